//! Session State Machine
//!
//! Drives the `start -> camera -> processing -> readout` cycle, owns the captured
//! still and the reading, and maps failures back to a screen with a message.

pub mod state;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::capture::{CaptureError, CapturedImage};
use crate::reading::{AuraReading, ReadingError};

pub use state::{Phase, ReadingTicket, SessionState};

/// Shown on the start screen whenever a reading fails, whatever the cause
pub const READING_FAILED_MESSAGE: &str = "Failed to connect with the cosmos. Please try again.";

/// Errors raised by session transitions
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    /// The trigger is not valid in the current state
    #[error("cannot {trigger} while on the {from} screen")]
    InvalidTransition { from: Phase, trigger: &'static str },
    /// Readout was entered without both an image and a reading
    #[error("readout entered without {missing}")]
    InconsistentState { missing: &'static str },
}

/// What happened to a reading result handed to [`Session::complete_reading`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// The result was applied; the session is now on this screen
    Applied(Phase),
    /// The session moved on before the result arrived; it was dropped
    Stale,
}

/// One user session
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    state: SessionState,
    generation: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session on the start screen with no error
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::start(),
            generation: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Start -> Camera, clearing any previous error
    pub fn begin(&mut self) -> Result<(), SessionError> {
        self.ensure_phase(Phase::Start, "begin a reading")?;
        self.transition(SessionState::Camera { error: None });
        Ok(())
    }

    /// Camera -> Camera with a cause-specific message; the user retries in place
    pub fn report_capture_error(&mut self, err: &CaptureError) -> Result<(), SessionError> {
        self.ensure_phase(Phase::Camera, "report a camera error")?;
        warn!(session = %self.id, error = %err, "Camera capture failed");
        self.state = SessionState::Camera {
            error: Some(err.user_message().to_string()),
        };
        Ok(())
    }

    /// Clear an inline camera error before trying the camera again
    pub fn retry_camera(&mut self) -> Result<(), SessionError> {
        self.ensure_phase(Phase::Camera, "retry the camera")?;
        self.state = SessionState::Camera { error: None };
        Ok(())
    }

    /// Camera -> Processing, taking ownership of the still
    pub fn submit_capture(&mut self, image: CapturedImage) -> Result<ReadingTicket, SessionError> {
        self.ensure_phase(Phase::Camera, "submit a capture")?;
        self.generation += 1;
        let ticket = ReadingTicket(self.generation);
        self.transition(SessionState::Processing { image, ticket });
        Ok(ticket)
    }

    /// Apply the outcome of the reading request issued under `ticket`.
    ///
    /// Success moves to Readout. Failure of any kind drops the still and returns
    /// to Start with [`READING_FAILED_MESSAGE`]. A result for a ticket that is no
    /// longer current is discarded without touching the state.
    pub fn complete_reading(
        &mut self,
        ticket: ReadingTicket,
        result: Result<AuraReading, ReadingError>,
    ) -> Commit {
        let current = match &self.state {
            SessionState::Processing { ticket, .. } => Some(*ticket),
            _ => None,
        };
        if current != Some(ticket) {
            debug!(
                session = %self.id,
                ticket = ticket.0,
                phase = %self.phase(),
                "Discarding stale reading result"
            );
            return Commit::Stale;
        }

        match result {
            Ok(reading) => {
                let image = self.state.image().cloned();
                match self.show_readout(image, Some(reading)) {
                    Ok(()) => Commit::Applied(Phase::Readout),
                    Err(_) => Commit::Applied(Phase::Start),
                }
            }
            Err(err) => {
                warn!(
                    session = %self.id,
                    kind = err.kind(),
                    error = %err,
                    "Reading failed"
                );
                self.transition(SessionState::Start {
                    error: Some(READING_FAILED_MESSAGE.to_string()),
                });
                Commit::Applied(Phase::Start)
            }
        }
    }

    /// Processing -> Readout. Both parts must be present; otherwise the session
    /// resets itself to Start and reports the inconsistency.
    fn show_readout(
        &mut self,
        image: Option<CapturedImage>,
        reading: Option<AuraReading>,
    ) -> Result<(), SessionError> {
        self.ensure_phase(Phase::Processing, "show a readout")?;
        match (image, reading) {
            (Some(image), Some(reading)) => {
                self.transition(SessionState::Readout { image, reading });
                Ok(())
            }
            (image, reading) => {
                let missing = match (image.is_none(), reading.is_none()) {
                    (true, true) => "an image or a reading",
                    (true, false) => "an image",
                    _ => "a reading",
                };
                let err = SessionError::InconsistentState { missing };
                error!(session = %self.id, error = %err, "Inconsistent session state, resetting");
                self.reset();
                Err(err)
            }
        }
    }

    /// Back to Start with nothing held. Safe from any state and idempotent;
    /// a reading still in flight becomes stale.
    pub fn reset(&mut self) {
        if self.phase() == Phase::Processing {
            self.generation += 1;
        }
        self.transition(SessionState::start());
    }

    /// Fail with [`SessionError::InvalidTransition`] unless on `phase`
    pub fn ensure_phase(&self, phase: Phase, trigger: &'static str) -> Result<(), SessionError> {
        if self.phase() == phase {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition {
                from: self.phase(),
                trigger,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        self.state = next;
        info!(session = %self.id, "Session entered {}", self.phase());
    }
}
