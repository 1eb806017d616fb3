//! Session states

use std::fmt;

use crate::capture::CapturedImage;
use crate::reading::AuraReading;

/// Identifies one reading request; results carrying an old ticket are stale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadingTicket(pub(super) u64);

/// The four screens of a session. Payloads exist only where a screen needs them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Landing screen, optionally showing why the last reading failed
    Start { error: Option<String> },
    /// Live camera, optionally showing why the camera could not be used
    Camera { error: Option<String> },
    /// Waiting on the reading service
    Processing {
        image: CapturedImage,
        ticket: ReadingTicket,
    },
    /// Result screen
    Readout {
        image: CapturedImage,
        reading: AuraReading,
    },
}

impl SessionState {
    pub fn start() -> Self {
        SessionState::Start { error: None }
    }

    pub fn phase(&self) -> Phase {
        match self {
            SessionState::Start { .. } => Phase::Start,
            SessionState::Camera { .. } => Phase::Camera,
            SessionState::Processing { .. } => Phase::Processing,
            SessionState::Readout { .. } => Phase::Readout,
        }
    }

    /// User-visible error on the current screen
    pub fn error(&self) -> Option<&str> {
        match self {
            SessionState::Start { error } | SessionState::Camera { error } => error.as_deref(),
            _ => None,
        }
    }

    /// Image held by the session, if any
    pub fn image(&self) -> Option<&CapturedImage> {
        match self {
            SessionState::Processing { image, .. } | SessionState::Readout { image, .. } => {
                Some(image)
            }
            _ => None,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::start()
    }
}

/// Payload-free discriminant of [`SessionState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Start,
    Camera,
    Processing,
    Readout,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Start => "start",
            Phase::Camera => "camera",
            Phase::Processing => "processing",
            Phase::Readout => "readout",
        };
        f.write_str(name)
    }
}
