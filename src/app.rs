//! Application Coordinator
//!
//! Composes the capture source, the reading client and the session state
//! machine into the capture-to-result pipeline.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{CameraDevice, CaptureError, CaptureSource, CapturedImage, FrameOptions, StreamConstraints};
use crate::config::AppConfig;
use crate::reading::ReadingService;
use crate::session::{Commit, Phase, Session, SessionError, SessionState};

/// Errors raised while driving a capture
#[derive(Debug, Error)]
pub enum AppError {
    /// The session is not on the camera screen
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The camera could not produce a still
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// Main application coordinator
pub struct AuraApp {
    /// Session shared with whoever presents it
    session: Arc<Mutex<Session>>,
    /// Camera stream owner
    capture: CaptureSource,
    /// Injected reading client
    reader: Arc<dyn ReadingService>,
    constraints: StreamConstraints,
    frame_options: FrameOptions,
    ready_timeout: Duration,
}

impl AuraApp {
    /// Create a coordinator over a camera device and a reading client
    pub fn new(config: &AppConfig, camera: Arc<dyn CameraDevice>, reader: Arc<dyn ReadingService>) -> Self {
        Self {
            session: Arc::new(Mutex::new(Session::new())),
            capture: CaptureSource::new(camera),
            reader,
            constraints: config.capture.constraints(),
            frame_options: config.capture.frame_options(),
            ready_timeout: config.capture.ready_timeout(),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> SessionState {
        self.session.lock().state().clone()
    }

    /// Start screen -> camera screen
    pub fn begin(&self) -> Result<(), SessionError> {
        let mut session = self.session.lock();
        session.begin()?;
        info!("Session {} looking into the camera", session.id());
        Ok(())
    }

    /// Open the camera, wait for it, and take one still.
    ///
    /// Only valid on the camera screen; elsewhere the device is not touched.
    /// The stream is released whatever the outcome. On failure the session stays
    /// on the camera screen with a cause-specific message.
    pub async fn capture(&mut self) -> Result<CapturedImage, AppError> {
        {
            let mut session = self.session.lock();
            session.ensure_phase(Phase::Camera, "use the camera")?;
            if session.state().error().is_some() {
                session.retry_camera()?;
            }
        }

        let result = self.capture_still().await;
        self.capture.close_stream();

        if let Err(err) = &result {
            if let Err(session_err) = self.session.lock().report_capture_error(err) {
                debug!("Capture error not shown: {}", session_err);
            }
        }
        result.map_err(AppError::from)
    }

    async fn capture_still(&mut self) -> Result<CapturedImage, CaptureError> {
        let timeout = self.ready_timeout;
        let options = self.frame_options;
        let stream = self.capture.open_stream(&self.constraints).await?;

        let metadata = match tokio::time::timeout(timeout, stream.ready()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(format!(
                    "camera did not become ready within {:?}",
                    timeout
                )))
            }
        };
        info!(
            "Camera stream {} ready at {}x{}",
            stream.id(),
            metadata.width,
            metadata.height
        );

        stream.capture_frame(&options)
    }

    /// Hand the still to the session and build the reading request.
    ///
    /// The returned future owns everything it needs, so it can be spawned. It
    /// commits its result only if the session is still waiting on this request.
    pub fn reading_job(
        &self,
        image: CapturedImage,
    ) -> Result<impl Future<Output = Commit> + Send + 'static, SessionError> {
        let ticket = self.session.lock().submit_capture(image.clone())?;
        let session = self.session.clone();
        let reader = self.reader.clone();

        Ok(async move {
            let result = reader.request_reading(&image).await;
            debug!("Reading settled {:?} after capture", image.captured_at().elapsed());
            let commit = session.lock().complete_reading(ticket, result);
            if commit == Commit::Stale {
                warn!("Reading arrived after the session moved on; discarded");
            }
            commit
        })
    }

    /// Return to the start screen, dropping anything held
    pub fn reset(&mut self) {
        if self.capture.has_open_stream() {
            debug!("Releasing camera on reset");
            self.capture.close_stream();
        }
        self.session.lock().reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::testing::RecordingCamera;
    use crate::reading::{AuraReading, ReadingError};
    use crate::session::READING_FAILED_MESSAGE;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Reading service returning a canned result, optionally gated
    struct FakeReader {
        result: Result<AuraReading, ReadingError>,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeReader {
        fn returning(result: Result<AuraReading, ReadingError>) -> Self {
            Self {
                result,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl ReadingService for FakeReader {
        async fn request_reading(&self, _image: &CapturedImage) -> Result<AuraReading, ReadingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.result.clone()
        }
    }

    fn reading() -> AuraReading {
        AuraReading {
            aura_color_insight: "Your aura glows with a vibrant indigo.".to_string(),
            future_glimpse: "A wave of creative energy is approaching.".to_string(),
            angel_number: 777,
            spiritual_guidance: "Trust your intuition.".to_string(),
            primary_colors: vec![
                "#112233".to_string(),
                "#445566".to_string(),
                "#778899".to_string(),
            ],
        }
    }

    fn app_with(camera: Arc<RecordingCamera>, reader: Arc<FakeReader>) -> AuraApp {
        let mut config = AppConfig::default();
        config.capture.blur_sigma = 0.0;
        config.capture.ready_timeout_secs = 1;
        AuraApp::new(&config, camera, reader)
    }

    #[tokio::test]
    async fn test_full_cycle_reaches_readout() {
        let camera = Arc::new(RecordingCamera::new());
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let mut app = app_with(camera.clone(), reader.clone());

        app.begin().unwrap();
        let image = app.capture().await.unwrap();
        let commit = app.reading_job(image.clone()).unwrap().await;

        assert_eq!(commit, Commit::Applied(Phase::Readout));
        assert_eq!(
            app.state(),
            SessionState::Readout {
                image,
                reading: reading()
            }
        );
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
        assert_eq!(camera.opens(), camera.closes());
    }

    #[tokio::test]
    async fn test_invalid_reading_returns_to_start_with_message() {
        let camera = Arc::new(RecordingCamera::new());
        let reader = Arc::new(FakeReader::returning(Err(ReadingError::InvalidResponseShape(
            "`angelNumber` must be a number, got a string".to_string(),
        ))));
        let mut app = app_with(camera, reader.clone());

        app.begin().unwrap();
        let image = app.capture().await.unwrap();
        app.reading_job(image).unwrap().await;

        let state = app.state();
        assert_eq!(state.phase(), Phase::Start);
        assert_eq!(state.error(), Some(READING_FAILED_MESSAGE));
        assert!(state.image().is_none());
        // No retry
        assert_eq!(reader.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_stays_on_camera() {
        let camera = Arc::new(RecordingCamera::failing(CaptureError::PermissionDenied(
            "NotAllowedError".to_string(),
        )));
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let mut app = app_with(camera.clone(), reader.clone());

        app.begin().unwrap();
        let result = app.capture().await;

        assert!(matches!(result, Err(AppError::Capture(CaptureError::PermissionDenied(_)))));
        let state = app.state();
        assert_eq!(state.phase(), Phase::Camera);
        assert!(state.error().unwrap().contains("denied"));
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
        assert_eq!(camera.opens(), camera.closes());
    }

    #[tokio::test]
    async fn test_retry_after_camera_error_clears_message() {
        let camera = Arc::new(RecordingCamera::failing(CaptureError::Unsupported));
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let mut app = app_with(camera.clone(), reader);

        app.begin().unwrap();
        assert!(app.capture().await.is_err());
        assert!(app.state().error().is_some());

        *camera.open_error.lock() = None;
        let image = app.capture().await.unwrap();

        assert_eq!(app.state(), SessionState::Camera { error: None });
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(camera.opens(), 1);
    }

    #[tokio::test]
    async fn test_ready_timeout_releases_stream() {
        let camera = Arc::new(RecordingCamera {
            manual_ready: true,
            ..RecordingCamera::new()
        });
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let mut app = app_with(camera.clone(), reader);

        app.begin().unwrap();
        let result = app.capture().await;

        assert!(matches!(result, Err(AppError::Capture(CaptureError::DeviceUnavailable(_)))));
        assert_eq!(app.state().phase(), Phase::Camera);
        assert_eq!(camera.opens(), 1);
        assert_eq!(camera.closes(), 1);
    }

    #[tokio::test]
    async fn test_reset_while_processing_discards_late_result() {
        let camera = Arc::new(RecordingCamera::new());
        let gate = Arc::new(Notify::new());
        let reader = Arc::new(FakeReader {
            gate: Some(gate.clone()),
            ..FakeReader::returning(Ok(reading()))
        });
        let mut app = app_with(camera, reader);

        app.begin().unwrap();
        let image = app.capture().await.unwrap();
        let job = tokio::spawn(app.reading_job(image).unwrap());
        assert_eq!(app.state().phase(), Phase::Processing);

        app.reset();
        gate.notify_one();

        assert_eq!(job.await.unwrap(), Commit::Stale);
        assert_eq!(app.state(), SessionState::start());
    }

    #[tokio::test]
    async fn test_read_outside_camera_is_rejected() {
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let app = app_with(Arc::new(RecordingCamera::new()), reader.clone());
        let image = CapturedImage::from_jpeg(vec![0xFF, 0xD8, 0xFF, 0xD9], 1, 1);

        assert!(app.reading_job(image).is_err());
        assert_eq!(reader.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_capture_before_begin_leaves_camera_closed() {
        let camera = Arc::new(RecordingCamera::new());
        let reader = Arc::new(FakeReader::returning(Ok(reading())));
        let mut app = app_with(camera.clone(), reader);

        let result = app.capture().await;

        assert!(matches!(
            result,
            Err(AppError::Session(SessionError::InvalidTransition {
                from: Phase::Start,
                ..
            }))
        ));
        assert_eq!(camera.opens(), 0);
        assert_eq!(app.state(), SessionState::start());
    }

    #[tokio::test]
    async fn test_capture_while_processing_is_rejected() {
        let camera = Arc::new(RecordingCamera::new());
        let gate = Arc::new(Notify::new());
        let reader = Arc::new(FakeReader {
            gate: Some(gate.clone()),
            ..FakeReader::returning(Ok(reading()))
        });
        let mut app = app_with(camera.clone(), reader);

        app.begin().unwrap();
        let image = app.capture().await.unwrap();
        let job = tokio::spawn(app.reading_job(image).unwrap());

        assert!(matches!(app.capture().await, Err(AppError::Session(_))));
        assert_eq!(camera.opens(), 1);

        gate.notify_one();
        assert_eq!(job.await.unwrap(), Commit::Applied(Phase::Readout));
    }
}
