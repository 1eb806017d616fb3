//! Camera Capture Layer
//!
//! Owns the lifecycle of a live camera stream and extracts single stills from it.
//! Platform access sits behind [`CameraDevice`]; a [`CaptureSource`] holds at most
//! one open stream and releases it on every exit path.

pub mod frame;
pub mod still;
#[cfg(feature = "webcam")]
pub mod webcam;

use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

pub use frame::{CapturedImage, FrameOptions};

/// Errors raised while acquiring or sampling the camera
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CaptureError {
    /// The user or the OS refused camera access
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    /// No camera, camera busy, or a hardware fault
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),
    /// The platform has no camera API
    #[error("camera capture is not supported on this platform")]
    Unsupported,
    /// A frame was requested before the stream delivered one
    #[error("camera stream is not ready")]
    NotReady,
    /// The sampled frame could not be encoded
    #[error("failed to encode captured frame: {0}")]
    Encode(String),
}

impl CaptureError {
    /// Message shown on the camera screen, specific to the cause
    pub fn user_message(&self) -> &'static str {
        match self {
            CaptureError::PermissionDenied(_) => {
                "Camera access was denied. Please enable camera permissions to continue."
            }
            CaptureError::Unsupported => "This platform does not support camera access.",
            CaptureError::NotReady => "The camera is still warming up. Please try again.",
            CaptureError::DeviceUnavailable(_) | CaptureError::Encode(_) => {
                "Could not access the camera. Please ensure it's not in use by another application and is connected properly."
            }
        }
    }
}

/// Preferred camera orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FacingMode {
    /// Front-facing, towards the user
    #[default]
    User,
    /// Rear-facing
    Environment,
}

/// Requested stream parameters; resolution is an ideal, not a guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 720,
            height: 720,
            facing: FacingMode::User,
        }
    }
}

/// Parameters the device settled on once negotiation finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamMetadata {
    pub width: u32,
    pub height: u32,
}

/// Resolves exactly once, when the stream has delivered its first frame or failed to
pub type ReadySignal = oneshot::Receiver<Result<StreamMetadata, CaptureError>>;

/// Device-side handle of an open stream
pub trait StreamTracks: Send {
    /// Sample the most recent frame, unmirrored
    fn sample(&mut self) -> Result<RgbImage, CaptureError>;

    /// Release the underlying device tracks
    fn stop(&mut self);
}

/// What a device hands back when a stream is requested
pub struct OpenedStream {
    pub tracks: Box<dyn StreamTracks>,
    pub ready: ReadySignal,
}

/// Platform camera API
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Request a video-only stream matching `constraints`
    async fn open(&self, constraints: &StreamConstraints) -> Result<OpenedStream, CaptureError>;
}

/// Device for platforms without camera access
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCamera;

#[async_trait]
impl CameraDevice for NoCamera {
    async fn open(&self, _constraints: &StreamConstraints) -> Result<OpenedStream, CaptureError> {
        Err(CaptureError::Unsupported)
    }
}

/// An open camera stream.
///
/// The device tracks are released exactly once: on [`CameraStream::close`] or on drop.
pub struct CameraStream {
    id: u64,
    tracks: Option<Box<dyn StreamTracks>>,
    ready: Option<ReadySignal>,
    metadata: Option<StreamMetadata>,
}

impl CameraStream {
    fn new(id: u64, opened: OpenedStream) -> Self {
        Self {
            id,
            tracks: Some(opened.tracks),
            ready: Some(opened.ready),
            metadata: None,
        }
    }

    /// Stream identifier, unique per capture source
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the stream has delivered a frame
    pub fn is_ready(&self) -> bool {
        self.metadata.is_some()
    }

    /// Wait until the device finishes negotiating and delivers a frame.
    ///
    /// Cancel-safe: dropping the future before it resolves leaves the signal in place.
    pub async fn ready(&mut self) -> Result<StreamMetadata, CaptureError> {
        if let Some(metadata) = self.metadata {
            return Ok(metadata);
        }
        let signal = self.ready.as_mut().ok_or(CaptureError::NotReady)?;
        let outcome = signal.await;
        self.ready = None;

        let metadata = match outcome {
            Ok(result) => result?,
            Err(_) => {
                return Err(CaptureError::DeviceUnavailable(
                    "stream ended before delivering a frame".to_string(),
                ))
            }
        };
        debug!("Stream {} ready at {}x{}", self.id, metadata.width, metadata.height);
        self.metadata = Some(metadata);
        Ok(metadata)
    }

    /// Sample the current frame, mirror and encode it
    pub fn capture_frame(&mut self, options: &FrameOptions) -> Result<CapturedImage, CaptureError> {
        if !self.is_ready() {
            return Err(CaptureError::NotReady);
        }
        let tracks = self.tracks.as_mut().ok_or(CaptureError::NotReady)?;
        let raw = tracks.sample()?;
        frame::encode_still(&raw, options)
    }

    /// Release the device tracks
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(mut tracks) = self.tracks.take() {
            tracks.stop();
            debug!("Stream {} released", self.id);
        }
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Holds at most one open stream on a camera device
pub struct CaptureSource {
    device: Arc<dyn CameraDevice>,
    active: Option<CameraStream>,
    opened: u64,
}

impl CaptureSource {
    /// Create a capture source over a camera device
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            active: None,
            opened: 0,
        }
    }

    /// Open a new stream, releasing any stream this source already holds
    pub async fn open_stream(
        &mut self,
        constraints: &StreamConstraints,
    ) -> Result<&mut CameraStream, CaptureError> {
        self.close_stream();

        let opened = self.device.open(constraints).await?;
        self.opened += 1;
        info!(
            "Opened camera stream {} (ideal {}x{}, facing {:?})",
            self.opened, constraints.width, constraints.height, constraints.facing
        );

        Ok(self.active.insert(CameraStream::new(self.opened, opened)))
    }

    /// Whether a stream is currently held
    pub fn has_open_stream(&self) -> bool {
        self.active.is_some()
    }

    /// Release the held stream; no-op when nothing is open
    pub fn close_stream(&mut self) {
        if let Some(stream) = self.active.take() {
            stream.close();
        }
    }
}

impl Drop for CaptureSource {
    fn drop(&mut self) {
        self.close_stream();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingCamera;
    use super::*;
    use std::time::Duration;

    fn source_with(camera: &Arc<RecordingCamera>) -> CaptureSource {
        CaptureSource::new(camera.clone())
    }

    fn sharp() -> FrameOptions {
        FrameOptions {
            jpeg_quality: 80,
            blur_sigma: 0.0,
        }
    }

    #[tokio::test]
    async fn test_open_then_close_releases_device() {
        let camera = Arc::new(RecordingCamera::new());
        let mut source = source_with(&camera);

        source.open_stream(&StreamConstraints::default()).await.unwrap();
        assert!(source.has_open_stream());
        source.close_stream();

        assert!(!source.has_open_stream());
        assert_eq!(camera.opens(), 1);
        assert_eq!(camera.closes(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let camera = Arc::new(RecordingCamera::new());
        let mut source = source_with(&camera);

        source.open_stream(&StreamConstraints::default()).await.unwrap();
        source.close_stream();
        source.close_stream();

        assert_eq!(camera.closes(), 1);
    }

    #[tokio::test]
    async fn test_reopen_releases_previous_stream_first() {
        let camera = Arc::new(RecordingCamera::new());
        let mut source = source_with(&camera);

        let first = source.open_stream(&StreamConstraints::default()).await.unwrap().id();
        let second = source.open_stream(&StreamConstraints::default()).await.unwrap().id();

        assert_ne!(first, second);
        assert_eq!(camera.opens(), 2);
        assert_eq!(camera.closes(), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_open_stream() {
        let camera = Arc::new(RecordingCamera::new());
        {
            let mut source = source_with(&camera);
            source.open_stream(&StreamConstraints::default()).await.unwrap();
        }

        assert_eq!(camera.opens(), camera.closes());
    }

    #[tokio::test]
    async fn test_open_failure_holds_nothing() {
        let camera = Arc::new(RecordingCamera::failing(CaptureError::PermissionDenied(
            "NotAllowedError".to_string(),
        )));
        let mut source = source_with(&camera);

        let result = source.open_stream(&StreamConstraints::default()).await;

        assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
        assert!(!source.has_open_stream());
        assert_eq!(camera.closes(), 0);
    }

    #[tokio::test]
    async fn test_capture_before_ready_is_rejected() {
        let camera = Arc::new(RecordingCamera {
            manual_ready: true,
            ..RecordingCamera::new()
        });
        let mut source = source_with(&camera);
        let stream = source.open_stream(&StreamConstraints::default()).await.unwrap();

        assert!(!stream.is_ready());
        assert_eq!(stream.capture_frame(&sharp()), Err(CaptureError::NotReady));
    }

    #[tokio::test]
    async fn test_ready_waits_for_signal() {
        let camera = Arc::new(RecordingCamera {
            manual_ready: true,
            ..RecordingCamera::new()
        });
        let mut source = source_with(&camera);
        let stream = source.open_stream(&StreamConstraints::default()).await.unwrap();

        // Nothing resolves until the device signals
        let early = tokio::time::timeout(Duration::from_millis(20), stream.ready()).await;
        assert!(early.is_err());

        camera.signal_ready();
        let metadata = stream.ready().await.unwrap();
        assert_eq!(metadata, StreamMetadata { width: 8, height: 8 });

        // Resolves again from the stored metadata
        assert_eq!(stream.ready().await.unwrap(), metadata);
        let still = stream.capture_frame(&sharp()).unwrap();
        assert_eq!(still.dimensions(), (8, 8));
    }

    #[tokio::test]
    async fn test_ready_error_is_reported() {
        let camera = Arc::new(RecordingCamera {
            ready_error: Some(CaptureError::DeviceUnavailable("busy".to_string())),
            ..RecordingCamera::new()
        });
        let mut source = source_with(&camera);
        let stream = source.open_stream(&StreamConstraints::default()).await.unwrap();

        assert_eq!(
            stream.ready().await,
            Err(CaptureError::DeviceUnavailable("busy".to_string()))
        );
        assert_eq!(stream.capture_frame(&sharp()), Err(CaptureError::NotReady));
    }

    #[tokio::test]
    async fn test_no_camera_is_unsupported() {
        let mut source = CaptureSource::new(Arc::new(NoCamera));
        let result = source.open_stream(&StreamConstraints::default()).await;

        assert!(matches!(result, Err(CaptureError::Unsupported)));
    }

    #[test]
    fn test_user_messages_distinguish_causes() {
        let denied = CaptureError::PermissionDenied(String::new()).user_message();
        let missing = CaptureError::DeviceUnavailable(String::new()).user_message();
        let unsupported = CaptureError::Unsupported.user_message();

        assert!(denied.contains("denied"));
        assert_ne!(denied, missing);
        assert_ne!(missing, unsupported);
    }
}
