//! Native webcam device backed by nokhwa
//!
//! The camera handle lives on a dedicated worker thread that keeps the latest
//! decoded frame. The first decoded frame resolves the ready signal.

use async_trait::async_trait;
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CameraDevice, CaptureError, OpenedStream, StreamConstraints, StreamMetadata, StreamTracks};

type ReadySender = oneshot::Sender<Result<StreamMetadata, CaptureError>>;

/// Webcam selected by index
#[derive(Debug, Clone, Copy)]
pub struct WebcamCamera {
    index: u32,
}

impl WebcamCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

struct WebcamTracks {
    latest: Arc<Mutex<Option<RgbImage>>>,
    cancel: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StreamTracks for WebcamTracks {
    fn sample(&mut self) -> Result<RgbImage, CaptureError> {
        self.latest.lock().clone().ok_or(CaptureError::NotReady)
    }

    fn stop(&mut self) {
        self.cancel.cancel();
        self.latest.lock().take();

        let Some(worker) = self.worker.take() else {
            return;
        };
        // The worker may be blocked in a frame read; never join it on a runtime thread
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || join_worker(worker));
            }
            Err(_) => join_worker(worker),
        }
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        warn!("Webcam worker panicked during shutdown");
    }
}

#[async_trait]
impl CameraDevice for WebcamCamera {
    async fn open(&self, constraints: &StreamConstraints) -> Result<OpenedStream, CaptureError> {
        let latest: Arc<Mutex<Option<RgbImage>>> = Arc::default();
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let index = self.index;
        let constraints = *constraints;
        let worker_latest = latest.clone();
        let worker_cancel = cancel.clone();

        let worker = std::thread::Builder::new()
            .name(format!("webcam-{}", index))
            .spawn(move || capture_loop(index, constraints, worker_latest, worker_cancel, tx))
            .map_err(|e| CaptureError::DeviceUnavailable(format!("cannot start camera thread: {}", e)))?;

        Ok(OpenedStream {
            tracks: Box::new(WebcamTracks {
                latest,
                cancel,
                worker: Some(worker),
            }),
            ready: rx,
        })
    }
}

fn open_camera(index: u32, constraints: &StreamConstraints) -> Result<Camera, CaptureError> {
    let format = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
        Resolution::new(constraints.width, constraints.height),
        FrameFormat::MJPEG,
        30,
    )));

    let mut camera = Camera::new(CameraIndex::Index(index), format).map_err(map_error)?;
    camera.open_stream().map_err(map_error)?;
    Ok(camera)
}

/// Worker loop; exits on cancellation or when the device stops delivering frames
fn capture_loop(
    index: u32,
    constraints: StreamConstraints,
    latest: Arc<Mutex<Option<RgbImage>>>,
    cancel: CancellationToken,
    ready: ReadySender,
) {
    let mut camera = match open_camera(index, &constraints) {
        Ok(camera) => camera,
        Err(err) => {
            let _ = ready.send(Err(err));
            return;
        }
    };
    if constraints.facing != super::FacingMode::User {
        debug!("Facing preference {:?} is not selectable by index", constraints.facing);
    }

    let mut ready = Some(ready);
    while !cancel.is_cancelled() {
        let buffer = match camera.frame() {
            Ok(buffer) => buffer,
            Err(err) => {
                warn!("Webcam {} stopped delivering frames: {}", index, err);
                if let Some(tx) = ready.take() {
                    let _ = tx.send(Err(map_error(err)));
                }
                break;
            }
        };

        let decoded = match buffer.decode_image::<RgbFormat>() {
            Ok(decoded) => decoded,
            Err(err) => {
                debug!("Dropping undecodable frame: {}", err);
                continue;
            }
        };

        let (width, height) = (decoded.width(), decoded.height());
        if let Some(frame) = RgbImage::from_raw(width, height, decoded.into_raw()) {
            *latest.lock() = Some(frame);
            if let Some(tx) = ready.take() {
                info!("Webcam {} delivering {}x{}", index, width, height);
                let _ = tx.send(Ok(StreamMetadata { width, height }));
            }
        }
    }

    if let Err(err) = camera.stop_stream() {
        warn!("Failed to stop webcam {}: {}", index, err);
    }
}

fn map_error(err: NokhwaError) -> CaptureError {
    let text = err.to_string();
    let lower = text.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized") {
        return CaptureError::PermissionDenied(text);
    }
    match err {
        NokhwaError::UnsupportedOperationError(_) | NokhwaError::NotImplementedError(_) => {
            CaptureError::Unsupported
        }
        _ => CaptureError::DeviceUnavailable(text),
    }
}
