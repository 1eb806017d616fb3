//! File-backed camera device
//!
//! Serves a single image from disk as if it were a live camera feed. Decoding
//! happens off the async runtime and readiness is signalled once it finishes.

use async_trait::async_trait;
use image::{imageops::FilterType, RgbImage};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

use super::{CameraDevice, CaptureError, OpenedStream, StreamConstraints, StreamMetadata, StreamTracks};

/// Camera device whose "feed" is a still image file
#[derive(Debug, Clone)]
pub struct StillImageCamera {
    path: PathBuf,
}

impl StillImageCamera {
    /// Create a device serving the image at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

struct StillTracks {
    frame: Arc<Mutex<Option<RgbImage>>>,
}

impl StreamTracks for StillTracks {
    fn sample(&mut self) -> Result<RgbImage, CaptureError> {
        self.frame.lock().clone().ok_or(CaptureError::NotReady)
    }

    fn stop(&mut self) {
        self.frame.lock().take();
    }
}

#[async_trait]
impl CameraDevice for StillImageCamera {
    async fn open(&self, constraints: &StreamConstraints) -> Result<OpenedStream, CaptureError> {
        if !self.path.is_file() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no image at {}",
                self.path.display()
            )));
        }
        debug!("Facing preference {:?} ignored for still images", constraints.facing);

        let frame: Arc<Mutex<Option<RgbImage>>> = Arc::default();
        let (tx, rx) = oneshot::channel();
        let path = self.path.clone();
        let (width, height) = (constraints.width, constraints.height);
        let slot = frame.clone();

        tokio::task::spawn_blocking(move || {
            let outcome = load_frame(&path, width, height).map(|image| {
                let metadata = StreamMetadata {
                    width: image.width(),
                    height: image.height(),
                };
                *slot.lock() = Some(image);
                metadata
            });
            let _ = tx.send(outcome);
        });

        Ok(OpenedStream {
            tracks: Box::new(StillTracks { frame }),
            ready: rx,
        })
    }
}

/// Decode the file and scale it down to fit the ideal resolution
fn load_frame(path: &Path, width: u32, height: u32) -> Result<RgbImage, CaptureError> {
    let image = image::open(path).map_err(|e| {
        CaptureError::DeviceUnavailable(format!("cannot decode {}: {}", path.display(), e))
    })?;

    let image = if width > 0 && height > 0 && (image.width() > width || image.height() > height) {
        image.resize(width, height, FilterType::Triangle)
    } else {
        image
    };

    Ok(image.to_rgb8())
}
