//! Reading Client
//!
//! Turns one captured still into one validated [`AuraReading`] through a single
//! structured-generation request. No retries happen here; retrying is the
//! caller's decision.

pub mod gemini;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::capture::CapturedImage;

pub use gemini::GeminiClient;
pub use types::AuraReading;

/// Errors raised by a reading request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadingError {
    /// Timeout, non-success status, or an unreadable transport response
    #[error("reading service unavailable: {0}")]
    ServiceUnavailable(String),
    /// The model answered, but not with a well-formed reading
    #[error("invalid reading response: {0}")]
    InvalidResponseShape(String),
}

impl ReadingError {
    /// Short label for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ReadingError::ServiceUnavailable(_) => "service_unavailable",
            ReadingError::InvalidResponseShape(_) => "invalid_response_shape",
        }
    }
}

/// Anything that can produce a reading from a captured still
#[async_trait]
pub trait ReadingService: Send + Sync {
    /// Perform exactly one outbound request for `image`
    async fn request_reading(&self, image: &CapturedImage) -> Result<AuraReading, ReadingError>;
}
