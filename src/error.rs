use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::capture::PixelFormat;

/// Failures a streaming session can run into.
///
/// None of these leave a session: transient ones skip a frame, the rest end
/// the session that hit them and nothing else.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("camera capture failed: {0}")]
    CaptureFailed(String),

    #[error("frame encode failed: {0}")]
    EncodeFailed(String),

    #[error("unsupported pixel format: {0:?}")]
    UnsupportedEncoding(PixelFormat),

    #[error("stream write failed: {0}")]
    WriteFailed(String),

    #[error("camera sensor unavailable")]
    SensorUnavailable,
}

impl StreamError {
    /// Whether the session should skip the frame and keep going.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StreamError::CaptureFailed(_)
                | StreamError::EncodeFailed(_)
                | StreamError::UnsupportedEncoding(_)
                | StreamError::SensorUnavailable
        )
    }
}

/// A stream that never got going is reported to the client as 503.
impl IntoResponse for StreamError {
    fn into_response(self) -> Response {
        tracing::error!("Stream request failed: {}", self);
        (StatusCode::SERVICE_UNAVAILABLE, self.to_string()).into_response()
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, StreamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_write_failures_are_terminal() {
        assert!(StreamError::CaptureFailed("busy".into()).is_transient());
        assert!(StreamError::EncodeFailed("short".into()).is_transient());
        assert!(StreamError::UnsupportedEncoding(PixelFormat::Rgb565).is_transient());
        assert!(StreamError::SensorUnavailable.is_transient());
        assert!(!StreamError::WriteFailed("reset".into()).is_transient());
    }

    #[test]
    fn maps_to_service_unavailable() {
        let response = StreamError::SensorUnavailable.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
