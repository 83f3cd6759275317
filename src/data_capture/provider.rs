use async_trait::async_trait;

use crate::error_handling::types::DeviceError;

/// Source of still images.
///
/// Implementations own any device warm-up; a failed capture is retryable by
/// the next request.
#[async_trait]
pub trait CaptureProvider: Send + Sync {
    async fn capture(&self) -> Result<Vec<u8>, DeviceError>;
}
