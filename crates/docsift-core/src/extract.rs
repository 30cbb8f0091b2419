//! Text extraction capability.

use async_trait::async_trait;

use crate::error::ExtractionError;

/// Turns uploaded bytes into raw text.
///
/// `content_type` is the declared MIME type of the upload. Implementations
/// reject types they cannot handle with
/// [`ExtractionError::UnsupportedContentType`]. An extractor that reads the
/// file successfully but finds no text returns `Ok(String::new())`.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: &[u8], content_type: &str) -> Result<String, ExtractionError>;
}
