use crate::shared::error::AppError;
use async_trait::async_trait;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub image_id: String,
    pub path: PathBuf,
}

/// Device-local image files addressed by a generated id.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<StoredImage, AppError>;
    async fn path_for(&self, image_id: &str) -> Result<Option<PathBuf>, AppError>;
    /// Returns whether a file was removed.
    async fn remove(&self, image_id: &str) -> Result<bool, AppError>;
}
