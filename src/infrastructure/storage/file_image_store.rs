use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use uuid::Uuid;

use crate::{
    application::ports::image_store::{ImageStore, StoredImage},
    shared::AppError,
};

const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Stores each image as `{uuid}.{ext}` under one directory.
pub struct FileImageStore {
    root_dir: PathBuf,
}

impl FileImageStore {
    pub async fn new(root_dir: PathBuf) -> Result<Self, AppError> {
        fs::create_dir_all(&root_dir)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to create image dir: {err}")))?;
        Ok(Self { root_dir })
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

fn extension_for(mime_type: &str) -> Result<&'static str, AppError> {
    match mime_type {
        "image/jpeg" | "image/jpg" => Ok("jpg"),
        "image/png" => Ok("png"),
        "image/webp" => Ok("webp"),
        "image/gif" => Ok("gif"),
        "image/heic" => Ok("heic"),
        other => Err(AppError::ValidationError(format!(
            "Unsupported image type: {other}"
        ))),
    }
}

fn parse_image_id(image_id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(image_id)
        .map_err(|_| AppError::InvalidInput(format!("Invalid image id: {image_id}")))
}

#[async_trait]
impl ImageStore for FileImageStore {
    async fn save(&self, bytes: &[u8], mime_type: &str) -> Result<StoredImage, AppError> {
        if bytes.is_empty() {
            return Err(AppError::ValidationError("Image file is empty".to_string()));
        }
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(AppError::ValidationError(format!(
                "Image size exceeds limit ({} bytes > {MAX_IMAGE_BYTES} bytes)",
                bytes.len()
            )));
        }
        let extension = extension_for(mime_type)?;

        let image_id = Uuid::new_v4().to_string();
        let path = self.root_dir.join(format!("{image_id}.{extension}"));
        fs::write(&path, bytes)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to write image: {err}")))?;

        Ok(StoredImage { image_id, path })
    }

    async fn path_for(&self, image_id: &str) -> Result<Option<PathBuf>, AppError> {
        let image_id = parse_image_id(image_id)?.to_string();
        let prefix = format!("{image_id}.");

        let mut entries = fs::read_dir(&self.root_dir)
            .await
            .map_err(|err| AppError::Storage(format!("Failed to read image dir: {err}")))?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(Some(entry.path()));
            }
        }
        Ok(None)
    }

    async fn remove(&self, image_id: &str) -> Result<bool, AppError> {
        match self.path_for(image_id).await? {
            Some(path) => {
                fs::remove_file(&path)
                    .await
                    .map_err(|err| AppError::Storage(format!("Failed to remove image: {err}")))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
