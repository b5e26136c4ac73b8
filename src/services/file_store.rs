use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::{AppError, AppResult};

const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Stores the bytes and returns the public URL.
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> AppResult<String>;
    async fn delete(&self, url: &str) -> AppResult<()>;
}

/// Lowercased extension of an allowed image file name.
pub fn image_extension(name: &str) -> AppResult<String> {
    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .ok_or_else(|| AppError::ValidationError("File name needs an extension".into()))?;

    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(AppError::ValidationError(format!(
            "Unsupported image type '{}'",
            extension
        )));
    }
    Ok(extension)
}

/// Writes uploads to a local directory served under `base_url`.
pub struct LocalFileStore {
    root: PathBuf,
    base_url: String,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, base_url: &str) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn path_for(&self, url: &str) -> AppResult<PathBuf> {
        let file_name = url
            .strip_prefix(&self.base_url)
            .map(|rest| rest.trim_start_matches('/'))
            .filter(|name| !name.is_empty() && !name.contains('/') && !name.contains(".."))
            .ok_or_else(|| {
                AppError::ValidationError(format!("'{}' is not a stored file", url))
            })?;
        Ok(self.root.join(file_name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn upload(&self, bytes: Vec<u8>, name: &str) -> AppResult<String> {
        if bytes.is_empty() {
            return Err(AppError::ValidationError("Uploaded file is empty".into()));
        }
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(AppError::ValidationError(format!(
                "Uploaded file exceeds {} bytes",
                MAX_UPLOAD_BYTES
            )));
        }
        let extension = image_extension(name)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), extension);

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| AppError::DependencyFailure(format!("Upload directory unavailable: {}", e)))?;
        tokio::fs::write(self.root.join(&file_name), bytes)
            .await
            .map_err(|e| AppError::DependencyFailure(format!("Failed to store upload: {}", e)))?;

        Ok(format!("{}/{}", self.base_url, file_name))
    }

    async fn delete(&self, url: &str) -> AppResult<()> {
        let path = self.path_for(url)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::DependencyFailure(format!(
                "Failed to delete '{}': {}",
                url, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_images_are_accepted() {
        assert_eq!(image_extension("Diagram.PNG").unwrap(), "png");
        assert!(image_extension("notes.txt").is_err());
        assert!(image_extension("no_extension").is_err());
    }

    #[tokio::test]
    async fn upload_then_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "/uploads/");

        let url = store.upload(vec![1, 2, 3], "figure.jpg").await.unwrap();
        assert!(url.starts_with("/uploads/"));
        assert!(url.ends_with(".jpg"));

        let path = store.path_for(&url).unwrap();
        assert!(path.exists());

        store.delete(&url).await.unwrap();
        assert!(!path.exists());
        // Deleting twice is fine.
        store.delete(&url).await.unwrap();
    }

    #[tokio::test]
    async fn foreign_urls_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "/uploads");
        assert!(store.delete("/etc/passwd").await.is_err());
        assert!(store.delete("/uploads/../secret").await.is_err());
    }

    #[tokio::test]
    async fn empty_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(dir.path(), "/uploads");
        assert!(store.upload(Vec::new(), "a.png").await.is_err());
    }
}
