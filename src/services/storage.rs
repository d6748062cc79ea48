//! File storage for uploaded documents and cover images
//!
//! Files are written below the upload directory as `<folder>/<uuid>.<ext>`.
//! The returned reference is that relative path; it is what the database
//! stores and what `/media/` serves.

use crate::config::UploadConfig;
use std::path::PathBuf;
use uuid::Uuid;

/// URL prefix under which stored files are served
pub const MEDIA_URL: &str = "/media/";

/// Folder for post documents
pub const DOCUMENTS_FOLDER: &str = "documents";

/// Folder for cover images
pub const COVERS_FOLDER: &str = "covers";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("File is too large ({size} bytes, limit {limit} bytes)")]
    TooLarge { size: u64, limit: u64 },

    #[error("Failed to store file: {0}")]
    Io(#[from] std::io::Error),
}

/// An uploaded file held in memory until it is stored
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// File name as sent by the client
    pub file_name: String,
    /// Content type as sent by the client
    pub content_type: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Stores uploads on the local filesystem
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
    config: UploadConfig,
}

impl FileStorage {
    pub fn new(config: UploadConfig) -> Self {
        Self {
            root: config.path.clone(),
            config,
        }
    }

    /// Write a file into `folder` and return its reference
    pub async fn save(&self, folder: &str, file: &UploadedFile) -> Result<String, StorageError> {
        if file.size() > self.config.max_file_size {
            return Err(StorageError::TooLarge {
                size: file.size(),
                limit: self.config.max_file_size,
            });
        }

        let extension = self.config.extension_for(&file.content_type, &file.file_name);
        let reference = format!("{}/{}.{}", folder, Uuid::new_v4().simple(), extension);

        let dir = self.root.join(folder);
        tokio::fs::create_dir_all(&dir).await?;
        tokio::fs::write(self.root.join(&reference), &file.data).await?;

        tracing::debug!(reference = %reference, bytes = file.size(), "Stored upload");
        Ok(reference)
    }

    /// Remove a stored file. Missing files are ignored.
    pub async fn delete(&self, reference: &str) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.root.join(reference)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Public URL of a stored file reference
pub fn media_url(reference: &str) -> String {
    format!("{}{}", MEDIA_URL, reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(max_file_size: u64) -> (TempDir, FileStorage) {
        let dir = TempDir::new().unwrap();
        let config = UploadConfig {
            path: dir.path().to_path_buf(),
            max_file_size,
            ..UploadConfig::default()
        };
        (dir, FileStorage::new(config))
    }

    fn png(data: &[u8]) -> UploadedFile {
        UploadedFile {
            file_name: "cover.png".into(),
            content_type: "image/png".into(),
            data: data.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_save_writes_file_under_folder() {
        let (dir, storage) = storage(1024);

        let reference = storage.save(COVERS_FOLDER, &png(b"\x89PNG")).await.unwrap();

        assert!(reference.starts_with("covers/"));
        assert!(reference.ends_with(".png"));
        let written = std::fs::read(dir.path().join(&reference)).unwrap();
        assert_eq!(written, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_save_uses_unique_names() {
        let (_dir, storage) = storage(1024);

        let a = storage.save(COVERS_FOLDER, &png(b"a")).await.unwrap();
        let b = storage.save(COVERS_FOLDER, &png(b"b")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_save_rejects_oversized_file() {
        let (_dir, storage) = storage(4);

        let err = storage.save(COVERS_FOLDER, &png(b"too large")).await.unwrap_err();
        assert!(matches!(err, StorageError::TooLarge { size: 9, limit: 4 }));
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_file() {
        let (_dir, storage) = storage(1024);

        let reference = storage.save(DOCUMENTS_FOLDER, &png(b"x")).await.unwrap();
        storage.delete(&reference).await.unwrap();
        storage.delete(&reference).await.unwrap();
    }

    #[test]
    fn test_media_url() {
        assert_eq!(media_url("covers/a.png"), "/media/covers/a.png");
    }
}
