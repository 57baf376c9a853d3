//! Native Runtime Implementation
//!
//! Wraps `tokio::fs` behind the `Runtime` trait so the engine stays agnostic
//! of where its files live.

#![allow(clippy::disallowed_methods)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{FileMetadata, Runtime, RuntimeError, RuntimeResult};

/// Native filesystem `Runtime` implementation using `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeRuntime;

impl NativeRuntime {
    /// Create a new NativeRuntime instance.
    pub fn new() -> Self {
        Self
    }
}

fn to_metadata(metadata: &std::fs::Metadata) -> FileMetadata {
    FileMetadata {
        size: metadata.len(),
        is_dir: metadata.is_dir(),
        is_file: metadata.is_file(),
        is_symlink: metadata.file_type().is_symlink(),
    }
}

#[async_trait]
impl Runtime for NativeRuntime {
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RuntimeError::from_io(parent, e))?;
        }

        tokio::fs::write(path, content)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))?;
        Ok(to_metadata(&metadata))
    }

    async fn symlink_metadata(&self, path: &Path) -> RuntimeResult<FileMetadata> {
        let metadata = tokio::fs::symlink_metadata(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))?;
        Ok(to_metadata(&metadata))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    async fn canonicalize(&self, path: &Path) -> RuntimeResult<PathBuf> {
        tokio::fs::canonicalize(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()> {
        let result = if recursive {
            tokio::fs::create_dir_all(path).await
        } else {
            tokio::fs::create_dir(path).await
        };

        result.map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn copy_file(&self, from: &Path, to: &Path) -> RuntimeResult<()> {
        tokio::fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::from_io(from, e))
    }

    async fn read_link(&self, path: &Path) -> RuntimeResult<PathBuf> {
        tokio::fs::read_link(path)
            .await
            .map_err(|e| RuntimeError::from_io(path, e))
    }

    async fn symlink_dir(&self, target: &Path, link: &Path) -> RuntimeResult<()> {
        #[cfg(unix)]
        let result = tokio::fs::symlink(target, link).await;

        #[cfg(windows)]
        let result = tokio::fs::symlink_dir(target, link).await;

        #[cfg(not(any(unix, windows)))]
        let result: std::io::Result<()> = Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "symlinks are not supported on this platform",
        ));

        result.map_err(|e| RuntimeError::from_io(link, e))
    }

    async fn remove_file(&self, path: &Path) -> RuntimeResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            // Directory symlinks on Windows are removed as directories.
            #[cfg(windows)]
            Err(_) => tokio::fs::remove_dir(path)
                .await
                .map_err(|e| RuntimeError::from_io(path, e)),
            #[cfg(not(windows))]
            Err(e) => Err(RuntimeError::from_io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let path = temp_dir.path().join("a/b/c.txt");

        runtime.write_file(&path, b"content").await.unwrap();

        assert_eq!(runtime.read_file(&path).await.unwrap(), b"content");
    }

    #[tokio::test]
    async fn test_missing_file_maps_to_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();

        let err = runtime
            .read_file(&temp_dir.path().join("missing.js"))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let runtime = NativeRuntime::new();
        let target_dir = temp_dir.path().join("target");
        std::fs::create_dir(&target_dir).unwrap();
        let link = temp_dir.path().join("link");

        runtime
            .symlink_dir(Path::new("target"), &link)
            .await
            .unwrap();

        let meta = runtime.symlink_metadata(&link).await.unwrap();
        assert!(meta.is_symlink);
        assert_eq!(runtime.read_link(&link).await.unwrap(), PathBuf::from("target"));
        assert_eq!(
            runtime.canonicalize(&link).await.unwrap(),
            target_dir.canonicalize().unwrap()
        );
    }
}
