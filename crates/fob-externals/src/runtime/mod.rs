//! Filesystem runtime abstraction for the externals engine
//!
//! This module defines the `Runtime` trait that abstracts every filesystem
//! probe and write the engine performs (reading descriptors, canonicalizing
//! traced paths, copying package files, creating links). `NativeRuntime`
//! implements it on top of `tokio::fs`; tests wrap it to inject failures.

pub mod native;

pub use native::NativeRuntime;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result type for runtime operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors that can occur during runtime operations
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Permission denied
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Other runtime error
    #[error("Runtime error: {0}")]
    Other(String),
}

impl RuntimeError {
    /// Map an `std::io::Error` for `path` onto the runtime taxonomy.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => RuntimeError::FileNotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => {
                RuntimeError::PermissionDenied(path.to_path_buf())
            }
            _ => RuntimeError::Io {
                path: path.to_path_buf(),
                source: err,
            },
        }
    }

    /// Whether retrying the same operation could plausibly succeed.
    ///
    /// Missing files and permission problems will not fix themselves between
    /// attempts; everything else (busy files, interrupted syscalls, descriptor
    /// exhaustion) is treated as transient.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            RuntimeError::FileNotFound(_) | RuntimeError::PermissionDenied(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::FileNotFound(_))
    }
}

/// File metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,
    /// Whether this is a directory
    pub is_dir: bool,
    /// Whether this is a file
    pub is_file: bool,
    /// Whether this is a symbolic link (only meaningful for `symlink_metadata`)
    pub is_symlink: bool,
}

/// Platform runtime trait
///
/// All methods take absolute paths. Implementations must be safe to share
/// between the concurrent copy workers.
#[async_trait]
pub trait Runtime: Send + Sync + std::fmt::Debug {
    /// Read a file
    async fn read_file(&self, path: &Path) -> RuntimeResult<Vec<u8>>;

    /// Write a file, creating parent directories as needed
    async fn write_file(&self, path: &Path, content: &[u8]) -> RuntimeResult<()>;

    /// Get file metadata, following symlinks
    async fn metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Get file metadata without following symlinks
    async fn symlink_metadata(&self, path: &Path) -> RuntimeResult<FileMetadata>;

    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Resolve a path to its canonical, symlink-free form
    async fn canonicalize(&self, path: &Path) -> RuntimeResult<PathBuf>;

    /// Create a directory
    async fn create_dir(&self, path: &Path, recursive: bool) -> RuntimeResult<()>;

    /// Copy a file's contents to `to`, overwriting it
    async fn copy_file(&self, from: &Path, to: &Path) -> RuntimeResult<()>;

    /// Read the target of a symbolic link
    async fn read_link(&self, path: &Path) -> RuntimeResult<PathBuf>;

    /// Create a directory symlink at `link` pointing at `target`
    async fn symlink_dir(&self, target: &Path, link: &Path) -> RuntimeResult<()>;

    /// Remove a file or symlink
    async fn remove_file(&self, path: &Path) -> RuntimeResult<()>;
}
