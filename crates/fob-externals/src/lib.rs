#![cfg_attr(docsrs, feature(doc_cfg))]

//! # fob-externals
//!
//! Dependency-closure resolution and materialization for externalized imports.
//!
//! When a server build leaves imports external, the runtime still needs their
//! files next to the output. This crate classifies each import as inline or
//! external, traces the files every external package needs at runtime, groups
//! them by package and version, resolves version conflicts, and writes a
//! self-contained `node_modules` tree plus a `package.json` manifest.
//!
//! ## Quick Start
//!
//! ```no_run
//! use fob_externals::{ExternalsConfig, ExternalsEngine, ImportCandidate};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = ExternalsEngine::new(ExternalsConfig::new(".output/server"))?;
//! let ctx = engine.begin_build();
//!
//! // Called by the bundler for every import site
//! let decision = engine
//!     .classify(&ctx, &ImportCandidate::new("left-pad", "/app/server/index.js"))
//!     .await;
//! println!("{decision:?}");
//!
//! let report = engine.finish(ctx).await?;
//! println!("{} files copied", report.files_copied);
//! # Ok(()) }
//! ```

pub mod classify;
pub mod closure;
pub mod config;
pub mod conflict;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod manifest;
pub mod materialize;
pub mod node_modules;
pub mod resolver;
pub mod runtime;
pub mod trace;
pub mod version;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

pub use classify::{Classification, Classifier, ImportCandidate};
pub use closure::{Closure, Package, PackageVersion};
pub use config::{ConflictPolicyKind, ExternalsConfig};
pub use conflict::{ConflictPolicy, DroppedVersion, FileCopy, Link, Placement, PlacementPlan};
pub use context::BuildContext;
pub use descriptor::PackageDescriptor;
pub use engine::{BuildReport, ExternalsEngine};
pub use manifest::Manifest;
pub use materialize::{MaterializeStats, Materializer};
pub use runtime::{NativeRuntime, Runtime, RuntimeError};
pub use trace::{StaticTracer, TracedFile, Tracer};

use std::path::PathBuf;

/// Error types for fob-externals operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the filesystem runtime.
    #[error(transparent)]
    Runtime(#[from] runtime::RuntimeError),

    /// A trace root or include id could not be resolved.
    #[error("Could not resolve '{specifier}' from {}", base_dir.display())]
    Resolution { specifier: String, base_dir: PathBuf },

    /// The tracer failed as a whole.
    #[error("Trace failed: {0}")]
    Trace(String),

    /// A descriptor could not be serialized or written.
    #[error("Descriptor error for {}: {message}", path.display())]
    Descriptor { path: PathBuf, message: String },

    /// A package file could not be copied into the output tree.
    #[error("Failed to copy {} after {attempts} attempt(s): {source}", path.display())]
    CopyFailed {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: runtime::RuntimeError,
    },

    /// Materialization failed outside of a file copy.
    #[error("Materialization failed: {0}")]
    Materialize(String),

    /// A copy worker panicked or was cancelled.
    #[error("Copy worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for fob-externals operations.
pub type Result<T> = std::result::Result<T, Error>;

impl miette::Diagnostic for Error {
    fn code(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        Some(Box::new(match self {
            Error::InvalidConfig(_) => "EXTERNALS_INVALID_CONFIG",
            Error::Io(_) => "EXTERNALS_IO_ERROR",
            Error::Runtime(_) => "EXTERNALS_RUNTIME_ERROR",
            Error::Resolution { .. } => "EXTERNALS_UNRESOLVED",
            Error::Trace(_) => "EXTERNALS_TRACE_FAILED",
            Error::Descriptor { .. } => "EXTERNALS_DESCRIPTOR_ERROR",
            Error::CopyFailed { .. } => "EXTERNALS_COPY_FAILED",
            Error::Materialize(_) => "EXTERNALS_MATERIALIZE_FAILED",
            Error::Join(_) => "EXTERNALS_WORKER_FAILED",
        }))
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Error)
    }

    fn help(&self) -> Option<Box<dyn std::fmt::Display + '_>> {
        match self {
            Error::InvalidConfig(msg) => Some(Box::new(format!(
                "Check the [externals] table of your configuration file and FOB_EXTERNALS_* variables.\nError: {}",
                msg
            ))),
            Error::CopyFailed { path, source, .. } => Some(Box::new(format!(
                "The output tree would be incomplete without '{}'.\nCheck that the file is readable and the output directory is writable.\nError: {}",
                path.display(),
                source
            ))),
            Error::Resolution { specifier, .. } => Some(Box::new(format!(
                "Make sure '{}' is installed in one of the configured module directories.",
                specifier
            ))),
            Error::Materialize(msg) => Some(Box::new(format!(
                "Check disk space and permissions of the output directory.\nError: {}",
                msg
            ))),
            _ => None,
        }
    }
}
