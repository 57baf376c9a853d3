//! Whole-program tracing.
//!
//! A [`Tracer`] turns the trace roots collected during classification into
//! every file reachable from them at runtime. The engine only depends on the
//! trait; [`StaticTracer`] is the built-in implementation and tests inject
//! fakes with a fixed closure.

pub mod static_tracer;

pub use static_tracer::StaticTracer;

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::Result;
use crate::context::BuildContext;
use crate::node_modules::is_in_node_modules;
use crate::runtime::Runtime;

/// A file reached by the tracer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedFile {
    /// Absolute path of the file.
    pub path: PathBuf,
    /// Files that import this one. Empty for trace roots.
    pub parents: BTreeSet<PathBuf>,
    /// Recorded but excluded from the closure.
    pub ignored: bool,
}

impl TracedFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parents: BTreeSet::new(),
            ignored: false,
        }
    }

    pub fn with_parents<I, P>(mut self, parents: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.parents.extend(parents.into_iter().map(Into::into));
        self
    }

    pub fn ignored(mut self) -> Self {
        self.ignored = true;
        self
    }
}

/// Static reachability analysis over the runtime's module loading rules.
#[async_trait]
pub trait Tracer: Send + Sync + std::fmt::Debug {
    /// Return every file transitively reachable from `roots`, roots included.
    ///
    /// Recoverable problems go to `ctx` as warnings.
    async fn trace(&self, ctx: &BuildContext, roots: &[PathBuf]) -> Result<Vec<TracedFile>>;
}

/// Prepare tracer output for grouping.
///
/// Paths (and parents) are canonicalized so symlinked installs collapse onto
/// one physical file. Ignored entries, files outside any `node_modules`, and
/// anything that is not a regular file are dropped. Entries that canonicalize
/// to the same file are merged.
pub async fn normalize_traced_files(
    runtime: &dyn Runtime,
    files: Vec<TracedFile>,
) -> Vec<TracedFile> {
    let mut merged: BTreeMap<PathBuf, TracedFile> = BTreeMap::new();

    for file in files {
        if file.ignored {
            continue;
        }

        let path = match runtime.canonicalize(&file.path).await {
            Ok(path) => path,
            Err(err) => {
                tracing::debug!("[externals] dropping traced file: {}", err);
                continue;
            }
        };

        if !is_in_node_modules(&path) {
            continue;
        }

        match runtime.metadata(&path).await {
            Ok(meta) if meta.is_file => {}
            _ => continue,
        }

        let mut parents = BTreeSet::new();
        for parent in &file.parents {
            let parent = runtime
                .canonicalize(parent)
                .await
                .unwrap_or_else(|_| parent.clone());
            parents.insert(parent);
        }

        merged
            .entry(path.clone())
            .or_insert_with(|| TracedFile::new(path))
            .parents
            .extend(parents);
    }

    merged.into_values().collect()
}
