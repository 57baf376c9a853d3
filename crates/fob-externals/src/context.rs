//! Build-scoped state.
//!
//! A `BuildContext` is created per build by `ExternalsEngine::begin_build` and
//! passed to every classification and to the final materialization. Nothing
//! here outlives a build, so concurrent builds never share caches.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::descriptor::{DescriptorCache, PackageDescriptor};
use crate::runtime::Runtime;

/// State accumulated while the bundler classifies imports.
#[derive(Debug, Default)]
pub struct BuildContext {
    tracked_roots: Mutex<BTreeSet<PathBuf>>,
    resolve_memo: DashMap<String, Option<PathBuf>>,
    descriptors: DescriptorCache,
    warnings: Mutex<Vec<String>>,
}

impl BuildContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an absolute file as a trace root.
    pub fn track_root(&self, path: impl Into<PathBuf>) {
        self.tracked_roots.lock().insert(path.into());
    }

    /// Snapshot of the trace roots collected so far, sorted.
    pub fn tracked_roots(&self) -> Vec<PathBuf> {
        self.tracked_roots.lock().iter().cloned().collect()
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        self.tracked_roots.lock().contains(path)
    }

    /// Memoized resolution result for `specifier`, if looked up before.
    ///
    /// The outer `Option` tells whether the id was seen, the inner one
    /// whether it resolved.
    pub(crate) fn memoized(&self, specifier: &str) -> Option<Option<PathBuf>> {
        self.resolve_memo.get(specifier).map(|entry| entry.value().clone())
    }

    pub(crate) fn memoize(&self, specifier: &str, resolved: Option<PathBuf>) {
        self.resolve_memo.insert(specifier.to_string(), resolved);
    }

    /// Descriptor cache shared by grouping and materialization.
    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Load a package descriptor through the cache, reporting a fallback to
    /// the synthetic descriptor as a warning.
    pub async fn descriptor(
        &self,
        runtime: &dyn Runtime,
        package_dir: &Path,
        package_name: &str,
    ) -> Arc<PackageDescriptor> {
        let (descriptor, fallback) = self.descriptors.load(runtime, package_dir, package_name).await;
        if let Some(reason) = fallback {
            self.warn(reason);
        }
        descriptor
    }

    /// Record a recoverable problem; it is logged and reported at the end.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        self.warnings.lock().push(message);
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().clone()
    }

    pub(crate) fn take_warnings(&self) -> Vec<String> {
        std::mem::take(&mut *self.warnings.lock())
    }
}
