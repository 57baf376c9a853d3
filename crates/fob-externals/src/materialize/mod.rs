//! Materialization of a placement plan.
//!
//! Writes happen in three phases: package files are copied, descriptors are
//! written with the production condition baked in, and only then are links
//! created. A link therefore never points at a directory that is still being
//! written.

pub mod copy;
pub mod link;

pub use copy::{CopyStats, copy_files};
pub use link::{LinkOutcome, LinkStats, create_link, create_links, relative_path};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::conflict::{Placement, PlacementPlan};
use crate::context::BuildContext;
use crate::node_modules::PACKAGE_JSON;
use crate::runtime::Runtime;
use crate::{Error, Result};

/// Counts of a materialization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub files_copied: usize,
    pub files_skipped: usize,
    pub descriptors_written: usize,
    /// Descriptors already present with identical content.
    pub descriptors_unchanged: usize,
    pub links_created: usize,
    pub links_unchanged: usize,
    pub links_failed: usize,
}

/// Writes a [`PlacementPlan`] into an output directory.
#[derive(Debug, Clone)]
pub struct Materializer {
    runtime: Arc<dyn Runtime>,
    out_dir: PathBuf,
    concurrency: usize,
    attempts: u32,
}

impl Materializer {
    pub fn new(runtime: Arc<dyn Runtime>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            out_dir: out_dir.into(),
            concurrency: crate::config::default_copy_concurrency(),
            attempts: 3,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Copy, describe, then link. A failed copy or descriptor write aborts;
    /// failed links are recorded as warnings on `ctx`.
    pub async fn materialize(
        &self,
        ctx: &BuildContext,
        plan: &PlacementPlan,
    ) -> Result<MaterializeStats> {
        let mut stats = MaterializeStats::default();

        let copies = plan
            .placements
            .iter()
            .flat_map(|placement| placement.files.iter().cloned())
            .collect();
        let copied = copy_files(
            Arc::clone(&self.runtime),
            &self.out_dir,
            copies,
            self.concurrency,
            self.attempts,
        )
        .await?;
        stats.files_copied = copied.copied;
        stats.files_skipped = copied.skipped;

        for placement in &plan.placements {
            if self.write_descriptor(placement).await? {
                stats.descriptors_written += 1;
            } else {
                stats.descriptors_unchanged += 1;
            }
        }

        let linked = create_links(ctx, self.runtime.as_ref(), &self.out_dir, &plan.links).await;
        stats.links_created = linked.created;
        stats.links_unchanged = linked.unchanged;
        stats.links_failed = linked.failed;

        tracing::info!(
            "[externals] materialized {} packages ({} files copied, {} links) into {}",
            plan.placements.len(),
            stats.files_copied,
            stats.links_created + stats.links_unchanged,
            self.out_dir.display()
        );

        Ok(stats)
    }

    /// Write the production descriptor of `placement`. Returns `false` when
    /// the file already holds the same bytes.
    async fn write_descriptor(&self, placement: &Placement) -> Result<bool> {
        let path = self.out_dir.join(&placement.dir).join(PACKAGE_JSON);
        let content = placement.descriptor.for_production().to_json_pretty();

        if let Ok(existing) = self.runtime.read_file(&path).await {
            if existing == content.as_bytes() {
                return Ok(false);
            }
        }

        self.runtime
            .write_file(&path, content.as_bytes())
            .await
            .map_err(|err| Error::Descriptor {
                path: path.clone(),
                message: err.to_string(),
            })?;
        Ok(true)
    }
}
