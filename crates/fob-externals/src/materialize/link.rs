//! Directory links between placements.
//!
//! Links use relative targets so the output directory can be moved or
//! archived as a whole. Link failures never fail the build: the affected
//! package may not resolve at runtime, which is reported as a warning.

use std::path::{Component, Path, PathBuf};

use crate::conflict::Link;
use crate::context::BuildContext;
use crate::runtime::Runtime;

/// Result of linking one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Created,
    /// Already present with the right target.
    Unchanged,
    /// Not created; a warning was recorded.
    Failed,
}

/// Counts of a link batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub created: usize,
    pub unchanged: usize,
    pub failed: usize,
}

/// Create `links` (paths relative to `out_dir`) one after another.
pub async fn create_links(
    ctx: &BuildContext,
    runtime: &dyn Runtime,
    out_dir: &Path,
    links: &[Link],
) -> LinkStats {
    let mut stats = LinkStats::default();
    for link in links {
        match create_link(ctx, runtime, out_dir, link).await {
            LinkOutcome::Created => stats.created += 1,
            LinkOutcome::Unchanged => stats.unchanged += 1,
            LinkOutcome::Failed => stats.failed += 1,
        }
    }
    stats
}

/// Create a single link, replacing a stale one.
pub async fn create_link(
    ctx: &BuildContext,
    runtime: &dyn Runtime,
    out_dir: &Path,
    link: &Link,
) -> LinkOutcome {
    let link_path = out_dir.join(&link.path);
    let link_dir = link.path.parent().unwrap_or(Path::new(""));
    let target = relative_path(link_dir, &link.target);

    match runtime.symlink_metadata(&link_path).await {
        Ok(meta) if meta.is_symlink => {
            if let Ok(existing) = runtime.read_link(&link_path).await {
                if existing == target {
                    return LinkOutcome::Unchanged;
                }
            }
            if let Err(err) = runtime.remove_file(&link_path).await {
                ctx.warn(format!(
                    "Cannot replace stale link {}: {}",
                    link_path.display(),
                    err
                ));
                return LinkOutcome::Failed;
            }
        }
        Ok(_) => {
            ctx.warn(format!(
                "Cannot link {} to {}: path exists and is not a link",
                link.target.display(),
                link.path.display()
            ));
            return LinkOutcome::Failed;
        }
        Err(err) if err.is_not_found() => {}
        Err(err) => {
            ctx.warn(format!("Cannot inspect {}: {}", link_path.display(), err));
            return LinkOutcome::Failed;
        }
    }

    if let Some(parent) = link_path.parent() {
        if let Err(err) = runtime.create_dir(parent, true).await {
            ctx.warn(format!(
                "Cannot link {} to {}: {}",
                link.target.display(),
                link.path.display(),
                err
            ));
            return LinkOutcome::Failed;
        }
    }

    match runtime.symlink_dir(&target, &link_path).await {
        Ok(()) => {
            tracing::debug!(
                "[externals] linked {} -> {}",
                link.path.display(),
                target.display()
            );
            LinkOutcome::Created
        }
        Err(err) => {
            ctx.warn(format!(
                "Cannot link {} to {}: {}",
                link.target.display(),
                link.path.display(),
                err
            ));
            LinkOutcome::Failed
        }
    }
}

/// Path of `to` relative to the directory `from`. Both must be relative to
/// the same base and free of `..` components.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().filter(|c| *c != Component::CurDir).collect();
    let to: Vec<Component<'_>> = to.components().filter(|c| *c != Component::CurDir).collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..from.len() {
        relative.push("..");
    }
    for component in &to[common..] {
        relative.push(component.as_os_str());
    }
    relative
}
