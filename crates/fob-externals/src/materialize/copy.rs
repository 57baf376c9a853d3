//! Bounded, retrying file copies.
//!
//! Copies run on a `JoinSet` with a `Semaphore` limiting how many are in
//! flight. A copy that still fails after its retries aborts the remaining
//! work: a partially written tree is worse than a failed build.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::conflict::FileCopy;
use crate::runtime::{Runtime, RuntimeError};
use crate::{Error, Result};

/// Delay between attempts of a failed copy.
const RETRY_DELAY: Duration = Duration::from_millis(2);

/// Outcome of a copy batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub copied: usize,
    /// Optional files whose source did not exist.
    pub skipped: usize,
}

enum CopyOutcome {
    Copied,
    Skipped,
}

/// Copy `copies` into `out_dir` with at most `concurrency` copies in flight.
pub async fn copy_files(
    runtime: Arc<dyn Runtime>,
    out_dir: &Path,
    copies: Vec<FileCopy>,
    concurrency: usize,
    attempts: u32,
) -> Result<CopyStats> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set: JoinSet<Result<CopyOutcome>> = JoinSet::new();
    let mut stats = CopyStats::default();

    for copy in copies {
        // Surface failures early instead of queueing the rest of the batch.
        while let Some(res) = join_set.try_join_next() {
            if let Err(err) = record(&mut stats, res) {
                join_set.abort_all();
                return Err(err);
            }
        }

        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|e| Error::Materialize(e.to_string()))?;
        let runtime = Arc::clone(&runtime);
        let target = out_dir.join(&copy.target);

        join_set.spawn(async move {
            let _permit = permit;
            copy_one(runtime.as_ref(), &copy.source, &target, copy.required, attempts).await
        });
    }

    while let Some(res) = join_set.join_next().await {
        if let Err(err) = record(&mut stats, res) {
            join_set.abort_all();
            return Err(err);
        }
    }

    Ok(stats)
}

fn record(
    stats: &mut CopyStats,
    res: std::result::Result<Result<CopyOutcome>, tokio::task::JoinError>,
) -> Result<()> {
    match res? {
        Ok(CopyOutcome::Copied) => stats.copied += 1,
        Ok(CopyOutcome::Skipped) => stats.skipped += 1,
        Err(err) => return Err(err),
    }
    Ok(())
}

async fn copy_one(
    runtime: &dyn Runtime,
    source: &Path,
    target: &Path,
    required: bool,
    attempts: u32,
) -> Result<CopyOutcome> {
    if !required && !runtime.exists(source) {
        tracing::debug!("[externals] optional file {} not found, skipping", source.display());
        return Ok(CopyOutcome::Skipped);
    }

    let attempts = attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match try_copy(runtime, source, target).await {
            Ok(()) => return Ok(CopyOutcome::Copied),
            Err(err) if !required && err.is_not_found() => {
                return Ok(CopyOutcome::Skipped);
            }
            Err(err) if err.is_retryable() && attempt < attempts => {
                tracing::debug!(
                    "[externals] copy of {} failed (attempt {}/{}): {}",
                    source.display(),
                    attempt,
                    attempts,
                    err
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(err) => {
                return Err(Error::CopyFailed {
                    path: source.to_path_buf(),
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

async fn try_copy(runtime: &dyn Runtime, source: &Path, target: &Path) -> std::result::Result<(), RuntimeError> {
    if let Some(parent) = target.parent() {
        runtime.create_dir(parent, true).await?;
    }
    runtime.copy_file(source, target).await
}
