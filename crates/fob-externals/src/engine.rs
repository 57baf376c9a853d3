//! Engine façade.
//!
//! Wires the classifier, tracer, conflict policy and materializer together.
//! A build is driven in two steps: the bundler calls [`ExternalsEngine::classify`]
//! for every import site against one [`BuildContext`], then hands the context
//! to [`ExternalsEngine::finish`] once bundling completes.

use path_clean::PathClean;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::classify::{Classification, Classifier, ImportCandidate};
use crate::closure::Closure;
use crate::config::ExternalsConfig;
use crate::conflict::{ConflictPolicy, DroppedVersion};
use crate::context::BuildContext;
use crate::manifest::Manifest;
use crate::materialize::Materializer;
use crate::resolver::ModuleResolver;
use crate::runtime::{NativeRuntime, Runtime};
use crate::trace::{StaticTracer, Tracer, normalize_traced_files};
use crate::{Error, Result};

/// Summary of a finished build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub manifest: Manifest,
    /// Retained versions per package name, sorted ascending.
    pub packages: BTreeMap<String, Vec<String>>,
    pub files_copied: usize,
    pub links_created: usize,
    /// Versions the flat policy left out.
    pub dropped: Vec<DroppedVersion>,
    /// Every recoverable problem reported during the build.
    pub warnings: Vec<String>,
}

impl BuildReport {
    fn empty(config: &ExternalsConfig, warnings: Vec<String>) -> Self {
        Self {
            manifest: Manifest::new(&config.manifest_name, &config.manifest_version),
            packages: BTreeMap::new(),
            files_copied: 0,
            links_created: 0,
            dropped: Vec::new(),
            warnings,
        }
    }
}

/// Classifies imports during a build and materializes their closure after it.
#[derive(Debug, Clone)]
pub struct ExternalsEngine {
    config: Arc<ExternalsConfig>,
    runtime: Arc<dyn Runtime>,
    resolver: Arc<ModuleResolver>,
    tracer: Arc<dyn Tracer>,
    classifier: Classifier,
    out_dir: PathBuf,
}

impl ExternalsEngine {
    /// Build the default stack: native filesystem, oxc resolution from the
    /// configured module directories, and the static tracer.
    pub fn new(config: ExternalsConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config.normalized());
        let cwd = std::env::current_dir()?;

        let runtime: Arc<dyn Runtime> = Arc::new(NativeRuntime::new());
        let resolver = Arc::new(ModuleResolver::new(&config, &cwd));
        let tracer: Arc<dyn Tracer> = Arc::new(
            StaticTracer::new(Arc::clone(&resolver), Arc::clone(&runtime))
                .with_ignore(config.trace_ignore.iter().cloned()),
        );
        let classifier = Classifier::new(
            Arc::clone(&config),
            Arc::clone(&resolver),
            Arc::clone(&runtime),
        );
        // Links are computed relative to this path; keep it free of `..`.
        let out_dir = cwd.join(&config.out_dir).clean();

        Ok(Self {
            config,
            runtime,
            resolver,
            tracer,
            classifier,
            out_dir,
        })
    }

    /// Replace the filesystem runtime used for classification, grouping and
    /// writing. The tracer is kept; install a matching one with
    /// [`with_tracer`](Self::with_tracer) if it reads files too.
    pub fn with_runtime(mut self, runtime: Arc<dyn Runtime>) -> Self {
        self.classifier = Classifier::new(
            Arc::clone(&self.config),
            Arc::clone(&self.resolver),
            Arc::clone(&runtime),
        );
        self.runtime = runtime;
        self
    }

    pub fn with_tracer(mut self, tracer: Arc<dyn Tracer>) -> Self {
        self.tracer = tracer;
        self
    }

    pub fn config(&self) -> &ExternalsConfig {
        &self.config
    }

    pub fn out_dir(&self) -> &std::path::Path {
        &self.out_dir
    }

    /// Fresh state for one build.
    pub fn begin_build(&self) -> BuildContext {
        BuildContext::new()
    }

    /// Classify one import site, recording trace roots on `ctx`.
    pub async fn classify(&self, ctx: &BuildContext, candidate: &ImportCandidate) -> Classification {
        self.classifier.classify(ctx, candidate).await
    }

    /// Add the file `id` resolves to as a trace root, whether or not any
    /// import site referenced it.
    pub fn include(&self, ctx: &BuildContext, id: &str) -> Result<PathBuf> {
        let path = self
            .resolver
            .resolve(ctx, id)
            .ok_or_else(|| Error::Resolution {
                specifier: id.to_string(),
                base_dir: self
                    .resolver
                    .search_roots()
                    .first()
                    .cloned()
                    .unwrap_or_default(),
            })?;
        ctx.track_root(path.clone());
        Ok(path)
    }

    /// Trace, group, resolve conflicts, materialize and write the manifest.
    ///
    /// With tracing disabled this returns an empty report and leaves the
    /// output directory untouched.
    pub async fn finish(&self, ctx: BuildContext) -> Result<BuildReport> {
        if !self.config.trace {
            tracing::debug!("[externals] tracing disabled, nothing to materialize");
            return Ok(BuildReport::empty(&self.config, ctx.take_warnings()));
        }

        for id in &self.config.trace_include {
            if let Err(err) = self.include(&ctx, id) {
                ctx.warn(err.to_string());
            }
        }

        let roots = ctx.tracked_roots();
        tracing::info!("[externals] tracing {} roots", roots.len());

        let traced = self.tracer.trace(&ctx, &roots).await?;
        let files = normalize_traced_files(self.runtime.as_ref(), traced).await;
        let closure = Closure::build(&ctx, self.runtime.as_ref(), files).await;

        let policy = ConflictPolicy::from(self.config.conflict_policy);
        let plan = policy.plan(&closure);
        for warning in &plan.warnings {
            ctx.warn(warning.clone());
        }

        let stats = Materializer::new(Arc::clone(&self.runtime), &self.out_dir)
            .with_concurrency(self.config.copy_concurrency)
            .with_attempts(self.config.copy_retries)
            .materialize(&ctx, &plan)
            .await?;

        let manifest = Manifest::from_plan(&self.config, &plan);
        manifest.write(self.runtime.as_ref(), &self.out_dir).await?;

        tracing::info!(
            "[externals] {} packages externalized, {} files copied",
            manifest.bundled_dependencies.len(),
            stats.files_copied
        );

        Ok(BuildReport {
            packages: plan.retained_versions(),
            manifest,
            files_copied: stats.files_copied,
            links_created: stats.links_created,
            dropped: plan.dropped,
            warnings: ctx.take_warnings(),
        })
    }
}
