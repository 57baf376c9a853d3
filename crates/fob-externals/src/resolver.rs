//! Module resolution for external ids.
//!
//! Wraps `oxc_resolver` with the configured export conditions. Bare ids are
//! looked up from each search root in order; results are memoized in the
//! `BuildContext` so repeated probes for the same id stay in memory.

use oxc_resolver::{ResolveOptions, Resolver};
use std::path::{Path, PathBuf};

use crate::config::ExternalsConfig;
use crate::context::BuildContext;

/// Extensions probed for extensionless specifiers, in order.
const EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".json", ".node"];

/// Which module system a specifier is loaded through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolveKind {
    /// `import` / `export ... from` / `import()`
    Import,
    /// `require()`
    Require,
}

/// Resolver for bare ids and paths, shared by the classifier and the tracer.
#[derive(Debug)]
pub struct ModuleResolver {
    esm: Resolver,
    cjs: Resolver,
    search_roots: Vec<PathBuf>,
}

impl ModuleResolver {
    /// Build resolvers from the configured conditions and search roots.
    pub fn new(config: &ExternalsConfig, cwd: &Path) -> Self {
        let esm = Resolver::new(ResolveOptions {
            condition_names: config.export_conditions.clone(),
            extensions: EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            builtin_modules: true,
            ..Default::default()
        });

        // `require` loads see the same conditions minus `import`.
        let mut require_conditions: Vec<String> = config
            .export_conditions
            .iter()
            .filter(|c| c.as_str() != "import")
            .cloned()
            .collect();
        require_conditions.push("require".to_string());

        let cjs = esm.clone_with_options(ResolveOptions {
            condition_names: require_conditions,
            extensions: EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
            builtin_modules: true,
            ..Default::default()
        });

        Self {
            esm,
            cjs,
            search_roots: config.search_roots(cwd),
        }
    }

    pub fn search_roots(&self) -> &[PathBuf] {
        &self.search_roots
    }

    /// Resolve `specifier` from the search roots, memoized per build.
    ///
    /// Returns the canonical path of the first root that resolves it.
    pub fn resolve(&self, ctx: &BuildContext, specifier: &str) -> Option<PathBuf> {
        if let Some(memoized) = ctx.memoized(specifier) {
            return memoized;
        }

        let resolved = self
            .search_roots
            .iter()
            .find_map(|root| self.resolve_from(root, specifier, ResolveKind::Import));

        tracing::debug!(
            "[externals] resolve {} -> {}",
            specifier,
            resolved
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<unresolved>".to_string())
        );

        ctx.memoize(specifier, resolved.clone());
        resolved
    }

    /// Resolve `specifier` relative to `dir` without memoization.
    ///
    /// Builtins (`fs`, `node:path`) and failures both yield `None`.
    pub fn resolve_from(&self, dir: &Path, specifier: &str, kind: ResolveKind) -> Option<PathBuf> {
        let resolver = match kind {
            ResolveKind::Import => &self.esm,
            ResolveKind::Require => &self.cjs,
        };

        match resolver.resolve(dir, specifier) {
            Ok(resolution) => Some(resolution.into_path_buf()),
            Err(err) => {
                tracing::trace!(
                    "[externals] cannot resolve {} from {}: {}",
                    specifier,
                    dir.display(),
                    err
                );
                None
            }
        }
    }
}
