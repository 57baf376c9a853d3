//! Import classification.
//!
//! Every import site the bundler visits is turned into an [`ImportCandidate`]
//! and classified as [`Classification::Inline`] (the bundler embeds it) or
//! [`Classification::External`] (left as an import and materialized later).
//! External decisions that need tracing register their resolved file as a
//! trace root on the [`BuildContext`].

pub mod validation;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ExternalsConfig;
use crate::context::BuildContext;
use crate::node_modules::{normalize_slashes, parse_node_module_path, strip_node_modules_prefix};
use crate::resolver::ModuleResolver;
use crate::runtime::Runtime;

pub use validation::{has_esm_syntax, is_node_builtin, is_valid_node_import};

/// One import site as seen by the bundler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportCandidate {
    /// The specifier exactly as written in the source.
    pub raw_id: String,
    /// File containing the import.
    pub importer: PathBuf,
    /// What the bundler's own resolver produced, if anything.
    pub resolved_id: Option<PathBuf>,
}

impl ImportCandidate {
    pub fn new(raw_id: impl Into<String>, importer: impl Into<PathBuf>) -> Self {
        Self {
            raw_id: raw_id.into(),
            importer: importer.into(),
            resolved_id: None,
        }
    }

    pub fn with_resolved(mut self, resolved_id: impl Into<PathBuf>) -> Self {
        self.resolved_id = Some(resolved_id.into());
        self
    }
}

/// Outcome of classifying an import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Leave the import to the bundler.
    Inline,
    /// Emit the import as `id`.
    External {
        /// Canonical id to emit (`pkg`, `pkg/deep/path`, or an absolute path
        /// when tracing is disabled).
        id: String,
        /// Whether the import contributes to the traced closure.
        traced: bool,
    },
}

impl Classification {
    fn external(id: impl Into<String>, traced: bool) -> Self {
        Classification::External {
            id: id.into(),
            traced,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Classification::External { .. })
    }

    pub fn external_id(&self) -> Option<&str> {
        match self {
            Classification::External { id, .. } => Some(id),
            Classification::Inline => None,
        }
    }
}

/// Decides inline vs external for import candidates.
#[derive(Debug, Clone)]
pub struct Classifier {
    config: Arc<ExternalsConfig>,
    resolver: Arc<ModuleResolver>,
    runtime: Arc<dyn Runtime>,
}

impl Classifier {
    pub fn new(
        config: Arc<ExternalsConfig>,
        resolver: Arc<ModuleResolver>,
        runtime: Arc<dyn Runtime>,
    ) -> Self {
        Self {
            config,
            resolver,
            runtime,
        }
    }

    /// Classify a single import.
    ///
    /// Never fails: anything ambiguous or unresolvable is left inline.
    pub async fn classify(&self, ctx: &BuildContext, candidate: &ImportCandidate) -> Classification {
        let raw_id = candidate.raw_id.as_str();
        if is_bundler_owned(raw_id) {
            return Classification::Inline;
        }

        let id = normalize_slashes(raw_id);
        let id_without_node_modules = strip_node_modules_prefix(&id);
        let matches_prefix = |prefix: &String| {
            id.starts_with(prefix.as_str()) || id_without_node_modules.starts_with(prefix.as_str())
        };

        if self.config.inline.iter().any(matches_prefix) {
            return Classification::Inline;
        }
        if self.config.external.iter().any(matches_prefix) {
            return Classification::external(id, false);
        }

        let resolved = candidate
            .resolved_id
            .clone()
            .unwrap_or_else(|| PathBuf::from(raw_id));

        let resolved = if self.is_usable_file(&resolved).await {
            resolved
        } else {
            match self
                .resolver
                .resolve(ctx, &normalize_slashes(&resolved.to_string_lossy()))
            {
                Some(path) if self.is_usable_file(&path).await => path,
                _ => {
                    tracing::debug!("[externals] {} is not resolvable, inlining", raw_id);
                    return Classification::Inline;
                }
            }
        };

        if !is_valid_node_import(self.runtime.as_ref(), &resolved).await {
            tracing::debug!(
                "[externals] {} ({}) is not loadable by the runtime, inlining",
                raw_id,
                resolved.display()
            );
            return Classification::Inline;
        }

        if !self.config.trace {
            return Classification::external(normalize_slashes(&resolved.to_string_lossy()), false);
        }

        let Some(parsed) = parse_node_module_path(&resolved) else {
            return Classification::Inline;
        };
        let package_name = parsed.package_name.as_str();

        if package_name != raw_id {
            let raw_path = Path::new(raw_id);
            if !raw_path.is_absolute() {
                let root = self.resolver.resolve(ctx, raw_id).unwrap_or(resolved);
                ctx.track_root(root);
                return Classification::external(raw_id, true);
            }

            let package_entry = self.resolver.resolve(ctx, package_name);
            if package_entry.as_deref() != Some(raw_path) {
                let guess = format!("{}{}", package_name, strip_extension(&parsed.subpath));
                return match self.resolver.resolve(ctx, &guess) {
                    Some(guessed) if guessed == raw_path => {
                        ctx.track_root(guessed);
                        Classification::external(guess, true)
                    }
                    _ => {
                        tracing::debug!(
                            "[externals] deep import {} has no stable package subpath, inlining",
                            raw_id
                        );
                        Classification::Inline
                    }
                };
            }
        }

        ctx.track_root(resolved);
        Classification::external(package_name, true)
    }

    async fn is_usable_file(&self, path: &Path) -> bool {
        path.is_absolute()
            && self
                .runtime
                .metadata(path)
                .await
                .map(|meta| meta.is_file)
                .unwrap_or(false)
    }
}

/// Ids the bundler always owns: virtual modules, queries, subpath imports
/// and relative paths.
fn is_bundler_owned(raw_id: &str) -> bool {
    raw_id.is_empty()
        || raw_id.starts_with('\0')
        || raw_id.contains('?')
        || raw_id.starts_with('#')
        || raw_id.starts_with('.')
}

/// Drop a trailing lowercase extension (`/fp/map.js` -> `/fp/map`).
fn strip_extension(subpath: &str) -> &str {
    match subpath.rfind('.') {
        Some(dot)
            if dot + 1 < subpath.len()
                && subpath[dot + 1..].bytes().all(|b| b.is_ascii_lowercase()) =>
        {
            &subpath[..dot]
        }
        _ => subpath,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NativeRuntime;

    fn classifier(config: ExternalsConfig) -> Classifier {
        let cwd = std::env::temp_dir();
        let resolver = ModuleResolver::new(&config, &cwd);
        Classifier::new(
            Arc::new(config),
            Arc::new(resolver),
            Arc::new(NativeRuntime::new()),
        )
    }

    #[test]
    fn test_bundler_owned_ids() {
        assert!(is_bundler_owned(""));
        assert!(is_bundler_owned("\0virtual:entry"));
        assert!(is_bundler_owned("./styles.css?inline"));
        assert!(is_bundler_owned("#internal/server"));
        assert!(is_bundler_owned("../utils"));
        assert!(!is_bundler_owned("left-pad"));
        assert!(!is_bundler_owned("@scope/pkg"));
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("/fp/map.js"), "/fp/map");
        assert_eq!(strip_extension("/index.mjs"), "/index");
        assert_eq!(strip_extension("/v1.2/index"), "/v1.2/index");
        assert_eq!(strip_extension(""), "");
    }

    #[tokio::test]
    async fn test_prefix_lists_short_circuit() {
        let classifier = classifier(
            ExternalsConfig::default()
                .with_inline(["my-lib"])
                .with_external(["sharp"]),
        );
        let ctx = BuildContext::new();

        let inline = classifier
            .classify(&ctx, &ImportCandidate::new("my-lib/utils", "/app/index.js"))
            .await;
        assert_eq!(inline, Classification::Inline);

        // dependency-directory prefix is stripped before matching
        let inline = classifier
            .classify(
                &ctx,
                &ImportCandidate::new("/app/node_modules/my-lib/index.js", "/app/index.js"),
            )
            .await;
        assert_eq!(inline, Classification::Inline);

        let external = classifier
            .classify(&ctx, &ImportCandidate::new("sharp", "/app/index.js"))
            .await;
        assert_eq!(
            external,
            Classification::External {
                id: "sharp".to_string(),
                traced: false
            }
        );
        assert!(ctx.tracked_roots().is_empty());
    }

    /// `pkg` exporting its entry and one subpath; `dist/internal.js` is
    /// reachable on disk but not through the package exports.
    fn exported_package() -> (tempfile::TempDir, PathBuf, Classifier) {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let pkg = root.join("node_modules/pkg");
        std::fs::create_dir_all(pkg.join("lib")).unwrap();
        std::fs::create_dir_all(pkg.join("dist")).unwrap();
        std::fs::write(
            pkg.join("package.json"),
            r#"{"name":"pkg","version":"1.0.0","main":"index.js","exports":{".":"./index.js","./lib/util":"./lib/util.js"}}"#,
        )
        .unwrap();
        std::fs::write(pkg.join("index.js"), "module.exports = 1;").unwrap();
        std::fs::write(pkg.join("lib/util.js"), "module.exports = 2;").unwrap();
        std::fs::write(pkg.join("dist/internal.js"), "module.exports = 3;").unwrap();

        let classifier = classifier(ExternalsConfig::default().with_module_directories([root.clone()]));
        (temp_dir, pkg, classifier)
    }

    #[tokio::test]
    async fn test_absolute_package_entry_is_external_by_name() {
        let (_temp_dir, pkg, classifier) = exported_package();
        let ctx = BuildContext::new();
        let entry = pkg.join("index.js");

        let result = classifier
            .classify(&ctx, &ImportCandidate::new(entry.to_string_lossy(), "/app/index.js"))
            .await;

        assert_eq!(
            result,
            Classification::External {
                id: "pkg".to_string(),
                traced: true
            }
        );
        assert_eq!(ctx.tracked_roots(), vec![entry]);
    }

    #[tokio::test]
    async fn test_absolute_deep_path_maps_to_exported_subpath() {
        let (_temp_dir, pkg, classifier) = exported_package();
        let ctx = BuildContext::new();
        let util = pkg.join("lib/util.js");

        let result = classifier
            .classify(&ctx, &ImportCandidate::new(util.to_string_lossy(), "/app/index.js"))
            .await;

        assert_eq!(
            result,
            Classification::External {
                id: "pkg/lib/util".to_string(),
                traced: true
            }
        );
        assert_eq!(ctx.tracked_roots(), vec![util]);
    }

    #[tokio::test]
    async fn test_absolute_path_without_package_subpath_is_inline() {
        let (_temp_dir, pkg, classifier) = exported_package();
        let ctx = BuildContext::new();
        let internal = pkg.join("dist/internal.js");

        let result = classifier
            .classify(&ctx, &ImportCandidate::new(internal.to_string_lossy(), "/app/index.js"))
            .await;

        assert_eq!(result, Classification::Inline);
        assert!(ctx.tracked_roots().is_empty());
    }

    #[tokio::test]
    async fn test_bundler_resolution_is_used_for_unknown_ids() {
        let (_temp_dir, pkg, classifier) = exported_package();
        let ctx = BuildContext::new();
        let entry = pkg.join("index.js");

        // an alias only the bundler knows how to resolve
        let candidate = ImportCandidate::new("pkg-alias", "/app/index.js").with_resolved(entry.clone());
        let result = classifier.classify(&ctx, &candidate).await;

        assert_eq!(
            result,
            Classification::External {
                id: "pkg-alias".to_string(),
                traced: true
            }
        );
        assert_eq!(ctx.tracked_roots(), vec![entry]);

        // without it the alias does not resolve at all
        let unresolved = classifier
            .classify(&BuildContext::new(), &ImportCandidate::new("pkg-alias", "/app/index.js"))
            .await;
        assert_eq!(unresolved, Classification::Inline);
    }

    #[tokio::test]
    async fn test_unresolvable_is_inline() {
        let classifier = classifier(ExternalsConfig::default());
        let ctx = BuildContext::new();

        let result = classifier
            .classify(&ctx, &ImportCandidate::new("definitely-not-installed-pkg", "/app/index.js"))
            .await;

        assert_eq!(result, Classification::Inline);
        assert!(ctx.tracked_roots().is_empty());
    }
}
