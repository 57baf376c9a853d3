//! `node_modules` path conventions.
//!
//! Every file that ends up in the materialized tree is identified by the
//! package directory it lives in. The helpers here split an absolute path at
//! its last `node_modules` segment, honoring scoped `@scope/name` packages.

use std::path::{Path, PathBuf};

/// Name of the conventional dependency directory.
pub const NODE_MODULES: &str = "node_modules";

/// Directory (inside `node_modules`) holding namespaced multi-version copies.
pub const INTERNAL_DIR: &str = ".internal";

/// Package descriptor file name.
pub const PACKAGE_JSON: &str = "package.json";

/// A path split into the `node_modules` directory, the package name and the
/// subpath inside the package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeModulePath {
    /// Everything up to and including the last `node_modules/`.
    pub base_dir: String,
    /// Package name, `name` or `@scope/name`.
    pub package_name: String,
    /// Remainder of the path, starting with `/` (empty for the package root).
    pub subpath: String,
}

impl NodeModulePath {
    /// Absolute package root directory (`base_dir` + `package_name`).
    pub fn package_dir(&self) -> PathBuf {
        PathBuf::from(format!("{}{}", self.base_dir, self.package_name))
    }

    /// Subpath relative to the package root, without the leading slash.
    pub fn relative_subpath(&self) -> &str {
        self.subpath.trim_start_matches('/')
    }
}

/// Normalize a path or id to forward slashes.
pub fn normalize_slashes(id: &str) -> String {
    id.replace('\\', "/")
}

/// Split `path` at its last `node_modules/` segment.
///
/// Returns `None` when the path has no `node_modules` segment or the segment is
/// not followed by a package name.
///
/// ```
/// # use fob_externals::node_modules::parse_node_module_path;
/// let parsed = parse_node_module_path("/app/node_modules/@scope/pkg/dist/index.js").unwrap();
/// assert_eq!(parsed.base_dir, "/app/node_modules/");
/// assert_eq!(parsed.package_name, "@scope/pkg");
/// assert_eq!(parsed.subpath, "/dist/index.js");
/// ```
pub fn parse_node_module_path(path: impl AsRef<Path>) -> Option<NodeModulePath> {
    let normalized = normalize_slashes(&path.as_ref().to_string_lossy());
    let marker = format!("/{NODE_MODULES}/");
    let idx = normalized.rfind(&marker)?;
    // The regex form of this rule requires at least one character before the marker.
    if idx == 0 {
        return None;
    }

    let split = idx + marker.len();
    let base_dir = &normalized[..split];
    let rest = &normalized[split..];

    let package_len = package_name_len(rest)?;
    let package_name = &rest[..package_len];
    let subpath = &rest[package_len..];

    Some(NodeModulePath {
        base_dir: base_dir.to_string(),
        package_name: package_name.to_string(),
        subpath: subpath.to_string(),
    })
}

/// Length of the leading package name in `rest`, or `None` when `rest` does
/// not start with one.
fn package_name_len(rest: &str) -> Option<usize> {
    if let Some(scoped) = rest.strip_prefix('@') {
        let scope_end = scoped.find('/')?;
        if scope_end == 0 {
            return None;
        }
        let after_scope = &scoped[scope_end + 1..];
        let name_len = after_scope.find('/').unwrap_or(after_scope.len());
        if name_len == 0 {
            return None;
        }
        return Some(1 + scope_end + 1 + name_len);
    }

    let name_len = rest.find('/').unwrap_or(rest.len());
    if name_len == 0 || rest[..name_len].contains('@') {
        return None;
    }
    Some(name_len)
}

/// Extract the base package name from a bare import specifier.
///
/// - `@foo/bar/baz` -> `@foo/bar`
/// - `lodash/fp` -> `lodash`
pub fn extract_package_name(specifier: &str) -> &str {
    if specifier.is_empty() {
        return specifier;
    }

    if specifier.starts_with('@') {
        if let Some(first_slash) = specifier.find('/') {
            if let Some(second_slash) = specifier[first_slash + 1..].find('/') {
                return &specifier[..first_slash + 1 + second_slash];
            }
        }
        return specifier;
    }

    match specifier.find('/') {
        Some(slash_idx) => &specifier[..slash_idx],
        None => specifier,
    }
}

/// Strip the last `node_modules/` prefix from an id, if any.
pub fn strip_node_modules_prefix(id: &str) -> &str {
    let marker = format!("{NODE_MODULES}/");
    match id.rfind(&marker) {
        Some(idx) => &id[idx + marker.len()..],
        None => id,
    }
}

/// Whether a path contains a `node_modules` segment at all.
pub fn is_in_node_modules(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .components()
        .any(|c| c.as_os_str() == NODE_MODULES)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_package() {
        let parsed = parse_node_module_path("/app/node_modules/lodash/fp/map.js").unwrap();
        assert_eq!(parsed.base_dir, "/app/node_modules/");
        assert_eq!(parsed.package_name, "lodash");
        assert_eq!(parsed.subpath, "/fp/map.js");
        assert_eq!(parsed.relative_subpath(), "fp/map.js");
        assert_eq!(parsed.package_dir(), PathBuf::from("/app/node_modules/lodash"));
    }

    #[test]
    fn test_parse_uses_last_node_modules_segment() {
        let parsed =
            parse_node_module_path("/app/node_modules/a/node_modules/b/index.js").unwrap();
        assert_eq!(parsed.base_dir, "/app/node_modules/a/node_modules/");
        assert_eq!(parsed.package_name, "b");
        assert_eq!(parsed.subpath, "/index.js");
    }

    #[test]
    fn test_parse_scoped_package_root() {
        let parsed = parse_node_module_path("/app/node_modules/@scope/pkg").unwrap();
        assert_eq!(parsed.package_name, "@scope/pkg");
        assert_eq!(parsed.subpath, "");
    }

    #[test]
    fn test_parse_rejects_paths_without_package() {
        assert!(parse_node_module_path("/app/src/index.js").is_none());
        assert!(parse_node_module_path("/app/node_modules/").is_none());
        assert!(parse_node_module_path("/app/node_modules/@scope").is_none());
        assert!(parse_node_module_path("node_modules/lodash/index.js").is_none());
    }

    #[test]
    fn test_parse_normalizes_backslashes() {
        let parsed = parse_node_module_path("C:\\app\\node_modules\\left-pad\\index.js").unwrap();
        assert_eq!(parsed.package_name, "left-pad");
        assert_eq!(parsed.subpath, "/index.js");
    }

    #[test]
    fn test_extract_package_name() {
        assert_eq!(extract_package_name("@babel/core"), "@babel/core");
        assert_eq!(extract_package_name("@babel/core/lib/index"), "@babel/core");
        assert_eq!(extract_package_name("lodash"), "lodash");
        assert_eq!(extract_package_name("lodash/fp"), "lodash");
        assert_eq!(extract_package_name(""), "");
        assert_eq!(extract_package_name("@org"), "@org");
    }

    #[test]
    fn test_strip_node_modules_prefix() {
        assert_eq!(
            strip_node_modules_prefix("/app/node_modules/vue/index.js"),
            "vue/index.js"
        );
        assert_eq!(strip_node_modules_prefix("vue"), "vue");
    }

    #[test]
    fn test_is_in_node_modules() {
        assert!(is_in_node_modules("/app/node_modules/vue/index.js"));
        assert!(!is_in_node_modules("/app/src/node_modules_backup/index.js"));
    }
}
