//! Package descriptor (`package.json`) handling.
//!
//! Descriptors are kept as raw JSON objects so every field survives the trip
//! into the output tree untouched, except for the `exports` map, which gets
//! its `production` conditions baked in before writing.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::node_modules::PACKAGE_JSON;
use crate::runtime::Runtime;

/// Maximum allowed size for package.json files (10MB)
const MAX_PACKAGE_JSON_SIZE: u64 = 10 * 1024 * 1024;

/// Version assigned to packages whose descriptor is missing or unreadable.
pub const FALLBACK_VERSION: &str = "0.0.0";

/// A parsed package descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct PackageDescriptor {
    fields: Map<String, Value>,
    synthetic: bool,
}

impl PackageDescriptor {
    /// Wrap a parsed JSON object.
    pub fn from_map(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            synthetic: false,
        }
    }

    /// Parse descriptor JSON. Non-object documents are rejected.
    pub fn parse(content: &str) -> Result<Self, String> {
        match serde_json::from_str::<Value>(content) {
            Ok(Value::Object(fields)) => Ok(Self::from_map(fields)),
            Ok(_) => Err("package.json is not a JSON object".to_string()),
            Err(e) => Err(format!("Invalid package.json format: {e}")),
        }
    }

    /// Minimal stand-in `{name, version: "0.0.0"}` for an unreadable descriptor.
    pub fn synthetic(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("name".to_string(), Value::String(name.to_string()));
        fields.insert(
            "version".to_string(),
            Value::String(FALLBACK_VERSION.to_string()),
        );
        Self {
            fields,
            synthetic: true,
        }
    }

    /// Whether this descriptor was synthesized instead of read from disk.
    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Declared version, or `0.0.0` when absent.
    pub fn version(&self) -> &str {
        self.fields
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(FALLBACK_VERSION)
    }

    pub fn main(&self) -> Option<&str> {
        self.fields.get("main").and_then(Value::as_str)
    }

    /// `"type"` field (`"module"` or `"commonjs"`).
    pub fn module_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    pub fn exports(&self) -> Option<&Value> {
        self.fields.get("exports")
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Copy of this descriptor with `production` export conditions applied.
    pub fn for_production(&self) -> Self {
        let mut rewritten = self.clone();
        if let Some(exports) = rewritten.fields.get_mut("exports") {
            apply_production_condition(exports);
        }
        rewritten
    }

    /// Pretty-printed JSON with a trailing newline.
    pub fn to_json_pretty(&self) -> String {
        let mut out = serde_json::to_string_pretty(&self.fields)
            .unwrap_or_else(|_| "{}".to_string());
        out.push('\n');
        out
    }
}

/// Bake the `production` export condition into a conditional exports value.
///
/// The output runs without a condition evaluator that knows about
/// `production`, so the choice is made statically:
/// - a string `production` target becomes the `default` target and the
///   `production` key is removed; an object left with only `default`
///   collapses to that target;
/// - an object `production` branch is merged over its siblings.
///
/// Conditions match in key order, so sibling keys keep their positions and
/// `default` always ends up last. Applied recursively to every nested
/// conditional object.
pub fn apply_production_condition(exports: &mut Value) {
    let Value::Object(map) = exports else {
        return;
    };

    let overrides = match map.get("production") {
        Some(Value::String(target)) => {
            let mut overrides = Map::new();
            overrides.insert("default".to_string(), Value::String(target.clone()));
            Some(overrides)
        }
        Some(Value::Object(branch)) => Some(branch.clone()),
        // Arrays and null are not meaningful as a production override.
        _ => None,
    };

    if let Some(overrides) = overrides {
        let siblings = std::mem::take(map);
        let mut default = None;
        for (key, value) in siblings.into_iter().chain(overrides) {
            if key == "default" {
                default = Some(value);
            } else if key != "production" {
                // Re-inserting an existing key keeps its position.
                map.insert(key, value);
            }
        }
        if let Some(default) = default {
            map.insert("default".to_string(), default);
        }
    }

    for value in map.values_mut() {
        apply_production_condition(value);
    }

    if map.len() == 1 {
        if let Some(default) = map.get("default") {
            if default.is_string() {
                *exports = default.clone();
            }
        }
    }
}

/// Build-scoped descriptor cache keyed by package root directory.
///
/// Populated concurrently; reading the same descriptor twice is harmless,
/// so there is no coordination beyond the map's own sharding.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: DashMap<PathBuf, Arc<PackageDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the descriptor at `package_dir/package.json`.
    ///
    /// Missing or unparsable descriptors are replaced by a synthetic
    /// `{name: package_name, version: "0.0.0"}`; this never fails. The
    /// second value explains the fallback and is only returned by the load
    /// that populated the cache entry.
    pub async fn load(
        &self,
        runtime: &dyn Runtime,
        package_dir: &Path,
        package_name: &str,
    ) -> (Arc<PackageDescriptor>, Option<String>) {
        if let Some(cached) = self.entries.get(package_dir) {
            return (Arc::clone(cached.value()), None);
        }

        let (descriptor, fallback) = match read_descriptor(runtime, package_dir).await {
            Ok(descriptor) => (descriptor, None),
            Err(reason) => (
                PackageDescriptor::synthetic(package_name),
                Some(format!(
                    "Could not read descriptor of `{}` at {}: {}. Assuming version {}.",
                    package_name,
                    package_dir.display(),
                    reason,
                    FALLBACK_VERSION
                )),
            ),
        };

        match self.entries.entry(package_dir.to_path_buf()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), None),
            Entry::Vacant(entry) => (Arc::clone(&entry.insert(Arc::new(descriptor))), fallback),
        }
    }

    /// Cached descriptor for `package_dir`, if already loaded.
    pub fn get(&self, package_dir: &Path) -> Option<Arc<PackageDescriptor>> {
        self.entries.get(package_dir).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

async fn read_descriptor(
    runtime: &dyn Runtime,
    package_dir: &Path,
) -> Result<PackageDescriptor, String> {
    let path = package_dir.join(PACKAGE_JSON);

    let metadata = runtime.metadata(&path).await.map_err(|e| e.to_string())?;
    if metadata.size > MAX_PACKAGE_JSON_SIZE {
        return Err(format!(
            "package.json exceeds maximum size of {}MB",
            MAX_PACKAGE_JSON_SIZE / 1024 / 1024
        ));
    }

    let bytes = runtime.read_file(&path).await.map_err(|e| e.to_string())?;
    let content = String::from_utf8(bytes)
        .map_err(|e| format!("package.json contains invalid UTF-8: {e}"))?;

    PackageDescriptor::parse(&content)
}

/// Find the descriptor governing `file` by walking up its ancestors.
///
/// Stops at (and includes) the first `package.json` found. Used to read the
/// `"type"` field when deciding whether a `.js` file is loadable.
pub async fn find_nearest_descriptor(
    runtime: &dyn Runtime,
    file: &Path,
) -> Option<PackageDescriptor> {
    let mut current = file.parent();
    while let Some(dir) = current {
        let candidate = dir.join(PACKAGE_JSON);
        if runtime.exists(&candidate) {
            return read_descriptor(runtime, dir).await.ok();
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::NativeRuntime;
    use serde_json::json;
    use tempfile::TempDir;

    fn rewrite(value: Value) -> Value {
        let mut value = value;
        apply_production_condition(&mut value);
        value
    }

    #[test]
    fn test_production_string_collapses_conditions() {
        let exports = json!({".": {"production": "./prod.js", "default": "./dev.js"}});
        assert_eq!(rewrite(exports), json!({".": "./prod.js"}));
    }

    #[test]
    fn test_production_string_keeps_other_conditions() {
        let exports = json!({
            "import": "./esm.js",
            "production": "./prod.js",
            "default": "./dev.js"
        });
        assert_eq!(
            rewrite(exports),
            json!({"import": "./esm.js", "default": "./prod.js"})
        );
    }

    #[test]
    fn test_production_object_merges_over_siblings() {
        let exports = json!({
            ".": {
                "production": {"import": "./prod.mjs", "require": "./prod.cjs"},
                "import": "./dev.mjs",
                "require": "./dev.cjs"
            }
        });
        assert_eq!(
            rewrite(exports),
            json!({".": {"import": "./prod.mjs", "require": "./prod.cjs"}})
        );
    }

    fn keys(value: &Value) -> Vec<&str> {
        value.as_object().unwrap().keys().map(String::as_str).collect()
    }

    #[test]
    fn test_leading_production_keeps_default_last() {
        let rewritten = rewrite(json!({
            "node": {"production": "./p.cjs", "import": "./a.mjs", "default": "./a.cjs"}
        }));
        assert_eq!(keys(&rewritten["node"]), vec!["import", "default"]);
        assert_eq!(rewritten["node"]["default"], "./p.cjs");
    }

    #[test]
    fn test_production_without_default_appends_it() {
        let rewritten = rewrite(json!({"production": "./p.js", "require": "./r.cjs"}));
        assert_eq!(keys(&rewritten), vec!["require", "default"]);
    }

    #[test]
    fn test_production_object_keeps_sibling_order() {
        let rewritten = rewrite(json!({
            "production": {"default": "./p.js", "worker": "./w.js", "require": "./p.cjs"},
            "import": "./a.mjs",
            "require": "./a.cjs",
            "default": "./a.js"
        }));
        assert_eq!(keys(&rewritten), vec!["import", "require", "worker", "default"]);
        assert_eq!(rewritten["require"], "./p.cjs");
        assert_eq!(rewritten["default"], "./p.js");
        assert_eq!(rewritten["import"], "./a.mjs");
    }

    #[test]
    fn test_nested_production_conditions() {
        let exports = json!({
            "./server": {"node": {"production": "./a.prod.js", "default": "./a.js"}}
        });
        assert_eq!(rewrite(exports), json!({"./server": {"node": "./a.prod.js"}}));
    }

    #[test]
    fn test_string_exports_untouched() {
        assert_eq!(rewrite(json!("./index.js")), json!("./index.js"));
        let exports = json!({".": {"import": "./a.mjs", "default": "./a.js"}});
        assert_eq!(rewrite(exports.clone()), exports);
    }

    #[test]
    fn test_for_production_rewrites_only_exports() {
        let descriptor = PackageDescriptor::parse(
            r#"{"name":"pkg","version":"1.0.0","exports":{".":{"production":"./prod.js","default":"./dev.js"}}}"#,
        )
        .unwrap();

        let rewritten = descriptor.for_production();

        assert_eq!(rewritten.exports(), Some(&json!({".": "./prod.js"})));
        assert_eq!(rewritten.name(), Some("pkg"));
        // the original is not modified
        assert_eq!(
            descriptor.exports(),
            Some(&json!({".": {"production": "./prod.js", "default": "./dev.js"}}))
        );
    }

    #[test]
    fn test_synthetic_descriptor() {
        let descriptor = PackageDescriptor::synthetic("@scope/pkg");
        assert!(descriptor.is_synthetic());
        assert_eq!(descriptor.name(), Some("@scope/pkg"));
        assert_eq!(descriptor.version(), "0.0.0");
    }

    #[test]
    fn test_to_json_pretty_preserves_field_order() {
        let descriptor =
            PackageDescriptor::parse(r#"{"version":"1.0.0","name":"z","main":"index.js"}"#)
                .unwrap();
        let json = descriptor.to_json_pretty();
        let version_at = json.find("\"version\"").unwrap();
        let name_at = json.find("\"name\"").unwrap();
        assert!(version_at < name_at);
        assert!(json.ends_with("}\n"));
    }

    #[tokio::test]
    async fn test_cache_loads_once_and_falls_back() {
        let temp_dir = TempDir::new().unwrap();
        let pkg_dir = temp_dir.path().join("node_modules/left-pad");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name":"left-pad","version":"1.3.0"}"#,
        )
        .unwrap();
        let broken_dir = temp_dir.path().join("node_modules/broken");
        std::fs::create_dir_all(&broken_dir).unwrap();
        std::fs::write(broken_dir.join("package.json"), "{ not json").unwrap();

        let runtime = NativeRuntime::new();
        let cache = DescriptorCache::new();

        let (first, fallback) = cache.load(&runtime, &pkg_dir, "left-pad").await;
        assert_eq!(first.version(), "1.3.0");
        assert!(fallback.is_none());

        // a changed file is not re-read within the same build
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name":"left-pad","version":"9.9.9"}"#,
        )
        .unwrap();
        let (second, _) = cache.load(&runtime, &pkg_dir, "left-pad").await;
        assert!(Arc::ptr_eq(&first, &second));

        let (broken, reason) = cache.load(&runtime, &broken_dir, "broken").await;
        assert!(broken.is_synthetic());
        assert_eq!(broken.version(), "0.0.0");
        assert!(reason.unwrap().contains("`broken`"));
        // the fallback is explained once per build
        let (_, again) = cache.load(&runtime, &broken_dir, "broken").await;
        assert!(again.is_none());

        let (missing, reason) = cache
            .load(&runtime, &temp_dir.path().join("node_modules/missing"), "missing")
            .await;
        assert!(missing.is_synthetic());
        assert!(reason.is_some());
        assert_eq!(cache.len(), 3);
    }

    #[tokio::test]
    async fn test_find_nearest_descriptor() {
        let temp_dir = TempDir::new().unwrap();
        let pkg_dir = temp_dir.path().join("node_modules/esm-only");
        std::fs::create_dir_all(pkg_dir.join("dist")).unwrap();
        std::fs::write(
            pkg_dir.join("package.json"),
            r#"{"name":"esm-only","type":"module"}"#,
        )
        .unwrap();

        let runtime = NativeRuntime::new();
        let found = find_nearest_descriptor(&runtime, &pkg_dir.join("dist/index.js"))
            .await
            .unwrap();
        assert_eq!(found.module_type(), Some("module"));
    }
}
