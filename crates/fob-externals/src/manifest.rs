//! Output manifest.
//!
//! `package.json` at the root of the output directory. It lists every
//! materialized package with the versions present, for auditing the tree;
//! the version strings are not installable ranges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::config::ExternalsConfig;
use crate::conflict::PlacementPlan;
use crate::node_modules::PACKAGE_JSON;
use crate::runtime::Runtime;
use crate::{Error, Result};

/// Separator between the versions of one package.
const VERSION_SEPARATOR: &str = " ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub name: String,
    pub version: String,
    pub private: bool,
    /// Package name to its retained versions, sorted and space-joined.
    pub bundled_dependencies: BTreeMap<String, String>,
}

impl Manifest {
    /// Empty manifest carrying the configured name and version.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            private: true,
            bundled_dependencies: BTreeMap::new(),
        }
    }

    pub fn from_plan(config: &ExternalsConfig, plan: &PlacementPlan) -> Self {
        let mut manifest = Self::new(&config.manifest_name, &config.manifest_version);
        manifest.bundled_dependencies = plan
            .retained_versions()
            .into_iter()
            .map(|(name, versions)| (name, versions.join(VERSION_SEPARATOR)))
            .collect();
        manifest
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        let mut out = serde_json::to_string_pretty(self).map_err(|err| Error::Descriptor {
            path: PathBuf::from(PACKAGE_JSON),
            message: err.to_string(),
        })?;
        out.push('\n');
        Ok(out)
    }

    /// Write to `out_dir/package.json`, returning the written path.
    pub async fn write(&self, runtime: &dyn Runtime, out_dir: &Path) -> Result<PathBuf> {
        let path = out_dir.join(PACKAGE_JSON);
        let content = self.to_json_pretty()?;
        runtime
            .write_file(&path, content.as_bytes())
            .await
            .map_err(|err| Error::Descriptor {
                path: path.clone(),
                message: err.to_string(),
            })?;
        tracing::debug!(
            "[externals] wrote manifest with {} packages to {}",
            self.bundled_dependencies.len(),
            path.display()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::Placement;
    use crate::descriptor::PackageDescriptor;
    use crate::runtime::NativeRuntime;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn placement(name: &str, version: &str) -> Placement {
        Placement {
            name: name.to_string(),
            version: version.to_string(),
            dir: PathBuf::from("node_modules").join(name),
            files: Vec::new(),
            descriptor: Arc::new(PackageDescriptor::synthetic(name)),
        }
    }

    #[test]
    fn test_versions_are_sorted_and_joined() {
        let plan = PlacementPlan {
            placements: vec![
                placement("lodash", "4.0.0"),
                placement("left-pad", "1.0.0"),
                placement("lodash", "3.0.0"),
            ],
            ..PlacementPlan::default()
        };

        let manifest = Manifest::from_plan(&ExternalsConfig::default(), &plan);

        assert_eq!(manifest.name, "fob-output");
        assert!(manifest.private);
        assert_eq!(manifest.bundled_dependencies["lodash"], "3.0.0 4.0.0");
        assert_eq!(manifest.bundled_dependencies["left-pad"], "1.0.0");
    }

    #[tokio::test]
    async fn test_write_uses_camel_case_fields() {
        let temp_dir = TempDir::new().unwrap();
        let mut manifest = Manifest::new("app", "1.2.3");
        manifest
            .bundled_dependencies
            .insert("left-pad".to_string(), "1.0.0".to_string());

        let path = manifest
            .write(&NativeRuntime::new(), temp_dir.path())
            .await
            .unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(
            written,
            serde_json::json!({
                "name": "app",
                "version": "1.2.3",
                "private": true,
                "bundledDependencies": { "left-pad": "1.0.0" }
            })
        );
    }
}
