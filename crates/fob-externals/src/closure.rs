//! Closure grouping.
//!
//! Partitions traced files into packages and package versions. The owning
//! package of a file is derived from its canonical path alone; the version
//! comes from the descriptor at the package root.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::context::BuildContext;
use crate::descriptor::PackageDescriptor;
use crate::node_modules::parse_node_module_path;
use crate::runtime::Runtime;
use crate::trace::TracedFile;

/// One `(name, version)` pair observed in the closure.
#[derive(Debug, Clone)]
pub struct PackageVersion {
    pub name: String,
    pub version: String,
    /// Package root the files were found under.
    pub root_dir: PathBuf,
    /// Files keyed by their subpath inside the package (`lib/index.js`).
    pub files: BTreeMap<String, TracedFile>,
    pub descriptor: Arc<PackageDescriptor>,
}

impl PackageVersion {
    /// Directory name used for namespaced copies: `name@version`.
    pub fn namespaced_name(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

/// All versions of one package name.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    pub versions: BTreeMap<String, PackageVersion>,
}

impl Package {
    pub fn has_conflict(&self) -> bool {
        self.versions.len() > 1
    }
}

/// The grouped runtime closure of a build.
#[derive(Debug, Clone, Default)]
pub struct Closure {
    pub packages: BTreeMap<String, Package>,
    owners: BTreeMap<PathBuf, (String, String)>,
}

impl Closure {
    /// Group normalized traced files by package name and version.
    ///
    /// Descriptors are read through the context's cache; unreadable ones are
    /// replaced by `{name, version: "0.0.0"}`, reported as warnings on
    /// `ctx`, and never fail the build.
    pub async fn build(ctx: &BuildContext, runtime: &dyn Runtime, files: Vec<TracedFile>) -> Self {
        let mut closure = Closure::default();

        for file in files {
            let Some(parsed) = parse_node_module_path(&file.path) else {
                continue;
            };
            let subpath = parsed.relative_subpath().to_string();
            if subpath.is_empty() {
                continue;
            }

            let root_dir = parsed.package_dir();
            let descriptor = ctx
                .descriptor(runtime, &root_dir, &parsed.package_name)
                .await;
            let version = descriptor.version().to_string();

            let package = closure
                .packages
                .entry(parsed.package_name.clone())
                .or_insert_with(|| Package {
                    name: parsed.package_name.clone(),
                    versions: BTreeMap::new(),
                });

            let package_version = package
                .versions
                .entry(version.clone())
                .or_insert_with(|| PackageVersion {
                    name: parsed.package_name.clone(),
                    version: version.clone(),
                    root_dir,
                    files: BTreeMap::new(),
                    descriptor,
                });

            closure
                .owners
                .insert(file.path.clone(), (parsed.package_name.clone(), version));
            package_version.files.entry(subpath).or_insert(file);
        }

        closure.include_main_entries(runtime).await;

        tracing::debug!(
            "[externals] grouped {} files into {} packages",
            closure.file_count(),
            closure.packages.len()
        );
        closure
    }

    /// Make sure each version carries the file its `main` field points at.
    ///
    /// A package reached only through a deep import still exposes `main` to
    /// anyone requiring it by name.
    async fn include_main_entries(&mut self, runtime: &dyn Runtime) {
        for package in self.packages.values_mut() {
            for version in package.versions.values_mut() {
                let Some(main) = version.descriptor.main() else {
                    continue;
                };
                let candidates = main_candidates(main);
                if candidates.iter().any(|c| version.files.contains_key(c)) {
                    continue;
                }

                for candidate in candidates {
                    let path = version.root_dir.join(&candidate);
                    let is_file = runtime
                        .metadata(&path)
                        .await
                        .map(|meta| meta.is_file)
                        .unwrap_or(false);
                    if !is_file {
                        continue;
                    }

                    // Attributed to the package itself so it adds no consumers.
                    let parents: BTreeSet<PathBuf> = version
                        .files
                        .values()
                        .next()
                        .map(|f| f.path.clone())
                        .into_iter()
                        .collect();
                    tracing::debug!(
                        "[externals] adding main entry {} of {}",
                        candidate,
                        version.namespaced_name()
                    );
                    self.owners
                        .insert(path.clone(), (version.name.clone(), version.version.clone()));
                    version.files.insert(
                        candidate,
                        TracedFile {
                            path,
                            parents,
                            ignored: false,
                        },
                    );
                    break;
                }
            }
        }
    }

    /// Assemble a closure from already grouped versions.
    pub fn from_versions(versions: impl IntoIterator<Item = PackageVersion>) -> Self {
        let mut closure = Closure::default();
        for version in versions {
            for file in version.files.values() {
                closure.owners.insert(
                    file.path.clone(),
                    (version.name.clone(), version.version.clone()),
                );
            }
            closure
                .packages
                .entry(version.name.clone())
                .or_insert_with(|| Package {
                    name: version.name.clone(),
                    versions: BTreeMap::new(),
                })
                .versions
                .insert(version.version.clone(), version);
        }
        closure
    }

    /// `(name, version)` of the package owning `path`.
    pub fn owner_of(&self, path: &Path) -> Option<(&str, &str)> {
        self.owners
            .get(path)
            .map(|(name, version)| (name.as_str(), version.as_str()))
    }

    pub fn get(&self, name: &str, version: &str) -> Option<&PackageVersion> {
        self.packages.get(name)?.versions.get(version)
    }

    pub fn versions(&self) -> impl Iterator<Item = &PackageVersion> {
        self.packages.values().flat_map(|p| p.versions.values())
    }

    pub fn file_count(&self) -> usize {
        self.versions().map(|v| v.files.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Subpaths `main` may refer to, in lookup order.
fn main_candidates(main: &str) -> Vec<String> {
    let main = main.trim_start_matches("./").trim_end_matches('/');
    if main.is_empty() || main == "." {
        return vec!["index.js".to_string(), "index.json".to_string()];
    }
    vec![
        main.to_string(),
        format!("{main}.js"),
        format!("{main}.json"),
        format!("{main}/index.js"),
        format!("{main}/index.json"),
    ]
}
