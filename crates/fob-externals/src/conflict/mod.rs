//! Version conflict resolution.
//!
//! Turns a [`Closure`] into a [`PlacementPlan`]: where every retained
//! package version goes in the output tree and which directory links make
//! each consumer see the version it was traced with. Packages with a single
//! version are placed directly at `node_modules/<name>` by every policy.

pub mod flat;
pub mod shadowed;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::closure::{Closure, PackageVersion};
use crate::config::ConflictPolicyKind;
use crate::descriptor::PackageDescriptor;
use crate::node_modules::{NODE_MODULES, PACKAGE_JSON};
use crate::version::sort_versions;

/// A file to copy into the output tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCopy {
    /// Absolute source path.
    pub source: PathBuf,
    /// Destination, relative to the output directory.
    pub target: PathBuf,
    /// Missing optional sources are skipped instead of failing the build.
    pub required: bool,
}

/// One package version written to the output tree.
#[derive(Debug, Clone)]
pub struct Placement {
    pub name: String,
    pub version: String,
    /// Package directory, relative to the output directory.
    pub dir: PathBuf,
    pub files: Vec<FileCopy>,
    pub descriptor: Arc<PackageDescriptor>,
}

/// A directory link created after all placements are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    /// Where the link is created, relative to the output directory.
    pub path: PathBuf,
    /// Placement directory it points at, relative to the output directory.
    pub target: PathBuf,
    /// `name@version` of the package this link shadows a dependency for;
    /// `None` for the shared top-level slot.
    pub consumer: Option<String>,
}

/// A version left out of the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedVersion {
    pub name: String,
    pub version: String,
    /// Version placed instead.
    pub winner: String,
}

/// Output of a conflict policy.
#[derive(Debug, Clone, Default)]
pub struct PlacementPlan {
    pub placements: Vec<Placement>,
    pub links: Vec<Link>,
    pub dropped: Vec<DroppedVersion>,
    pub warnings: Vec<String>,
}

impl PlacementPlan {
    /// Retained versions per package name, sorted ascending.
    pub fn retained_versions(&self) -> BTreeMap<String, Vec<String>> {
        let mut retained: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for placement in &self.placements {
            retained
                .entry(placement.name.clone())
                .or_default()
                .push(placement.version.clone());
        }
        for versions in retained.values_mut() {
            sort_versions(versions);
            versions.dedup();
        }
        retained
    }

    pub fn file_count(&self) -> usize {
        self.placements.iter().map(|p| p.files.len()).sum()
    }
}

/// Strategy for placing packages that appear in more than one version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Isolate every version and link it into its consumers' scope.
    Shadowed,
    /// Keep one version per name.
    Flat,
}

impl From<ConflictPolicyKind> for ConflictPolicy {
    fn from(kind: ConflictPolicyKind) -> Self {
        match kind {
            ConflictPolicyKind::Shadowed => ConflictPolicy::Shadowed,
            ConflictPolicyKind::Flat => ConflictPolicy::Flat,
        }
    }
}

impl ConflictPolicy {
    /// Compute the placement plan for `closure`.
    pub fn plan(&self, closure: &Closure) -> PlacementPlan {
        let plan = match self {
            ConflictPolicy::Shadowed => shadowed::plan(closure),
            ConflictPolicy::Flat => flat::plan(closure),
        };
        tracing::debug!(
            "[externals] {:?} plan: {} placements, {} links, {} dropped",
            self,
            plan.placements.len(),
            plan.links.len(),
            plan.dropped.len()
        );
        plan
    }
}

/// `node_modules/<name>`
pub(crate) fn top_level_dir(name: &str) -> PathBuf {
    PathBuf::from(NODE_MODULES).join(name)
}

/// Place every file of `version` under `dir`.
///
/// The root descriptor is not copied; the materializer writes a rewritten one.
pub(crate) fn place_version(version: &PackageVersion, dir: PathBuf) -> Placement {
    let files = version
        .files
        .iter()
        .filter(|(subpath, _)| subpath.as_str() != PACKAGE_JSON)
        .map(|(subpath, file)| FileCopy {
            source: file.path.clone(),
            target: dir.join(subpath),
            required: true,
        })
        .collect();

    Placement {
        name: version.name.clone(),
        version: version.version.clone(),
        dir,
        files,
        descriptor: Arc::clone(&version.descriptor),
    }
}
