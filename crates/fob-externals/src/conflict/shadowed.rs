//! Shadowed placement.
//!
//! Every version of a conflicting package gets its own directory under
//! `node_modules/.internal/<name>@<version>`. One version is linked at the
//! shared `node_modules/<name>` slot; every other version is linked inside
//! the scope of each package that consumes it, so hierarchical lookup from
//! that consumer finds exactly its version and siblings never see it.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::PathBuf;

use super::{Link, PlacementPlan, place_version, top_level_dir};
use crate::closure::{Closure, Package, PackageVersion};
use crate::node_modules::{INTERNAL_DIR, NODE_MODULES};
use crate::version::compare_versions;

/// Who requires one version of a conflicting package.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionConsumers {
    /// `(name, version)` of packages importing this version.
    pub consumers: BTreeSet<(String, String)>,
    /// Imported by the program itself (a file with no traced parents, or a
    /// parent outside every traced package).
    pub root_required: bool,
}

/// Compute consumers of `version` from its files' parents.
///
/// Parents inside the same package name are internal references and ignored.
pub fn consumers_of(closure: &Closure, version: &PackageVersion) -> VersionConsumers {
    let mut result = VersionConsumers::default();

    for file in version.files.values() {
        if file.parents.is_empty() {
            result.root_required = true;
        }
        for parent in &file.parents {
            match closure.owner_of(parent) {
                None => result.root_required = true,
                Some((name, _)) if name == version.name => {}
                Some((name, parent_version)) => {
                    result
                        .consumers
                        .insert((name.to_string(), parent_version.to_string()));
                }
            }
        }
    }

    result
}

/// `node_modules/.internal/<name>@<version>`
pub fn namespaced_dir(name: &str, version: &str) -> PathBuf {
    PathBuf::from(NODE_MODULES)
        .join(INTERNAL_DIR)
        .join(format!("{name}@{version}"))
}

/// Directory of a consumer's placement: namespaced if the consumer itself
/// has several versions, top-level otherwise.
fn consumer_dir(closure: &Closure, name: &str, version: &str) -> PathBuf {
    match closure.packages.get(name) {
        Some(package) if package.has_conflict() => namespaced_dir(name, version),
        _ => top_level_dir(name),
    }
}

pub(super) fn plan(closure: &Closure) -> PlacementPlan {
    let mut plan = PlacementPlan::default();

    for package in closure.packages.values() {
        if !package.has_conflict() {
            if let Some(version) = package.versions.values().next() {
                plan.placements
                    .push(place_version(version, top_level_dir(&package.name)));
            }
            continue;
        }
        plan_conflicting(closure, package, &mut plan);
    }

    plan
}

fn plan_conflicting(closure: &Closure, package: &Package, plan: &mut PlacementPlan) {
    let entries: Vec<(&PackageVersion, VersionConsumers)> = package
        .versions
        .values()
        .map(|version| (version, consumers_of(closure, version)))
        .collect();

    for (version, _) in &entries {
        plan.placements.push(place_version(
            version,
            namespaced_dir(&version.name, &version.version),
        ));
    }

    let Some(top) = select_top_level(&package.name, &entries, &mut plan.warnings) else {
        return;
    };

    plan.links.push(Link {
        path: top_level_dir(&package.name),
        target: namespaced_dir(&package.name, top),
        consumer: None,
    });

    for (version, usage) in &entries {
        if version.version == top {
            continue;
        }
        for (consumer, consumer_version) in &usage.consumers {
            plan.links.push(Link {
                path: consumer_dir(closure, consumer, consumer_version)
                    .join(NODE_MODULES)
                    .join(&package.name),
                target: namespaced_dir(&package.name, &version.version),
                consumer: Some(format!("{consumer}@{consumer_version}")),
            });
        }
    }
}

/// Pick the version linked at the shared slot.
///
/// The root-required version wins. With several root-required versions the
/// highest wins and the others are reported. Without any, the version with
/// the fewest consumers wins, ties going to the highest version.
fn select_top_level<'a>(
    name: &str,
    entries: &[(&'a PackageVersion, VersionConsumers)],
    warnings: &mut Vec<String>,
) -> Option<&'a str> {
    let mut root_required: Vec<&str> = entries
        .iter()
        .filter(|(_, usage)| usage.root_required)
        .map(|&(version, _)| version.version.as_str())
        .collect();
    root_required.sort_by(|a, b| compare_versions(b, a));

    if let Some((&winner, rest)) = root_required.split_first() {
        if !rest.is_empty() {
            warnings.push(format!(
                "Multiple versions of `{}` are required by the program directly ({}, {}). Linking {} at node_modules/{}.",
                name,
                winner,
                rest.join(", "),
                winner,
                name
            ));
        }
        return Some(winner);
    }

    entries
        .iter()
        .min_by(|(va, a), (vb, b)| match a.consumers.len().cmp(&b.consumers.len()) {
            Ordering::Equal => compare_versions(&vb.version, &va.version),
            other => other,
        })
        .map(|&(version, _)| version.version.as_str())
}
