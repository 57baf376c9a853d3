//! Flat placement: one version per package name.
//!
//! For targets that cannot resolve through nested links. The highest version
//! wins the shared slot. Losers with the same compatibility key are assumed to
//! be drop-in compatible, so their files are served from the winner's
//! directory. Losers with a different key are dropped outright.

use std::collections::BTreeMap;

use super::{DroppedVersion, FileCopy, PlacementPlan, place_version, top_level_dir};
use crate::closure::{Closure, Package, PackageVersion};
use crate::node_modules::PACKAGE_JSON;
use crate::version::{compare_versions, compat_key};

pub(super) fn plan(closure: &Closure) -> PlacementPlan {
    let mut plan = PlacementPlan::default();

    for package in closure.packages.values() {
        let Some(winner) = select_winner(package) else {
            continue;
        };
        let mut placement = place_version(winner, top_level_dir(&package.name));

        if !package.has_conflict() {
            plan.placements.push(placement);
            continue;
        }

        let winner_key = compat_key(&winner.version);
        let mut remapped: BTreeMap<String, FileCopy> = BTreeMap::new();
        let mut dropped: Vec<&str> = Vec::new();

        for loser in package.versions.values() {
            if loser.version == winner.version {
                continue;
            }

            if compat_key(&loser.version) != winner_key {
                dropped.push(&loser.version);
                plan.dropped.push(DroppedVersion {
                    name: package.name.clone(),
                    version: loser.version.clone(),
                    winner: winner.version.clone(),
                });
                continue;
            }

            for subpath in loser.files.keys() {
                if subpath == PACKAGE_JSON || winner.files.contains_key(subpath) {
                    continue;
                }
                remapped.entry(subpath.clone()).or_insert_with(|| FileCopy {
                    source: winner.root_dir.join(subpath),
                    target: placement.dir.join(subpath),
                    required: false,
                });
            }
        }

        if !dropped.is_empty() {
            plan.warnings.push(format!(
                "Multiple major versions of package `{}` are being externalized. Picking latest version {} (dropping {}).",
                package.name,
                winner.version,
                dropped.join(", ")
            ));
        }

        placement.files.extend(remapped.into_values());
        plan.placements.push(placement);
    }

    plan
}

/// Highest version of `package`.
fn select_winner(package: &Package) -> Option<&PackageVersion> {
    package
        .versions
        .values()
        .max_by(|a, b| compare_versions(&a.version, &b.version))
}
