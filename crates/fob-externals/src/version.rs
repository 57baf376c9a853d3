//! Version ordering for package descriptors.
//!
//! Descriptor versions are usually semver, but the closure also contains
//! hand-written or prerelease-ish strings (`1.0`, `v2.3.1`, `0.0.0-dev`).
//! Parsing is lenient; anything that still fails falls back to lexical order.

use semver::Version;
use std::cmp::Ordering;

/// Parse a descriptor version leniently.
///
/// Accepts a leading `v`/`=` and pads missing minor/patch components.
pub fn parse_loose(version: &str) -> Option<Version> {
    let trimmed = version.trim().trim_start_matches(['v', '=']);
    if let Ok(parsed) = Version::parse(trimmed) {
        return Some(parsed);
    }

    // Pad `1` / `1.2` to full triples, keeping any prerelease/build suffix.
    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() >= 3 {
        return None;
    }
    let mut padded = parts.join(".");
    for _ in parts.len()..3 {
        padded.push_str(".0");
    }
    padded.push_str(suffix);
    Version::parse(&padded).ok()
}

/// Compare two descriptor versions; higher versions sort greater.
///
/// Unparsable versions sort below every parsable one and lexically among
/// themselves. Versions that parse equal (`1.0`, `1.0.0`) are ordered by
/// their text, so the result is a total order.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_loose(a), parse_loose(b)) {
        (Some(va), Some(vb)) => va.cmp(&vb).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Compatibility key: the first non-zero component of `major.minor.patch`.
///
/// Two versions with the same key are assumed to be drop-in replacements for
/// each other (`1.2.0`/`1.9.3`, `0.4.1`/`0.4.7`), different keys are not.
pub fn compat_key(version: &str) -> String {
    match parse_loose(version) {
        Some(v) if v.major != 0 => format!("{}", v.major),
        Some(v) if v.minor != 0 => format!("0.{}", v.minor),
        Some(v) => format!("0.0.{}", v.patch),
        None => version
            .split('.')
            .find(|s| *s != "0")
            .unwrap_or(version)
            .to_string(),
    }
}

/// Sort versions ascending, in place.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(a, b));
}
