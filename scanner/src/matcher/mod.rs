//! Package-to-advisory matching.
//!
//! Comparators are a capability-indexed registry: a [`PackageFormat`] maps
//! to the comparator implementing that ecosystem's documented
//! version-ordering grammar. Adding a format registers one entry here —
//! the matching path itself never changes.

mod apk;
mod deb;
mod rpm;

use std::cmp::Ordering;
use std::collections::HashMap;

use stratum_core::error::ScanWarning;
use stratum_core::report::{Finding, Package, PackageFormat, RangeOp, RangeSpec};

use crate::advisory::bundle::os_applies;
use crate::advisory::{AdvisoryIndex, RangeEntry};

pub use apk::ApkVersion;
pub use deb::DebVersion;
pub use rpm::RpmVersion;

/// A total order over one ecosystem's version strings.
///
/// These orderings are not semver and must not be approximated by one.
pub trait VersionOrd: Send + Sync {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

/// Format-indexed comparator registry.
pub struct ComparatorRegistry {
    comparators: HashMap<PackageFormat, Box<dyn VersionOrd>>,
}

impl ComparatorRegistry {
    /// Registry with every built-in comparator.
    pub fn with_builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(PackageFormat::Deb, Box::new(DebVersion));
        registry.register(PackageFormat::Apk, Box::new(ApkVersion));
        registry.register(PackageFormat::Rpm, Box::new(RpmVersion));
        registry
    }

    pub fn empty() -> Self {
        Self {
            comparators: HashMap::new(),
        }
    }

    pub fn register(&mut self, format: PackageFormat, comparator: Box<dyn VersionOrd>) {
        self.comparators.insert(format, comparator);
    }

    pub fn get(&self, format: PackageFormat) -> Option<&dyn VersionOrd> {
        self.comparators.get(&format).map(Box::as_ref)
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Match one package against the advisory index.
///
/// Ranges tagged with a different format than the package are skipped, as
/// are ranges scoped to a different OS than the scanned image. A package
/// whose format has no registered comparator yields zero findings plus an
/// `UnsupportedFormat` warning — never a failure.
pub fn match_package(
    package: &Package,
    os_label: Option<&str>,
    index: &AdvisoryIndex,
    comparators: &ComparatorRegistry,
) -> (Vec<Finding>, Vec<ScanWarning>) {
    let candidates = index.ranges_for(&package.name);
    if candidates.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let Some(comparator) = comparators.get(package.format) else {
        return (
            Vec::new(),
            vec![ScanWarning::UnsupportedFormat {
                package: package.name.clone(),
                format: package.format.to_string(),
            }],
        );
    };

    let findings = candidates
        .iter()
        .filter(|entry| entry.format == package.format)
        .filter(|entry| os_applies(entry.os.as_deref(), os_label))
        .filter(|entry| range_matches(comparator, &package.version, entry))
        .map(|entry| Finding {
            package: package.clone(),
            advisory_id: entry.advisory_id.clone(),
            severity: entry.severity.clone(),
            summary: entry.summary.clone(),
            range: RangeSpec {
                op: entry.op,
                boundary: entry.boundary.clone(),
                upper: entry.upper.clone(),
            },
        })
        .collect();

    (findings, Vec::new())
}

/// Evaluate one range predicate with the format's total order.
fn range_matches(comparator: &dyn VersionOrd, version: &str, entry: &RangeEntry) -> bool {
    let to_boundary = comparator.compare(version, &entry.boundary);
    match entry.op {
        RangeOp::Lt => to_boundary == Ordering::Less,
        RangeOp::Le => to_boundary != Ordering::Greater,
        RangeOp::Eq => to_boundary == Ordering::Equal,
        RangeOp::Ge => to_boundary != Ordering::Less,
        RangeOp::Gt => to_boundary == Ordering::Greater,
        RangeOp::Between => {
            // Inclusive lower, exclusive upper.
            let Some(upper) = entry.upper.as_deref() else {
                return false;
            };
            to_boundary != Ordering::Less && comparator.compare(version, upper) == Ordering::Less
        }
    }
}
