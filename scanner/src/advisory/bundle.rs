//! Advisory bundle document format.
//!
//! A bundle is a JSON payload carrying per-package advisory range records,
//! accompanied by a detached signature file (`<bundle>.sig`) whose
//! hex-encoded ECDSA signature covers the exact payload bytes. Bundles may
//! declare an `os` scope (e.g. "debian 12") limiting which images they
//! apply to.

use serde::{Deserialize, Serialize};
use stratum_core::error::{Result, ScanError};
use stratum_core::report::{PackageFormat, RangeOp, Severity};

/// Supported bundle format version.
pub const BUNDLE_VERSION: &str = "1";

/// One version-range predicate of an advisory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRange {
    /// Affected package name
    pub package: String,
    /// Package format the boundary versions are written in
    pub format: PackageFormat,
    pub op: RangeOp,
    /// Boundary version; the lower boundary for `between`
    pub boundary: String,
    /// Upper boundary, required for `between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<String>,
}

/// One advisory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleAdvisory {
    /// Opaque identifier (CVE or vendor id)
    pub id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub ranges: Vec<BundleRange>,
}

/// A parsed advisory bundle payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryBundle {
    pub version: String,
    /// OS scope label (e.g. "debian 12"); absent means unscoped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    pub advisories: Vec<BundleAdvisory>,
}

impl AdvisoryBundle {
    /// Parse and validate a bundle payload.
    ///
    /// Only called after the payload's signature has verified.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let bundle: AdvisoryBundle = serde_json::from_slice(bytes)
            .map_err(|e| ScanError::Serialization(format!("malformed advisory bundle: {}", e)))?;

        if bundle.version != BUNDLE_VERSION {
            return Err(ScanError::Serialization(format!(
                "unsupported bundle version '{}' (supported: {})",
                bundle.version, BUNDLE_VERSION
            )));
        }

        for advisory in &bundle.advisories {
            for range in &advisory.ranges {
                if range.op == RangeOp::Between && range.upper.is_none() {
                    return Err(ScanError::Serialization(format!(
                        "advisory {} has a between range without an upper boundary",
                        advisory.id
                    )));
                }
            }
        }

        Ok(bundle)
    }

}

/// Whether an OS scope applies to a detected OS label.
///
/// Unscoped advisories apply everywhere; scoped ones require a match and
/// are skipped when the image's OS could not be detected.
pub fn os_applies(scope: Option<&str>, os_label: Option<&str>) -> bool {
    match (scope, os_label) {
        (None, _) => true,
        (Some(scope), Some(label)) => scope == label,
        (Some(_), None) => false,
    }
}
