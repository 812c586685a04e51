//! Report and wire data model.
//!
//! These types cross the process boundary: they are serialized onto the
//! result channel and consumed by the downstream detection engine, so the
//! serde shape is part of the external contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ScanWarning;

/// Package-manager format of an installed package.
///
/// Each format has its own version-ordering grammar; the matcher selects
/// a comparator by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageFormat {
    /// Debian dpkg databases
    Deb,
    /// Alpine apk databases
    Apk,
    /// RPM databases
    Rpm,
}

impl std::fmt::Display for PackageFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deb => write!(f, "deb"),
            Self::Apk => write!(f, "apk"),
            Self::Rpm => write!(f, "rpm"),
        }
    }
}

impl std::str::FromStr for PackageFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "deb" => Ok(Self::Deb),
            "apk" => Ok(Self::Apk),
            "rpm" => Ok(Self::Rpm),
            _ => Err(format!("unknown package format: '{}'", s)),
        }
    }
}

/// An installed software package extracted from an image.
///
/// The version string is kept raw; epoch/upstream/revision splitting is
/// comparator-specific and happens lazily during matching.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    pub format: PackageFormat,
}

impl std::fmt::Display for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

/// Advisory severity metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Severity {
    /// CVSS base score
    pub score: f64,
    /// CVSS vector string, when the feed provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<String>,
}

/// Comparator operator of an advisory range predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeOp {
    Lt,
    Le,
    Eq,
    Ge,
    Gt,
    /// Inclusive lower boundary, exclusive upper boundary
    Between,
}

impl std::fmt::Display for RangeOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lt => write!(f, "<"),
            Self::Le => write!(f, "<="),
            Self::Eq => write!(f, "="),
            Self::Ge => write!(f, ">="),
            Self::Gt => write!(f, ">"),
            Self::Between => write!(f, "between"),
        }
    }
}

/// The concrete range predicate a finding matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub op: RangeOp,
    /// Boundary version; the lower boundary for `Between`
    pub boundary: String,
    /// Upper boundary, present only for `Between`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper: Option<String>,
}

/// A match between an installed package and one advisory range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub package: Package,
    pub advisory_id: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub range: RangeSpec,
}

impl Finding {
    /// Stable identity for consumer-side idempotence:
    /// (image identity, finding identity) pairs must dedupe.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.advisory_id.clone(),
            self.package.name.clone(),
            self.package.version.clone(),
        )
    }
}

/// Operating-system release information detected inside the image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsRelease {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pretty_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpe_name: Option<String>,
}

impl OsRelease {
    /// `"<id> <version_id>"` label used to scope advisory bundles,
    /// e.g. "debian 12".
    pub fn label(&self) -> Option<String> {
        match (&self.id, &self.version_id) {
            (Some(id), Some(version)) => Some(format!("{} {}", id, version)),
            _ => None,
        }
    }
}

/// Terminal status of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Complete,
    Partial,
    Failed,
}

/// The full result of one image scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    /// Unique scan identifier carried on every published message
    pub scan_id: Uuid,

    /// Full image reference as requested
    pub image: String,

    /// Resolved manifest digest, when resolution succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_digest: Option<String>,

    /// OS release detected inside the image, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_release: Option<OsRelease>,

    pub status: ScanStatus,

    pub findings: Vec<Finding>,

    #[serde(default)]
    pub warnings: Vec<ScanWarning>,

    /// Reason string when status is `failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScanResult {
    /// Order-insensitive finding identities, for idempotence checks.
    pub fn finding_identities(&self) -> Vec<(String, String, String)> {
        let mut ids: Vec<_> = self.findings.iter().map(Finding::identity).collect();
        ids.sort();
        ids
    }
}
