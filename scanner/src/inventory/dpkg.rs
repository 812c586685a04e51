//! dpkg status database extractor.
//!
//! Two layouts share the stanza format: the classic status file at
//! `var/lib/dpkg/status`, and the distroless-style `status.d/` directory
//! holding one stanza file per package. Stanzas are RFC-822-style field
//! blocks separated by blank lines.

use stratum_core::error::ScanWarning;
use stratum_core::report::{Package, PackageFormat};

use crate::fsview::PathFilter;

use super::PackageDb;

pub const DPKG_STATUS: &str = "var/lib/dpkg/status";
pub const DPKG_STATUS_DIR: &str = "var/lib/dpkg/status.d";

/// Extractor for dpkg status databases.
pub struct DpkgStatusDb;

impl PackageDb for DpkgStatusDb {
    fn recognizes(&self, path: &str) -> bool {
        path == DPKG_STATUS || path.starts_with("var/lib/dpkg/status.d/")
    }

    fn register_paths(&self, filter: PathFilter) -> PathFilter {
        filter.with_path(DPKG_STATUS).with_subtree(DPKG_STATUS_DIR)
    }

    fn extract(&self, path: &str, bytes: &[u8]) -> (Vec<Package>, Vec<ScanWarning>) {
        let mut packages = Vec::new();
        let mut warnings = Vec::new();
        let text = String::from_utf8_lossy(bytes);

        for stanza in text.split("\n\n").filter(|s| !s.trim().is_empty()) {
            match parse_stanza(stanza) {
                Stanza::Installed(package) => packages.push(package),
                Stanza::NotInstalled => {}
                Stanza::Malformed => warnings.push(ScanWarning::UnparsablePackageDb {
                    path: path.to_string(),
                    detail: format!(
                        "stanza without Package/Version: '{}'",
                        stanza.lines().next().unwrap_or_default()
                    ),
                }),
            }
        }

        (packages, warnings)
    }
}

enum Stanza {
    Installed(Package),
    /// Well-formed, but the package is removed/not configured
    NotInstalled,
    Malformed,
}

fn parse_stanza(stanza: &str) -> Stanza {
    let mut name = None;
    let mut version = None;
    let mut architecture = None;
    let mut status = None;

    for line in stanza.lines() {
        // Continuation lines (leading whitespace) belong to multi-line
        // fields we don't read.
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match field {
            "Package" => name = Some(value.to_string()),
            "Version" => version = Some(value.to_string()),
            "Architecture" => architecture = Some(value.to_string()),
            "Status" => status = Some(value.to_string()),
            _ => {}
        }
    }

    // The status file records removed-but-not-purged packages too; only
    // `... installed` stanzas count. status.d files carry no Status field.
    if let Some(status) = status {
        if !status.ends_with("installed") {
            return Stanza::NotInstalled;
        }
    }

    match (name, version) {
        (Some(name), Some(version)) => Stanza::Installed(Package {
            name,
            version,
            architecture,
            format: PackageFormat::Deb,
        }),
        _ => Stanza::Malformed,
    }
}
