//! apk installed database extractor.
//!
//! Alpine's installed database at `lib/apk/db/installed` is a sequence of
//! blank-line-separated records of single-letter fields; `P:` is the
//! package name, `V:` the version, `A:` the architecture.

use stratum_core::error::ScanWarning;
use stratum_core::report::{Package, PackageFormat};

use crate::fsview::PathFilter;

use super::PackageDb;

pub const APK_INSTALLED: &str = "lib/apk/db/installed";

/// Extractor for the apk installed database.
pub struct ApkInstalledDb;

impl PackageDb for ApkInstalledDb {
    fn recognizes(&self, path: &str) -> bool {
        path == APK_INSTALLED
    }

    fn register_paths(&self, filter: PathFilter) -> PathFilter {
        filter.with_path(APK_INSTALLED)
    }

    fn extract(&self, path: &str, bytes: &[u8]) -> (Vec<Package>, Vec<ScanWarning>) {
        let mut packages = Vec::new();
        let mut warnings = Vec::new();
        let text = String::from_utf8_lossy(bytes);

        for record in text.split("\n\n").filter(|r| !r.trim().is_empty()) {
            let mut name = None;
            let mut version = None;
            let mut architecture = None;

            for line in record.lines() {
                match line.split_once(':') {
                    Some(("P", value)) => name = Some(value.to_string()),
                    Some(("V", value)) => version = Some(value.to_string()),
                    Some(("A", value)) => architecture = Some(value.to_string()),
                    _ => {}
                }
            }

            match (name, version) {
                (Some(name), Some(version)) => packages.push(Package {
                    name,
                    version,
                    architecture,
                    format: PackageFormat::Apk,
                }),
                _ => warnings.push(ScanWarning::UnparsablePackageDb {
                    path: path.to_string(),
                    detail: format!(
                        "record without P/V fields: '{}'",
                        record.lines().next().unwrap_or_default()
                    ),
                }),
            }
        }

        (packages, warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTALLED_FIXTURE: &[u8] = b"C:Q1pxZ3oFcdlzsZ8SWHdNGRbF+P7wY=\n\
P:musl\n\
V:1.2.4-r2\n\
A:x86_64\n\
T:the musl c library (libc) implementation\n\
\n\
C:Q1ndNpHpioQlfbLLYvTojO1OU+Qzk=\n\
P:busybox\n\
V:1.36.1-r5\n\
A:x86_64\n\
\n";

    #[test]
    fn test_extract_records() {
        let (packages, warnings) = ApkInstalledDb.extract(APK_INSTALLED, INSTALLED_FIXTURE);

        assert!(warnings.is_empty());
        assert_eq!(packages.len(), 2);
        assert_eq!(packages[0].name, "musl");
        assert_eq!(packages[0].version, "1.2.4-r2");
        assert_eq!(packages[0].architecture.as_deref(), Some("x86_64"));
        assert_eq!(packages[0].format, PackageFormat::Apk);
        assert_eq!(packages[1].name, "busybox");
    }

    #[test]
    fn test_extract_record_missing_version_warns() {
        let content = b"P:broken\nA:x86_64\n\n";
        let (packages, warnings) = ApkInstalledDb.extract(APK_INSTALLED, content);
        assert!(packages.is_empty());
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            warnings[0],
            ScanWarning::UnparsablePackageDb { .. }
        ));
    }

    #[test]
    fn test_extract_empty_input() {
        let (packages, warnings) = ApkInstalledDb.extract(APK_INSTALLED, b"");
        assert!(packages.is_empty());
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_recognizes_exact_path_only() {
        assert!(ApkInstalledDb.recognizes("lib/apk/db/installed"));
        assert!(!ApkInstalledDb.recognizes("lib/apk/db/scripts.tar"));
        assert!(!ApkInstalledDb.recognizes("var/lib/dpkg/status"));
    }
}
