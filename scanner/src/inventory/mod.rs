//! Inventory extraction.
//!
//! Recognizes package-database files surfaced by the materializer and
//! parses them into normalized [`Package`] records, one extractor per
//! supported package-manager format. Recognition is by well-known path;
//! adding a format means registering one extractor here and one
//! comparator in the matcher — the pipeline itself is untouched.

pub mod apk;
pub mod dpkg;
pub mod os_release;

use stratum_core::error::ScanWarning;
use stratum_core::report::{OsRelease, Package};

use crate::fsview::{FsView, PathFilter};

pub use apk::ApkInstalledDb;
pub use dpkg::DpkgStatusDb;
pub use os_release::{ETC_OS_RELEASE, USR_LIB_OS_RELEASE};

/// A package-database extractor for one format.
///
/// `extract` is pure and total over its input: malformed content yields an
/// empty (or shortened) package list plus warnings, never an error.
pub trait PackageDb: Send + Sync {
    /// Whether this extractor recognizes the given path.
    fn recognizes(&self, path: &str) -> bool;

    /// Paths this extractor needs materialized.
    fn register_paths(&self, filter: PathFilter) -> PathFilter;

    /// Parse one database file into packages.
    fn extract(&self, path: &str, bytes: &[u8]) -> (Vec<Package>, Vec<ScanWarning>);
}

/// The full inventory pulled out of a materialized view.
#[derive(Debug, Default)]
pub struct Inventory {
    pub packages: Vec<Package>,
    pub os_release: Option<OsRelease>,
    pub warnings: Vec<ScanWarning>,
}

/// Registry of package-database extractors.
pub struct InventoryExtractor {
    extractors: Vec<Box<dyn PackageDb>>,
}

impl InventoryExtractor {
    /// Registry with all built-in formats.
    pub fn new() -> Self {
        Self {
            extractors: vec![Box::new(DpkgStatusDb), Box::new(ApkInstalledDb)],
        }
    }

    /// The materializer allow-list covering every registered database plus
    /// the os-release locations.
    pub fn path_filter(&self) -> PathFilter {
        let filter = PathFilter::new()
            .with_path(ETC_OS_RELEASE)
            .with_path(USR_LIB_OS_RELEASE);
        self.extractors
            .iter()
            .fold(filter, |filter, db| db.register_paths(filter))
    }

    /// Extract packages and OS release info from the materialized view.
    pub fn extract(&self, view: &FsView) -> Inventory {
        let mut inventory = Inventory::default();

        inventory.os_release = os_release::detect(view);

        for (path, file) in view.captured_files() {
            let Some(db) = self.extractors.iter().find(|db| db.recognizes(path)) else {
                continue;
            };

            let (packages, warnings) = db.extract(path, &file.content);
            tracing::debug!(
                path,
                layer = file.layer,
                packages = packages.len(),
                warnings = warnings.len(),
                "Extracted package database"
            );
            inventory.packages.extend(packages);
            inventory.warnings.extend(warnings);
        }

        inventory
    }
}

impl Default for InventoryExtractor {
    fn default() -> Self {
        Self::new()
    }
}
