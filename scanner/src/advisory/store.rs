//! Verified advisory index.
//!
//! The store maps package names to range entries, each vector ordered by
//! lower boundary so heavily-advised names stay cheap to narrow. The index
//! is built once and shared read-only; `reload` builds a replacement off
//! to the side and publishes it with a single atomic swap.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use stratum_core::error::{Result, ScanError};
use stratum_core::report::{PackageFormat, RangeOp, Severity};

use crate::matcher::ComparatorRegistry;

use super::bundle::AdvisoryBundle;
use super::verify::TrustAnchor;

/// One advisory range, denormalized for the matching path.
#[derive(Debug, Clone)]
pub struct RangeEntry {
    pub advisory_id: String,
    pub severity: Severity,
    pub summary: Option<String>,
    pub format: PackageFormat,
    pub op: RangeOp,
    pub boundary: String,
    pub upper: Option<String>,
    /// OS scope inherited from the bundle, `None` when unscoped
    pub os: Option<String>,
}

/// An immutable snapshot of the verified advisory data.
#[derive(Debug, Default)]
pub struct AdvisoryIndex {
    ranges: HashMap<String, Vec<RangeEntry>>,
    /// Bundle file names whose content is in this index
    pub loaded_bundles: Vec<String>,
    /// Bundle file names excluded by signature verification failure
    pub rejected_bundles: Vec<String>,
}

impl AdvisoryIndex {
    pub fn empty() -> Self {
        Self::default()
    }

    /// All ranges recorded for a package name.
    pub fn ranges_for(&self, name: &str) -> &[RangeEntry] {
        self.ranges.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn package_count(&self) -> usize {
        self.ranges.len()
    }

    pub fn range_count(&self) -> usize {
        self.ranges.values().map(Vec::len).sum()
    }

    fn insert(&mut self, name: String, entry: RangeEntry) {
        self.ranges.entry(name).or_default().push(entry);
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, name: String, entry: RangeEntry) {
        self.insert(name, entry);
    }

    /// Order every per-name vector by (format, lower boundary), using the
    /// format's own comparator for the boundary ordering.
    fn sort(&mut self, comparators: &ComparatorRegistry) {
        for entries in self.ranges.values_mut() {
            entries.sort_by(|a, b| {
                a.format.to_string().cmp(&b.format.to_string()).then_with(|| {
                    match comparators.get(a.format) {
                        Some(comparator) => comparator.compare(&a.boundary, &b.boundary),
                        None => a.boundary.cmp(&b.boundary),
                    }
                })
            });
        }
    }
}

/// Shared, reloadable advisory store.
///
/// Readers take an [`Arc`] snapshot; reload swaps the whole index so a
/// reader never observes a partially-rebuilt state.
pub struct AdvisoryStore {
    index: RwLock<Arc<AdvisoryIndex>>,
}

impl AdvisoryStore {
    /// An empty store (no bundles loaded).
    pub fn empty() -> Self {
        Self {
            index: RwLock::new(Arc::new(AdvisoryIndex::empty())),
        }
    }

    /// Load and verify every bundle in a directory.
    ///
    /// A bundle failing signature verification is excluded entirely and
    /// recorded as rejected; the store proceeds with whatever verified.
    pub fn load(
        bundle_dir: &Path,
        anchor: &TrustAnchor,
        comparators: &ComparatorRegistry,
    ) -> Result<Self> {
        let index = Self::build_index(bundle_dir, anchor, comparators)?;
        Ok(Self {
            index: RwLock::new(Arc::new(index)),
        })
    }

    /// The current immutable snapshot.
    pub fn snapshot(&self) -> Arc<AdvisoryIndex> {
        self.index.read().clone()
    }

    /// Rebuild from disk and atomically swap the snapshot.
    pub fn reload(
        &self,
        bundle_dir: &Path,
        anchor: &TrustAnchor,
        comparators: &ComparatorRegistry,
    ) -> Result<()> {
        let index = Self::build_index(bundle_dir, anchor, comparators)?;
        *self.index.write() = Arc::new(index);
        Ok(())
    }

    fn build_index(
        bundle_dir: &Path,
        anchor: &TrustAnchor,
        comparators: &ComparatorRegistry,
    ) -> Result<AdvisoryIndex> {
        let mut index = AdvisoryIndex::empty();

        let entries = std::fs::read_dir(bundle_dir).map_err(|e| {
            ScanError::Config(format!(
                "failed to read advisory directory {}: {}",
                bundle_dir.display(),
                e
            ))
        })?;

        for entry in entries {
            let path = entry
                .map_err(|e| ScanError::Config(format!("failed to list bundle: {}", e)))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            match Self::load_bundle(&path, &name, anchor) {
                Ok(bundle) => {
                    Self::index_bundle(&mut index, &bundle);
                    index.loaded_bundles.push(name);
                }
                Err(e) => {
                    tracing::warn!(bundle = %name, error = %e, "Rejected advisory bundle");
                    index.rejected_bundles.push(name);
                }
            }
        }

        index.sort(comparators);

        tracing::info!(
            bundles = index.loaded_bundles.len(),
            rejected = index.rejected_bundles.len(),
            packages = index.package_count(),
            ranges = index.range_count(),
            "Built advisory index"
        );

        Ok(index)
    }

    /// Read one bundle and its detached signature; verify before parsing.
    fn load_bundle(path: &Path, name: &str, anchor: &TrustAnchor) -> Result<AdvisoryBundle> {
        let payload = std::fs::read(path)?;

        let sig_path = path.with_extension("json.sig");
        let signature_hex =
            std::fs::read_to_string(&sig_path).map_err(|_| ScanError::SignatureVerification {
                bundle: name.to_string(),
                message: format!("missing signature file {}", sig_path.display()),
            })?;

        anchor.verify(name, &payload, &signature_hex)?;
        AdvisoryBundle::parse(&payload)
    }

    fn index_bundle(index: &mut AdvisoryIndex, bundle: &AdvisoryBundle) {
        for advisory in &bundle.advisories {
            for range in &advisory.ranges {
                index.insert(
                    range.package.clone(),
                    RangeEntry {
                        advisory_id: advisory.id.clone(),
                        severity: advisory.severity.clone(),
                        summary: advisory.summary.clone(),
                        format: range.format,
                        op: range.op,
                        boundary: range.boundary.clone(),
                        upper: range.upper.clone(),
                        os: bundle.os.clone(),
                    },
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::verify::testkey::{anchor_hex, sign_hex, test_signing_key};
    use super::*;

    fn write_bundle(dir: &Path, name: &str, payload: &str, sign: bool) {
        let path = dir.join(name);
        std::fs::write(&path, payload).unwrap();
        if sign {
            let signature = sign_hex(&test_signing_key(), payload.as_bytes());
            std::fs::write(path.with_extension("json.sig"), signature).unwrap();
        }
    }

    fn anchor() -> TrustAnchor {
        TrustAnchor::from_hex(&anchor_hex(&test_signing_key())).unwrap()
    }

    fn debian_bundle() -> String {
        r#"{
            "version": "1",
            "os": "debian 12",
            "advisories": [
                {
                    "id": "CVE-2024-0001",
                    "severity": { "score": 9.8 },
                    "ranges": [
                        { "package": "zlib1g", "format": "deb", "op": "lt", "boundary": "1:1.3-1" },
                        { "package": "zlib1g", "format": "deb", "op": "lt", "boundary": "1:1.2-5" }
                    ]
                },
                {
                    "id": "CVE-2024-0002",
                    "severity": { "score": 5.5 },
                    "ranges": [
                        { "package": "libssl3", "format": "deb", "op": "between",
                          "boundary": "3.0.0-1", "upper": "3.0.11-1" }
                    ]
                }
            ]
        }"#
        .to_string()
    }

    #[test]
    fn test_load_verified_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "debian-12.json", &debian_bundle(), true);

        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let index = store.snapshot();
        assert_eq!(index.loaded_bundles, vec!["debian-12.json"]);
        assert!(index.rejected_bundles.is_empty());
        assert_eq!(index.package_count(), 2);
        assert_eq!(index.ranges_for("zlib1g").len(), 2);
        assert!(index.ranges_for("unknown-package").is_empty());
    }

    #[test]
    fn test_ranges_ordered_by_lower_boundary() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "debian-12.json", &debian_bundle(), true);

        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let index = store.snapshot();
        let boundaries: Vec<_> = index
            .ranges_for("zlib1g")
            .iter()
            .map(|r| r.boundary.as_str())
            .collect();
        // dpkg ordering: 1:1.2-5 < 1:1.3-1
        assert_eq!(boundaries, vec!["1:1.2-5", "1:1.3-1"]);
    }

    #[test]
    fn test_unsigned_bundle_rejected_entirely() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "unsigned.json", &debian_bundle(), false);

        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let index = store.snapshot();
        assert_eq!(index.rejected_bundles, vec!["unsigned.json"]);
        assert_eq!(index.package_count(), 0);
        assert!(index.ranges_for("zlib1g").is_empty());
    }

    #[test]
    fn test_tampered_bundle_rejected_entirely() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "feed.json", &debian_bundle(), true);
        // Tamper after signing.
        let path = dir.path().join("feed.json");
        let mut payload = std::fs::read_to_string(&path).unwrap();
        payload = payload.replace("9.8", "0.1");
        std::fs::write(&path, payload).unwrap();

        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let index = store.snapshot();
        assert_eq!(index.rejected_bundles, vec!["feed.json"]);
        assert_eq!(index.package_count(), 0);
    }

    #[test]
    fn test_entries_carry_bundle_os_scope() {
        let dir = tempfile::tempdir().unwrap();
        write_bundle(dir.path(), "debian-12.json", &debian_bundle(), true);

        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let index = store.snapshot();
        // OS scoping is applied at match time; the scope travels on entries.
        for entry in index.ranges_for("zlib1g") {
            assert_eq!(entry.os.as_deref(), Some("debian 12"));
        }
    }

    #[test]
    fn test_reload_swaps_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = AdvisoryStore::load(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        let before = store.snapshot();
        assert_eq!(before.package_count(), 0);

        let unscoped = debian_bundle().replace("\"os\": \"debian 12\",", "");
        write_bundle(dir.path(), "feed.json", &unscoped, true);
        store
            .reload(dir.path(), &anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();

        // The old snapshot is unchanged; the new one sees the bundle.
        assert_eq!(before.package_count(), 0);
        assert_eq!(store.snapshot().package_count(), 2);
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent");
        let result =
            AdvisoryStore::load(&missing, &anchor(), &ComparatorRegistry::with_builtin());
        assert!(matches!(result, Err(ScanError::Config(_))));
    }
}
