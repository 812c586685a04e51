//! End-to-end pipeline tests: synthesized layer archives through the
//! materializer, inventory extraction, signed advisory loading, and
//! matching. No registry or broker involved.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature, SigningKey};
use stratum_core::report::PackageFormat;
use stratum_scanner::advisory::{AdvisoryStore, TrustAnchor};
use stratum_scanner::fsview::{open_archive, FsView, LayerDelta};
use stratum_scanner::inventory::InventoryExtractor;
use stratum_scanner::matcher::{match_package, ComparatorRegistry};
use stratum_scanner::registry::manifest::LayerCompression;

fn build_layer(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *content).unwrap();
    }
    builder.into_inner().unwrap()
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

fn signing_key() -> SigningKey {
    SigningKey::from_slice(&[0x42; 32]).unwrap()
}

fn write_signed_bundle(dir: &std::path::Path, name: &str, payload: &str) {
    let path = dir.join(name);
    std::fs::write(&path, payload).unwrap();
    let signature: Signature = signing_key().sign(payload.as_bytes());
    std::fs::write(
        path.with_extension("json.sig"),
        hex::encode(signature.to_bytes()),
    )
    .unwrap();
}

fn trust_anchor() -> TrustAnchor {
    let key_hex = hex::encode(signing_key().verifying_key().to_sec1_bytes());
    TrustAnchor::from_hex(&key_hex).unwrap()
}

const LAYER0_STATUS: &[u8] = b"Package: zlib1g\n\
Status: install ok installed\n\
Architecture: amd64\n\
Version: 1:1.2.13-1\n\
\n\
Package: libssl3\n\
Status: install ok installed\n\
Architecture: amd64\n\
Version: 3.0.9-1\n\
\n";

const LAYER1_STATUS: &[u8] = b"Package: zlib1g\n\
Status: install ok installed\n\
Architecture: amd64\n\
Version: 1:1.2.13-1\n\
\n\
Package: libssl3\n\
Status: install ok installed\n\
Architecture: amd64\n\
Version: 3.0.11-1\n\
\n";

const OS_RELEASE: &[u8] = b"ID=debian\nVERSION_ID=\"12\"\nPRETTY_NAME=\"Debian GNU/Linux 12\"\n";

const BUNDLE: &str = r#"{
    "version": "1",
    "os": "debian 12",
    "advisories": [
        {
            "id": "CVE-2024-1111",
            "severity": { "score": 8.1 },
            "summary": "zlib heap overflow",
            "ranges": [
                { "package": "zlib1g", "format": "deb", "op": "lt", "boundary": "1:1.3-1" }
            ]
        },
        {
            "id": "CVE-2024-2222",
            "severity": { "score": 7.5 },
            "ranges": [
                { "package": "libssl3", "format": "deb", "op": "between",
                  "boundary": "3.0.0-1", "upper": "3.0.11-1" }
            ]
        }
    ]
}"#;

/// Materialize the two-layer fixture: layer 0 installs the packages,
/// layer 1 upgrades libssl3 by overwriting the status file.
fn materialized_view() -> FsView {
    let extractor = InventoryExtractor::new();
    let filter = extractor.path_filter();

    let layer0 = gzip(&build_layer(&[
        ("etc/os-release", OS_RELEASE),
        ("var/lib/dpkg/status", LAYER0_STATUS),
    ]));
    let layer1 = gzip(&build_layer(&[("var/lib/dpkg/status", LAYER1_STATUS)]));

    let mut view = FsView::new();
    for (index, blob) in [layer0, layer1].iter().enumerate() {
        let reader = open_archive(&blob[..], LayerCompression::Gzip).unwrap();
        let delta = LayerDelta::from_tar(reader, &filter, &format!("sha256:layer{}", index));
        assert!(delta.warning.is_none());
        view.apply(delta, index);
    }
    view
}

#[test]
fn upgraded_package_escapes_advisory_range() {
    let view = materialized_view();
    let inventory = InventoryExtractor::new().extract(&view);

    assert_eq!(inventory.packages.len(), 2);
    let os_label = inventory.os_release.as_ref().unwrap().label();
    assert_eq!(os_label.as_deref(), Some("debian 12"));

    let dir = tempfile::tempdir().unwrap();
    write_signed_bundle(dir.path(), "debian-12.json", BUNDLE);
    let store =
        AdvisoryStore::load(dir.path(), &trust_anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();
    let index = store.snapshot();
    assert!(index.rejected_bundles.is_empty());

    let comparators = ComparatorRegistry::with_builtin();
    let mut findings = Vec::new();
    for package in &inventory.packages {
        let (f, w) = match_package(package, os_label.as_deref(), &index, &comparators);
        assert!(w.is_empty());
        findings.extend(f);
    }

    // zlib1g 1:1.2.13-1 < 1:1.3-1 matches; libssl3 was upgraded to the
    // range's exclusive upper boundary by layer 1, so it does not.
    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].advisory_id, "CVE-2024-1111");
    assert_eq!(findings[0].package.name, "zlib1g");
    assert_eq!(findings[0].package.format, PackageFormat::Deb);
}

#[test]
fn pre_upgrade_layer_alone_would_match_both() {
    // Sanity check of the fixture: without layer 1 the openssl range hits.
    let extractor = InventoryExtractor::new();
    let filter = extractor.path_filter();

    let layer0 = build_layer(&[
        ("etc/os-release", OS_RELEASE),
        ("var/lib/dpkg/status", LAYER0_STATUS),
    ]);
    let mut view = FsView::new();
    view.apply(
        LayerDelta::from_tar(&layer0[..], &filter, "sha256:layer0"),
        0,
    );

    let inventory = extractor.extract(&view);
    let os_label = inventory.os_release.as_ref().unwrap().label();

    let dir = tempfile::tempdir().unwrap();
    write_signed_bundle(dir.path(), "debian-12.json", BUNDLE);
    let store =
        AdvisoryStore::load(dir.path(), &trust_anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();
    let index = store.snapshot();
    let comparators = ComparatorRegistry::with_builtin();

    let mut ids: Vec<String> = Vec::new();
    for package in &inventory.packages {
        let (f, _) = match_package(package, os_label.as_deref(), &index, &comparators);
        ids.extend(f.into_iter().map(|f| f.advisory_id));
    }
    ids.sort();
    assert_eq!(ids, vec!["CVE-2024-1111", "CVE-2024-2222"]);
}

#[test]
fn whiteout_removes_database_from_inventory() {
    let extractor = InventoryExtractor::new();
    let filter = extractor.path_filter();

    let layer0 = build_layer(&[("var/lib/dpkg/status", LAYER0_STATUS)]);
    // Layer 1 deletes the dpkg directory outright.
    let layer1 = build_layer(&[("var/lib/.wh.dpkg", b"")]);

    let mut view = FsView::new();
    view.apply(LayerDelta::from_tar(&layer0[..], &filter, "sha256:l0"), 0);
    view.apply(LayerDelta::from_tar(&layer1[..], &filter, "sha256:l1"), 1);

    let inventory = extractor.extract(&view);
    assert!(inventory.packages.is_empty());
}

#[test]
fn rejected_bundle_produces_no_findings() {
    let view = materialized_view();
    let inventory = InventoryExtractor::new().extract(&view);
    let os_label = inventory.os_release.as_ref().unwrap().label();

    // Bundle is written unsigned: verification must exclude it entirely.
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("debian-12.json"), BUNDLE).unwrap();

    let store =
        AdvisoryStore::load(dir.path(), &trust_anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();
    let index = store.snapshot();
    assert_eq!(index.rejected_bundles, vec!["debian-12.json"]);

    let comparators = ComparatorRegistry::with_builtin();
    for package in &inventory.packages {
        let (findings, _) = match_package(package, os_label.as_deref(), &index, &comparators);
        assert!(
            findings.is_empty(),
            "no findings may come from a rejected bundle"
        );
    }
}

#[test]
fn matching_is_idempotent() {
    let view = materialized_view();
    let inventory = InventoryExtractor::new().extract(&view);
    let os_label = inventory.os_release.as_ref().unwrap().label();

    let dir = tempfile::tempdir().unwrap();
    write_signed_bundle(dir.path(), "debian-12.json", BUNDLE);
    let store =
        AdvisoryStore::load(dir.path(), &trust_anchor(), &ComparatorRegistry::with_builtin())
            .unwrap();
    let comparators = ComparatorRegistry::with_builtin();

    let run = || {
        let index = store.snapshot();
        let mut ids: Vec<String> = Vec::new();
        for package in &inventory.packages {
            let (f, _) = match_package(package, os_label.as_deref(), &index, &comparators);
            ids.extend(f.into_iter().map(|f| f.advisory_id));
        }
        ids.sort();
        ids
    };

    assert_eq!(run(), run());
}
