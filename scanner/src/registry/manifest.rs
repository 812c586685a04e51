//! Manifest and image-index documents.
//!
//! Serde models for the two manifest families served by registries (OCI
//! and Docker v2), plus the resolved [`Manifest`] handed to the rest of
//! the pipeline. Layer ordering in a resolved manifest is bottom-to-top
//! and is never reordered.

use serde::{Deserialize, Serialize};
use stratum_core::error::{Result, ScanError};

// Manifest media types, both families.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";

/// Accept header offered on manifest requests.
pub fn manifest_accept_header() -> String {
    [OCI_MANIFEST, OCI_INDEX, DOCKER_MANIFEST, DOCKER_MANIFEST_LIST].join(", ")
}

/// How a layer blob is compressed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    None,
    Gzip,
    Zstd,
}

/// A content descriptor as it appears in manifests and indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub media_type: String,
    pub digest: String,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
}

/// Platform selector on an index entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

/// An image index / manifest list document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageIndex {
    pub schema_version: u32,
    pub manifests: Vec<Descriptor>,
}

impl ImageIndex {
    /// Select the manifest entry for the given platform.
    pub fn select(&self, os: &str, architecture: &str) -> Option<&Descriptor> {
        self.manifests.iter().find(|entry| {
            entry
                .platform
                .as_ref()
                .is_some_and(|p| p.os == os && p.architecture == architecture)
        })
    }
}

/// A single-architecture image manifest document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

/// One layer of a resolved manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Declared digest (`algorithm:hex`), verified while streaming
    pub digest: String,
    /// Compressed size in bytes
    pub size: u64,
    pub media_type: String,
}

impl LayerDescriptor {
    /// Compression named by the layer media type.
    pub fn compression(&self) -> Result<LayerCompression> {
        match self.media_type.as_str() {
            "application/vnd.oci.image.layer.v1.tar" => Ok(LayerCompression::None),
            "application/vnd.oci.image.layer.v1.tar+gzip"
            | "application/vnd.docker.image.rootfs.diff.tar.gzip"
            | "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip" => {
                Ok(LayerCompression::Gzip)
            }
            "application/vnd.oci.image.layer.v1.tar+zstd" => Ok(LayerCompression::Zstd),
            other => Err(ScanError::Protocol(format!(
                "unsupported layer media type '{}'",
                other
            ))),
        }
    }
}

/// A resolved manifest: the scan target after reference resolution.
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Digest of the manifest document itself
    pub digest: String,
    /// Digest of the image config blob
    pub config_digest: String,
    /// Layers, bottom-to-top
    pub layers: Vec<LayerDescriptor>,
}

impl Manifest {
    pub fn from_document(digest: String, document: ImageManifest) -> Self {
        let layers = document
            .layers
            .into_iter()
            .map(|d| LayerDescriptor {
                digest: d.digest,
                size: d.size,
                media_type: d.media_type,
            })
            .collect();
        Self {
            digest,
            config_digest: document.config.digest,
            layers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_fixture() -> ImageIndex {
        serde_json::from_str(
            r#"{
                "schemaVersion": 2,
                "manifests": [
                    {
                        "mediaType": "application/vnd.oci.image.manifest.v1+json",
                        "digest": "sha256:aaa",
                        "size": 100,
                        "platform": { "os": "linux", "architecture": "amd64" }
                    },
                    {
                        "mediaType": "application/vnd.oci.image.manifest.v1+json",
                        "digest": "sha256:bbb",
                        "size": 100,
                        "platform": { "os": "linux", "architecture": "arm64", "variant": "v8" }
                    }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_index_selects_matching_platform() {
        let index = index_fixture();
        let entry = index.select("linux", "arm64").unwrap();
        assert_eq!(entry.digest, "sha256:bbb");
    }

    #[test]
    fn test_index_select_misses_absent_platform() {
        let index = index_fixture();
        assert!(index.select("linux", "s390x").is_none());
        assert!(index.select("windows", "amd64").is_none());
    }

    #[test]
    fn test_manifest_document_parse() {
        let document: ImageManifest = serde_json::from_str(
            r#"{
                "schemaVersion": 2,
                "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
                "config": {
                    "mediaType": "application/vnd.docker.container.image.v1+json",
                    "digest": "sha256:cfg",
                    "size": 10
                },
                "layers": [
                    {
                        "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                        "digest": "sha256:l0",
                        "size": 5
                    },
                    {
                        "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                        "digest": "sha256:l1",
                        "size": 6
                    }
                ]
            }"#,
        )
        .unwrap();

        let manifest = Manifest::from_document("sha256:m".to_string(), document);
        assert_eq!(manifest.config_digest, "sha256:cfg");
        assert_eq!(manifest.layers.len(), 2);
        // Order preserved bottom-to-top
        assert_eq!(manifest.layers[0].digest, "sha256:l0");
        assert_eq!(manifest.layers[1].digest, "sha256:l1");
    }

    #[test]
    fn test_layer_compression_mapping() {
        let layer = |media_type: &str| LayerDescriptor {
            digest: "sha256:x".to_string(),
            size: 0,
            media_type: media_type.to_string(),
        };

        assert_eq!(
            layer("application/vnd.oci.image.layer.v1.tar").compression().unwrap(),
            LayerCompression::None
        );
        assert_eq!(
            layer("application/vnd.oci.image.layer.v1.tar+gzip").compression().unwrap(),
            LayerCompression::Gzip
        );
        assert_eq!(
            layer("application/vnd.docker.image.rootfs.diff.tar.gzip").compression().unwrap(),
            LayerCompression::Gzip
        );
        assert_eq!(
            layer("application/vnd.oci.image.layer.v1.tar+zstd").compression().unwrap(),
            LayerCompression::Zstd
        );
        assert!(layer("application/octet-stream").compression().is_err());
    }

    #[test]
    fn test_accept_header_lists_both_families() {
        let accept = manifest_accept_header();
        assert!(accept.contains(OCI_MANIFEST));
        assert!(accept.contains(OCI_INDEX));
        assert!(accept.contains(DOCKER_MANIFEST));
        assert!(accept.contains(DOCKER_MANIFEST_LIST));
    }
}
