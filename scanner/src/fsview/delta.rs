//! Single-pass layer archive walk.
//!
//! A [`LayerDelta`] is everything one layer contributes to the union view:
//! adds (with content captured only for allow-listed paths), whiteouts, and
//! opaque-directory markers. Whiteout entries use the `.wh.` basename
//! convention; `.wh..wh..opq` marks its directory as opaque.

use std::collections::HashSet;
use std::io::Read;

use flate2::read::GzDecoder;
use stratum_core::error::ScanWarning;

use crate::registry::manifest::LayerCompression;

/// Allow-list of paths whose content the materializer must capture.
///
/// Exact paths cover fixed database locations; subtrees cover
/// directory-of-manifests layouts whose file names are not known upfront.
#[derive(Debug, Clone, Default)]
pub struct PathFilter {
    exact: HashSet<String>,
    subtrees: Vec<String>,
}

impl PathFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an exact path of interest.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.exact.insert(path.into());
        self
    }

    /// Add a directory whose direct and nested files are all of interest.
    pub fn with_subtree(mut self, dir: impl Into<String>) -> Self {
        let mut dir = dir.into();
        if !dir.ends_with('/') {
            dir.push('/');
        }
        self.subtrees.push(dir);
        self
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact.contains(path) || self.subtrees.iter().any(|dir| path.starts_with(dir.as_str()))
    }
}

/// Whiteout basename prefix.
const WHITEOUT_PREFIX: &str = ".wh.";
/// Opaque-directory marker basename.
const OPAQUE_MARKER: &str = ".wh..wh..opq";

/// File kind tracked in the path-state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
}

/// One path added or overwritten by a layer.
#[derive(Debug, Clone)]
pub struct DeltaAdd {
    pub path: String,
    pub kind: EntryKind,
    /// Captured bytes, present only for allow-listed regular files
    pub content: Option<Vec<u8>>,
}

/// Everything one layer contributes to the union view.
#[derive(Debug, Default)]
pub struct LayerDelta {
    pub adds: Vec<DeltaAdd>,
    /// Paths whose subtree the layer deletes
    pub whiteouts: Vec<String>,
    /// Directories whose prior contents the layer deletes
    pub opaques: Vec<String>,
    /// Set when a corrupt entry ended the walk early; the delta holds the
    /// entries read up to the last good one
    pub warning: Option<ScanWarning>,
}

impl LayerDelta {
    /// Walk a tar stream once, collecting the layer's delta.
    ///
    /// `wanted` is the allow-list of paths whose content must be captured;
    /// all other file bodies are skipped. A corrupt entry does not fail the
    /// walk — it truncates it and records a warning.
    pub fn from_tar<R: Read>(reader: R, wanted: &PathFilter, layer_digest: &str) -> Self {
        let mut delta = LayerDelta::default();
        let mut archive = tar::Archive::new(reader);

        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(e) => {
                delta.warning = Some(ScanWarning::CorruptLayerEntry {
                    layer_digest: layer_digest.to_string(),
                    detail: format!("unreadable archive: {}", e),
                });
                return delta;
            }
        };

        for entry in entries {
            let mut entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    delta.warning = Some(ScanWarning::CorruptLayerEntry {
                        layer_digest: layer_digest.to_string(),
                        detail: e.to_string(),
                    });
                    break;
                }
            };

            let raw_path = match entry.path() {
                Ok(path) => path.to_string_lossy().into_owned(),
                Err(e) => {
                    delta.warning = Some(ScanWarning::CorruptLayerEntry {
                        layer_digest: layer_digest.to_string(),
                        detail: format!("bad entry path: {}", e),
                    });
                    break;
                }
            };
            let Some(path) = normalize_path(&raw_path) else {
                continue;
            };

            let (dir, base) = split_basename(&path);
            if base == OPAQUE_MARKER {
                delta.opaques.push(dir.to_string());
                continue;
            }
            if let Some(target) = base.strip_prefix(WHITEOUT_PREFIX) {
                let whited = if dir.is_empty() {
                    target.to_string()
                } else {
                    format!("{}/{}", dir, target)
                };
                delta.whiteouts.push(whited);
                continue;
            }

            let kind = match entry.header().entry_type() {
                tar::EntryType::Directory => EntryKind::Directory,
                tar::EntryType::Symlink | tar::EntryType::Link => EntryKind::Symlink,
                tar::EntryType::Regular | tar::EntryType::GNUSparse => EntryKind::Regular,
                // Device nodes, fifos etc. never carry package databases;
                // their paths still participate in deletion tracking.
                _ => EntryKind::Regular,
            };

            let content = if kind == EntryKind::Regular && wanted.matches(&path) {
                let mut bytes = Vec::with_capacity(entry.size() as usize);
                match entry.read_to_end(&mut bytes) {
                    Ok(_) => Some(bytes),
                    Err(e) => {
                        delta.warning = Some(ScanWarning::CorruptLayerEntry {
                            layer_digest: layer_digest.to_string(),
                            detail: format!("failed to read {}: {}", path, e),
                        });
                        break;
                    }
                }
            } else {
                // Body skipped; the archive reader seeks past it.
                None
            };

            delta.adds.push(DeltaAdd {
                path,
                kind,
                content,
            });
        }

        delta
    }
}

/// Wrap the raw blob reader with the decompressor its media type names.
pub fn open_archive<'a, R: Read + 'a>(
    reader: R,
    compression: LayerCompression,
) -> std::io::Result<Box<dyn Read + 'a>> {
    match compression {
        LayerCompression::None => Ok(Box::new(reader)),
        LayerCompression::Gzip => Ok(Box::new(GzDecoder::new(reader))),
        LayerCompression::Zstd => Ok(Box::new(zstd::Decoder::new(reader)?)),
    }
}

/// Normalize an archive path: strip `./` and leading/trailing slashes.
/// Returns `None` for the archive root itself.
fn normalize_path(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim_start_matches("./")
        .trim_start_matches('/')
        .trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn split_basename(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    }
}
