//! Path-state table fold.
//!
//! [`FsView`] accumulates the materialized view across layers: a flat map
//! of path → (kind, owning layer) plus the captured bytes of allow-listed
//! paths. Applying a layer is a pure fold — deletions from the layer's
//! whiteout/opaque markers are applied to the accumulated state first,
//! then the layer's own adds.

use std::collections::BTreeMap;

use super::delta::{EntryKind, LayerDelta};

/// State of one visible path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathState {
    /// Index of the layer that last wrote this path
    pub layer: usize,
    pub kind: EntryKind,
}

/// Final content of an allow-listed path.
#[derive(Debug, Clone)]
pub struct CapturedFile {
    /// Index of the layer the content came from
    pub layer: usize,
    pub content: Vec<u8>,
}

/// The materialized union view accumulated so far.
#[derive(Debug, Default)]
pub struct FsView {
    states: BTreeMap<String, PathState>,
    captured: BTreeMap<String, CapturedFile>,
}

impl FsView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one layer's delta. Layers must be applied in manifest order.
    pub fn apply(&mut self, delta: LayerDelta, layer: usize) {
        // Deletions affect prior layers only.
        for dir in &delta.opaques {
            self.remove_children(dir);
        }
        for path in &delta.whiteouts {
            self.remove_path_and_children(path);
        }

        for add in delta.adds {
            // A non-directory replacing a directory hides its subtree.
            if add.kind != EntryKind::Directory {
                if let Some(prior) = self.states.get(&add.path) {
                    if prior.kind == EntryKind::Directory {
                        self.remove_children(&add.path);
                    }
                }
            }

            self.states.insert(
                add.path.clone(),
                PathState {
                    layer,
                    kind: add.kind,
                },
            );

            match add.content {
                Some(content) => {
                    self.captured
                        .insert(add.path, CapturedFile { layer, content });
                }
                None => {
                    // Overwritten without capture (e.g. replaced by a
                    // symlink): stale bytes must not survive.
                    self.captured.remove(&add.path);
                }
            }
        }
    }

    /// Whether a path is visible at the top of the applied stack.
    pub fn contains(&self, path: &str) -> bool {
        self.states.contains_key(path)
    }

    pub fn state(&self, path: &str) -> Option<&PathState> {
        self.states.get(path)
    }

    /// Captured content of an allow-listed path, when still visible.
    pub fn captured(&self, path: &str) -> Option<&CapturedFile> {
        self.captured.get(path)
    }

    /// All captured paths with their final content, in path order.
    pub fn captured_files(&self) -> impl Iterator<Item = (&str, &CapturedFile)> {
        self.captured.iter().map(|(path, file)| (path.as_str(), file))
    }

    /// Number of visible paths.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove a path and everything under it.
    fn remove_path_and_children(&mut self, path: &str) {
        self.states.remove(path);
        self.captured.remove(path);
        self.remove_children(path);
    }

    /// Remove everything strictly under a directory, keeping the directory.
    fn remove_children(&mut self, dir: &str) {
        let prefix = format!("{}/", dir);
        let doomed: Vec<String> = self
            .states
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            self.states.remove(&path);
            self.captured.remove(&path);
        }
    }
}
