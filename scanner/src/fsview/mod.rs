//! Layer materializer.
//!
//! Computes the logical file set visible after applying an image's layers
//! in manifest order, without extracting anything to disk. Each layer's
//! archive is walked exactly once into a [`LayerDelta`]; the deltas are
//! folded into an [`FsView`] path-state table applying union-filesystem
//! whiteout and opaque-directory semantics.
//!
//! Only a caller-supplied allow-list of paths is materialized with full
//! content; every other file body is skipped while its path metadata is
//! still tracked so deletions resolve correctly.

mod delta;
mod view;

pub use delta::{open_archive, DeltaAdd, EntryKind, LayerDelta, PathFilter};
pub use view::{CapturedFile, FsView, PathState};
