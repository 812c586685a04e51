//! Advisory store.
//!
//! Loads signed advisory bundles, verifies each bundle's signature against
//! the provisioned trust anchor before indexing any of its content, and
//! serves a package-name-indexed, range-ordered view to the matcher. The
//! built index is an immutable snapshot behind an atomic swap, so
//! concurrent matches never observe a half-built index.

pub mod bundle;
pub mod store;
pub mod verify;

pub use bundle::{AdvisoryBundle, BundleAdvisory, BundleRange};
pub use store::{AdvisoryIndex, AdvisoryStore, RangeEntry};
pub use verify::TrustAnchor;
