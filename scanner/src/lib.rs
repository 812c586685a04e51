//! Stratum Scanner — the image-to-findings pipeline.
//!
//! The pipeline streams image layers from a registry, reconstructs the
//! logical union-filesystem view of the package databases without a full
//! unpack, normalizes the installed inventory, matches it against signed
//! advisory bundles, and publishes findings on the result channel.
//!
//! Control flow:
//!
//! ```text
//! registry --> fsview --> inventory --> matcher <-- advisory (cached)
//!                                          |
//!                                       publish
//! ```

pub mod advisory;
pub mod fsview;
pub mod inventory;
pub mod matcher;
pub mod publish;
pub mod registry;
pub mod scan;

pub use registry::reference::ImageReference;
pub use scan::{ScanOutcome, Scanner};
