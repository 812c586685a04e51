//! Registry client — speaks the image-distribution HTTP protocol.
//!
//! Resolves an [`ImageReference`] to a [`Manifest`] (following
//! manifest-list indirection for the configured platform) and streams
//! digest-verified layer blobs on demand.

pub mod auth;
pub mod client;
pub mod digest;
pub mod manifest;
pub mod reference;

pub use client::{LayerStream, RegistryClient};
pub use digest::{Digest, DigestReader};
pub use manifest::{LayerCompression, LayerDescriptor, Manifest};
pub use reference::ImageReference;
