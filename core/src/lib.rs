//! Stratum Core - Foundational Types and Abstractions
//!
//! This module provides the shared types, error taxonomy, and configuration
//! used across the Stratum scanner ecosystem.

pub mod config;
pub mod error;
pub mod report;

// Re-export commonly used types
pub use config::{IntegrityPolicy, RetryConfig, ScanConfig};
pub use error::{Result, ScanError, ScanWarning};
pub use report::{Finding, Package, PackageFormat, ScanResult, ScanStatus, Severity};

/// Stratum version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
