//! Result publishing.
//!
//! Serializes scan results onto the message bus for the downstream
//! detection engine. Delivery is at-least-once: consumers are expected to
//! be idempotent on (image identity, finding identity) pairs. Publishing
//! is decoupled from matching — a delivery failure never invalidates the
//! already-computed findings.

mod mqtt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stratum_core::error::Result;
use stratum_core::report::{ScanResult, ScanStatus};
use uuid::Uuid;

pub use mqtt::MqttPublisher;

/// Topic carrying serialized [`ScanResult`] payloads.
pub const RESULT_TOPIC: &str = "scanner/scan/result";
/// Topic carrying scan lifecycle notifications.
pub const STATUS_TOPIC: &str = "scanner/scan/status";

/// A scan lifecycle notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub scan_id: Uuid,
    /// Image identity, carried on every message for correlation
    pub image: String,
    pub status: ScanStatus,
}

impl StatusMessage {
    pub fn from_result(result: &ScanResult) -> Self {
        Self {
            scan_id: result.scan_id,
            image: result.image.clone(),
            status: result.status,
        }
    }
}

/// Sink for completed scan results.
#[async_trait]
pub trait ResultPublisher: Send + Sync {
    /// Deliver a full scan result on the result topic.
    async fn publish(&self, result: &ScanResult) -> Result<()>;

    /// Deliver a lifecycle notification on the status topic.
    async fn publish_status(&self, status: &StatusMessage) -> Result<()>;
}
