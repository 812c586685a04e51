//! MQTT publisher.
//!
//! Publishes at QoS 1 and drives the client event loop until the broker
//! acknowledges the message. Transient broker failures are retried with
//! bounded backoff; exhaustion surfaces `PublishFailed` to the caller.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use stratum_core::config::BrokerConfig;
use stratum_core::error::{Result, ScanError};
use stratum_core::report::ScanResult;

use super::{ResultPublisher, StatusMessage, RESULT_TOPIC, STATUS_TOPIC};

/// Publisher over an MQTT broker.
pub struct MqttPublisher {
    config: BrokerConfig,
}

impl MqttPublisher {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    /// Publish one payload with bounded retries.
    async fn publish_with_retry(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        let attempts = self.config.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let delay = self.config.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.publish_once(topic, &payload).await {
                Ok(()) => {
                    tracing::debug!(topic, attempt, bytes = payload.len(), "Published message");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(topic, attempt, error = %e, "Publish attempt failed");
                    last_error = e;
                }
            }
        }

        Err(ScanError::PublishFailed {
            attempts,
            message: last_error,
        })
    }

    /// One connect-publish-ack round.
    async fn publish_once(&self, topic: &str, payload: &[u8]) -> std::result::Result<(), String> {
        let mut options = MqttOptions::new(
            &self.config.client_id,
            &self.config.host,
            self.config.port,
        );
        options.set_keep_alive(Duration::from_secs(30));

        let (client, mut event_loop) = AsyncClient::new(options, 16);
        client
            .publish(topic, QoS::AtLeastOnce, false, payload.to_vec())
            .await
            .map_err(|e| format!("failed to queue publish: {}", e))?;

        // Drive the event loop until the broker acks the message.
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::PubAck(_))) => {
                    let _ = client.disconnect().await;
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => return Err(format!("broker connection failed: {}", e)),
            }
        }
    }
}

#[async_trait]
impl ResultPublisher for MqttPublisher {
    async fn publish(&self, result: &ScanResult) -> Result<()> {
        let payload = serde_json::to_vec(result)?;
        tracing::info!(
            scan_id = %result.scan_id,
            image = %result.image,
            findings = result.findings.len(),
            "Publishing scan result"
        );
        self.publish_with_retry(RESULT_TOPIC, payload).await
    }

    async fn publish_status(&self, status: &StatusMessage) -> Result<()> {
        let payload = serde_json::to_vec(status)?;
        self.publish_with_retry(STATUS_TOPIC, payload).await
    }
}
