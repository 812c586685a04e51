use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, ScanError};

/// Scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Target platform used to resolve multi-arch manifest indexes
    pub platform: PlatformConfig,

    /// Registry transport settings
    pub registry: RegistryConfig,

    /// Maximum number of layers fetched concurrently per scan
    pub layer_concurrency: usize,

    /// Worker count for package matching (defaults to available cores)
    pub match_workers: Option<usize>,

    /// Overall per-scan deadline in seconds
    pub scan_deadline_secs: u64,

    /// What to do when a layer fails its integrity check
    pub integrity_policy: IntegrityPolicy,

    /// Advisory bundle locations and trust anchor
    pub advisory: AdvisoryConfig,

    /// Message bus settings for result publishing
    pub broker: BrokerConfig,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            platform: PlatformConfig::default(),
            registry: RegistryConfig::default(),
            layer_concurrency: 4,
            match_workers: None,
            scan_deadline_secs: 600,
            integrity_policy: IntegrityPolicy::Partial,
            advisory: AdvisoryConfig::default(),
            broker: BrokerConfig::default(),
        }
    }
}

impl ScanConfig {
    /// Validate option ranges. Called once at load time.
    pub fn validate(&self) -> Result<()> {
        if self.layer_concurrency == 0 {
            return Err(ScanError::Config(
                "layer_concurrency must be at least 1".to_string(),
            ));
        }
        if self.scan_deadline_secs == 0 {
            return Err(ScanError::Config(
                "scan_deadline_secs must be at least 1".to_string(),
            ));
        }
        if let Some(workers) = self.match_workers {
            if workers == 0 {
                return Err(ScanError::Config(
                    "match_workers must be at least 1 when set".to_string(),
                ));
            }
        }
        self.registry.retry.validate()?;
        Ok(())
    }

    /// Overall per-scan deadline.
    pub fn scan_deadline(&self) -> Duration {
        Duration::from_secs(self.scan_deadline_secs)
    }
}

/// Target platform for manifest-index resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Operating system (e.g., "linux")
    pub os: String,

    /// CPU architecture (e.g., "amd64", "arm64")
    pub architecture: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        let arch = match std::env::consts::ARCH {
            "x86_64" => "amd64",
            "aarch64" => "arm64",
            other => other,
        };
        Self {
            os: "linux".to_string(),
            architecture: arch.to_string(),
        }
    }
}

/// Registry transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Optional basic credentials for the token exchange
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Per-request timeout in seconds (manifest fetch, blob read)
    pub request_timeout_secs: u64,

    /// Retry/backoff parameters for transient failures
    pub retry: RetryConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            username: None,
            password: None,
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Bounded exponential backoff parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts including the first (1 = no retry)
    pub max_attempts: u32,

    /// Base delay before the first retry, in milliseconds
    pub base_delay_ms: u64,

    /// Upper bound on a single backoff delay, in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ScanError::Config(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(ScanError::Config(
                "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Backoff delay before attempt `n` (1-based; attempt 1 has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exp = attempt.saturating_sub(2).min(16);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exp);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Policy for scans where some layers failed integrity checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrityPolicy {
    /// Exclude the failed layer and continue; result is marked partial
    Partial,
    /// Fail the whole scan on the first integrity failure
    Fail,
}

impl std::str::FromStr for IntegrityPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "partial" => Ok(Self::Partial),
            "fail" => Ok(Self::Fail),
            _ => Err(format!(
                "unknown integrity policy: '{}' (supported: partial, fail)",
                s
            )),
        }
    }
}

/// Advisory bundle locations and trust anchor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    /// Directory containing advisory bundle files (`*.json` + `*.json.sig`)
    pub bundle_dir: PathBuf,

    /// Path to the trust-anchor public key (hex-encoded SEC1 point)
    pub trust_anchor: PathBuf,
}

impl Default for AdvisoryConfig {
    fn default() -> Self {
        Self {
            bundle_dir: PathBuf::from("/var/lib/stratum/advisories"),
            trust_anchor: PathBuf::from("/var/lib/stratum/trust-anchor.pub"),
        }
    }
}

/// Message bus settings for result publishing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker hostname
    pub host: String,

    /// Broker port
    pub port: u16,

    /// MQTT client identifier
    pub client_id: String,

    /// Maximum delivery attempts before PublishFailed
    pub max_retries: u32,

    /// Retry/backoff parameters for reconnect attempts
    pub retry: RetryConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "stratum.scanner".to_string(),
            max_retries: 3,
            retry: RetryConfig::default(),
        }
    }
}
