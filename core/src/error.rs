use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stratum error types
#[derive(Error, Debug)]
pub enum ScanError {
    /// Image reference does not resolve to a manifest
    #[error("Not found: {reference}")]
    NotFound { reference: String },

    /// Credential exchange with the registry failed after retry
    #[error("Authentication required: {registry} - {message}")]
    AuthRequired { registry: String, message: String },

    /// Malformed registry response or manifest
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Container registry transport error
    #[error("Registry error: {registry} - {message}")]
    Registry { registry: String, message: String },

    /// A blob's computed digest does not match its declared digest
    #[error("Integrity error: expected {expected}, computed {computed}")]
    Integrity { expected: String, computed: String },

    /// Advisory bundle signature did not verify against the trust anchor
    #[error("Signature verification failed for bundle '{bundle}': {message}")]
    SignatureVerification { bundle: String, message: String },

    /// Result delivery to the message bus failed after bounded retries
    #[error("Publish failed after {attempts} attempts: {message}")]
    PublishFailed { attempts: u32, message: String },

    /// The per-scan deadline elapsed
    #[error("Scan deadline exceeded")]
    DeadlineExceeded,

    /// The scan was cancelled at a suspension point
    #[error("Scan cancelled")]
    Cancelled,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for ScanError {
    fn from(err: serde_json::Error) -> Self {
        ScanError::Serialization(err.to_string())
    }
}

/// Result type alias for Stratum operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Non-fatal conditions accumulated on a scan result.
///
/// Warnings never abort a scan; they record degraded coverage so the
/// downstream consumer can judge how complete the inventory was.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanWarning {
    /// A corrupt archive entry ended the walk of one layer early
    CorruptLayerEntry { layer_digest: String, detail: String },

    /// A recognized package database could not be parsed
    UnparsablePackageDb { path: String, detail: String },

    /// A package's format has no registered version comparator
    UnsupportedFormat { package: String, format: String },

    /// A layer failed its integrity check and was excluded from the view
    LayerExcluded { layer_digest: String },

    /// An advisory bundle was rejected and its coverage is missing
    BundleRejected { bundle: String },
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CorruptLayerEntry {
                layer_digest,
                detail,
            } => write!(f, "corrupt entry in layer {}: {}", layer_digest, detail),
            Self::UnparsablePackageDb { path, detail } => {
                write!(f, "unparsable package database {}: {}", path, detail)
            }
            Self::UnsupportedFormat { package, format } => {
                write!(f, "no comparator for format '{}' (package {})", format, package)
            }
            Self::LayerExcluded { layer_digest } => {
                write!(f, "layer {} excluded after integrity failure", layer_digest)
            }
            Self::BundleRejected { bundle } => {
                write!(f, "advisory bundle '{}' rejected, coverage reduced", bundle)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let error = ScanError::NotFound {
            reference: "ghcr.io/acme/app:1.0".to_string(),
        };
        assert_eq!(error.to_string(), "Not found: ghcr.io/acme/app:1.0");
    }

    #[test]
    fn test_auth_required_display() {
        let error = ScanError::AuthRequired {
            registry: "ghcr.io".to_string(),
            message: "token exchange rejected".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Authentication required: ghcr.io - token exchange rejected"
        );
    }

    #[test]
    fn test_integrity_display() {
        let error = ScanError::Integrity {
            expected: "sha256:aaa".to_string(),
            computed: "sha256:bbb".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Integrity error: expected sha256:aaa, computed sha256:bbb"
        );
    }

    #[test]
    fn test_publish_failed_display() {
        let error = ScanError::PublishFailed {
            attempts: 3,
            message: "broker unreachable".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Publish failed after 3 attempts: broker unreachable"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let scan_error: ScanError = io_error.into();
        assert!(matches!(scan_error, ScanError::Io(_)));
        assert!(scan_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let result: std::result::Result<serde_json::Value, _> =
            serde_json::from_str("{ invalid json }");
        let scan_error: ScanError = result.unwrap_err().into();
        assert!(matches!(scan_error, ScanError::Serialization(_)));
    }

    #[test]
    fn test_warning_roundtrip() {
        let warning = ScanWarning::UnparsablePackageDb {
            path: "var/lib/dpkg/status".to_string(),
            detail: "truncated stanza".to_string(),
        };
        let json = serde_json::to_string(&warning).unwrap();
        let back: ScanWarning = serde_json::from_str(&json).unwrap();
        assert_eq!(warning, back);
    }

    #[test]
    fn test_warning_display() {
        let warning = ScanWarning::LayerExcluded {
            layer_digest: "sha256:abc".to_string(),
        };
        assert_eq!(
            warning.to_string(),
            "layer sha256:abc excluded after integrity failure"
        );
    }
}
