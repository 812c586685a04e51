//! Configuration file loading.

use std::path::Path;

use anyhow::Context;
use stratum_core::config::ScanConfig;

/// Load the scan configuration from a YAML file, or defaults when no file
/// is given.
pub fn load(path: Option<&Path>) -> anyhow::Result<ScanConfig> {
    let config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => ScanConfig::default(),
    };

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config.layer_concurrency, 4);
    }

    #[test]
    fn test_load_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stratum.yaml");
        std::fs::write(
            &path,
            r#"
platform:
  os: linux
  architecture: arm64
layer_concurrency: 8
scan_deadline_secs: 120
integrity_policy: fail
advisory:
  bundle_dir: /tmp/advisories
  trust_anchor: /tmp/anchor.pub
broker:
  host: broker.local
  port: 1883
  client_id: stratum.ci
  max_retries: 5
  retry:
    max_attempts: 3
    base_delay_ms: 100
    max_delay_ms: 1000
registry:
  request_timeout_secs: 30
  retry:
    max_attempts: 2
    base_delay_ms: 50
    max_delay_ms: 500
"#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.platform.architecture, "arm64");
        assert_eq!(config.layer_concurrency, 8);
        assert_eq!(config.broker.host, "broker.local");
    }

    #[test]
    fn test_load_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(&path, "layer_concurrency: 0\n").unwrap();
        // Partial YAML misses required sections; either parse or
        // validation must reject it.
        assert!(load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load(Some(Path::new("/nonexistent/stratum.yaml"))).is_err());
    }
}
