//! Scan orchestration.
//!
//! Drives one pipeline instance per scan request: manifest resolution,
//! concurrent layer fetch with strictly-ordered application, inventory
//! extraction, parallel matching, result assembly, publishing. Layer
//! downloads overlap up to the configured concurrency limit, but deltas
//! are folded into the filesystem view in manifest order — a finished
//! download waits buffered until its turn.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use stratum_core::config::{IntegrityPolicy, ScanConfig};
use stratum_core::error::{Result, ScanError, ScanWarning};
use stratum_core::report::{Finding, OsRelease, Package, ScanResult, ScanStatus};
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::advisory::{AdvisoryIndex, AdvisoryStore};
use crate::fsview::{open_archive, FsView, LayerDelta, PathFilter};
use crate::inventory::InventoryExtractor;
use crate::matcher::{match_package, ComparatorRegistry};
use crate::publish::{ResultPublisher, StatusMessage};
use crate::registry::client::LayerStream;
use crate::registry::manifest::LayerDescriptor;
use crate::registry::{DigestReader, ImageReference, RegistryClient};

/// A completed scan plus the outcome of publishing it.
///
/// Publishing failure never invalidates the result; it is surfaced here
/// as a separate condition.
pub struct ScanOutcome {
    pub result: ScanResult,
    pub publish_error: Option<ScanError>,
}

/// The scanner: one instance serves many scans concurrently.
pub struct Scanner {
    config: ScanConfig,
    store: Arc<AdvisoryStore>,
    extractor: InventoryExtractor,
    comparators: Arc<ComparatorRegistry>,
}

/// Result of fetching and walking one layer.
enum LayerFetch {
    Verified { delta: LayerDelta },
    IntegrityFailed { digest: String },
}

impl Scanner {
    pub fn new(config: ScanConfig, store: Arc<AdvisoryStore>) -> Self {
        Self {
            config,
            store,
            extractor: InventoryExtractor::new(),
            comparators: Arc::new(ComparatorRegistry::with_builtin()),
        }
    }

    /// Run one scan to completion.
    ///
    /// Fatal pipeline conditions (unresolvable reference, auth exhaustion,
    /// protocol errors, integrity failure under the `fail` policy) produce
    /// an `Ok` result with status `failed` — never a silently empty one.
    /// Only deadline expiry and cancellation return `Err`: those scans
    /// must publish nothing.
    pub async fn scan(&self, reference: &ImageReference) -> Result<ScanResult> {
        self.scan_cancellable(reference, &CancellationToken::new())
            .await
    }

    /// Run one scan under a cancellation token and the per-scan deadline.
    pub async fn scan_cancellable(
        &self,
        reference: &ImageReference,
        cancel: &CancellationToken,
    ) -> Result<ScanResult> {
        let work = tokio::time::timeout(self.config.scan_deadline(), self.run(reference));
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(reference = %reference, "Scan cancelled");
                Err(ScanError::Cancelled)
            }
            outcome = work => match outcome {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!(reference = %reference, "Scan deadline exceeded");
                    Err(ScanError::DeadlineExceeded)
                }
            },
        }
    }

    /// Scan and deliver the result on the message bus.
    pub async fn scan_and_publish(
        &self,
        reference: &ImageReference,
        publisher: &dyn ResultPublisher,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome> {
        let result = self.scan_cancellable(reference, cancel).await?;

        let publish_error = match publisher.publish(&result).await {
            Ok(()) => publisher
                .publish_status(&StatusMessage::from_result(&result))
                .await
                .err(),
            Err(e) => Some(e),
        };

        if let Some(ref e) = publish_error {
            tracing::warn!(scan_id = %result.scan_id, error = %e, "Result publishing failed");
        }

        Ok(ScanOutcome {
            result,
            publish_error,
        })
    }

    async fn run(&self, reference: &ImageReference) -> Result<ScanResult> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();

        tracing::info!(scan_id = %scan_id, reference = %reference, "Starting scan");

        let (status, manifest_digest, os_release, findings, warnings, failure_reason) =
            match self.pipeline(reference).await {
                Ok(outcome) => (
                    outcome.status,
                    outcome.manifest_digest,
                    outcome.os_release,
                    outcome.findings,
                    outcome.warnings,
                    None,
                ),
                Err(e) => {
                    tracing::warn!(scan_id = %scan_id, error = %e, "Scan failed");
                    (
                        ScanStatus::Failed,
                        None,
                        None,
                        Vec::new(),
                        Vec::new(),
                        Some(e.to_string()),
                    )
                }
            };

        tracing::info!(
            scan_id = %scan_id,
            status = ?status,
            findings = findings.len(),
            warnings = warnings.len(),
            "Scan finished"
        );

        Ok(ScanResult {
            scan_id,
            image: reference.to_string(),
            manifest_digest,
            os_release,
            status,
            findings,
            warnings,
            failure_reason,
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn pipeline(&self, reference: &ImageReference) -> Result<PipelineOutcome> {
        let auth = self.registry_auth();
        let client = RegistryClient::new(auth, &self.config.registry, self.config.platform.clone())?;

        let manifest = client.resolve_manifest(reference).await?;
        tracing::debug!(
            digest = %manifest.digest,
            layers = manifest.layers.len(),
            "Resolved manifest"
        );

        let filter = Arc::new(self.extractor.path_filter());
        let mut warnings: Vec<ScanWarning> = Vec::new();
        let mut view = FsView::new();
        let mut degraded = false;

        // Fetch concurrently; `buffered` yields results in manifest order,
        // so application is strictly ordered even when downloads finish
        // out of order.
        let mut deltas = futures::stream::iter(
            manifest
                .layers
                .iter()
                .cloned()
                .map(|layer| fetch_layer(&client, reference, layer, filter.clone())),
        )
        .buffered(self.config.layer_concurrency);

        let mut layer_index = 0usize;
        while let Some(fetch) = deltas.next().await {
            match fetch? {
                LayerFetch::Verified { delta } => {
                    if let Some(warning) = &delta.warning {
                        warnings.push(warning.clone());
                    }
                    view.apply(delta, layer_index);
                }
                LayerFetch::IntegrityFailed { digest } => match self.config.integrity_policy {
                    IntegrityPolicy::Fail => {
                        return Err(ScanError::Integrity {
                            expected: digest.clone(),
                            computed: "stream digest mismatch".to_string(),
                        });
                    }
                    IntegrityPolicy::Partial => {
                        tracing::warn!(digest = %digest, "Excluding layer after integrity failure");
                        warnings.push(ScanWarning::LayerExcluded {
                            layer_digest: digest,
                        });
                        degraded = true;
                    }
                },
            }
            layer_index += 1;
        }
        drop(deltas);

        let inventory = self.extractor.extract(&view);
        warnings.extend(inventory.warnings);
        tracing::info!(
            packages = inventory.packages.len(),
            visible_paths = view.len(),
            "Extracted inventory"
        );

        let index = self.store.snapshot();
        for bundle in &index.rejected_bundles {
            warnings.push(ScanWarning::BundleRejected {
                bundle: bundle.clone(),
            });
        }

        let os_label = inventory.os_release.as_ref().and_then(OsRelease::label);
        let (findings, match_warnings) = self
            .match_all(inventory.packages, os_label, index)
            .await?;
        warnings.extend(match_warnings);

        Ok(PipelineOutcome {
            status: if degraded {
                ScanStatus::Partial
            } else {
                ScanStatus::Complete
            },
            manifest_digest: Some(manifest.digest),
            os_release: inventory.os_release,
            findings,
            warnings: dedup_warnings(warnings),
        })
    }

    /// Match all packages on a bounded pool of blocking workers.
    ///
    /// Matching is independent per package; chunk order keeps the output
    /// deterministic.
    async fn match_all(
        &self,
        packages: Vec<Package>,
        os_label: Option<String>,
        index: Arc<AdvisoryIndex>,
    ) -> Result<(Vec<Finding>, Vec<ScanWarning>)> {
        if packages.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let workers = self
            .config
            .match_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            })
            .max(1);
        let chunk_size = packages.len().div_ceil(workers);

        let mut handles = Vec::new();
        for chunk in packages.chunks(chunk_size) {
            let chunk = chunk.to_vec();
            let index = index.clone();
            let comparators = self.comparators.clone();
            let os_label = os_label.clone();

            handles.push(tokio::task::spawn_blocking(move || {
                let mut findings = Vec::new();
                let mut warnings = Vec::new();
                for package in &chunk {
                    let (f, w) = match_package(package, os_label.as_deref(), &index, &comparators);
                    findings.extend(f);
                    warnings.extend(w);
                }
                (findings, warnings)
            }));
        }

        let mut findings = Vec::new();
        let mut warnings = Vec::new();
        for handle in handles {
            let (f, w) = handle
                .await
                .map_err(|e| ScanError::Protocol(format!("match worker failed: {}", e)))?;
            findings.extend(f);
            warnings.extend(w);
        }
        Ok((findings, warnings))
    }

    fn registry_auth(&self) -> crate::registry::auth::RegistryAuth {
        use crate::registry::auth::RegistryAuth;
        match (
            &self.config.registry.username,
            &self.config.registry.password,
        ) {
            (Some(user), Some(pass)) => RegistryAuth::basic(user.clone(), pass.clone()),
            _ => RegistryAuth::from_env(),
        }
    }
}

struct PipelineOutcome {
    status: ScanStatus,
    manifest_digest: Option<String>,
    os_release: Option<OsRelease>,
    findings: Vec<Finding>,
    warnings: Vec<ScanWarning>,
}

/// Fetch one layer and walk it into a delta off the async threads.
///
/// The blob bytes are hashed as they stream through the decompressor; the
/// digest check is terminal, and a mismatch discards the whole delta.
async fn fetch_layer(
    client: &RegistryClient,
    reference: &ImageReference,
    layer: LayerDescriptor,
    filter: Arc<PathFilter>,
) -> Result<LayerFetch> {
    let compression = layer.compression()?;
    let LayerStream { reader, digest } = client
        .open_layer(&reference.registry, &reference.repository, &layer)
        .await?;

    let declared = layer.digest.clone();
    tokio::task::spawn_blocking(move || -> Result<LayerFetch> {
        let bridge = SyncIoBridge::new(reader);
        let mut verifying = DigestReader::new(bridge, digest);

        let delta = {
            let archive = open_archive(&mut verifying, compression)?;
            LayerDelta::from_tar(archive, filter.as_ref(), &declared)
        };

        match verifying.verify() {
            Ok(()) => Ok(LayerFetch::Verified { delta }),
            Err(ScanError::Integrity { .. }) => {
                Ok(LayerFetch::IntegrityFailed { digest: declared })
            }
            Err(e) => Err(e),
        }
    })
    .await
    .map_err(|e| ScanError::Protocol(format!("layer worker failed: {}", e)))?
}

fn dedup_warnings(warnings: Vec<ScanWarning>) -> Vec<ScanWarning> {
    let mut seen: Vec<ScanWarning> = Vec::new();
    for warning in warnings {
        if !seen.contains(&warning) {
            seen.push(warning);
        }
    }
    seen
}
