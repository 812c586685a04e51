//! Distribution protocol client.
//!
//! Talks to the registry HTTP API directly: manifest GET with content-type
//! negotiation (following index indirection for the configured platform),
//! digest-addressed blob GET returning a lazily-consumed stream, bearer
//! token challenge handling, and bounded exponential backoff on transient
//! failures. 4xx responses are never retried outside the auth flow.

use std::io::ErrorKind;

use futures::TryStreamExt;
use parking_lot::Mutex;
use reqwest::header::{ACCEPT, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Response, StatusCode};
use stratum_core::config::{PlatformConfig, RegistryConfig, RetryConfig};
use stratum_core::error::{Result, ScanError};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;

use super::auth::{fetch_token, BearerChallenge, RegistryAuth};
use super::digest::Digest;
use super::manifest::{
    manifest_accept_header, ImageIndex, ImageManifest, LayerDescriptor, Manifest, DOCKER_MANIFEST_LIST,
    OCI_INDEX,
};
use super::reference::ImageReference;

/// An opened layer blob: the raw byte stream plus its declared digest.
///
/// Bytes are tentative until the consumer's digest verification passes at
/// end-of-stream.
pub struct LayerStream {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub digest: Digest,
}

/// Client for one registry host.
pub struct RegistryClient {
    http: reqwest::Client,
    auth: RegistryAuth,
    retry: RetryConfig,
    platform: PlatformConfig,
    /// Bearer token cached after the first challenge round-trip
    token: Mutex<Option<String>>,
}

impl RegistryClient {
    pub fn new(auth: RegistryAuth, config: &RegistryConfig, platform: PlatformConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ScanError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            auth,
            retry: config.retry.clone(),
            platform,
            token: Mutex::new(None),
        })
    }

    fn manifest_url(registry: &str, repository: &str, reference: &str) -> String {
        format!("https://{}/v2/{}/manifests/{}", registry, repository, reference)
    }

    fn blob_url(registry: &str, repository: &str, digest: &str) -> String {
        format!("https://{}/v2/{}/blobs/{}", registry, repository, digest)
    }

    /// Resolve a reference to a single-architecture manifest.
    ///
    /// Indexes / manifest lists are followed one level, selecting the entry
    /// matching the configured platform; `NotFound` when no entry matches.
    pub async fn resolve_manifest(&self, reference: &ImageReference) -> Result<Manifest> {
        let url = Self::manifest_url(
            &reference.registry,
            &reference.repository,
            reference.manifest_ref(),
        );
        let (body, content_type, digest) = self.fetch_manifest_document(reference, &url).await?;

        if is_index_media_type(&content_type) {
            let index: ImageIndex = serde_json::from_slice(&body)
                .map_err(|e| ScanError::Protocol(format!("malformed image index: {}", e)))?;

            let entry = index
                .select(&self.platform.os, &self.platform.architecture)
                .ok_or_else(|| ScanError::NotFound {
                    reference: format!(
                        "{} has no {}/{} manifest",
                        reference, self.platform.os, self.platform.architecture
                    ),
                })?;

            tracing::debug!(
                reference = %reference,
                digest = %entry.digest,
                os = %self.platform.os,
                arch = %self.platform.architecture,
                "Resolved index entry"
            );

            let manifest_url =
                Self::manifest_url(&reference.registry, &reference.repository, &entry.digest);
            let (body, content_type, digest) =
                self.fetch_manifest_document(reference, &manifest_url).await?;
            if is_index_media_type(&content_type) {
                return Err(ScanError::Protocol(
                    "index entry resolved to another index".to_string(),
                ));
            }
            return Self::parse_manifest(&body, digest);
        }

        Self::parse_manifest(&body, digest)
    }

    fn parse_manifest(body: &[u8], digest: String) -> Result<Manifest> {
        let document: ImageManifest = serde_json::from_slice(body)
            .map_err(|e| ScanError::Protocol(format!("malformed manifest: {}", e)))?;
        if document.schema_version != 2 {
            return Err(ScanError::Protocol(format!(
                "unsupported manifest schema version {}",
                document.schema_version
            )));
        }
        Ok(Manifest::from_document(digest, document))
    }

    /// Fetch one manifest document, returning (body, content-type, digest).
    async fn fetch_manifest_document(
        &self,
        reference: &ImageReference,
        url: &str,
    ) -> Result<(Vec<u8>, String, String)> {
        let response = self
            .get_with_retry(&reference.registry, url, Some(manifest_accept_header()))
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ScanError::NotFound {
                reference: reference.to_string(),
            });
        }
        let response = check_status(&reference.registry, response)?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let header_digest = response
            .headers()
            .get("Docker-Content-Digest")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| ScanError::Registry {
                registry: reference.registry.clone(),
                message: format!("failed to read manifest body: {}", e),
            })?
            .to_vec();

        // The registry names the digest in a header; compute it otherwise.
        let digest = match header_digest {
            Some(d) => d,
            None => Digest::compute(super::digest::Algorithm::Sha256, &body).to_string(),
        };

        Ok((body, content_type, digest))
    }

    /// Open a layer blob as a lazily-consumed byte stream.
    ///
    /// Integrity is verified incrementally by wrapping the stream in a
    /// [`super::DigestReader`] on the consuming side; the declared digest
    /// travels with the stream for that purpose.
    pub async fn open_layer(
        &self,
        registry: &str,
        repository: &str,
        layer: &LayerDescriptor,
    ) -> Result<LayerStream> {
        let digest = Digest::parse(&layer.digest)?;
        let url = Self::blob_url(registry, repository, &layer.digest);

        let response = self.get_with_retry(registry, &url, None).await?;
        let response = check_status(registry, response)?;

        tracing::debug!(
            digest = %layer.digest,
            size = layer.size,
            "Streaming layer blob"
        );

        let stream = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(ErrorKind::Other, e));

        Ok(LayerStream {
            reader: Box::new(StreamReader::new(stream)),
            digest,
        })
    }

    /// GET with bearer-token handling and bounded backoff on transient
    /// failures. 4xx responses are returned to the caller un-retried.
    async fn get_with_retry(
        &self,
        registry: &str,
        url: &str,
        accept: Option<String>,
    ) -> Result<Response> {
        let mut last_error = None;

        for attempt in 1..=self.retry.max_attempts {
            let delay = self.retry.delay_for_attempt(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            match self.get_once(registry, url, accept.as_deref()).await {
                Ok(response) if is_transient_status(response.status()) => {
                    tracing::warn!(
                        url,
                        status = %response.status(),
                        attempt,
                        "Transient registry response, retrying"
                    );
                    last_error = Some(ScanError::Registry {
                        registry: registry.to_string(),
                        message: format!("server returned {}", response.status()),
                    });
                }
                Ok(response) => return Ok(response),
                // Auth failures are terminal; everything else transport-level
                // is assumed transient.
                Err(e @ ScanError::AuthRequired { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(url, attempt, error = %e, "Registry request failed, retrying");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| ScanError::Registry {
            registry: registry.to_string(),
            message: "request retries exhausted".to_string(),
        }))
    }

    /// A single request round, including at most one token exchange.
    async fn get_once(&self, registry: &str, url: &str, accept: Option<&str>) -> Result<Response> {
        let cached_token = self.token.lock().clone();
        let response = self.send(url, accept, cached_token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Challenge round: honor the WWW-Authenticate header exactly.
        let challenge_header = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ScanError::AuthRequired {
                registry: registry.to_string(),
                message: "401 without an auth challenge".to_string(),
            })?;
        let challenge = BearerChallenge::parse(challenge_header)?;

        let token = fetch_token(&self.http, registry, &challenge, &self.auth).await?;
        *self.token.lock() = Some(token.clone());

        let response = self.send(url, accept, Some(token)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ScanError::AuthRequired {
                registry: registry.to_string(),
                message: "registry rejected the exchanged token".to_string(),
            });
        }
        Ok(response)
    }

    async fn send(&self, url: &str, accept: Option<&str>, token: Option<String>) -> Result<Response> {
        let mut request = self.http.get(url);
        if let Some(accept) = accept {
            request = request.header(ACCEPT, accept);
        }
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }
        request.send().await.map_err(|e| ScanError::Registry {
            registry: url.to_string(),
            message: e.to_string(),
        })
    }
}

fn is_index_media_type(content_type: &str) -> bool {
    content_type.starts_with(OCI_INDEX) || content_type.starts_with(DOCKER_MANIFEST_LIST)
}

/// Retry 5xx and 429; nothing else.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Map terminal non-success statuses to the error taxonomy.
fn check_status(registry: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ScanError::Registry {
        registry: registry.to_string(),
        message: format!("server returned {}", status),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_url_shape() {
        assert_eq!(
            RegistryClient::manifest_url("ghcr.io", "acme/app", "v1"),
            "https://ghcr.io/v2/acme/app/manifests/v1"
        );
        assert_eq!(
            RegistryClient::manifest_url("reg.local:5000", "app", "sha256:abc"),
            "https://reg.local:5000/v2/app/manifests/sha256:abc"
        );
    }

    #[test]
    fn test_blob_url_shape() {
        assert_eq!(
            RegistryClient::blob_url("docker.io", "library/debian", "sha256:abc"),
            "https://docker.io/v2/library/debian/blobs/sha256:abc"
        );
    }

    #[test]
    fn test_index_media_type_detection() {
        assert!(is_index_media_type(OCI_INDEX));
        assert!(is_index_media_type(DOCKER_MANIFEST_LIST));
        assert!(is_index_media_type(&format!("{}; charset=utf-8", OCI_INDEX)));
        assert!(!is_index_media_type(super::super::manifest::OCI_MANIFEST));
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
        assert!(!is_transient_status(StatusCode::OK));
    }
}
