//! Registry authentication.
//!
//! Implements the bearer-token challenge/response flow of the distribution
//! protocol: a 401 response carries a `WWW-Authenticate: Bearer` challenge
//! naming the token realm; the client fetches a token there (attaching
//! basic credentials when configured) and retries the original request.

use base64::Engine as _;
use serde::Deserialize;
use stratum_core::error::{Result, ScanError};

/// Authentication credentials for a container registry.
#[derive(Debug, Clone, Default)]
pub struct RegistryAuth {
    username: Option<String>,
    password: Option<String>,
}

impl RegistryAuth {
    /// Anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    /// Credentials from the environment.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`; falls back to
    /// anonymous if either is unset.
    pub fn from_env() -> Self {
        let username = std::env::var("REGISTRY_USERNAME").ok();
        let password = std::env::var("REGISTRY_PASSWORD").ok();

        if username.is_some() && password.is_some() {
            Self { username, password }
        } else {
            Self::anonymous()
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_none() || self.password.is_none()
    }

    /// `Authorization: Basic ...` header value, when credentials are set.
    pub fn basic_header(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                let encoded =
                    base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", user, pass));
                Some(format!("Basic {}", encoded))
            }
            _ => None,
        }
    }
}

/// A parsed `WWW-Authenticate: Bearer` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerChallenge {
    /// Token endpoint URL
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl BearerChallenge {
    /// Parse the challenge header value exactly as sent.
    ///
    /// Expected shape:
    /// `Bearer realm="https://auth.example/token",service="registry.example",scope="repository:acme/app:pull"`
    pub fn parse(header: &str) -> Result<Self> {
        let params = header.strip_prefix("Bearer ").ok_or_else(|| {
            ScanError::Protocol(format!("unsupported auth challenge: '{}'", header))
        })?;

        let mut realm = None;
        let mut service = None;
        let mut scope = None;

        for (key, value) in parse_challenge_params(params) {
            match key.as_str() {
                "realm" => realm = Some(value),
                "service" => service = Some(value),
                "scope" => scope = Some(value),
                _ => {}
            }
        }

        let realm = realm.ok_or_else(|| {
            ScanError::Protocol("auth challenge is missing the realm parameter".to_string())
        })?;

        Ok(Self {
            realm,
            service,
            scope,
        })
    }

    /// The token endpoint with service/scope query parameters attached.
    pub fn token_url(&self) -> String {
        let mut url = self.realm.clone();
        let mut sep = if url.contains('?') { '&' } else { '?' };
        if let Some(ref service) = self.service {
            url.push(sep);
            url.push_str("service=");
            url.push_str(service);
            sep = '&';
        }
        if let Some(ref scope) = self.scope {
            url.push(sep);
            url.push_str("scope=");
            url.push_str(scope);
        }
        url
    }
}

/// Split `key="value",key="value"` pairs, honoring quoted values.
fn parse_challenge_params(params: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = params.trim();

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let Some(end) = stripped.find('"') else { break };
            value = stripped[..end].to_string();
            rest = stripped[end + 1..].trim_start_matches(',').trim_start();
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest[end..].trim_start_matches(',').trim_start();
        }

        pairs.push((key, value));
    }

    pairs
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Exchange a bearer challenge for a token.
///
/// Basic credentials are attached when configured; registries serving
/// public content issue anonymous pull tokens without them.
pub async fn fetch_token(
    client: &reqwest::Client,
    registry: &str,
    challenge: &BearerChallenge,
    auth: &RegistryAuth,
) -> Result<String> {
    let mut request = client.get(challenge.token_url());
    if let Some(header) = auth.basic_header() {
        request = request.header(reqwest::header::AUTHORIZATION, header);
    }

    let response = request.send().await.map_err(|e| ScanError::Registry {
        registry: registry.to_string(),
        message: format!("token exchange failed: {}", e),
    })?;

    if !response.status().is_success() {
        return Err(ScanError::AuthRequired {
            registry: registry.to_string(),
            message: format!("token endpoint returned {}", response.status()),
        });
    }

    let body: TokenResponse = response.json().await.map_err(|e| ScanError::Registry {
        registry: registry.to_string(),
        message: format!("malformed token response: {}", e),
    })?;

    body.token
        .or(body.access_token)
        .ok_or_else(|| ScanError::AuthRequired {
            registry: registry.to_string(),
            message: "token response carried no token".to_string(),
        })
}
