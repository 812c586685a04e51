//! Image reference parsing.
//!
//! Parses references like `ghcr.io/acme/app:v1.2` into structured
//! components. A reference identifies exactly one scan target and is
//! immutable after parsing.

use stratum_core::error::{Result, ScanError};

/// Default registry when none is specified.
const DEFAULT_REGISTRY: &str = "docker.io";

/// Default tag when neither tag nor digest is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference: registry host, repository, tag-or-digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname, possibly with port (e.g., "ghcr.io", "reg.local:5000")
    pub registry: String,
    /// Repository path (e.g., "library/debian", "acme/app")
    pub repository: String,
    /// Tag (e.g., "latest", "bookworm-slim")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<String>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supported forms:
    /// - `debian` → docker.io/library/debian:latest
    /// - `debian:12` → docker.io/library/debian:12
    /// - `acme/app` → docker.io/acme/app:latest
    /// - `ghcr.io/acme/app:v1` → ghcr.io/acme/app:v1
    /// - `ghcr.io/acme/app@sha256:ab...` → digest-pinned reference
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ScanError::Protocol("empty image reference".to_string()));
        }

        // Split off a digest first (@ separator); its format is algorithm:hex.
        let (name_tag, digest) = match reference.rsplit_once('@') {
            Some((head, digest)) => {
                if !digest.contains(':') {
                    return Err(ScanError::Protocol(format!(
                        "invalid digest in reference '{}': expected algorithm:hex",
                        reference
                    )));
                }
                (head, Some(digest.to_string()))
            }
            None => (reference, None),
        };

        let (name, tag) = Self::split_tag(name_tag);
        let (registry, repository) = Self::split_registry_repository(name)?;

        // A bare reference defaults to :latest; digest-pinned references don't.
        let tag = match (&tag, &digest) {
            (None, None) => Some(DEFAULT_TAG.to_string()),
            _ => tag,
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a trailing `:tag`, taking care not to confuse a registry port
    /// (`reg.local:5000/app`) with a tag.
    fn split_tag(name_tag: &str) -> (&str, Option<String>) {
        let after_slash = match name_tag.rfind('/') {
            Some(pos) => &name_tag[pos + 1..],
            None => name_tag,
        };
        match after_slash.rfind(':') {
            Some(colon) => {
                let candidate = &after_slash[colon + 1..];
                // A colon in the only path component could be a port.
                if !name_tag.contains('/') && candidate.chars().all(|c| c.is_ascii_digit()) {
                    return (name_tag, None);
                }
                let cut = name_tag.len() - after_slash.len() + colon;
                (&name_tag[..cut], Some(candidate.to_string()))
            }
            None => (name_tag, None),
        }
    }

    /// Split a name into registry and repository components.
    ///
    /// The first path component is a registry hostname when it contains a
    /// dot or colon, or is "localhost"; otherwise the default registry is
    /// assumed and single names get the `library/` namespace.
    fn split_registry_repository(name: &str) -> Result<(String, String)> {
        if let Some((first, rest)) = name.split_once('/') {
            if first.contains('.') || first.contains(':') || first == "localhost" {
                if rest.is_empty() {
                    return Err(ScanError::Protocol(format!(
                        "empty repository in reference '{}'",
                        name
                    )));
                }
                return Ok((first.to_string(), rest.to_string()));
            }
        }

        let repository = if name.contains('/') {
            name.to_string()
        } else {
            format!("library/{}", name)
        };

        Ok((DEFAULT_REGISTRY.to_string(), repository))
    }

    /// The tag or digest used to address the manifest, digest preferred.
    pub fn manifest_ref(&self) -> &str {
        self.digest
            .as_deref()
            .or(self.tag.as_deref())
            .unwrap_or(DEFAULT_TAG)
    }

    /// The full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = format!("{}/{}", self.registry, self.repository);
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(digest);
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

impl std::str::FromStr for ImageReference {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_name() {
        let r = ImageReference::parse("debian").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "library/debian");
        assert_eq!(r.tag, Some("latest".to_string()));
        assert_eq!(r.digest, None);
    }

    #[test]
    fn test_parse_name_with_tag() {
        let r = ImageReference::parse("debian:12").unwrap();
        assert_eq!(r.repository, "library/debian");
        assert_eq!(r.tag, Some("12".to_string()));
    }

    #[test]
    fn test_parse_user_repo() {
        let r = ImageReference::parse("acme/app").unwrap();
        assert_eq!(r.registry, "docker.io");
        assert_eq!(r.repository, "acme/app");
        assert_eq!(r.tag, Some("latest".to_string()));
    }

    #[test]
    fn test_parse_custom_registry() {
        let r = ImageReference::parse("ghcr.io/acme/app:v1.2").unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.repository, "acme/app");
        assert_eq!(r.tag, Some("v1.2".to_string()));
    }

    #[test]
    fn test_parse_digest_only() {
        let r = ImageReference::parse(
            "ghcr.io/acme/app@sha256:8f25f37ec1e3c1a9e5e0a030dc558ca236e84911e3f981b0a96af3d3b4a9f13e",
        )
        .unwrap();
        assert_eq!(r.registry, "ghcr.io");
        assert_eq!(r.tag, None);
        assert!(r.digest.as_deref().unwrap().starts_with("sha256:"));
        assert!(r.manifest_ref().starts_with("sha256:"));
    }

    #[test]
    fn test_parse_tag_and_digest() {
        let r = ImageReference::parse("ghcr.io/acme/app:v1@sha256:abc123").unwrap();
        assert_eq!(r.tag, Some("v1".to_string()));
        assert_eq!(r.digest, Some("sha256:abc123".to_string()));
        // Digest wins for manifest addressing.
        assert_eq!(r.manifest_ref(), "sha256:abc123");
    }

    #[test]
    fn test_parse_localhost_registry() {
        let r = ImageReference::parse("localhost/app:test").unwrap();
        assert_eq!(r.registry, "localhost");
        assert_eq!(r.repository, "app");
    }

    #[test]
    fn test_parse_registry_with_port() {
        let r = ImageReference::parse("reg.local:5000/app:v1").unwrap();
        assert_eq!(r.registry, "reg.local:5000");
        assert_eq!(r.repository, "app");
        assert_eq!(r.tag, Some("v1".to_string()));
    }

    #[test]
    fn test_parse_empty_reference() {
        assert!(ImageReference::parse("").is_err());
        assert!(ImageReference::parse("   ").is_err());
    }

    #[test]
    fn test_parse_invalid_digest() {
        assert!(ImageReference::parse("debian@notadigest").is_err());
    }

    #[test]
    fn test_full_reference_roundtrip() {
        let r = ImageReference::parse("ghcr.io/acme/app:v1.2").unwrap();
        assert_eq!(r.full_reference(), "ghcr.io/acme/app:v1.2");
        assert_eq!(format!("{}", r), "ghcr.io/acme/app:v1.2");
    }

    #[test]
    fn test_deep_repository_path() {
        let r = ImageReference::parse("ghcr.io/org/team/app:v1").unwrap();
        assert_eq!(r.repository, "org/team/app");
    }

    #[test]
    fn test_from_str() {
        let r: ImageReference = "debian:12".parse().unwrap();
        assert_eq!(r.repository, "library/debian");
    }
}
