//! Content digest parsing and streaming verification.
//!
//! Digests use the `algorithm:hex` string form; the algorithm named in the
//! digest selects the hash actually computed. [`DigestReader`] hashes bytes
//! as they are consumed and performs the comparison as a distinct terminal
//! check — bytes handed out before [`DigestReader::verify`] succeeds are
//! tentative and must be discarded on mismatch.

use std::io::Read;

use sha2::{Digest as _, Sha256, Sha512};
use stratum_core::error::{Result, ScanError};

/// Digest algorithms the registry protocol names in digest strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Sha256,
    Sha512,
}

impl Algorithm {
    fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    fn hasher(self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sha256 => write!(f, "sha256"),
            Self::Sha512 => write!(f, "sha512"),
        }
    }
}

/// A parsed `algorithm:hex` content digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    pub algorithm: Algorithm,
    pub hex: String,
}

impl Digest {
    /// Parse a digest string, validating algorithm name and hex length.
    pub fn parse(s: &str) -> Result<Self> {
        let (algo, hex) = s.split_once(':').ok_or_else(|| {
            ScanError::Protocol(format!("invalid digest '{}': expected algorithm:hex", s))
        })?;

        let algorithm = match algo {
            "sha256" => Algorithm::Sha256,
            "sha512" => Algorithm::Sha512,
            other => {
                return Err(ScanError::Protocol(format!(
                    "unsupported digest algorithm '{}'",
                    other
                )))
            }
        };

        if hex.len() != algorithm.hex_len()
            || !hex.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(ScanError::Protocol(format!(
                "invalid {} digest hex '{}'",
                algorithm, hex
            )));
        }

        Ok(Self {
            algorithm,
            hex: hex.to_string(),
        })
    }

    /// Compute the digest of a byte slice with this digest's algorithm.
    pub fn compute(algorithm: Algorithm, bytes: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(bytes);
        Self {
            algorithm,
            hex: hasher.finalize_hex(),
        }
    }
}

impl std::fmt::Display for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Running hash over one of the supported algorithms.
enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(bytes),
            Self::Sha512(h) => h.update(bytes),
        }
    }

    fn finalize_hex(self) -> String {
        match self {
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// A reader that hashes everything it hands out.
///
/// Wraps the raw blob stream; the hash covers the bytes exactly as served
/// by the registry (i.e., before decompression). Call [`verify`] after the
/// stream is exhausted; consumers that acted on the bytes earlier must
/// discard their results when it fails.
///
/// [`verify`]: DigestReader::verify
pub struct DigestReader<R> {
    inner: R,
    hasher: Hasher,
    expected: Digest,
}

impl<R: Read> DigestReader<R> {
    pub fn new(inner: R, expected: Digest) -> Self {
        let hasher = expected.algorithm.hasher();
        Self {
            inner,
            hasher,
            expected,
        }
    }

    /// Terminal check: drain any unread remainder, then compare the
    /// computed digest against the declared one.
    pub fn verify(self) -> Result<()> {
        let Self {
            mut inner,
            mut hasher,
            expected,
        } = self;

        // The tail of the stream may not have been consumed (trailing
        // archive padding); it still counts toward the digest.
        let mut sink = [0u8; 8192];
        loop {
            match inner.read(&mut sink) {
                Ok(0) => break,
                Ok(n) => hasher.update(&sink[..n]),
                Err(e) => return Err(ScanError::Io(e)),
            }
        }

        let computed = hasher.finalize_hex();
        if computed == expected.hex {
            Ok(())
        } else {
            Err(ScanError::Integrity {
                expected: expected.to_string(),
                computed: format!("{}:{}", expected.algorithm, computed),
            })
        }
    }
}

impl<R: Read> Read for DigestReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.hasher.update(&buf[..n]);
        }
        Ok(n)
    }
}
