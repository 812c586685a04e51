//! Debian version ordering.
//!
//! Implements the dpkg comparison algorithm over
//! `[epoch:]upstream[-revision]` version strings: epochs compare
//! numerically; upstream and revision compare by alternating non-digit /
//! digit runs where letters sort before punctuation and `~` sorts before
//! everything, including the end of the string. This is not semver.

use std::cmp::Ordering;

use super::VersionOrd;

/// Comparator for dpkg version strings.
pub struct DebVersion;

impl VersionOrd for DebVersion {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let a = DebParts::parse(a);
        let b = DebParts::parse(b);

        a.epoch
            .cmp(&b.epoch)
            .then_with(|| verrevcmp(a.upstream, b.upstream))
            .then_with(|| verrevcmp(a.revision, b.revision))
    }
}

/// The three segments of a Debian version string.
struct DebParts<'a> {
    epoch: u64,
    upstream: &'a str,
    revision: &'a str,
}

impl<'a> DebParts<'a> {
    fn parse(version: &'a str) -> Self {
        // Epoch: leading digits before the first ':'. A non-numeric prefix
        // is not an epoch.
        let (epoch, rest) = match version.split_once(':') {
            Some((epoch, rest)) if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) => {
                (epoch.parse().unwrap_or(u64::MAX), rest)
            }
            _ => (0, version),
        };

        // Revision: after the last '-'; absent compares as the empty string.
        let (upstream, revision) = match rest.rsplit_once('-') {
            Some((upstream, revision)) => (upstream, revision),
            None => (rest, ""),
        };

        Self {
            epoch,
            upstream,
            revision,
        }
    }
}

/// Sort weight of a character inside a non-digit run.
///
/// `~` sorts below everything including the run's end; letters sort below
/// all other characters.
fn order(c: u8) -> i32 {
    match c {
        b'~' => -1,
        c if c.is_ascii_alphabetic() => c as i32,
        c => c as i32 + 256,
    }
}

/// Compare two upstream/revision strings by alternating runs.
fn verrevcmp(a: &str, b: &str) -> Ordering {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < a.len() || j < b.len() {
        // Non-digit run: character-by-character by sort weight; a missing
        // character weighs 0, so `~` loses against end-of-string.
        while (i < a.len() && !a[i].is_ascii_digit()) || (j < b.len() && !b[j].is_ascii_digit()) {
            let wa = if i < a.len() { order(a[i]) } else { 0 };
            let wb = if j < b.len() { order(b[j]) } else { 0 };
            if wa != wb {
                return wa.cmp(&wb);
            }
            i += 1;
            j += 1;
        }

        // Digit run: numeric comparison with leading zeros ignored.
        while i < a.len() && a[i] == b'0' {
            i += 1;
        }
        while j < b.len() && b[j] == b'0' {
            j += 1;
        }

        let da = digits(&a[i.min(a.len())..]);
        let db = digits(&b[j.min(b.len())..]);

        // A longer digit run is a bigger number.
        match da.len().cmp(&db.len()).then_with(|| da.cmp(db)) {
            Ordering::Equal => {}
            other => return other,
        }
        i += da.len();
        j += db.len();
    }

    Ordering::Equal
}

fn digits(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .position(|b| !b.is_ascii_digit())
        .unwrap_or(bytes.len());
    &bytes[..end]
}
