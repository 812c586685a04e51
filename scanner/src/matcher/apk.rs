//! Alpine apk version ordering.
//!
//! Implements the apk-tools ordering over
//! `digits{.digits}[letter]{_suffix[num]}[-r<num>]` version strings.
//! Pre-release suffixes (`_alpha`, `_beta`, `_pre`, `_rc`) sort below the
//! bare version; post-release suffixes (`_cvs`, `_svn`, `_git`, `_hg`,
//! `_p`) sort above it. Numeric components with leading zeros compare as
//! fractions, i.e. textually.

use std::cmp::Ordering;

use super::VersionOrd;

/// Comparator for apk version strings.
pub struct ApkVersion;

impl VersionOrd for ApkVersion {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        let a = ApkParts::parse(a);
        let b = ApkParts::parse(b);

        a.compare_components(&b)
            .then_with(|| a.letter.cmp(&b.letter))
            .then_with(|| compare_suffixes(&a.suffixes, &b.suffixes))
            .then_with(|| a.revision.cmp(&b.revision))
    }
}

/// Suffix rank; `NO_SUFFIX_RANK` sits between pre- and post-release.
const NO_SUFFIX_RANK: u8 = 4;

fn suffix_rank(name: &str) -> Option<u8> {
    match name {
        "alpha" => Some(0),
        "beta" => Some(1),
        "pre" => Some(2),
        "rc" => Some(3),
        "cvs" => Some(5),
        "svn" => Some(6),
        "git" => Some(7),
        "hg" => Some(8),
        "p" => Some(9),
        _ => None,
    }
}

#[derive(Debug)]
struct NumComponent {
    value: u64,
    /// Leading zero forces textual (fractional) comparison
    raw: String,
}

#[derive(Debug)]
struct ApkParts {
    components: Vec<NumComponent>,
    letter: Option<char>,
    suffixes: Vec<(u8, u64)>,
    revision: u64,
}

impl ApkParts {
    fn parse(version: &str) -> Self {
        let mut parts = Self {
            components: Vec::new(),
            letter: None,
            suffixes: Vec::new(),
            revision: 0,
        };

        // Build revision comes after `-r`.
        let (version, revision) = match version.rsplit_once("-r") {
            Some((head, rev)) if !rev.is_empty() && rev.bytes().all(|b| b.is_ascii_digit()) => {
                (head, rev.parse().unwrap_or(0))
            }
            _ => (version, 0),
        };
        parts.revision = revision;

        let mut rest = version;

        // Dotted numeric components.
        loop {
            let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                break;
            }
            rest = &rest[digits.len()..];
            parts.components.push(NumComponent {
                value: digits.parse().unwrap_or(u64::MAX),
                raw: digits,
            });
            match rest.strip_prefix('.') {
                Some(tail) => rest = tail,
                None => break,
            }
        }

        // Optional single trailing letter.
        if let Some(c) = rest.chars().next() {
            if c.is_ascii_lowercase() {
                parts.letter = Some(c);
                rest = &rest[1..];
            }
        }

        // `_suffix[num]` groups.
        while let Some(tail) = rest.strip_prefix('_') {
            let name: String = tail.chars().take_while(|c| c.is_ascii_lowercase()).collect();
            let after_name = &tail[name.len()..];
            let digits: String = after_name.chars().take_while(|c| c.is_ascii_digit()).collect();

            let Some(rank) = suffix_rank(&name) else {
                break;
            };
            parts
                .suffixes
                .push((rank, digits.parse().unwrap_or(0)));
            rest = &after_name[digits.len()..];
        }

        parts
    }

    fn compare_components(&self, other: &Self) -> Ordering {
        let len = self.components.len().max(other.components.len());
        for idx in 0..len {
            match (self.components.get(idx), other.components.get(idx)) {
                (Some(a), Some(b)) => {
                    // Leading zeros mark a fractional part: "1.01" < "1.1".
                    let fractional = idx > 0
                        && (a.raw.starts_with('0') || b.raw.starts_with('0'));
                    let ordering = if fractional {
                        a.raw.cmp(&b.raw)
                    } else {
                        a.value.cmp(&b.value)
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                // A missing component sorts below a present one.
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (None, None) => unreachable!(),
            }
        }
        Ordering::Equal
    }
}

fn compare_suffixes(a: &[(u8, u64)], b: &[(u8, u64)]) -> Ordering {
    let len = a.len().max(b.len());
    for idx in 0..len {
        let (rank_a, num_a) = a.get(idx).copied().unwrap_or((NO_SUFFIX_RANK, 0));
        let (rank_b, num_b) = b.get(idx).copied().unwrap_or((NO_SUFFIX_RANK, 0));
        let ordering = rank_a.cmp(&rank_b).then_with(|| num_a.cmp(&num_b));
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(a: &str, b: &str) -> Ordering {
        ApkVersion.compare(a, b)
    }

    #[test]
    fn test_numeric_ordering() {
        assert_eq!(cmp("1.2.3", "1.2.4"), Ordering::Less);
        assert_eq!(cmp("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(cmp("1.2.4-r2", "1.2.4-r2"), Ordering::Equal);
    }

    #[test]
    fn test_build_revision_ordering() {
        assert_eq!(cmp("1.2.4-r1", "1.2.4-r2"), Ordering::Less);
        assert_eq!(cmp("1.36.1-r5", "1.36.1-r0"), Ordering::Greater);
        // Absent revision equals -r0.
        assert_eq!(cmp("1.2.4", "1.2.4-r0"), Ordering::Equal);
    }

    #[test]
    fn test_pre_release_suffixes_sort_below() {
        assert_eq!(cmp("1.0_alpha", "1.0"), Ordering::Less);
        assert_eq!(cmp("1.0_beta", "1.0_rc1"), Ordering::Less);
        assert_eq!(cmp("1.0_alpha1", "1.0_alpha2"), Ordering::Less);
        assert_eq!(cmp("1.0_rc1", "1.0"), Ordering::Less);
    }

    #[test]
    fn test_post_release_suffixes_sort_above() {
        assert_eq!(cmp("1.0_p1", "1.0"), Ordering::Greater);
        assert_eq!(cmp("1.0_git20240101", "1.0"), Ordering::Greater);
        assert_eq!(cmp("1.0_p1", "1.0.1"), Ordering::Less);
    }

    #[test]
    fn test_trailing_letter_ordering() {
        assert_eq!(cmp("1.2a", "1.2b"), Ordering::Less);
        assert_eq!(cmp("1.2", "1.2a"), Ordering::Less);
        assert_eq!(cmp("1.2b-r1", "1.2b-r1"), Ordering::Equal);
    }

    #[test]
    fn test_leading_zero_fractional_comparison() {
        assert_eq!(cmp("1.01", "1.1"), Ordering::Less);
        assert_eq!(cmp("1.05", "1.5"), Ordering::Less);
        assert_eq!(cmp("1.05", "1.050"), Ordering::Less);
    }

    #[test]
    fn test_missing_component_is_lower() {
        assert_eq!(cmp("1.2", "1.2.0"), Ordering::Less);
        assert_eq!(cmp("3.19", "3.19.1"), Ordering::Less);
    }

    #[test]
    fn test_real_world_alpine_versions() {
        assert_eq!(cmp("1.1.1w-r1", "3.0.12-r0"), Ordering::Less);
        assert_eq!(cmp("2.38.1-r8", "2.38.1-r10"), Ordering::Less);
        assert_eq!(cmp("6.4_p20230625-r0", "6.4-r0"), Ordering::Greater);
    }

    #[test]
    fn test_total_order_sample() {
        let sorted = [
            "1.0_alpha",
            "1.0_alpha1",
            "1.0_beta",
            "1.0_rc1",
            "1.0",
            "1.0_p1",
            "1.0a",
            "1.0.1",
            "1.1",
        ];
        for (i, a) in sorted.iter().enumerate() {
            for (j, b) in sorted.iter().enumerate() {
                let expected = i.cmp(&j);
                assert_eq!(cmp(a, b), expected, "{} vs {}", a, b);
            }
        }
    }
}
