//! os-release detection.
//!
//! `etc/os-release` is the canonical location, with `usr/lib/os-release`
//! as the documented fallback (in most images the former is a symlink to
//! the latter, in which case only the fallback carries content).

use stratum_core::report::OsRelease;

use crate::fsview::FsView;

pub const ETC_OS_RELEASE: &str = "etc/os-release";
pub const USR_LIB_OS_RELEASE: &str = "usr/lib/os-release";

/// Look up os-release content in the materialized view and parse it.
pub fn detect(view: &FsView) -> Option<OsRelease> {
    let file = view
        .captured(ETC_OS_RELEASE)
        .or_else(|| view.captured(USR_LIB_OS_RELEASE))?;
    Some(parse(&file.content))
}

/// Parse os-release key=value lines.
pub fn parse(bytes: &[u8]) -> OsRelease {
    let text = String::from_utf8_lossy(bytes);
    let mut release = OsRelease::default();

    for line in text.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = unquote(value);
        match key {
            "ID" => release.id = Some(value),
            "VERSION_ID" => release.version_id = Some(value),
            "NAME" => release.name = Some(value),
            "PRETTY_NAME" => release.pretty_name = Some(value),
            "CPE_NAME" => release.cpe_name = Some(value),
            _ => {}
        }
    }

    release
}

/// Values may use double or single quotes.
fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value)
        .to_string()
}
