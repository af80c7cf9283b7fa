//! Input grammars: app slugs, upload filenames, checksums, semver.
//!
//! Rejections here map to `validation` (400). Regexes compile once.

use once_cell::sync::Lazy;
use regex::Regex;
use semver::Version;

use crate::error::ApiError;

static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*[a-z0-9]$").unwrap());

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9._-]+$").unwrap());

static CHECKSUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z0-9]+:[0-9a-fA-F]+$").unwrap());

/// App slugs: lowercase alphanumeric with single hyphen separators, 2..=50.
pub fn validate_slug(slug: &str) -> Result<(), ApiError> {
    if slug.len() < 2 || slug.len() > 50 {
        return Err(ApiError::validation(format!(
            "slug '{slug}' must be 2-50 characters"
        )));
    }
    if !SLUG_RE.is_match(slug) {
        return Err(ApiError::validation(format!(
            "slug '{slug}' must match ^[a-z][a-z0-9-]*[a-z0-9]$"
        )));
    }
    if slug.contains("--") {
        return Err(ApiError::validation(format!(
            "slug '{slug}' must not contain consecutive hyphens"
        )));
    }
    Ok(())
}

/// Reduce an upload filename to a safe basename.
///
/// Strips any path components the client sent, then requires the remainder
/// to match `^[a-zA-Z0-9._-]+$`. Dot-only names are rejected along with
/// everything else that could escape the object-key namespace.
pub fn sanitize_filename(raw: &str) -> Result<String, ApiError> {
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    if base.is_empty() || base == "." || base == ".." || !FILENAME_RE.is_match(&base) {
        return Err(ApiError::validation(format!(
            "filename '{raw}' is not a safe object name"
        )));
    }
    Ok(base)
}

/// Checksums travel as `algorithm:hex` (e.g. `sha256:ab12…`).
pub fn validate_checksum(checksum: &str) -> Result<(), ApiError> {
    if !CHECKSUM_RE.is_match(checksum) {
        return Err(ApiError::validation(format!(
            "checksum '{checksum}' must be algorithm:hex"
        )));
    }
    Ok(())
}

/// Parse a semver string or fail with a 400.
pub fn parse_version(version: &str) -> Result<Version, ApiError> {
    Version::parse(version.trim())
        .map_err(|e| ApiError::validation(format!("invalid semver '{version}': {e}")))
}
