//! Raw-path validation and absolutization.
//!
//! Every candidate path discovered by extraction or loaded from a file goes
//! through [`validate`] before the engine keeps it. The host-must-contain-a-dot
//! heuristic filters the trivial false positives lax scan patterns produce
//! (bare identifiers, version strings).

use thiserror::Error;
use url::Url;

/// Why a candidate path was rejected.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty path")]
    Empty,

    #[error("URL has no host")]
    MissingHost,

    #[error("host {0:?} contains no dot")]
    UndottedHost(String),

    #[error("cannot resolve relative path without base")]
    UnresolvableRelative,

    #[error("protocol-relative path without a source scheme")]
    MissingSourceScheme,

    #[error("parse failure: {0}")]
    Parse(String),
}

/// Resolve `raw` to a validated absolute URL.
///
/// Absolute inputs are accepted as-is when their host contains a dot.
/// Relative inputs resolve against `base` (RFC 3986 join). Without a base,
/// only protocol-relative (`//host/...`) inputs resolve, borrowing the
/// scheme of `source`.
pub fn validate(
    raw: &str,
    base: Option<&Url>,
    source: Option<&Url>,
) -> Result<Url, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }

    if let Ok(parsed) = Url::parse(trimmed) {
        if parsed.host_str().is_some() {
            return require_dotted_host(parsed);
        }
        // A scheme without a host (mailto:, data:, or a `host:port/...`
        // string the parser read as scheme-and-path) is never monitorable.
        return Err(ValidationError::MissingHost);
    }

    if let Some(base) = base {
        let joined = base
            .join(trimmed)
            .map_err(|e| ValidationError::Parse(e.to_string()))?;
        if joined.host_str().is_none() {
            return Err(ValidationError::MissingHost);
        }
        return require_dotted_host(joined);
    }

    if let Some(rest) = trimmed.strip_prefix("//") {
        let scheme = source
            .map(Url::scheme)
            .ok_or(ValidationError::MissingSourceScheme)?;
        let absolute = Url::parse(&format!("{scheme}://{rest}"))
            .map_err(|e| ValidationError::Parse(e.to_string()))?;
        if absolute.host_str().is_none() {
            return Err(ValidationError::MissingHost);
        }
        return require_dotted_host(absolute);
    }

    Err(ValidationError::UnresolvableRelative)
}

fn require_dotted_host(url: Url) -> Result<Url, ValidationError> {
    match url.host_str() {
        Some(host) if host.contains('.') => Ok(url),
        Some(host) => Err(ValidationError::UndottedHost(host.to_string())),
        None => Err(ValidationError::MissingHost),
    }
}
