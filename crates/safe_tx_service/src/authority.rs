//! Validation of transaction service locations.
//!
//! Service URLs come from configuration and command lines, and they decide where signed
//! requests are routed and whether an API key is attached. The parser here is intentionally
//! narrower than a browser URL parser: the authority may only be an ASCII host name with an
//! optional port. Userinfo, percent escapes, backslashes and Unicode dot look-alikes are
//! rejected outright rather than decoded, since every decoding step is a chance for two
//! parsers to disagree about which host a URL points at.

use serde_json::Value;
use url::Url;

use crate::{
    consts::TRUSTED_SERVICE_DOMAINS,
    error::{Result, SafeError},
    hex::{describe, UNSTRINGIFIABLE},
};

const SUBJECT: &str = "Safe transaction service URL";

/// Longest DNS name, excluding a trailing dot.
const MAX_HOST_LEN: usize = 253;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// A validated service location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceLocation {
    pub scheme: Scheme,
    /// Lowercase ASCII host. A trailing dot is preserved.
    pub host: String,
    pub port: Option<u16>,
    /// Path without query or fragment, as written in the input.
    pub path: String,
    /// Whether the host belongs to one of the trusted service domains.
    pub trusted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    NotHttp,
    Malformed,
}

impl ServiceLocation {
    /// Parses `candidate`, checking trust against [`TRUSTED_SERVICE_DOMAINS`].
    pub fn parse(candidate: &str) -> Result<Self> {
        Self::parse_with_domains(candidate, TRUSTED_SERVICE_DOMAINS)
    }

    pub fn parse_with_domains(candidate: &str, trusted_domains: &[&str]) -> Result<Self> {
        let trimmed = candidate.trim();
        if trimmed.is_empty() {
            return Err(SafeError::Required(format!("{SUBJECT} is empty")));
        }

        parse_location(trimmed, trusted_domains).map_err(|rejection| match rejection {
            Rejection::NotHttp => {
                SafeError::InvalidFormat(format!("{SUBJECT} must use http(s): {candidate}"))
            }
            Rejection::Malformed => {
                SafeError::InvalidFormat(format!("{SUBJECT} is invalid: {candidate}"))
            }
        })
    }

    /// The port to render, omitting the scheme default.
    fn explicit_port(&self) -> Option<u16> {
        self.port.filter(|port| *port != self.scheme.default_port())
    }
}

/// Returns `true` iff `candidate` points at a trusted service domain.
///
/// Never fails: malformed, non-HTTP or untrusted input is simply `false`.
pub fn requires_service_credential(candidate: &str) -> bool {
    requires_service_credential_with(candidate, TRUSTED_SERVICE_DOMAINS)
}

pub fn requires_service_credential_with(candidate: &str, trusted_domains: &[&str]) -> bool {
    ServiceLocation::parse_with_domains(candidate, trusted_domains)
        .map(|location| location.trusted)
        .unwrap_or(false)
}

/// Loosely typed variant of [`requires_service_credential`]; non-strings are `false`.
pub fn value_requires_service_credential(candidate: &Value) -> bool {
    candidate.as_str().map(requires_service_credential).unwrap_or(false)
}

/// Returns the canonical `scheme://host[:port]/path/api` form of a service URL.
///
/// Host-only and scheme-relative input is forced to `https`, default ports are dropped,
/// query and fragment are removed, and the path is made to end in exactly one `api`
/// segment (`.../api/v2` collapses to `.../api`).
pub fn normalize_service_url(candidate: &str) -> Result<String> {
    let location = ServiceLocation::parse(candidate)?;
    let path = canonical_api_path(&location.path)
        .ok_or_else(|| SafeError::InvalidFormat(format!("{SUBJECT} is invalid: {candidate}")))?;

    let mut normalized = format!("{}://{}", location.scheme.as_str(), location.host);
    if let Some(port) = location.explicit_port() {
        normalized.push(':');
        normalized.push_str(&port.to_string());
    }
    normalized.push_str(&path);

    Ok(normalized)
}

/// Loosely typed variant of [`normalize_service_url`].
pub fn normalize_service_url_value(candidate: &Value) -> Result<String> {
    match candidate {
        Value::String(s) => normalize_service_url(s),
        Value::Array(_) | Value::Object(_) => Err(SafeError::InvalidFormat(format!(
            "{SUBJECT} must be a string: {UNSTRINGIFIABLE}"
        ))),
        other => Err(SafeError::InvalidFormat(format!(
            "{SUBJECT} must be a string: {}",
            describe(other)
        ))),
    }
}

/// Host-trust test: equal to a trusted root or a sub-domain of one on a label boundary.
pub fn is_trusted_host(host: &str, trusted_domains: &[&str]) -> bool {
    let host = host.to_ascii_lowercase();
    let host = host.strip_suffix('.').unwrap_or(&host);

    trusted_domains.iter().any(|root| {
        let root = root.to_ascii_lowercase();
        let root = root.strip_suffix('.').unwrap_or(&root);
        !root.is_empty()
            && (host == root
                || host.strip_suffix(root).is_some_and(|prefix| prefix.ends_with('.')))
    })
}

fn parse_location(input: &str, trusted_domains: &[&str]) -> Result<ServiceLocation, Rejection> {
    let (scheme, rest) = split_scheme(input)?;

    let authority_end = rest.find(['/', '?', '#']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    let (host, port) = parse_authority(authority)?;

    let path_end = tail.find(['?', '#']).unwrap_or(tail.len());
    let path = tail[..path_end].to_string();

    let trusted = is_trusted_host(&host, trusted_domains);

    Ok(ServiceLocation {
        scheme,
        host,
        port,
        path,
        trusted,
    })
}

/// Splits off an explicit `http://`/`https://` scheme, a scheme-relative `//`, or nothing.
fn split_scheme(input: &str) -> Result<(Scheme, &str), Rejection> {
    if let Some(rest) = input.strip_prefix("//") {
        return match rest.starts_with(['/', '\\']) {
            true => Err(Rejection::Malformed),
            false => Ok((Scheme::Https, rest)),
        };
    }
    if input.starts_with(['/', '\\']) {
        return Err(Rejection::Malformed);
    }

    let Some((name, after)) = input.split_once(':') else {
        return Ok((Scheme::Https, input));
    };

    let is_http = name.eq_ignore_ascii_case("http") || name.eq_ignore_ascii_case("https");
    let looks_like_scheme = name.starts_with(|c: char| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));

    // `host:port`, unless the host is spelled like an http(s) scheme
    if !is_http && (!looks_like_scheme || after.starts_with(|c: char| c.is_ascii_digit())) {
        return Ok((Scheme::Https, input));
    }

    let scheme = match name.to_ascii_lowercase().as_str() {
        "http" => Scheme::Http,
        "https" => Scheme::Https,
        _ => return Err(Rejection::NotHttp),
    };

    // Exactly two forward slashes. `https:/host`, `https:\\host` and mixes are spoof vectors.
    match after.strip_prefix("//") {
        Some(rest) if !rest.starts_with(['/', '\\']) => Ok((scheme, rest)),
        _ => Err(Rejection::Malformed),
    }
}

fn parse_authority(authority: &str) -> Result<(String, Option<u16>), Rejection> {
    if authority.is_empty()
        || authority.chars().any(|c| c.is_control() || c.is_whitespace())
        || contains_userinfo(authority)
    {
        return Err(Rejection::Malformed);
    }

    let (host, port) = match authority.split_once(':') {
        Some((host, port)) => (host, Some(parse_port(port)?)),
        None => (authority, None),
    };

    validate_host(host)?;

    Ok((host.to_ascii_lowercase(), port))
}

/// Detects `@` and `\` in the authority, including percent-encoded forms at any `%25` depth
/// (`%40`, `%2540`, `%252540`, `%5C`, `%255C`, ...).
fn contains_userinfo(authority: &str) -> bool {
    if authority.contains(['@', '\\']) {
        return true;
    }

    let lower = authority.to_ascii_lowercase();
    contains_escaped(&lower, "40") || contains_escaped(&lower, "5c")
}

/// Whether `haystack` contains `%` + (`25`)* + `code`. Expects lowercase input.
fn contains_escaped(haystack: &str, code: &str) -> bool {
    haystack.match_indices('%').any(|(start, _)| {
        let mut rest = &haystack[start + 1..];
        while let Some(stripped) = rest.strip_prefix("25") {
            rest = stripped;
        }
        rest.starts_with(code)
    })
}

fn parse_port(port: &str) -> Result<u16, Rejection> {
    if port.is_empty() || port.len() > 5 || !port.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Rejection::Malformed);
    }

    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(Rejection::Malformed),
        Ok(port) => Ok(port),
    }
}

/// Only ASCII letters, digits, `-` and `.` with non-empty labels. Percent-encoded dots
/// (`%2E`, `%252E`, ...) and Unicode full stops (`。`, `．`, `｡`) fail the character check.
fn validate_host(host: &str) -> Result<(), Rejection> {
    if !host.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.') {
        return Err(Rejection::Malformed);
    }

    let name = host.strip_suffix('.').unwrap_or(host);
    if name.is_empty() || name.len() > MAX_HOST_LEN || name.split('.').any(str::is_empty) {
        return Err(Rejection::Malformed);
    }

    Ok(())
}

/// Re-encodes `path` and rewrites its tail to a single `api` segment.
fn canonical_api_path(path: &str) -> Option<String> {
    // Borrow the WHATWG path serializer for escaping; the host is never consulted.
    let mut url = Url::parse("https://service.invalid/").ok()?;
    url.set_path(path);

    let mut segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();

    let is_api = |segment: &str| segment.eq_ignore_ascii_case("api");
    let ends_with_api = segments.last().is_some_and(|last| is_api(last));
    let ends_with_api_v2 = match segments.as_slice() {
        [.., api, v2] => is_api(api) && v2.eq_ignore_ascii_case("v2"),
        _ => false,
    };

    if ends_with_api_v2 {
        segments.pop();
    } else if !ends_with_api {
        segments.push("api");
    }

    Some(format!("/{}", segments.join("/")))
}
