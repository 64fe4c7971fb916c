use std::fmt;

use semver::Version;
use serde_json::Value;

use crate::{
    consts::{MAX_SAFE_INTEGER, MIN_NON_LEGACY_SERVICE_VERSION},
    error::{Result, SafeError},
    hex::describe,
};

/// Version reported by the transaction service.
///
/// Only major, minor and patch take part in comparisons; pre-release and build metadata
/// are kept for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceVersion(Version);

impl ServiceVersion {
    /// Parses `[v]MAJOR.MINOR.PATCH[-PRERELEASE][+BUILD]`.
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(SafeError::Required("Version is required".into()));
        }

        let invalid = || SafeError::InvalidFormat(format!("Invalid Safe API version: {input}"));

        let unprefixed = trimmed.strip_prefix(['v', 'V']).unwrap_or(trimmed);
        let version = Version::parse(unprefixed).map_err(|_| invalid())?;

        let numeric_prerelease = version
            .pre
            .as_str()
            .split('.')
            .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
        for id in numeric_prerelease {
            match id.parse::<u64>() {
                Ok(n) if n <= MAX_SAFE_INTEGER => {}
                _ => return Err(invalid()),
            }
        }

        if [version.major, version.minor, version.patch].iter().any(|n| *n > MAX_SAFE_INTEGER) {
            return Err(invalid());
        }

        Ok(Self(version))
    }

    /// Loosely typed variant of [`ServiceVersion::parse`].
    pub fn parse_value(input: &Value) -> Result<Self> {
        match input {
            Value::Null => Err(SafeError::Required("Version is required".into())),
            Value::String(s) => Self::parse(s),
            other => Err(SafeError::InvalidFormat(format!(
                "Invalid Safe API version: {}",
                describe(other)
            ))),
        }
    }

    pub fn core(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }

    pub fn semver(&self) -> &Version {
        &self.0
    }

    /// Services older than 5.18.0 only serve the `v1` transaction endpoints.
    pub fn is_legacy(&self) -> bool {
        self.core() < MIN_NON_LEGACY_SERVICE_VERSION
    }
}

impl fmt::Display for ServiceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

pub fn is_legacy_service(version: &str) -> Result<bool> {
    ServiceVersion::parse(version).map(|version| version.is_legacy())
}

/// Service API generation used to shape requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn for_service(version: &ServiceVersion) -> Self {
        match version.is_legacy() {
            true => ApiVersion::V1,
            false => ApiVersion::V2,
        }
    }

    pub fn path_segment(&self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}
