use std::fmt;

use thiserror::Error;

/// First release that serves applications under `app` instead of `chart/release`.
const APP_API_SINCE: [u32; 2] = [24, 10];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VersionError {
    #[error("no numeric version in {0:?}")]
    NoNumericPart(String),
}

/// Version-dependent path segment for the application-management API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPath {
    App,
    ChartRelease,
}

impl AppPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppPath::App => "app",
            AppPath::ChartRelease => "chart/release",
        }
    }

    pub fn for_version(version: &[u32]) -> Self {
        if version >= &APP_API_SINCE[..] {
            AppPath::App
        } else {
            AppPath::ChartRelease
        }
    }
}

impl fmt::Display for AppPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracts the numeric release from strings such as `TrueNAS-SCALE-24.04.2`,
/// `TrueNAS-24.10-MASTER-20240901` or `25.04.0`.
///
/// The first dash-separated segment starting with a digit is split on dots;
/// parsing stops at the first component that is not a plain number.
pub fn parse_version(raw: &str) -> Result<Vec<u32>, VersionError> {
    let segment = raw
        .trim()
        .trim_matches('"')
        .split('-')
        .find(|part| part.starts_with(|c: char| c.is_ascii_digit()))
        .ok_or_else(|| VersionError::NoNumericPart(raw.to_string()))?;

    let parts: Vec<u32> = segment
        .split('.')
        .map_while(|part| part.parse::<u32>().ok())
        .collect();

    if parts.is_empty() {
        return Err(VersionError::NoNumericPart(raw.to_string()));
    }
    Ok(parts)
}

pub fn format_version(version: &[u32]) -> String {
    version
        .iter()
        .map(|part| part.to_string())
        .collect::<Vec<_>>()
        .join(".")
}
