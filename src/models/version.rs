use semver::Version;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid version string '{input}': {reason}")]
pub struct VersionParseError {
    pub input: String,
    pub reason: String,
}

/// Version of the Rectangle application.
///
/// Rectangle releases are often tagged with only two components (`0.85`), so
/// a missing patch component is padded with `.0` before semantic parsing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AppVersion(Version);

impl AppVersion {
    /// First release that understands the `ignore-app` task
    pub fn min_with_ignore_app_task() -> Self {
        AppVersion(Version::new(0, 85, 0))
    }

    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        AppVersion(Version::new(major, minor, patch))
    }

    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let normalized = normalize(input);
        Version::parse(&normalized)
            .map(AppVersion)
            .map_err(|err| VersionParseError {
                input: input.to_string(),
                reason: err.to_string(),
            })
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }

    pub fn supports_ignore_app_task(&self) -> bool {
        *self >= Self::min_with_ignore_app_task()
    }
}

/// Pad `major.minor` to `major.minor.0`, leaving anything else untouched
pub fn normalize(input: &str) -> String {
    let trimmed = input.trim();
    let core = trimmed.split(['-', '+']).next().unwrap_or(trimmed);
    if core.split('.').count() == 2 {
        let suffix = &trimmed[core.len()..];
        format!("{core}.0{suffix}")
    } else {
        trimmed.to_string()
    }
}

impl FromStr for AppVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppVersion::parse(s)
    }
}

impl fmt::Display for AppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl serde::Serialize for AppVersion {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_component_version_is_padded() {
        assert_eq!(normalize("0.85"), "0.85.0");
        assert_eq!(AppVersion::parse("0.85").unwrap(), AppVersion::new(0, 85, 0));
    }

    #[test]
    fn test_three_component_version_passes_through() {
        assert_eq!(normalize("0.85.3"), "0.85.3");
        assert_eq!(AppVersion::parse("0.85.3").unwrap().to_string(), "0.85.3");
    }

    #[test]
    fn test_surrounding_whitespace_from_mdls() {
        assert_eq!(AppVersion::parse(" 0.86\n").unwrap(), AppVersion::new(0, 86, 0));
    }

    #[test]
    fn test_pre_release_suffix_is_kept() {
        let version = AppVersion::parse("0.90-beta.1").unwrap();
        assert_eq!(version.to_string(), "0.90.0-beta.1");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(AppVersion::parse("(null)").is_err());
        assert!(AppVersion::parse("").is_err());
    }

    #[test]
    fn test_ignore_app_task_threshold() {
        assert!(!AppVersion::parse("0.84").unwrap().supports_ignore_app_task());
        assert!(AppVersion::parse("0.85").unwrap().supports_ignore_app_task());
        assert!(AppVersion::parse("0.85.3").unwrap().supports_ignore_app_task());
        assert!(AppVersion::parse("1.0").unwrap().supports_ignore_app_task());
    }
}
