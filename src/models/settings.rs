//! Typed keys of Rectangle's `defaults` preference domain
//!
//! Every key obeys the round-trip law `from_string(to_string(v)) == v`.
//! Malformed input to `from_string` is a [`SettingsParseError`], never a
//! silently wrong value.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unexpected value for {key}: '{value}'")]
pub struct SettingsParseError {
    pub key: String,
    pub value: String,
}

/// An entry of the external preference store
pub trait SettingsKey: Send + Sync {
    type Value: Clone + PartialEq + Send + std::fmt::Debug;

    /// Key name inside the preference domain
    fn key(&self) -> &str;

    /// Type flag passed to `defaults` (`-int`, `-bool`, ...)
    fn type_flag(&self) -> &str;

    fn from_string(&self, raw: &str) -> Result<Self::Value, SettingsParseError>;

    fn to_string(&self, value: &Self::Value) -> String;

    fn parse_error(&self, raw: &str) -> SettingsParseError {
        SettingsParseError {
            key: self.key().to_string(),
            value: raw.to_string(),
        }
    }
}

/// Whether drag-to-snap stays disabled for apps ignored by Rectangle.
///
/// Rectangle stores this as a tri-state integer: `0` (unset, behaves as
/// enabled), `1` enabled, `2` disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IgnoreDragSnapToo;

impl SettingsKey for IgnoreDragSnapToo {
    type Value = bool;

    fn key(&self) -> &str {
        "ignoreDragSnapToo"
    }

    fn type_flag(&self) -> &str {
        "-int"
    }

    fn from_string(&self, raw: &str) -> Result<bool, SettingsParseError> {
        match raw.trim() {
            "0" | "1" => Ok(true),
            "2" => Ok(false),
            _ => Err(self.parse_error(raw)),
        }
    }

    fn to_string(&self, value: &bool) -> String {
        let raw = if *value { "1" } else { "2" };
        raw.to_string()
    }
}

/// Plain boolean key stored with `-bool`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoolKey {
    key: String,
}

impl BoolKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SettingsKey for BoolKey {
    type Value = bool;

    fn key(&self) -> &str {
        &self.key
    }

    fn type_flag(&self) -> &str {
        "-bool"
    }

    fn from_string(&self, raw: &str) -> Result<bool, SettingsParseError> {
        // `defaults read` prints booleans as 1/0
        match raw.trim() {
            "1" | "true" | "YES" => Ok(true),
            "0" | "false" | "NO" => Ok(false),
            _ => Err(self.parse_error(raw)),
        }
    }

    fn to_string(&self, value: &bool) -> String {
        value.to_string()
    }
}

/// Integer key stored with `-int`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntKey {
    key: String,
}

impl IntKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl SettingsKey for IntKey {
    type Value = i64;

    fn key(&self) -> &str {
        &self.key
    }

    fn type_flag(&self) -> &str {
        "-int"
    }

    fn from_string(&self, raw: &str) -> Result<i64, SettingsParseError> {
        raw.trim().parse().map_err(|_| self.parse_error(raw))
    }

    fn to_string(&self, value: &i64) -> String {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_round_trip<K: SettingsKey>(key: &K, values: &[K::Value]) {
        for value in values {
            let raw = key.to_string(value);
            assert_eq!(&key.from_string(&raw).unwrap(), value, "raw: {raw}");
        }
    }

    #[test]
    fn test_round_trip_law() {
        assert_round_trip(&IgnoreDragSnapToo, &[true, false]);
        assert_round_trip(&BoolKey::new("launchOnLogin"), &[true, false]);
        assert_round_trip(&IntKey::new("gapSize"), &[0, 7, -3, i64::MAX]);
    }

    #[test]
    fn test_ignore_drag_snap_tri_state() {
        assert_eq!(IgnoreDragSnapToo.from_string("0"), Ok(true));
        assert_eq!(IgnoreDragSnapToo.from_string("1"), Ok(true));
        assert_eq!(IgnoreDragSnapToo.from_string("2"), Ok(false));
        assert_eq!(IgnoreDragSnapToo.from_string("2\n"), Ok(false));
    }

    #[test]
    fn test_malformed_values_are_typed_errors() {
        let err = IgnoreDragSnapToo.from_string("3").unwrap_err();
        assert_eq!(err.key, "ignoreDragSnapToo");
        assert_eq!(err.value, "3");

        assert!(BoolKey::new("x").from_string("maybe").is_err());
        assert!(IntKey::new("x").from_string("1.5").is_err());
    }
}
