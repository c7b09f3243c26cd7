//! Serde adapters for human-readable `std::time::Duration` fields.
//!
//! Configuration sections spell durations as `"30s"`, `"1m 30s"` or
//! `"250ms"`; parsing and formatting are delegated to the `humantime` crate.
//!
//! # Example
//! ```
//! use serde::{Serialize, Deserialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Shutdown {
//!     #[serde(with = "modular_utils::humantime_serde")]
//!     stop_timeout: Duration,
//! }
//! ```

use std::fmt;
use std::time::Duration;

use serde::{Deserializer, Serializer, de};

/// Deserialize a `Duration` from a humantime string.
///
/// # Errors
/// Fails when the input is not a string or not a valid humantime duration.
pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct DurationVisitor;

    impl de::Visitor<'_> for DurationVisitor {
        type Value = Duration;

        fn expecting(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
            fmt.write_str("a humantime duration string such as \"30s\"")
        }

        fn visit_str<E>(self, v: &str) -> Result<Duration, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    d.deserialize_str(DurationVisitor)
}

/// Serialize a `Duration` as a humantime string.
///
/// # Errors
/// Propagates serializer failures.
pub fn serialize<S>(value: &Duration, s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    s.collect_str(&humantime::format_duration(*value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Holder {
        #[serde(with = "crate::humantime_serde")]
        d: Duration,
    }

    #[test]
    fn roundtrip() {
        let h = Holder {
            d: Duration::from_secs(90),
        };
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, r#"{"d":"1m 30s"}"#);
        let back: Holder = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn rejects_garbage() {
        let res: Result<Holder, _> = serde_json::from_str(r#"{"d":"not a duration"}"#);
        assert!(res.is_err());
    }
}
