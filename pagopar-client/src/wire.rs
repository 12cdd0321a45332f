//! Serde helpers for Pagopar's loosely typed JSON.
//!
//! The service is inconsistent about scalar types: amounts and identifiers
//! arrive as numbers on some endpoints and as strings on others. Amounts use
//! `serde_with`'s `PickFirst<(_, DisplayFromStr)>` directly; identifiers go
//! through [`NumberOrString`], which `serde_with` has no built-in for.
//! Timestamps use Pagopar's own layout and are handled by the `with` modules
//! below.

use chrono::{DateTime, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Deserializer, Serializer};
use serde_with::{DeserializeAs, SerializeAs};

/// `String` from a string or a number; always serialized as a string.
///
/// Use as `#[serde_as(as = "wire::NumberOrString")]`.
pub(crate) struct NumberOrString;

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScalar {
    Text(String),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
}

impl SerializeAs<String> for NumberOrString {
    fn serialize_as<S: Serializer>(source: &String, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(source)
    }
}

impl<'de> DeserializeAs<'de, String> for NumberOrString {
    fn deserialize_as<D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match RawScalar::deserialize(deserializer)? {
            RawScalar::Text(s) => s,
            RawScalar::Unsigned(n) => n.to_string(),
            RawScalar::Signed(n) => n.to_string(),
            RawScalar::Float(f) => f.to_string(),
        })
    }
}

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parses the timestamp layouts Pagopar emits: `2024-05-01 13:45:00`, the
/// same with a `T` separator or fractional seconds, or RFC 3339.
pub(crate) fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

/// Local timestamp, written as `YYYY-MM-DD HH:MM:SS`.
pub(crate) mod datetime {
    use serde::de::Error as _;

    use super::*;

    pub(crate) fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(DATETIME_FORMAT))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_datetime(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp '{raw}'")))
    }
}

/// Time of day, written as `HH:MM:SS`; `HH:MM` is accepted on input.
pub(crate) mod time_of_day {
    use serde::de::Error as _;

    use super::*;

    pub(crate) fn serialize<S: Serializer>(value: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format("%H:%M:%S"))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(raw.trim(), "%H:%M:%S%.f")
            .or_else(|_| NaiveTime::parse_from_str(raw.trim(), "%H:%M"))
            .map_err(|_| D::Error::custom(format!("invalid time of day '{raw}'")))
    }
}
