//! Offsets and offset keys
//!
//! An [`Offset`] is the only address a record ever gets: the byte position of
//! its payload in the log file and the payload's length (delimiter excluded).
//!
//! Callers may hand an offset back in three interchangeable encodings, all
//! captured by [`OffsetKey`]:
//!
//! - a string `"START_LENGTH"` (the [`Display`] form of an offset)
//! - a two-element pair `[START, LENGTH]`
//! - a structured record `{ "start": START, "length": LENGTH }`
//!
//! [`OffsetKey::normalize`] is the single point where any of them becomes a
//! canonical [`Offset`].

use std::fmt::Display;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::KeyError;

/// Byte-range key of one record's payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Offset {
    /// Position of the first payload byte
    pub start: u64,
    /// Payload length in bytes, excluding the delimiter
    pub length: u64,
}

impl Offset {
    /// Create a new offset
    pub fn new(start: u64, length: u64) -> Self {
        Self { start, length }
    }

    /// Exclusive end of the payload
    pub fn end(&self) -> u64 {
        self.start + self.length
    }

    /// Position of the record that follows this one
    pub fn next_start(&self, delimiter_len: usize) -> u64 {
        self.end().saturating_add(delimiter_len as u64)
    }

    /// Build an offset, rejecting ranges whose end is not addressable
    fn checked(start: u64, length: u64) -> Result<Self, KeyError> {
        start
            .checked_add(length)
            .map(|_| Self { start, length })
            .ok_or(KeyError::Overflow { start, length })
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.start, self.length)
    }
}

impl FromStr for Offset {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, length) = s
            .split_once('_')
            .ok_or_else(|| KeyError::Malformed(s.to_string()))?;
        Self::checked(parse_component(start)?, parse_component(length)?)
    }
}

fn parse_component(part: &str) -> Result<u64, KeyError> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::NotAnInteger(part.to_string()));
    }
    part.parse()
        .map_err(|_| KeyError::NotAnInteger(part.to_string()))
}

fn integer_component(value: &Value) -> Result<u64, KeyError> {
    value
        .as_u64()
        .ok_or_else(|| KeyError::NotAnInteger(value.to_string()))
}

/// An offset in any of its accepted encodings
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OffsetKey {
    /// `"START_LENGTH"`, validated on normalization
    Text(String),
    /// `[START, LENGTH]`
    Pair(u64, u64),
    /// `{ start, length }`
    Record(Offset),
}

impl OffsetKey {
    /// Normalize to a canonical offset
    pub fn normalize(&self) -> Result<Offset, KeyError> {
        match self {
            Self::Text(text) => text.parse(),
            Self::Pair(start, length) => Offset::checked(*start, *length),
            Self::Record(offset) => Offset::checked(offset.start, offset.length),
        }
    }
}

impl TryFrom<&Value> for OffsetKey {
    type Error = KeyError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Array(items) if items.len() == 2 => Ok(Self::Pair(
                integer_component(&items[0])?,
                integer_component(&items[1])?,
            )),
            Value::Object(fields) => match (fields.get("start"), fields.get("length")) {
                (Some(start), Some(length)) => Ok(Self::Record(Offset::new(
                    integer_component(start)?,
                    integer_component(length)?,
                ))),
                _ => Err(KeyError::Malformed(value.to_string())),
            },
            other => Err(KeyError::Malformed(other.to_string())),
        }
    }
}

impl Serialize for OffsetKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text(text) => text.serialize(serializer),
            Self::Pair(start, length) => (start, length).serialize(serializer),
            Self::Record(offset) => offset.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for OffsetKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::try_from(&value).map_err(D::Error::custom)
    }
}

impl From<Offset> for OffsetKey {
    fn from(offset: Offset) -> Self {
        Self::Record(offset)
    }
}

impl From<&Offset> for OffsetKey {
    fn from(offset: &Offset) -> Self {
        Self::Record(*offset)
    }
}

impl From<(u64, u64)> for OffsetKey {
    fn from((start, length): (u64, u64)) -> Self {
        Self::Pair(start, length)
    }
}

impl From<[u64; 2]> for OffsetKey {
    fn from([start, length]: [u64; 2]) -> Self {
        Self::Pair(start, length)
    }
}

impl From<&str> for OffsetKey {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for OffsetKey {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_three_encodings_normalize_to_same_offset() {
        let expected = Offset::new(10, 8);
        let keys = [
            OffsetKey::from("10_8"),
            OffsetKey::from((10u64, 8u64)),
            OffsetKey::from(Offset::new(10, 8)),
        ];
        for key in keys {
            assert_eq!(key.normalize().unwrap(), expected);
        }
    }

    #[test]
    fn test_display_round_trips_through_text_key() {
        let offset = Offset::new(1234, 56);
        assert_eq!(offset.to_string(), "1234_56");
        assert_eq!(OffsetKey::from(offset.to_string()).normalize().unwrap(), offset);
    }

    #[test]
    fn test_malformed_text_keys() {
        assert!(matches!("".parse::<Offset>(), Err(KeyError::Malformed(_))));
        assert!(matches!("12".parse::<Offset>(), Err(KeyError::Malformed(_))));
        assert!(matches!("a_1".parse::<Offset>(), Err(KeyError::NotAnInteger(_))));
        assert!(matches!("1_".parse::<Offset>(), Err(KeyError::NotAnInteger(_))));
        assert!(matches!("-1_2".parse::<Offset>(), Err(KeyError::NotAnInteger(_))));
        assert!(matches!("1_2_3".parse::<Offset>(), Err(KeyError::NotAnInteger(_))));
        assert!(matches!(" 1_2".parse::<Offset>(), Err(KeyError::NotAnInteger(_))));
    }

    #[test]
    fn test_overflowing_key_rejected() {
        let key = OffsetKey::Pair(u64::MAX, 1);
        assert_eq!(
            key.normalize(),
            Err(KeyError::Overflow { start: u64::MAX, length: 1 })
        );
    }

    #[test]
    fn test_keys_from_json() {
        let text: OffsetKey = serde_json::from_value(json!("0_8")).unwrap();
        let pair: OffsetKey = serde_json::from_value(json!([0, 8])).unwrap();
        let record: OffsetKey = serde_json::from_value(json!({"start": 0, "length": 8})).unwrap();

        for key in [text, pair, record] {
            assert_eq!(key.normalize().unwrap(), Offset::new(0, 8));
        }
    }

    #[test]
    fn test_invalid_json_keys() {
        for value in [
            json!([1]),
            json!([1, 2, 3]),
            json!([1.5, 2]),
            json!([-1, 2]),
            json!({"start": 1}),
            json!(true),
            json!(null),
        ] {
            assert!(OffsetKey::try_from(&value).is_err(), "accepted {value}");
            assert!(serde_json::from_value::<OffsetKey>(value).is_err());
        }
    }

    #[test]
    fn test_key_serializes_in_its_own_encoding() {
        assert_eq!(serde_json::to_value(OffsetKey::from("3_4")).unwrap(), json!("3_4"));
        assert_eq!(serde_json::to_value(OffsetKey::Pair(3, 4)).unwrap(), json!([3, 4]));
        assert_eq!(
            serde_json::to_value(OffsetKey::from(Offset::new(3, 4))).unwrap(),
            json!({"start": 3, "length": 4})
        );
    }

    #[test]
    fn test_next_start() {
        let offset = Offset::new(0, 8);
        assert_eq!(offset.end(), 8);
        assert_eq!(offset.next_start(2), 10);
    }
}
