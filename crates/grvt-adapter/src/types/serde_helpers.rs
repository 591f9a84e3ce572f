/*
[INPUT]:  JSON values where the API mixes string and numeric encodings
[OUTPUT]: Reusable serde adapters
[POS]:    Data layer - serde glue for wire types
[UPDATE]: When the API changes how integers are quoted
*/

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    String(String),
    Unsigned(u64),
    Signed(i64),
}

/// Accepts `"123"` or `123`; 64-bit ids travel as strings to survive JS clients
pub fn deserialize_u64_lenient<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(value) => value.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Unsigned(value) => Ok(value),
        StringOrNumber::Signed(value) => u64::try_from(value).map_err(serde::de::Error::custom),
    }
}

/// Accepts `"123"` or `123` into a signed 64-bit value
pub fn deserialize_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(value) => value.trim().parse().map_err(serde::de::Error::custom),
        StringOrNumber::Unsigned(value) => i64::try_from(value).map_err(serde::de::Error::custom),
        StringOrNumber::Signed(value) => Ok(value),
    }
}

pub fn serialize_as_string<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(value)
}

/// Decimal from a string or number; null and empty strings read as zero
pub fn deserialize_decimal_or_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(Decimal::ZERO);
    }

    if let Some(raw) = value.as_str() {
        if raw.trim().is_empty() {
            return Ok(Decimal::ZERO);
        }
        return Decimal::from_str(raw.trim()).map_err(serde::de::Error::custom);
    }

    if value.is_number() {
        return Decimal::from_str(&value.to_string()).map_err(serde::de::Error::custom);
    }

    Err(serde::de::Error::custom("invalid decimal value"))
}

pub fn serialize_decimal<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_string())
}
