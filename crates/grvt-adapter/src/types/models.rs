/*
[INPUT]:  Caller-supplied order fields or raw API order payloads
[OUTPUT]: Validated Order / OrderLeg / OrderMetadata / Signature values
[POS]:    Data layer - order model; every constructor and setter validates
[UPDATE]: When the order schema or signed fields change
*/

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{B256, U256};
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::enums::TimeInForce;
use super::fixed_point::{PRICE_DECIMALS, SIZE_DECIMALS, to_fixed_point};
use super::serde_helpers;
use crate::error::{GrvtError, Result};

/// Parse a strictly positive decimal without precision loss
fn parse_positive_decimal(field: &str, raw: &str) -> Result<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(GrvtError::validation(format!(
            "{field} must be a non-empty decimal string"
        )));
    }
    let value = Decimal::from_str_exact(trimmed)
        .map_err(|e| GrvtError::validation(format!("{field} '{raw}' is not a valid decimal: {e}")))?;
    ensure_positive(field, value)
}

fn ensure_positive(field: &str, value: Decimal) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Err(GrvtError::validation(format!(
            "{field} must be positive, got '{value}'"
        )));
    }
    Ok(value)
}

fn parse_instrument_hash(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() {
        return Err(GrvtError::validation(
            "instrument_hash must be a non-empty hex string",
        ));
    }
    if digits.len() > 64 {
        return Err(GrvtError::validation(format!(
            "instrument_hash '{raw}' is longer than 32 bytes"
        )));
    }
    U256::from_str_radix(digits, 16)
        .map_err(|_| GrvtError::validation(format!("instrument_hash '{raw}' is not valid hex")))
}

/// One leg of an order.
///
/// Immutable once built; the scaled on-chain values are computed at
/// construction so a leg that exists can always be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLeg {
    instrument_hash: String,
    instrument_id: U256,
    size: Decimal,
    limit_price: Decimal,
    size_scaled: u64,
    limit_price_scaled: u64,
    is_buying_asset: bool,
}

impl OrderLeg {
    /// Build a leg from decimal strings, e.g. `OrderLeg::new("0x030501", "0.01", "65038.1", true)`
    pub fn new(
        instrument_hash: &str,
        size: &str,
        limit_price: &str,
        is_buying_asset: bool,
    ) -> Result<Self> {
        let size = parse_positive_decimal("size", size)?;
        let limit_price = parse_positive_decimal("limit_price", limit_price)?;
        Self::from_decimals(instrument_hash, size, limit_price, is_buying_asset)
    }

    pub fn from_decimals(
        instrument_hash: &str,
        size: Decimal,
        limit_price: Decimal,
        is_buying_asset: bool,
    ) -> Result<Self> {
        let instrument_id = parse_instrument_hash(instrument_hash)?;
        let size = ensure_positive("size", size)?;
        let limit_price = ensure_positive("limit_price", limit_price)?;
        let size_scaled = to_fixed_point(size, SIZE_DECIMALS)?;
        let limit_price_scaled = to_fixed_point(limit_price, PRICE_DECIMALS)?;

        Ok(Self {
            instrument_hash: instrument_hash.trim().to_string(),
            instrument_id,
            size,
            limit_price,
            size_scaled,
            limit_price_scaled,
            is_buying_asset,
        })
    }

    pub fn instrument_hash(&self) -> &str {
        &self.instrument_hash
    }

    /// Instrument hash as the `uint256` that is signed
    pub fn instrument_id(&self) -> U256 {
        self.instrument_id
    }

    pub fn size(&self) -> Decimal {
        self.size
    }

    pub fn limit_price(&self) -> Decimal {
        self.limit_price
    }

    pub fn size_scaled(&self) -> u64 {
        self.size_scaled
    }

    pub fn limit_price_scaled(&self) -> u64 {
        self.limit_price_scaled
    }

    pub fn is_buying_asset(&self) -> bool {
        self.is_buying_asset
    }
}

#[derive(Serialize, Deserialize)]
struct OrderLegWire {
    #[serde(alias = "instrument_hash")]
    instrument: String,
    size: String,
    limit_price: String,
    is_buying_asset: bool,
}

impl Serialize for OrderLeg {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        OrderLegWire {
            instrument: self.instrument_hash.clone(),
            size: self.size.to_string(),
            limit_price: self.limit_price.to_string(),
            is_buying_asset: self.is_buying_asset,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OrderLeg {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = OrderLegWire::deserialize(deserializer)?;
        OrderLeg::new(
            &wire.instrument,
            &wire.size,
            &wire.limit_price,
            wire.is_buying_asset,
        )
        .map_err(serde::de::Error::custom)
    }
}

/// Off-chain metadata attached to every order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderMetadata {
    client_order_id: u32,
    create_time: i64,
}

impl OrderMetadata {
    /// `client_order_id` must fit u32; `create_time` is unix nanoseconds and non-negative
    pub fn new(client_order_id: u64, create_time: i64) -> Result<Self> {
        let client_order_id = u32::try_from(client_order_id).map_err(|_| {
            GrvtError::validation(format!(
                "client_order_id must be a uint32, got {client_order_id}"
            ))
        })?;
        if create_time < 0 {
            return Err(GrvtError::validation(
                "create_time must be a non-negative unix nanosecond timestamp",
            ));
        }
        Ok(Self {
            client_order_id,
            create_time,
        })
    }

    /// Random client order id stamped with the current time
    pub fn generate() -> Self {
        let client_order_id = rand::thread_rng().gen_range(1..=u32::MAX);
        let create_time = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        Self {
            client_order_id,
            create_time,
        }
    }

    pub fn client_order_id(&self) -> u32 {
        self.client_order_id
    }

    pub fn create_time(&self) -> i64 {
        self.create_time
    }
}

#[derive(Serialize, Deserialize)]
struct OrderMetadataWire {
    #[serde(deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    client_order_id: u64,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_i64_lenient",
        serialize_with = "serde_helpers::serialize_as_string"
    )]
    create_time: i64,
}

impl Serialize for OrderMetadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        OrderMetadataWire {
            client_order_id: u64::from(self.client_order_id),
            create_time: self.create_time,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for OrderMetadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = OrderMetadataWire::deserialize(deserializer)?;
        OrderMetadata::new(wire.client_order_id, wire.create_time).map_err(serde::de::Error::custom)
    }
}

/// Secp256k1 signature over the order's structured-data digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature {
    r: B256,
    s: B256,
    v: u8,
}

impl Signature {
    /// `v` may be given as a recovery id (0/1) or in Ethereum form (27/28)
    pub fn new(r: B256, s: B256, v: u8) -> Result<Self> {
        let v = match v {
            0 | 1 => v + 27,
            27 | 28 => v,
            other => {
                return Err(GrvtError::Signing(format!("invalid signature v value {other}")));
            }
        };
        Ok(Self { r, s, v })
    }

    /// `v` already normalized to 27/28
    pub(crate) fn from_parts(r: B256, s: B256, v: u8) -> Self {
        Self { r, s, v }
    }

    pub fn r(&self) -> B256 {
        self.r
    }

    pub fn s(&self) -> B256 {
        self.s
    }

    /// Ethereum-style `v` (27 or 28)
    pub fn v(&self) -> u8 {
        self.v
    }

    /// Raw recovery id (0 or 1)
    pub fn recovery_id(&self) -> u8 {
        self.v - 27
    }

    /// `r || s || v`
    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(self.r.as_slice());
        out[32..64].copy_from_slice(self.s.as_slice());
        out[64] = self.v;
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 65 {
            return Err(GrvtError::Signing(format!(
                "signature must be 65 bytes, got {}",
                bytes.len()
            )));
        }
        Self::new(
            B256::from_slice(&bytes[..32]),
            B256::from_slice(&bytes[32..64]),
            bytes[64],
        )
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = GrvtError;

    fn from_str(s: &str) -> Result<Self> {
        let digits = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        let bytes = hex::decode(digits)
            .map_err(|e| GrvtError::Signing(format!("signature is not valid hex: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A fully constructed order.
///
/// Fields are private: every setter re-validates and drops any signature,
/// so a signed order is always the order that was signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    sub_account_id: u64,
    time_in_force: TimeInForce,
    expiration: i64,
    legs: Vec<OrderLeg>,
    metadata: OrderMetadata,
    post_only: bool,
    reduce_only: bool,
    signature: Option<Signature>,
    order_id: Option<String>,
}

impl Order {
    /// `expiration` is unix nanoseconds, e.g. year 2100 is ~4_102_444_800_000_000_000
    pub fn new(
        sub_account_id: u64,
        time_in_force: TimeInForce,
        expiration: i64,
        legs: Vec<OrderLeg>,
        metadata: OrderMetadata,
    ) -> Result<Self> {
        validate_sub_account_id(sub_account_id)?;
        validate_expiration(expiration)?;
        validate_legs(&legs)?;
        Ok(Self {
            sub_account_id,
            time_in_force,
            expiration,
            legs,
            metadata,
            post_only: false,
            reduce_only: false,
            signature: None,
            order_id: None,
        })
    }

    pub fn with_post_only(mut self, post_only: bool) -> Self {
        self.set_post_only(post_only);
        self
    }

    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.set_reduce_only(reduce_only);
        self
    }

    pub fn sub_account_id(&self) -> u64 {
        self.sub_account_id
    }

    pub fn time_in_force(&self) -> TimeInForce {
        self.time_in_force
    }

    pub fn expiration(&self) -> i64 {
        self.expiration
    }

    pub fn legs(&self) -> &[OrderLeg] {
        &self.legs
    }

    pub fn metadata(&self) -> &OrderMetadata {
        &self.metadata
    }

    pub fn post_only(&self) -> bool {
        self.post_only
    }

    pub fn reduce_only(&self) -> bool {
        self.reduce_only
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Exchange-assigned id, present on orders read back from the API
    pub fn order_id(&self) -> Option<&str> {
        self.order_id.as_deref()
    }

    pub fn set_sub_account_id(&mut self, sub_account_id: u64) -> Result<()> {
        validate_sub_account_id(sub_account_id)?;
        self.sub_account_id = sub_account_id;
        self.invalidate_signature();
        Ok(())
    }

    pub fn set_time_in_force(&mut self, time_in_force: TimeInForce) {
        self.time_in_force = time_in_force;
        self.invalidate_signature();
    }

    pub fn set_expiration(&mut self, expiration: i64) -> Result<()> {
        validate_expiration(expiration)?;
        self.expiration = expiration;
        self.invalidate_signature();
        Ok(())
    }

    pub fn set_legs(&mut self, legs: Vec<OrderLeg>) -> Result<()> {
        validate_legs(&legs)?;
        self.legs = legs;
        self.invalidate_signature();
        Ok(())
    }

    pub fn push_leg(&mut self, leg: OrderLeg) {
        self.legs.push(leg);
        self.invalidate_signature();
    }

    pub fn set_metadata(&mut self, metadata: OrderMetadata) {
        self.metadata = metadata;
        self.invalidate_signature();
    }

    pub fn set_post_only(&mut self, post_only: bool) {
        self.post_only = post_only;
        self.invalidate_signature();
    }

    pub fn set_reduce_only(&mut self, reduce_only: bool) {
        self.reduce_only = reduce_only;
        self.invalidate_signature();
    }

    /// Attach a signature produced by the signing engine
    pub(crate) fn attach_signature(&mut self, signature: Signature) {
        self.signature = Some(signature);
    }

    pub fn clear_signature(&mut self) {
        self.signature = None;
    }

    fn invalidate_signature(&mut self) {
        if self.signature.take().is_some() {
            tracing::debug!(
                client_order_id = self.metadata.client_order_id,
                "order mutated after signing; signature dropped"
            );
        }
    }
}

fn validate_sub_account_id(sub_account_id: u64) -> Result<()> {
    if sub_account_id == 0 {
        return Err(GrvtError::validation("sub_account_id must be positive, got 0"));
    }
    Ok(())
}

fn validate_expiration(expiration: i64) -> Result<()> {
    if expiration < 0 {
        return Err(GrvtError::validation(format!(
            "expiration must be a non-negative unix nanosecond timestamp, got {expiration}"
        )));
    }
    Ok(())
}

fn validate_legs(legs: &[OrderLeg]) -> Result<()> {
    if legs.is_empty() {
        return Err(GrvtError::validation("order must have at least one leg"));
    }
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct OrderWire {
    #[serde(
        deserialize_with = "serde_helpers::deserialize_u64_lenient",
        serialize_with = "serde_helpers::serialize_as_string"
    )]
    sub_account_id: u64,
    time_in_force: TimeInForce,
    #[serde(
        deserialize_with = "serde_helpers::deserialize_i64_lenient",
        serialize_with = "serde_helpers::serialize_as_string"
    )]
    expiration: i64,
    legs: Vec<OrderLeg>,
    metadata: OrderMetadata,
    #[serde(default)]
    post_only: bool,
    #[serde(default)]
    reduce_only: bool,
    #[serde(default, deserialize_with = "deserialize_optional_signature")]
    signature: Option<Signature>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
}

fn deserialize_optional_signature<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Signature>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl Serialize for Order {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        OrderWire {
            sub_account_id: self.sub_account_id,
            time_in_force: self.time_in_force,
            expiration: self.expiration,
            legs: self.legs.clone(),
            metadata: self.metadata,
            post_only: self.post_only,
            reduce_only: self.reduce_only,
            signature: self.signature,
            order_id: self.order_id.clone(),
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Order {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let wire = OrderWire::deserialize(deserializer)?;
        let mut order = Order::new(
            wire.sub_account_id,
            wire.time_in_force,
            wire.expiration,
            wire.legs,
            wire.metadata,
        )
        .map_err(serde::de::Error::custom)?;
        order.post_only = wire.post_only;
        order.reduce_only = wire.reduce_only;
        order.signature = wire.signature;
        order.order_id = wire.order_id;
        Ok(order)
    }
}
