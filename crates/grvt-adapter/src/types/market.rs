/*
[INPUT]:  Public market-data responses and private stream push payloads
[OUTPUT]: Typed instruments, books, trades, fills, order updates, positions
[POS]:    Data layer - read-side payloads delivered by REST and the stream
[UPDATE]: When the venue adds fields to market data or push events
*/

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::enums::{Kind, OrderStatus, Side};
use super::serde_helpers;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    pub instrument: String,
    #[serde(default)]
    pub instrument_hash: String,
    #[serde(default)]
    pub base: String,
    #[serde(default)]
    pub quote: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Kind>,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub tick_size: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub min_size: Decimal,
    #[serde(default)]
    pub base_decimals: u32,
    /// Fields this crate does not model yet
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderbookLevel {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(default)]
    pub num_orders: u32,
}

/// L2 snapshot for one instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Orderbook {
    #[serde(default)]
    pub instrument: String,
    #[serde(default)]
    pub bids: Vec<OrderbookLevel>,
    #[serde(default)]
    pub asks: Vec<OrderbookLevel>,
    #[serde(default, deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    pub sequence_number: u64,
}

impl Orderbook {
    pub fn best_bid(&self) -> Option<&OrderbookLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderbookLevel> {
        self.asks.first()
    }

    pub fn mid_price(&self) -> Option<Decimal> {
        let bid = self.best_bid()?.price;
        let ask = self.best_ask()?.price;
        Some((bid + ask) / Decimal::TWO)
    }
}

/// A public trade print.
///
/// Accepts both the stream shape (`side`, `timestamp`) and the REST shape
/// (`is_taker_buyer`, `created_time`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trade {
    pub trade_id: String,
    pub instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    /// Taker side
    pub side: Side,
    pub timestamp: i64,
}

#[derive(Deserialize)]
struct TradeWire {
    trade_id: String,
    #[serde(default)]
    instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    #[serde(default)]
    side: Option<Side>,
    #[serde(default)]
    is_taker_buyer: Option<bool>,
    #[serde(
        alias = "created_time",
        deserialize_with = "serde_helpers::deserialize_i64_lenient"
    )]
    timestamp: i64,
}

impl<'de> Deserialize<'de> for Trade {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = TradeWire::deserialize(deserializer)?;
        let side = match (wire.side, wire.is_taker_buyer) {
            (Some(side), _) => side,
            (None, Some(true)) => Side::Buy,
            (None, Some(false)) => Side::Sell,
            (None, None) => {
                return Err(serde::de::Error::missing_field("side"));
            }
        };
        Ok(Trade {
            trade_id: wire.trade_id,
            instrument: wire.instrument,
            price: wire.price,
            size: wire.size,
            side,
            timestamp: wire.timestamp,
        })
    }
}

/// Partial or full execution pushed on the private fills stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub fill_id: String,
    pub order_id: String,
    #[serde(deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    pub client_order_id: u64,
    pub instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    pub side: Side,
    /// Negative for maker rebates
    #[serde(with = "rust_decimal::serde::str")]
    pub fee: Decimal,
    #[serde(deserialize_with = "serde_helpers::deserialize_i64_lenient")]
    pub timestamp: i64,
    #[serde(default)]
    pub is_maker: bool,
}

/// Order lifecycle event: ack, partial fill, fill, cancel or reject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    #[serde(deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    pub client_order_id: u64,
    pub instrument: String,
    pub status: OrderStatus,
    #[serde(with = "rust_decimal::serde::str")]
    pub filled_size: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub remaining_size: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub avg_fill_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, deserialize_with = "serde_helpers::deserialize_i64_lenient")]
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub size: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub avg_entry_price: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub unrealised_pnl: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub realised_pnl: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub margin: Decimal,
}

/// Margin and positions for one sub-account; missing figures read as zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSummary {
    #[serde(default, deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    pub sub_account_id: u64,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub total_equity: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub available_margin: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub initial_margin: Decimal,
    #[serde(
        default,
        deserialize_with = "serde_helpers::deserialize_decimal_or_zero",
        serialize_with = "serde_helpers::serialize_decimal"
    )]
    pub maintenance_margin: Decimal,
    #[serde(default)]
    pub positions: Vec<Position>,
}
