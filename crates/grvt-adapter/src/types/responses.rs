/*
[INPUT]:  Raw REST response bodies
[OUTPUT]: Typed response envelopes
[POS]:    Data layer - response types for the REST surface
[UPDATE]: When response schemas change or new endpoints are added
*/

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::enums::OrderStatus;
use super::market::{Instrument, Trade};
use super::models::Order;
use super::serde_helpers;

fn default_open() -> OrderStatus {
    OrderStatus::Open
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    pub order_id: String,
    #[serde(default = "default_open")]
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderResponse {
    /// Falls back to the requested id when the venue omits it
    #[serde(default)]
    pub order_id: String,
    #[serde(default = "default_true")]
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAllOrdersResponse {
    #[serde(default, deserialize_with = "serde_helpers::deserialize_u64_lenient")]
    pub num_cancelled: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OpenOrdersResult {
    #[serde(default)]
    pub open_orders: Vec<Order>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OrderHistoryResult {
    #[serde(default)]
    pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct TradesResult {
    #[serde(default)]
    pub trades: Vec<Trade>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct InstrumentsResult {
    #[serde(default)]
    pub instruments: Vec<Instrument>,
}

/// Responses wrap their payload in `{"result": ...}`; some endpoints return it bare
pub(crate) fn unwrap_result(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("result") => {
            map.remove("result").unwrap_or(Value::Null)
        }
        other => other,
    }
}
