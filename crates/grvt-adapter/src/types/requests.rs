/*
[INPUT]:  Caller parameters for REST calls
[OUTPUT]: Serializable request bodies in the venue's wire shape
[POS]:    Data layer - request envelopes for the REST surface
[UPDATE]: When request schemas change or new endpoints are added
*/

use serde::Serialize;

use super::enums::Kind;
use super::serde_helpers;

/// Optional kind/base/quote filter shared by several endpoints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstrumentFilter {
    pub kind: Option<Kind>,
    pub base: Option<String>,
    pub quote: Option<String>,
}

impl InstrumentFilter {
    pub fn kind(mut self, kind: Kind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }

    pub fn quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = Some(quote.into());
        self
    }
}

/// The venue expects each filter as a one-element list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub(crate) struct FilterFields {
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<[Kind; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    base: Option<[String; 1]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quote: Option<[String; 1]>,
}

impl From<&InstrumentFilter> for FilterFields {
    fn from(filter: &InstrumentFilter) -> Self {
        Self {
            kind: filter.kind.map(|kind| [kind]),
            base: filter.base.clone().map(|base| [base]),
            quote: filter.quote.clone().map(|quote| [quote]),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SubAccountRequest {
    #[serde(serialize_with = "serde_helpers::serialize_as_string")]
    pub sub_account_id: u64,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OrderIdRequest<'a> {
    #[serde(serialize_with = "serde_helpers::serialize_as_string")]
    pub sub_account_id: u64,
    pub order_id: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FilteredSubAccountRequest {
    #[serde(serialize_with = "serde_helpers::serialize_as_string")]
    pub sub_account_id: u64,
    #[serde(flatten)]
    pub filter: FilterFields,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct InstrumentsRequest {
    pub is_active: [bool; 1],
    #[serde(flatten)]
    pub filter: FilterFields,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct BookRequest<'a> {
    pub instrument: &'a str,
    pub depth: u32,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TradesRequest<'a> {
    pub instrument: &'a str,
    pub limit: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_serializes_as_lists() {
        let filter = InstrumentFilter::default().kind(Kind::Perpetual).base("BTC");
        let body = FilteredSubAccountRequest {
            sub_account_id: 7,
            filter: FilterFields::from(&filter),
        };
        assert_eq!(
            serde_json::to_value(body).unwrap(),
            json!({"sub_account_id": "7", "kind": [1], "base": ["BTC"]})
        );
    }

    #[test]
    fn test_instruments_request_default_filter() {
        let body = InstrumentsRequest {
            is_active: [true],
            filter: FilterFields::default(),
        };
        assert_eq!(serde_json::to_value(body).unwrap(), json!({"is_active": [true]}));
    }
}
