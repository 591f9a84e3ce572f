/*
[INPUT]:  Instrument names and query parameters
[OUTPUT]: Order books, recent trades, instrument listings
[POS]:    HTTP layer - public market data endpoints (no auth required)
[UPDATE]: When adding new public endpoints or changing response format
*/

use crate::error::Result;
use crate::http::GrvtRestClient;
use crate::types::requests::{BookRequest, FilterFields, InstrumentsRequest, TradesRequest};
use crate::types::responses::{InstrumentsResult, TradesResult};
use crate::types::{Instrument, InstrumentFilter, Orderbook, Trade};

const BOOK: &str = "/full/v1/book";
const TRADES: &str = "/full/v1/trades";
const INSTRUMENTS: &str = "/full/v1/instruments";

impl GrvtRestClient {
    /// L2 book snapshot
    ///
    /// POST /full/v1/book
    pub async fn get_orderbook(&self, instrument: &str, depth: u32) -> Result<Orderbook> {
        let body = BookRequest { instrument, depth };
        let mut book: Orderbook = self.post_public(BOOK, &body).await?;
        if book.instrument.is_empty() {
            book.instrument = instrument.to_string();
        }
        Ok(book)
    }

    /// POST /full/v1/trades
    pub async fn get_recent_trades(&self, instrument: &str, limit: u32) -> Result<Vec<Trade>> {
        let body = TradesRequest { instrument, limit };
        let result: TradesResult = self.post_public(TRADES, &body).await?;
        Ok(result
            .trades
            .into_iter()
            .map(|mut trade| {
                if trade.instrument.is_empty() {
                    trade.instrument = instrument.to_string();
                }
                trade
            })
            .collect())
    }

    /// Active instruments matching `filter`
    ///
    /// POST /full/v1/instruments
    pub async fn get_instruments(&self, filter: &InstrumentFilter) -> Result<Vec<Instrument>> {
        let body = InstrumentsRequest {
            is_active: [true],
            filter: FilterFields::from(filter),
        };
        let result: InstrumentsResult = self.post_public(INSTRUMENTS, &body).await?;
        Ok(result.instruments)
    }
}
