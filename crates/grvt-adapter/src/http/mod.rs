/*
[INPUT]:  REST configuration, credential provider, API endpoints
[OUTPUT]: Typed API results from trading and market-data hosts
[POS]:    HTTP layer - REST API communication
[UPDATE]: When adding new endpoints or changing client behavior
*/

pub mod account;
pub mod client;
pub mod public;
pub mod trade;

pub use client::GrvtRestClient;
