/*
[INPUT]:  API schema definitions and serde requirements
[OUTPUT]: Typed Rust structs/enums with serialization support
[POS]:    Data layer - type definitions for API communication and signing
[UPDATE]: When API schema changes or new types added
*/

pub mod enums;
pub mod fixed_point;
pub mod market;
pub mod models;
pub mod requests;
pub mod responses;
pub(crate) mod serde_helpers;

pub use enums::*;
pub use fixed_point::{PRICE_DECIMALS, SIZE_DECIMALS, from_fixed_point, to_fixed_point};
pub use market::*;
pub use models::*;
pub use requests::InstrumentFilter;
pub use responses::{CancelAllOrdersResponse, CancelOrderResponse, CreateOrderResponse};
