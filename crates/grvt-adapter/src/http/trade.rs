/*
[INPUT]:  Signed orders, sub-account ids, order ids, instrument filters
[OUTPUT]: Order acknowledgements, cancellations, open and historical orders
[POS]:    HTTP layer - trading endpoints (session cookie required)
[UPDATE]: When adding new trading endpoints or changing order flow
*/

use reqwest::StatusCode;

use crate::error::{GrvtError, Result};
use crate::http::GrvtRestClient;
use crate::types::requests::{FilterFields, FilteredSubAccountRequest, OrderIdRequest};
use crate::types::responses::{OpenOrdersResult, OrderHistoryResult};
use crate::types::{
    CancelAllOrdersResponse, CancelOrderResponse, CreateOrderResponse, InstrumentFilter, Order,
};

const CREATE_ORDER: &str = "/full/v1/order";
const CANCEL_ORDER: &str = "/full/v1/cancel_order";
const CANCEL_ALL_ORDERS: &str = "/full/v1/cancel_all_orders";
const OPEN_ORDERS: &str = "/full/v1/open_orders";
const ORDER_HISTORY: &str = "/full/v1/order_history";

impl GrvtRestClient {
    /// Submit a signed order
    ///
    /// POST /full/v1/order
    pub async fn create_order(&self, order: &Order) -> Result<CreateOrderResponse> {
        if !order.is_signed() {
            return Err(GrvtError::validation(
                "order must be signed before it is submitted",
            ));
        }
        self.post_private(CREATE_ORDER, order).await
    }

    /// POST /full/v1/cancel_order
    pub async fn cancel_order(&self, sub_account_id: u64, order_id: &str) -> Result<CancelOrderResponse> {
        let body = OrderIdRequest {
            sub_account_id,
            order_id,
        };
        let mut response: CancelOrderResponse = self.post_private(CANCEL_ORDER, &body).await?;
        if response.order_id.is_empty() {
            response.order_id = order_id.to_string();
        }
        Ok(response)
    }

    /// POST /full/v1/cancel_all_orders
    pub async fn cancel_all_orders(
        &self,
        sub_account_id: u64,
        filter: &InstrumentFilter,
    ) -> Result<CancelAllOrdersResponse> {
        let body = FilteredSubAccountRequest {
            sub_account_id,
            filter: FilterFields::from(filter),
        };
        self.post_private(CANCEL_ALL_ORDERS, &body).await
    }

    /// POST /full/v1/open_orders
    pub async fn get_open_orders(
        &self,
        sub_account_id: u64,
        filter: &InstrumentFilter,
    ) -> Result<Vec<Order>> {
        let body = FilteredSubAccountRequest {
            sub_account_id,
            filter: FilterFields::from(filter),
        };
        let result: OpenOrdersResult = self.post_private(OPEN_ORDERS, &body).await?;
        Ok(result.open_orders)
    }

    /// Look up one order by exchange id
    ///
    /// POST /full/v1/order_history
    pub async fn get_order(&self, sub_account_id: u64, order_id: &str) -> Result<Order> {
        let body = OrderIdRequest {
            sub_account_id,
            order_id,
        };
        let result: OrderHistoryResult = self.post_private(ORDER_HISTORY, &body).await?;
        result.orders.into_iter().next().ok_or_else(|| {
            GrvtError::api(
                StatusCode::NOT_FOUND,
                "POST",
                ORDER_HISTORY,
                format!("order {order_id} not found"),
            )
        })
    }
}
