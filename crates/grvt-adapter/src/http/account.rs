/*
[INPUT]:  Sub-account id and session cookie
[OUTPUT]: Account summary with margin figures and positions
[POS]:    HTTP layer - account endpoints (session cookie required)
[UPDATE]: When adding new account endpoints
*/

use crate::error::Result;
use crate::http::GrvtRestClient;
use crate::types::AccountSummary;
use crate::types::requests::SubAccountRequest;

const ACCOUNT_SUMMARY: &str = "/full/v1/account_summary";

impl GrvtRestClient {
    /// POST /full/v1/account_summary
    pub async fn get_account_summary(&self, sub_account_id: u64) -> Result<AccountSummary> {
        let body = SubAccountRequest { sub_account_id };
        let mut summary: AccountSummary = self.post_private(ACCOUNT_SUMMARY, &body).await?;
        if summary.sub_account_id == 0 {
            summary.sub_account_id = sub_account_id;
        }
        Ok(summary)
    }
}
