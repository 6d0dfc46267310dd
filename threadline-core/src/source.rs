//! Remote collaborators consumed by the aggregation engine.

use crate::{CoreError, RawAccount, RawContent};
use async_trait::async_trait;

#[async_trait]
pub trait ContentApi: Send + Sync {
    /// Fetches a single record. `Ok(None)` when the API reports no record.
    async fn get_content(&self, author: &str, permlink: &str)
        -> Result<Option<RawContent>, CoreError>;

    /// Lists the direct replies of a record.
    async fn get_content_replies(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Vec<RawContent>, CoreError>;
}

#[async_trait]
pub trait AccountsApi: Send + Sync {
    /// Looks up many accounts in one request. Unknown names are omitted
    /// from the response.
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<RawAccount>, CoreError>;
}
