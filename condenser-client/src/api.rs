use crate::metrics::{ApiMetrics, CallOutcome, CallRecord, MetricsCollector};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use threadline_core::{
    AccountsApi, AppConfig, ContentApi, ContentApiError, CoreError, ErrorExt, RawAccount,
    RawContent,
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

const CONDENSER_API: &str = "condenser_api";

#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Value,
    pub id: String,
}

impl RpcRequest {
    pub fn condenser(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: format!("{}.{}", CONDENSER_API, method),
            params,
            id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    pub result: Option<T>,
    pub error: Option<RpcErrorBody>,
    pub id: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcErrorBody {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl<T> RpcResponse<T> {
    /// Splits the envelope into its result. A `null` result is `Ok(None)`.
    pub fn into_result(self) -> Result<Option<T>, CoreError> {
        match self.error {
            Some(body) => Err(CoreError::ContentApi(ContentApiError::Rpc {
                code: body.code,
                message: body.message,
            })),
            None => Ok(self.result),
        }
    }
}

/// Decodes a raw JSON-RPC response body.
pub fn parse_envelope<T: DeserializeOwned>(method: &str, body: &str) -> Result<Option<T>, CoreError> {
    let envelope: RpcResponse<T> = serde_json::from_str(body).map_err(|e| {
        error!("Failed to parse {} response: {}", method, e);
        CoreError::ContentApi(ContentApiError::InvalidResponse {
            details: format!("Failed to parse {} response", method),
        })
    })?;
    envelope.into_result()
}

/// JSON-RPC client for a condenser-style content API node.
#[derive(Debug)]
pub struct CondenserApiClient {
    http_client: Client,
    endpoint: Url,
    metrics: Arc<MetricsCollector>,
    user_agent: String,
}

impl CondenserApiClient {
    pub fn new(config: &AppConfig) -> Result<Self, CoreError> {
        let endpoint = Url::parse(&config.rpc_url).map_err(|_| CoreError::InvalidInput {
            message: format!("invalid RPC url: {}", config.rpc_url),
        })?;

        let http_client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            metrics: Arc::new(MetricsCollector::new()),
            user_agent: config.user_agent.clone(),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, CoreError> {
        let request = RpcRequest::condenser(method, params);
        let start_time = Instant::now();

        debug!("Calling {} (id {})", request.method, request.id);
        let (status_code, outcome) = self.execute::<T>(&request).await;

        self.metrics
            .record(CallRecord {
                method: request.method.clone(),
                elapsed: start_time.elapsed(),
                outcome: classify(status_code, &outcome),
                error_code: outcome.as_ref().err().map(|e| e.error_code()),
            })
            .await;

        outcome
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: &RpcRequest,
    ) -> (Option<u16>, Result<Option<T>, CoreError>) {
        let response = match self
            .http_client
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!("Network error for {}: {}", request.method, e);
                let error = if e.is_timeout() {
                    CoreError::ContentApi(ContentApiError::RequestTimeout)
                } else if e.is_connect() {
                    CoreError::ContentApi(ContentApiError::EndpointUnavailable {
                        endpoint: self.endpoint.to_string(),
                    })
                } else {
                    CoreError::Network(e)
                };
                return (None, Err(error));
            }
        };

        let status = response.status();
        if !status.is_success() {
            error!("Request failed with status: {} for {}", status, request.method);
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            return (
                Some(status.as_u16()),
                Err(status_error(status, retry_after, &self.endpoint)),
            );
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return (Some(status.as_u16()), Err(CoreError::Network(e))),
        };

        (Some(status.as_u16()), parse_envelope(&request.method, &body))
    }

    pub async fn get_metrics(&self) -> ApiMetrics {
        self.metrics.snapshot().await
    }

    pub async fn reset_metrics(&self) {
        self.metrics.reset().await;
    }
}

fn classify<T>(status_code: Option<u16>, outcome: &Result<T, CoreError>) -> CallOutcome {
    match (status_code, outcome) {
        (_, Ok(_)) => CallOutcome::Ok,
        (_, Err(CoreError::ContentApi(ContentApiError::RateLimitExceeded { .. }))) => {
            CallOutcome::RateLimited
        }
        (None, Err(_)) => CallOutcome::Transport,
        (Some(status), Err(_)) if (200..300).contains(&status) => CallOutcome::RpcError,
        (Some(status), Err(_)) => CallOutcome::HttpStatus(status),
    }
}

fn status_error(status: StatusCode, retry_after: Option<u64>, endpoint: &Url) -> CoreError {
    match status.as_u16() {
        429 => {
            let retry_after = retry_after.unwrap_or(60);
            warn!("Rate limited, retry after {} seconds", retry_after);
            CoreError::ContentApi(ContentApiError::RateLimitExceeded { retry_after })
        }
        404 => CoreError::ContentApi(ContentApiError::EndpointUnavailable {
            endpoint: endpoint.to_string(),
        }),
        code if status.is_server_error() => {
            CoreError::ContentApi(ContentApiError::ServerError { status_code: code })
        }
        code => CoreError::RequestFailed {
            message: format!("unexpected HTTP status {}", status),
            status_code: Some(code),
        },
    }
}

#[async_trait]
impl ContentApi for CondenserApiClient {
    async fn get_content(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Option<RawContent>, CoreError> {
        let content: Option<RawContent> = self
            .call("get_content", json!([author, permlink]))
            .await?;
        debug!("Retrieved content @{}/{}", author, permlink);
        Ok(content)
    }

    async fn get_content_replies(
        &self,
        author: &str,
        permlink: &str,
    ) -> Result<Vec<RawContent>, CoreError> {
        let replies: Vec<RawContent> = self
            .call("get_content_replies", json!([author, permlink]))
            .await?
            .unwrap_or_default();
        info!("Retrieved {} replies to @{}/{}", replies.len(), author, permlink);
        Ok(replies)
    }
}

#[async_trait]
impl AccountsApi for CondenserApiClient {
    async fn get_accounts(&self, names: &[String]) -> Result<Vec<RawAccount>, CoreError> {
        let accounts: Vec<RawAccount> = self
            .call("get_accounts", json!([names]))
            .await?
            .unwrap_or_default();
        debug!("Retrieved {} of {} accounts", accounts.len(), names.len());
        Ok(accounts)
    }
}
