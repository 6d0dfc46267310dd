use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::RwLock;

/// How a single RPC call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    Ok,
    /// HTTP 200 carrying a JSON-RPC `error` object, or an unreadable envelope.
    RpcError,
    HttpStatus(u16),
    RateLimited,
    /// No HTTP response at all: timeout, refused connection, TLS.
    Transport,
}

impl CallOutcome {
    pub fn is_ok(self) -> bool {
        self == CallOutcome::Ok
    }
}

/// One finished RPC call.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub method: String,
    pub elapsed: Duration,
    pub outcome: CallOutcome,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodMetrics {
    pub calls: u64,
    pub failures: u64,
    pub total_time: Duration,
    pub slowest: Duration,
    pub last_error: Option<String>,
}

impl MethodMetrics {
    fn absorb(&mut self, record: &CallRecord) {
        self.calls += 1;
        self.total_time += record.elapsed;
        self.slowest = self.slowest.max(record.elapsed);
        if !record.outcome.is_ok() {
            self.failures += 1;
            self.last_error = record.error_code.clone();
        }
    }

    pub fn average_response_time(&self) -> Duration {
        mean(self.total_time, self.calls)
    }

    pub fn success_rate(&self) -> f64 {
        if self.calls == 0 {
            return 0.0;
        }
        (self.calls - self.failures) as f64 / self.calls as f64
    }
}

/// Aggregate view over every call the client has made.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub rate_limited_requests: u64,
    pub rpc_errors: u64,
    pub transport_errors: u64,
    pub total_response_time: Duration,
    pub last_request_time: Option<SystemTime>,
    pub errors_by_code: BTreeMap<String, u64>,
    pub requests_by_method: BTreeMap<String, MethodMetrics>,
}

impl ApiMetrics {
    pub fn average_response_time(&self) -> Duration {
        mean(self.total_response_time, self.total_requests)
    }

    fn absorb(&mut self, record: &CallRecord) {
        self.total_requests += 1;
        self.total_response_time += record.elapsed;
        self.last_request_time = Some(SystemTime::now());

        match record.outcome {
            CallOutcome::Ok => self.successful_requests += 1,
            CallOutcome::RpcError => self.rpc_errors += 1,
            CallOutcome::RateLimited => self.rate_limited_requests += 1,
            CallOutcome::Transport => self.transport_errors += 1,
            CallOutcome::HttpStatus(_) => {}
        }
        if !record.outcome.is_ok() {
            self.failed_requests += 1;
            if let Some(code) = &record.error_code {
                *self.errors_by_code.entry(code.clone()).or_default() += 1;
            }
        }

        self.requests_by_method
            .entry(record.method.clone())
            .or_default()
            .absorb(record);
    }
}

fn mean(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(count) => total / count,
        Err(_) => Duration::from_secs_f64(total.as_secs_f64() / count as f64),
    }
}

/// Shared, async-safe accumulator the client records into after each call.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<ApiMetrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: CallRecord) {
        self.metrics.write().await.absorb(&record);
    }

    pub async fn snapshot(&self) -> ApiMetrics {
        self.metrics.read().await.clone()
    }

    pub async fn method(&self, method: &str) -> Option<MethodMetrics> {
        self.metrics.read().await.requests_by_method.get(method).cloned()
    }

    pub async fn reset(&self) {
        *self.metrics.write().await = ApiMetrics::default();
    }

    pub async fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.snapshot().await)
    }
}
