//! Client for condenser-style JSON-RPC content nodes.
//!
//! Implements the [`ContentApi`](threadline_core::ContentApi) and
//! [`AccountsApi`](threadline_core::AccountsApi) collaborators on top of
//! `condenser_api.get_content`, `condenser_api.get_content_replies` and
//! `condenser_api.get_accounts`.

pub mod api;
pub mod metrics;

pub use api::{CondenserApiClient, RpcRequest, RpcResponse};
pub use metrics::{ApiMetrics, CallOutcome, CallRecord, MethodMetrics, MetricsCollector};
