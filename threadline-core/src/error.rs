use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Content API error: {0}")]
    ContentApi(#[from] ContentApiError),

    #[error("{0}")]
    Thread(#[from] ThreadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// A non-root record the API no longer returns.
    #[error("No record for {resource}")]
    NotFound { resource: String },

    #[error("HTTP request failed: {message}")]
    RequestFailed {
        message: String,
        status_code: Option<u16>,
    },
}

/// Failures talking to a condenser API node.
#[derive(Error, Debug, Clone)]
pub enum ContentApiError {
    /// The node answered with a JSON-RPC `error` object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Node is throttling requests, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Node unavailable: {endpoint}")]
    EndpointUnavailable { endpoint: String },

    #[error("Node did not answer in time")]
    RequestTimeout,

    #[error("Unreadable RPC envelope: {details}")]
    InvalidResponse { details: String },

    #[error("Node returned HTTP {status_code}")]
    ServerError { status_code: u16 },
}

#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("Post @{author}/{permlink} does not exist")]
    RootNotFound { author: String, permlink: String },

    #[error("Could not list replies of @{author}/{permlink}: {source}")]
    TreeFetchFailure {
        author: String,
        permlink: String,
        #[source]
        source: Box<CoreError>,
    },

    /// One record or avatar lookup failed; the rest of the thread is intact.
    #[error("Degraded {target}: {reason}")]
    PartialFetchFailure { target: String, reason: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {path} could not be read")]
    FileNotFound { path: String },

    #[error("{field} = {value:?} is not valid")]
    InvalidValue { field: String, value: String },

    #[error("{reason}")]
    ValidationFailed { reason: String },

    #[error("Malformed TOML: {0}")]
    Parse(#[from] toml::de::Error),
}
