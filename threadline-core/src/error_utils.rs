use crate::error::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::time::Duration;
use tracing::{error, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Classification shared by every error type in the crate.
///
/// Implementors supply the code, retryability and the message shown to the
/// reader; logging and the default retry delay are derived from those.
pub trait ErrorExt: Display + Debug {
    fn error_code(&self) -> String;
    fn is_retryable(&self) -> bool;
    fn user_friendly_message(&self) -> String;

    fn retry_after(&self) -> Option<Duration> {
        self.is_retryable().then_some(DEFAULT_RETRY_DELAY)
    }

    fn log_error(&self) -> &Self {
        error!(code = %self.error_code(), "{}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!(code = %self.error_code(), retryable = self.is_retryable(), "{}", self);
        self
    }
}

impl ErrorExt for CoreError {
    fn error_code(&self) -> String {
        let code = match self {
            CoreError::ContentApi(_) => "CONTENT_API",
            CoreError::Thread(e) => return e.error_code(),
            CoreError::Config(_) => "CONFIG",
            CoreError::Network(_) => "NETWORK",
            CoreError::InvalidInput { .. } => "INVALID_INPUT",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::RequestFailed { .. } => "REQUEST_FAILED",
        };
        code.to_string()
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::ContentApi(e) => e.is_retryable(),
            CoreError::Thread(e) => e.is_retryable(),
            CoreError::Network(_) => true,
            CoreError::RequestFailed { status_code, .. } => {
                matches!(status_code, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::ContentApi(e) => e.retry_after(),
            CoreError::Thread(e) => e.retry_after(),
            _ => self.is_retryable().then_some(DEFAULT_RETRY_DELAY),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::ContentApi(e) => e.user_friendly_message(),
            CoreError::Thread(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Network(_) => {
                "Could not reach the API node. Check the connection and RPC URL.".to_string()
            }
            CoreError::InvalidInput { message } => format!("Invalid input: {}", message),
            CoreError::NotFound { resource } => format!("Could not find: {}", resource),
            CoreError::RequestFailed { message, .. } => format!("Request failed: {}", message),
        }
    }

    fn log_error(&self) -> &Self {
        let code = self.error_code();
        match self {
            CoreError::ContentApi(e) => error!(code = %code, detail = ?e, "{}", self),
            CoreError::Thread(e) => error!(code = %code, detail = ?e, "{}", self),
            CoreError::Config(e) => error!(code = %code, detail = ?e, "{}", self),
            _ => error!(code = %code, "{}", self),
        }
        self
    }
}

impl ErrorExt for ContentApiError {
    fn error_code(&self) -> String {
        let code = match self {
            ContentApiError::Rpc { .. } => "CONTENT_RPC_ERROR",
            ContentApiError::RateLimitExceeded { .. } => "CONTENT_RATE_LIMIT",
            ContentApiError::EndpointUnavailable { .. } => "CONTENT_ENDPOINT_UNAVAILABLE",
            ContentApiError::RequestTimeout => "CONTENT_TIMEOUT",
            ContentApiError::InvalidResponse { .. } => "CONTENT_INVALID_RESPONSE",
            ContentApiError::ServerError { .. } => "CONTENT_SERVER_ERROR",
        };
        code.to_string()
    }

    fn is_retryable(&self) -> bool {
        match self {
            ContentApiError::RateLimitExceeded { .. }
            | ContentApiError::RequestTimeout
            | ContentApiError::EndpointUnavailable { .. } => true,
            ContentApiError::ServerError { status_code } => *status_code >= 500,
            ContentApiError::Rpc { .. } | ContentApiError::InvalidResponse { .. } => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ContentApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ => self.is_retryable().then_some(Duration::from_secs(30)),
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ContentApiError::RateLimitExceeded { retry_after } => format!(
                "The API node is throttling requests. Wait {} seconds and retry.",
                retry_after
            ),
            ContentApiError::RequestTimeout => {
                "The API node did not answer in time. Please try again.".to_string()
            }
            ContentApiError::EndpointUnavailable { endpoint } => {
                format!("The API node {} is unavailable. Please try again.", endpoint)
            }
            ContentApiError::Rpc { message, .. } => {
                format!("The API node rejected the request: {}", message)
            }
            ContentApiError::InvalidResponse { .. } | ContentApiError::ServerError { .. } => {
                "The API node returned an unusable answer. Please try again later.".to_string()
            }
        }
    }
}

impl ErrorExt for ThreadError {
    fn error_code(&self) -> String {
        let code = match self {
            ThreadError::RootNotFound { .. } => "NOT_FOUND",
            ThreadError::TreeFetchFailure { .. } => "TREE_FETCH_FAILURE",
            ThreadError::PartialFetchFailure { .. } => "PARTIAL_FETCH_FAILURE",
        };
        code.to_string()
    }

    fn is_retryable(&self) -> bool {
        match self {
            ThreadError::RootNotFound { .. } => false,
            ThreadError::TreeFetchFailure { source, .. } => source.is_retryable(),
            ThreadError::PartialFetchFailure { .. } => true,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            ThreadError::TreeFetchFailure { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ThreadError::RootNotFound { .. } => {
                "This post could not be found. It may have been deleted.".to_string()
            }
            ThreadError::TreeFetchFailure { .. } => {
                "Comments failed to load. Please retry.".to_string()
            }
            ThreadError::PartialFetchFailure { target, .. } => {
                format!("Some details for {} could not be loaded.", target)
            }
        }
    }
}

impl ErrorExt for ConfigError {
    fn error_code(&self) -> String {
        let code = match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND",
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE",
            ConfigError::ValidationFailed { .. } => "CONFIG_VALIDATION_FAILED",
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR",
        };
        code.to_string()
    }

    fn is_retryable(&self) -> bool {
        false
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' was not found.", path)
            }
            ConfigError::InvalidValue { field, value } => {
                format!("Configuration field '{}' has an invalid value '{}'.", field, value)
            }
            ConfigError::ValidationFailed { reason } => {
                format!("Configuration is invalid: {}", reason)
            }
            ConfigError::Parse(_) => {
                "Configuration file could not be read.".to_string()
            }
        }
    }
}

/// Clonable snapshot of an error, suitable for holding in UI-facing state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl<E: ErrorExt> From<&E> for ErrorDescriptor {
    fn from(error: &E) -> Self {
        Self {
            code: error.error_code(),
            message: error.user_friendly_message(),
            retryable: error.is_retryable(),
        }
    }
}

/// Routes errors that reach the binary to the log.
#[derive(Debug, Clone, Copy)]
pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if !self.report_errors {
            return;
        }
        error.log_error();
        info!("{}", error.user_friendly_message());
        if let Some(delay) = error.retry_after() {
            info!("Retryable after {:?}", delay);
        }
    }

    /// Reports an error that was already folded into state.
    pub fn report_descriptor(&self, scope: &str, descriptor: &ErrorDescriptor) {
        if self.report_errors {
            error!(
                code = %descriptor.code,
                retryable = descriptor.retryable,
                "{} failed: {}",
                scope,
                descriptor.message
            );
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}
