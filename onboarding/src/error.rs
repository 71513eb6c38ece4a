// Client error taxonomy
//
// Flat on purpose: validation problems the user can correct, network/parse failures against our
// backend, and failures reported by third-party services (bank validation, payments).
// Every variant keeps a user-facing message; internal details only go to the log.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// A required field is missing or a value has the wrong format.
    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    /// Transport failure, timeout, or a body we could not parse.
    #[error("Network error occurred")]
    Network { details: String },

    /// The backend answered but reported a failure.
    #[error("{message}")]
    Api { status: u16, message: String },

    /// Bank validation or payment provider failure.
    #[error("{message}")]
    ExternalService { service: String, message: String },

    /// No usable session on this device.
    #[error("{0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn network(details: impl Into<String>) -> Self {
        Self::Network {
            details: details.into(),
        }
    }

    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Title used by alert modals.
    pub fn alert_title(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "Validation Error",
            Self::Network { .. } => "Network Error",
            Self::Api { .. } => "Request Failed",
            Self::ExternalService { .. } => "Service Error",
            Self::Session(_) => "Session",
            Self::Config(_) => "Configuration Error",
        }
    }

    /// External-service failures offer retry/cancel; everything else is a plain alert.
    pub fn is_retryable_by_user(&self) -> bool {
        matches!(self, Self::ExternalService { .. })
    }

    /// Internal details for logs (may contain more than the user-facing message).
    pub fn log_details(&self) -> String {
        match self {
            Self::Network { details } => details.clone(),
            Self::Api { status, message } => format!("HTTP {}: {}", status, message),
            Self::ExternalService { service, message } => format!("{}: {}", service, message),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        Self::network(e.to_string())
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        Self::network(format!("Response parse error: {}", e))
    }
}
