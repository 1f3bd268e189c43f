use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error as ThisError;

use crate::model::ErrorCode;

/// Errors that abort a whole request. Per-model failures never end up here;
/// they are reported inline as [`crate::model::ModelResult::Failure`].
#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or malformed input
    #[error("{message}")]
    Validation { message: String },

    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// Orchestration broke in a way no single model can be blamed for
    #[error("Failed to {operation}")]
    Internal { operation: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation { message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to hand back to the caller.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::NotFound { .. } => self.to_string(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self)
            }
            Error::Validation { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self)
            }
        }

        let body = json!({
            "success": false,
            "error": self.user_message(),
        });
        (self.status_code(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure raised inside a provider adapter. Converted into an inline
/// failure result before it leaves the adapter.
#[derive(ThisError, Debug)]
pub enum ProviderError {
    #[error("{provider} API error ({status}): {message}")]
    Upstream {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("request to {provider} timed out")]
    Timeout { provider: &'static str },

    #[error("could not reach {provider}: {source}")]
    Network {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid response from {provider}: {message}")]
    InvalidResponse { provider: &'static str, message: String },
}

impl ProviderError {
    pub fn from_reqwest(provider: &'static str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout { provider }
        } else if err.is_decode() {
            ProviderError::InvalidResponse {
                provider,
                message: err.to_string(),
            }
        } else {
            ProviderError::Network { provider, source: err }
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::Upstream { .. } => ErrorCode::ProviderError,
            ProviderError::Timeout { .. } => ErrorCode::Timeout,
            ProviderError::Network { .. } => ErrorCode::NetworkError,
            ProviderError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
        }
    }
}
