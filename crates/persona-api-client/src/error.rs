//! Client error types

use persona_core::{ApiError, TransferError};

/// Shown for network failures, kept distinct from anything the server said.
pub const NETWORK_ERROR_MESSAGE: &str = "Network error, please check your connection and try again";

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn api_error(&self) -> Option<&ApiError> {
        match self {
            ClientError::Api(err) => Some(err),
            _ => None,
        }
    }

    /// The structured error's own message, or `fallback` for anything else.
    pub fn resolved_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Api(err) => err.message.clone(),
            _ => fallback.to_string(),
        }
    }

    /// Copy suitable for showing to an operator.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ClientError::Api(err) => err.user_message(fallback),
            ClientError::Transport(_) => NETWORK_ERROR_MESSAGE.to_string(),
            ClientError::Encode(_) | ClientError::Decode(_) => fallback.to_string(),
        }
    }
}

/// Failure while importing a character-image transfer payload.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Invalid(#[from] TransferError),

    #[error("Copied {copied} of {total} images; copying {file_id} failed: {source}")]
    Copy {
        copied: usize,
        total: usize,
        file_id: String,
        #[source]
        source: ClientError,
    },
}
