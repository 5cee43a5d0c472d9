//! Turning non-success responses into structured errors.

use persona_core::{ApiError, ErrorMetadata, LogLevel};
use reqwest::Response;
use serde::de::DeserializeOwned;

use crate::error::ClientError;

/// Build a structured error from a non-success response.
///
/// Never fails: a body that cannot be read or parsed yields the generic
/// "Request failed with status N" message.
pub async fn build_error(response: Response, fallback_message: &str) -> ApiError {
    let status = response.status().as_u16();
    let err = match response.bytes().await {
        Ok(body) => ApiError::from_body(status, &body, fallback_message),
        Err(_) => ApiError::unparsed(status),
    };
    log_api_error(&err);
    err
}

fn log_api_error(err: &ApiError) {
    match err.log_level() {
        LogLevel::Error => tracing::error!(
            status = err.status_code,
            code = err.error_code(),
            message = %err.message,
            "API request failed"
        ),
        LogLevel::Warn => tracing::warn!(
            status = err.status_code,
            code = err.error_code(),
            message = %err.message,
            "API request failed"
        ),
        LogLevel::Debug => tracing::debug!(
            status = err.status_code,
            code = err.error_code(),
            message = %err.message,
            "API request failed"
        ),
    }
}

/// Pass a 2xx response through, or convert it into [`ClientError::Api`].
pub(crate) async fn expect_success(
    response: Response,
    fallback_message: &str,
) -> Result<Response, ClientError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(build_error(response, fallback_message).await.into())
    }
}

/// Deserialize a 2xx JSON response.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: Response,
    fallback_message: &str,
) -> Result<T, ClientError> {
    let response = expect_success(response, fallback_message).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}
