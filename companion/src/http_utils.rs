//! HTTP utility functions for consistent error handling across gateways

use reqwest::{Response, StatusCode};
use std::time::Duration;
use tracing::warn;

use crate::errors::{CompanionError, CompanionResult};

/// Shared client for gateway calls, bounded by `timeout`
pub fn build_http_client(timeout: Duration) -> CompanionResult<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| CompanionError::config(format!("Failed to build HTTP client: {}", e)))
}

/// Map transport failures (connect, timeout) to the gateway that saw them
pub fn transport_error(service: &str, error: reqwest::Error) -> CompanionError {
    match CompanionError::from(error) {
        CompanionError::GatewayUnavailable { message, .. } => {
            CompanionError::gateway_unavailable(service, message)
        }
        CompanionError::Unauthorized { message, .. } => CompanionError::unauthorized(service, message),
        other => other,
    }
}

/// Turn non-success statuses into gateway errors with logging
pub async fn check_gateway_response(response: Response, service: &str) -> CompanionResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    warn!("{} error: {} - {}", service, status, error_text);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(CompanionError::unauthorized(service, format!("{} - {}", status, error_text)));
    }
    Err(CompanionError::gateway_unavailable(
        service,
        format!("{} - {}", status, error_text),
    ))
}

/// Parse JSON response; an undecodable body is a gateway failure
pub async fn parse_json_response<T>(response: Response, service: &str, context: &str) -> CompanionResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(service, e))?;
    serde_json::from_str(&body).map_err(|e| {
        CompanionError::gateway_unavailable(service, format!("malformed {}: {}", context, e))
    })
}
