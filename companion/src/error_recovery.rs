use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

use crate::errors::{CompanionError, CompanionResult, ErrorCategory};

/// Error recovery strategies for gateway calls
pub struct ErrorRecovery;

impl ErrorRecovery {
    /// Run `operation`, and run it once more after `backoff` if the first
    /// failure is recoverable. The second outcome is final.
    pub async fn retry_once<F, Fut, T>(operation: F, backoff: Duration, operation_name: &str) -> CompanionResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CompanionResult<T>>,
    {
        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(error) if error.is_recoverable() => error,
            Err(error) => {
                error!("{} failed with non-recoverable error: {}", operation_name, error);
                return Err(error);
            }
        };

        warn!("{} failed: {}. Retrying in {:?}", operation_name, error, backoff);
        sleep(backoff).await;

        match operation().await {
            Ok(result) => {
                debug!("{} succeeded on retry", operation_name);
                Ok(result)
            }
            Err(error) => {
                error!("{} failed after retry: {}", operation_name, error);
                Err(error)
            }
        }
    }

    /// User-facing advice for errors that end an availability check
    pub fn advice(error: &CompanionError) -> &'static str {
        match error.category() {
            _ if error.requires_reauthentication() => {
                "Sign in again: run 'freebusy-companion auth-url' and follow the link."
            }
            ErrorCategory::Validation => "Check the date and times you entered.",
            ErrorCategory::Gateway => {
                "Availability could not be determined; the calendar service did not answer. Try again shortly."
            }
            ErrorCategory::Configuration => "Check the configuration file and environment overrides.",
            ErrorCategory::Authentication => "Sign in again.",
        }
    }
}
