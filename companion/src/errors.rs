use thiserror::Error;

/// Structured error types for the free/busy companion
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompanionError {
    /// The redirect callback did not carry both tokens
    #[error("Authentication error: redirect is missing {parameter}")]
    MissingToken { parameter: String },

    /// The identity token could not be decoded as a claims payload
    #[error("Authentication error: identity token is malformed: {message}")]
    MalformedToken { message: String },

    /// The identity token decoded but lacks a required claim
    #[error("Authentication error: identity token has no '{claim}' claim")]
    MissingClaim { claim: String },

    /// The requested window is empty or inverted
    #[error("Validation error: invalid time range: {message}")]
    InvalidRange { message: String },

    /// The local time falls in a DST fold or gap for the zone
    #[error("Validation error: local time {local} is ambiguous or does not exist in {zone}")]
    AmbiguousLocalTime { local: String, zone: String },

    /// Calendar gateway could not answer (network, timeout, bad response)
    #[error("Gateway error: {service} unavailable: {message}")]
    GatewayUnavailable { service: String, message: String },

    /// Calendar gateway rejected the bearer token, or the session expired
    #[error("Gateway error: {service} rejected credentials: {message}")]
    Unauthorized { service: String, message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Parsing errors for configuration files and command-line input
    #[error("Parsing error: Failed to parse {format}: {message}")]
    Parsing { format: String, message: String },
}

/// Broad grouping used to decide how a failure is reported and retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Validation,
    Gateway,
    Configuration,
}

/// Result type alias using CompanionError
pub type CompanionResult<T> = std::result::Result<T, CompanionError>;

impl CompanionError {
    pub fn missing_token(parameter: impl Into<String>) -> Self {
        Self::MissingToken { parameter: parameter.into() }
    }

    pub fn malformed_token(message: impl Into<String>) -> Self {
        Self::MalformedToken { message: message.into() }
    }

    pub fn missing_claim(claim: impl Into<String>) -> Self {
        Self::MissingClaim { claim: claim.into() }
    }

    pub fn invalid_range(message: impl Into<String>) -> Self {
        Self::InvalidRange { message: message.into() }
    }

    pub fn gateway_unavailable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::GatewayUnavailable {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn unauthorized(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            service: service.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingToken { .. } | Self::MalformedToken { .. } | Self::MissingClaim { .. } => {
                ErrorCategory::Authentication
            }
            Self::InvalidRange { .. } | Self::AmbiguousLocalTime { .. } => ErrorCategory::Validation,
            Self::GatewayUnavailable { .. } | Self::Unauthorized { .. } => ErrorCategory::Gateway,
            Self::Config { .. } | Self::Parsing { .. } => ErrorCategory::Configuration,
        }
    }

    /// Only transient gateway failures are worth another attempt
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::GatewayUnavailable { .. })
    }

    /// The user has to go through the authorization redirect again
    pub fn requires_reauthentication(&self) -> bool {
        matches!(
            self,
            Self::MissingToken { .. }
                | Self::MalformedToken { .. }
                | Self::MissingClaim { .. }
                | Self::Unauthorized { .. }
        )
    }
}

/// Convert std::io::Error to CompanionError
impl From<std::io::Error> for CompanionError {
    fn from(error: std::io::Error) -> Self {
        Self::Config {
            message: error.to_string(),
        }
    }
}

/// Convert serde_json::Error to CompanionError
impl From<serde_json::Error> for CompanionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Parsing {
            format: "JSON".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert toml::de::Error to CompanionError
impl From<toml::de::Error> for CompanionError {
    fn from(error: toml::de::Error) -> Self {
        Self::Parsing {
            format: "TOML".to_string(),
            message: error.to_string(),
        }
    }
}

/// Convert reqwest::Error to CompanionError
impl From<reqwest::Error> for CompanionError {
    fn from(error: reqwest::Error) -> Self {
        let message = if error.is_timeout() {
            "request timed out".to_string()
        } else if error.is_connect() {
            format!("Connection failed: {}", error)
        } else if error.is_decode() {
            format!("malformed response: {}", error)
        } else {
            error.to_string()
        };

        match error.status() {
            Some(status) if status == reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized {
                service: "HTTP".to_string(),
                message,
            },
            _ => Self::GatewayUnavailable {
                service: "HTTP".to_string(),
                message,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(CompanionError::missing_token("id_token").category(), ErrorCategory::Authentication);
        assert_eq!(CompanionError::invalid_range("empty").category(), ErrorCategory::Validation);
        assert_eq!(
            CompanionError::unauthorized("backend", "401").category(),
            ErrorCategory::Gateway
        );
        assert_eq!(CompanionError::config("bad zone").category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_only_gateway_unavailable_is_recoverable() {
        assert!(CompanionError::gateway_unavailable("backend", "timeout").is_recoverable());
        assert!(!CompanionError::unauthorized("backend", "401").is_recoverable());
        assert!(!CompanionError::invalid_range("empty").is_recoverable());
    }

    #[test]
    fn test_reauthentication_kinds() {
        assert!(CompanionError::unauthorized("backend", "401").requires_reauthentication());
        assert!(CompanionError::missing_claim("sub").requires_reauthentication());
        assert!(!CompanionError::gateway_unavailable("backend", "502").requires_reauthentication());
    }
}
