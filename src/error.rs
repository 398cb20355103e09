//! Error types for the webhook configuration controller

use thiserror::Error;

/// Result type alias using the controller's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Controller error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// One or more options failed validation
    #[error("invalid options: {}", .0.join("; "))]
    InvalidOptions(Vec<String>),

    /// Desired state could not be built from the local inputs
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A local object cache never completed its initial sync
    #[error("Cache sync error: {0}")]
    CacheSync(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a cache sync error
    pub fn cache_sync(msg: impl Into<String>) -> Self {
        Error::CacheSync(msg.into())
    }

    /// Reason string for reporting a failed cluster API call.
    ///
    /// API errors carry the `Status.reason` reported by the apiserver;
    /// anything else (transport, serialization) is `Unknown`.
    pub fn reason(&self) -> String {
        match self {
            Error::Kube(kube::Error::Api(resp)) if !resp.reason.is_empty() => resp.reason.clone(),
            Error::Config(e) => e.reason().to_string(),
            _ => "Unknown".to_string(),
        }
    }

    /// Whether the error is a 404 from the apiserver
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(resp)) if resp.code == 404)
    }
}

/// A failure to turn the template and CA bundle into a desired
/// configuration. Retrying with the same inputs fails the same way.
#[derive(Error, Debug)]
#[error("{reason}: {message}")]
pub struct ConfigError {
    reason: &'static str,
    message: String,
}

impl ConfigError {
    pub const READ_TEMPLATE: &'static str = "could not read validatingwebhookconfiguration file";
    pub const READ_CA_BUNDLE: &'static str = "could not read caBundle file";
    pub const DECODE_TEMPLATE: &'static str = "could not decode validatingwebhookconfiguration file";
    pub const VERIFY_CA_BUNDLE: &'static str = "could not verify caBundle";

    pub fn new(reason: &'static str, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    /// Machine-readable reason, used as the metric label
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::error::ErrorResponse;

    fn api_error(code: u16, reason: &str) -> Error {
        Error::Kube(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: reason.to_string(),
            code,
        }))
    }

    #[test]
    fn test_reason_from_api_error() {
        assert_eq!(api_error(409, "Conflict").reason(), "Conflict");
        assert_eq!(api_error(500, "").reason(), "Unknown");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(api_error(404, "NotFound").is_not_found());
        assert!(!api_error(409, "Conflict").is_not_found());
        assert!(!Error::cache_sync("gone").is_not_found());
    }

    #[test]
    fn test_invalid_options_lists_every_cause() {
        let err = Error::InvalidOptions(vec![
            "invalid namespace: \"\"".to_string(),
            "CA cert file not specified".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("invalid namespace"));
        assert!(msg.contains("CA cert file not specified"));
    }

    #[test]
    fn test_config_error_display_includes_reason() {
        let err = ConfigError::new(ConfigError::VERIFY_CA_BUNDLE, "could not decode pem");
        assert_eq!(err.reason(), "could not verify caBundle");
        assert_eq!(
            err.to_string(),
            "could not verify caBundle: could not decode pem"
        );
    }
}
