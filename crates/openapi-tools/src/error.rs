use std::time::Duration;
use thiserror::Error;

/// Bridge error taxonomy.
///
/// Startup errors ([`is_fatal`](BridgeError::is_fatal) returns true) abort
/// registry construction; everything else is scoped to a single tool
/// invocation and leaves the registry serving.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The OpenAPI document could not be parsed at all.
    #[error("failed to parse OpenAPI document from '{location}': {source}")]
    SpecParse {
        location: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document parsed but violates a structural expectation.
    #[error("OpenAPI document error: {0}")]
    SpecSchema(String),

    /// The configured role has no mapping and is not the built-in `all`.
    #[error("unknown role '{0}'; define it under `roles` or use the built-in 'all'")]
    UnknownRole(String),

    /// Two operations synthesized the same tool name.
    #[error("tool name collision: {0}")]
    NameCollision(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Caller-supplied arguments failed strict input validation.
    #[error("invalid arguments: {0}")]
    InvalidArgument(String),

    #[error("no tool named '{0}'")]
    ToolNotFound(String),

    /// The backend response does not fit the declared response schema and
    /// could not be coerced by the relaxation rules.
    #[error("response shape error: {0}")]
    ResponseShape(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("rate limited by backend: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl BridgeError {
    /// True for errors that must abort startup rather than fail one call.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::SpecParse { .. }
                | BridgeError::SpecSchema(_)
                | BridgeError::UnknownRole(_)
                | BridgeError::NameCollision(_)
                | BridgeError::Config(_)
                | BridgeError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert!(BridgeError::UnknownRole("noc".into()).is_fatal());
        assert!(BridgeError::NameCollision("get_devices".into()).is_fatal());
        assert!(BridgeError::SpecSchema("no paths".into()).is_fatal());
    }

    #[test]
    fn invocation_errors_are_recoverable() {
        assert!(!BridgeError::ToolNotFound("nope".into()).is_fatal());
        assert!(!BridgeError::Timeout("30s elapsed".into()).is_fatal());
        assert!(
            !BridgeError::RateLimited {
                message: "429".into(),
                retry_after: Some(Duration::from_secs(3)),
            }
            .is_fatal()
        );
    }
}
