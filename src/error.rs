use std::time::Duration;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An adapter method that needs a transport was called before a channel was attached.
    #[error("channel is not defined")]
    ChannelIsNotDefined,

    /// The backend rejected the project identifier.
    #[error("invalid project identifier: {0}")]
    InvalidProjectId(String),

    #[error("storage is not connected")]
    StorageIsNotConnected,

    /// A store was used outside the runtime it requires.
    #[error("unsuitable platform: {0}")]
    UnsuitablePlatform(String),

    #[error("project identifier missing")]
    ProjectIdentifierMissing,

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("unknown respond strategy: {0}")]
    UnknownRespondStrategy(String),

    #[error("no identity resolver bound")]
    ResolverNotBound,

    #[error("no frozen authentication state")]
    NoFrozenState,

    #[error("unsupported frozen state version {0}")]
    UnsupportedFrozenState(u32),

    /// Returned state did not match what was stored before navigation.
    #[error("state mismatch")]
    StateMismatch,

    /// A `target_origin` outside the configured allowlist.
    #[error("target origin not allowed: {0}")]
    InvalidTargetOrigin(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    /// Identity provider reported an error on the way back.
    #[error("provider error {code}: {message}")]
    Provider { code: String, message: String },

    #[error("{operation} failed (status {status:?}): {detail}")]
    Backend {
        operation: &'static str,
        status: Option<u16>,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Stable `error_code` reported to the initiating window.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::ChannelIsNotDefined => "channel_is_not_defined",
            Self::InvalidProjectId(_) => "invalid_project_id",
            Self::StorageIsNotConnected => "storage_is_not_connected",
            Self::UnsuitablePlatform(_) => "unsuitable_platform",
            Self::ProjectIdentifierMissing => "project_identifier_missing",
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport_error",
            Self::UnknownProvider(_) => "unknown_provider",
            Self::UnknownRespondStrategy(_) => "unknown_respond_strategy",
            Self::ResolverNotBound => "resolver_not_bound",
            Self::NoFrozenState => "no_frozen_state",
            Self::UnsupportedFrozenState(_) => "unsupported_frozen_state",
            Self::StateMismatch => "state_mismatch",
            Self::InvalidTargetOrigin(_) => "invalid_target_origin",
            Self::MissingParameter(_) => "missing_parameter",
            Self::Provider { code, .. } => code,
            Self::Backend { .. } => "backend_error",
            Self::Config(_) => "configuration_error",
            #[cfg(feature = "http")]
            Self::Http(_) => "network_error",
            Self::Json(_) => "serialization_error",
            Self::Io(_) => "io_error",
            Self::Url(_) => "invalid_url",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_keeps_its_own_code() {
        let err = Error::Provider {
            code: "access_denied".into(),
            message: "user cancelled".into(),
        };
        assert_eq!(err.code(), "access_denied");
        assert_eq!(err.to_string(), "provider error access_denied: user cancelled");
    }

    #[test]
    fn backend_error_message() {
        let err = Error::Backend {
            operation: "user registration",
            status: Some(500),
            detail: "boom".into(),
        };
        assert_eq!(err.code(), "backend_error");
        assert!(err.to_string().contains("user registration failed"));
    }
}
