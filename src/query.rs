//! Query-parameter vocabulary shared by resolvers, the delegate and the backend.

use std::fmt;
use std::str::FromStr;

/// Every query parameter the flow recognizes. The string tokens are wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryParam {
    ProjectIdentifier,
    ChainId,
    Address,
    Provider,
    State,
    Verifiers,
    CodeChallenge,
    CodeVerifier,
    Error,
    ErrorCode,
    ConnectorType,
    UserToken,
    RespondStrategy,
    OriginIdentifier,
    TargetOrigin,
    Code,
    CauseEvent,
    MessageSignRequired,
    Signature,
    UserIdentifier,
}

impl QueryParam {
    pub const ALL: [QueryParam; 20] = [
        Self::ProjectIdentifier,
        Self::ChainId,
        Self::Address,
        Self::Provider,
        Self::State,
        Self::Verifiers,
        Self::CodeChallenge,
        Self::CodeVerifier,
        Self::Error,
        Self::ErrorCode,
        Self::ConnectorType,
        Self::UserToken,
        Self::RespondStrategy,
        Self::OriginIdentifier,
        Self::TargetOrigin,
        Self::Code,
        Self::CauseEvent,
        Self::MessageSignRequired,
        Self::Signature,
        Self::UserIdentifier,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ProjectIdentifier => "project_identifier",
            Self::ChainId => "chain_id",
            Self::Address => "address",
            Self::Provider => "provider",
            Self::State => "state",
            Self::Verifiers => "verifiers",
            Self::CodeChallenge => "code_challenge",
            Self::CodeVerifier => "code_verifier",
            Self::Error => "error",
            Self::ErrorCode => "error_code",
            Self::ConnectorType => "connector_type",
            Self::UserToken => "user_token",
            Self::RespondStrategy => "respond_strategy",
            Self::OriginIdentifier => "origin_identifier",
            Self::TargetOrigin => "target_origin",
            Self::Code => "code",
            Self::CauseEvent => "cause_event",
            Self::MessageSignRequired => "message_sign_required",
            Self::Signature => "signature",
            Self::UserIdentifier => "user_identifier",
        }
    }
}

impl fmt::Display for QueryParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryParam {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|param| param.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// How `init` routes a configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigKey {
    /// Binds an identity resolver.
    Provider,
    /// Binds a communicator.
    RespondStrategy,
    /// Any other recognized parameter, stored verbatim.
    Param(QueryParam),
    /// Unrecognized key, stored verbatim.
    Custom(String),
}

impl ConfigKey {
    #[must_use]
    pub fn classify(key: &str) -> Self {
        match key.parse::<QueryParam>() {
            Ok(QueryParam::Provider) => Self::Provider,
            Ok(QueryParam::RespondStrategy) => Self::RespondStrategy,
            Ok(param) => Self::Param(param),
            Err(other) => Self::Custom(other),
        }
    }
}
