use std::collections::BTreeMap;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::query::QueryParam;

/// Project identifier issued by the authentication backend.
///
/// Sent as the project identity header on every backend call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct ProjectId(pub String);

/// Caller-supplied identifier of the end user, forwarded to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserIdentifier(pub String);

/// Tokens issued by `POST /token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access: String,
    pub refresh: String,
}

/// Registered session, persisted under `session_{provider}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Session {
    pub provider: String,
    #[serde(default)]
    pub connector_type: Option<String>,
    pub tokens: AuthTokens,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Session {
    #[must_use]
    pub fn new(provider: impl Into<String>, tokens: AuthTokens) -> Self {
        Self {
            provider: provider.into(),
            connector_type: None,
            tokens,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn with_connector_type(mut self, connector_type: impl Into<String>) -> Self {
        self.connector_type = Some(connector_type.into());
        self
    }

    /// Storage key the session lives under.
    #[must_use]
    pub fn storage_key(provider: &str) -> String {
        format!("session_{provider}")
    }
}

/// Payload posted to `POST /token`. One variant per flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UserRegistrationArgument {
    Web3 {
        provider: String,
        address: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
        message_sign_required: bool,
    },
    Web2 {
        provider: String,
        code: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        challenge: Option<String>,
        /// PKCE verifier the backend presents when exchanging `code`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code_verifier: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<String>,
    },
}

impl UserRegistrationArgument {
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Web3 { provider, .. } | Self::Web2 { provider, .. } => provider,
        }
    }
}

/// The minimal arguments needed to rebuild a delegate after a reload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuthenticationDelegateInitArgs {
    pub provider: String,
    pub respond_strategy: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl AuthenticationDelegateInitArgs {
    #[must_use]
    pub fn new(provider: impl Into<String>, respond_strategy: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            respond_strategy: respond_strategy.into(),
            user_identifier: None,
            address: None,
        }
    }

    #[must_use]
    pub fn with_user_identifier(mut self, user_identifier: impl Into<String>) -> Self {
        self.user_identifier = Some(user_identifier.into());
        self
    }

    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Flatten into the key/value form `init` consumes.
    #[must_use]
    pub fn into_query(self) -> BTreeMap<String, String> {
        let mut query = BTreeMap::new();
        query.insert(QueryParam::Provider.to_string(), self.provider);
        query.insert(QueryParam::RespondStrategy.to_string(), self.respond_strategy);
        if let Some(user) = self.user_identifier {
            query.insert(QueryParam::UserIdentifier.to_string(), user);
        }
        if let Some(address) = self.address {
            query.insert(QueryParam::Address.to_string(), address);
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn web3_argument_serializes_without_missing_signature() {
        let arg = UserRegistrationArgument::Web3 {
            provider: "ethereum".into(),
            address: "0xabc".into(),
            signature: None,
            message_sign_required: false,
        };
        let json = serde_json::to_value(&arg).unwrap();
        assert_eq!(json["kind"], "web3");
        assert_eq!(json["address"], "0xabc");
        assert!(json.get("signature").is_none());
    }

    #[test]
    fn web2_argument_carries_code_and_state() {
        let arg = UserRegistrationArgument::Web2 {
            provider: "google".into(),
            code: "c0de".into(),
            challenge: Some("ch".into()),
            code_verifier: Some("ver".into()),
            state: Some("st".into()),
        };
        let json = serde_json::to_value(&arg).unwrap();
        assert_eq!(json["kind"], "web2");
        assert_eq!(json["code"], "c0de");
        assert_eq!(json["code_verifier"], "ver");
        assert_eq!(arg.provider(), "google");
    }

    #[test]
    fn init_args_flatten_to_query_keys() {
        let query = AuthenticationDelegateInitArgs::new("ethereum", "web")
            .with_address("0x1")
            .into_query();
        assert_eq!(query.get("provider").map(String::as_str), Some("ethereum"));
        assert_eq!(query.get("respond_strategy").map(String::as_str), Some("web"));
        assert_eq!(query.get("address").map(String::as_str), Some("0x1"));
        assert!(!query.contains_key("user_identifier"));
    }

    #[test]
    fn session_storage_key() {
        assert_eq!(Session::storage_key("google"), "session_google");
    }

    #[test]
    fn project_id_from_string() {
        let id = ProjectId::from("p1".to_string());
        assert_eq!(id.to_string(), "p1");
    }
}
