//! Identity-provider strategies.
//!
//! A resolver decides how its provider authenticates (redirect or direct
//! wallet capture), which returned fields are security relevant, and what the
//! backend receives for registration.

mod oauth;
mod wallet;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::backend::RegistrationBackend;
use crate::communicator::{OriginFrameCommunicator, ResponseMessageCallbackArgument};
use crate::error::Error;
use crate::query::QueryParam;
use crate::storage::KeyValueStore;
use crate::types::{AuthTokens, ProjectId, UserRegistrationArgument};

pub use oauth::OAuthResolver;
pub use wallet::WalletResolver;

/// Fields generated by the remote side that cannot be known before navigation.
pub const DEFAULT_GENERATED_STATES: &[QueryParam] =
    &[QueryParam::Code, QueryParam::Error, QueryParam::ErrorCode];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverKind {
    /// Redirect-based identity provider.
    Web2,
    /// Direct wallet capture; never navigates.
    Web3,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Navigate here; the flow resumes on return.
    Redirect(Url),
    /// Everything needed for registration is already in the store.
    Completed,
}

/// What a resolver may touch while it runs.
pub struct ResolverContext<'a> {
    /// Name the resolver was bound under.
    pub provider: &'a str,
    pub store: &'a dyn KeyValueStore,
    pub backend: &'a dyn RegistrationBackend,
}

impl ResolverContext<'_> {
    /// A stored query parameter as a string.
    pub async fn stored(&self, param: QueryParam) -> Result<Option<String>, Error> {
        stored_string(self.store, param.as_str()).await
    }

    pub async fn require(&self, param: QueryParam) -> Result<String, Error> {
        self.stored(param)
            .await?
            .ok_or(Error::MissingParameter(param.as_str()))
    }

    pub async fn project_id(&self) -> Result<ProjectId, Error> {
        self.stored(QueryParam::ProjectIdentifier)
            .await?
            .map(ProjectId::from)
            .ok_or(Error::ProjectIdentifierMissing)
    }
}

/// Read a stored value as text; non-string JSON is rendered.
pub(crate) async fn stored_string(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<String>, Error> {
    Ok(store.get_value(key).await?.map(|value| match value {
        Value::String(text) => text,
        other => other.to_string(),
    }))
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    fn kind(&self) -> ResolverKind;

    /// Keys excluded from state verification because the remote side generates them.
    fn generated_states(&self) -> &[QueryParam] {
        DEFAULT_GENERATED_STATES
    }

    /// Keys a returned state set must contain; their absence fails verification.
    fn required_states(&self) -> &[QueryParam] {
        &[]
    }

    /// The subset of `data` that must match what was stored before navigation.
    fn get_states(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String>;

    async fn generate_redirect_url(&self, ctx: &ResolverContext<'_>) -> Result<Url, Error> {
        Err(Error::Config(format!(
            "provider {} does not authenticate by redirect",
            ctx.provider
        )))
    }

    /// Entry point after configuration capture.
    async fn capture_uri(
        &self,
        ctx: &ResolverContext<'_>,
        data: &BTreeMap<String, String>,
    ) -> Result<CaptureOutcome, Error>;

    /// Check the parameters the provider sent back before they are stored.
    async fn on_authentication_redirect(
        &self,
        _ctx: &ResolverContext<'_>,
        data: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        provider_error(data).map_or(Ok(()), Err)
    }

    async fn get_user_registration_arguments(
        &self,
        ctx: &ResolverContext<'_>,
    ) -> Result<UserRegistrationArgument, Error>;

    /// Report a successful registration to the initiating window.
    async fn authenticate_and_respond(
        &self,
        ctx: &ResolverContext<'_>,
        communicator: &dyn OriginFrameCommunicator,
        tokens: &AuthTokens,
    ) -> Result<(), Error> {
        let body = ResponseMessageCallbackArgument {
            provider: Some(ctx.provider.to_string()),
            address: ctx.stored(QueryParam::Address).await?,
            access: Some(tokens.access.clone()),
            refresh: Some(tokens.refresh.clone()),
            origin_identifier: ctx.stored(QueryParam::OriginIdentifier).await?,
            cause_event: ctx.stored(QueryParam::CauseEvent).await?,
        };
        communicator.send_success(body).await
    }
}

/// `error` / `error_code` sent back by a provider, if any.
pub(crate) fn provider_error(data: &BTreeMap<String, String>) -> Option<Error> {
    let message = data.get(QueryParam::Error.as_str())?;
    let code = data
        .get(QueryParam::ErrorCode.as_str())
        .unwrap_or(message)
        .clone();
    Some(Error::Provider {
        code,
        message: message.clone(),
    })
}

/// Copy the listed keys out of `data` where present.
pub(crate) fn pick(
    data: &BTreeMap<String, String>,
    keys: &[QueryParam],
) -> BTreeMap<String, String> {
    keys.iter()
        .filter_map(|param| {
            data.get(param.as_str())
                .map(|value| (param.to_string(), value.clone()))
        })
        .collect()
}
