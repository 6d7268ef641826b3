use std::collections::BTreeMap;

use async_trait::async_trait;
use url::Url;

use super::{
    CaptureOutcome, IdentityResolver, ResolverContext, ResolverKind, pick, provider_error,
};
use crate::error::Error;
use crate::pkce::{self, PkcePair};
use crate::query::QueryParam;
use crate::storage::KeyValueStoreExt;
use crate::types::UserRegistrationArgument;

/// Redirect-based provider whose authorization URL comes from the backend.
///
/// Before navigating it stores a fresh anti-forgery `state`, the backend's
/// `verifiers` and a PKCE pair; on return the `state` must match.
#[derive(Debug, Clone, Default)]
pub struct OAuthResolver {
    extra_params: Vec<(String, String)>,
}

impl OAuthResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extra query pair appended to every authorization URL (e.g. `prompt=consent`).
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl IdentityResolver for OAuthResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Web2
    }

    fn required_states(&self) -> &[QueryParam] {
        &[QueryParam::State]
    }

    fn get_states(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        pick(
            data,
            &[
                QueryParam::State,
                QueryParam::Code,
                QueryParam::Error,
                QueryParam::ErrorCode,
            ],
        )
    }

    async fn generate_redirect_url(&self, ctx: &ResolverContext<'_>) -> Result<Url, Error> {
        let project = ctx.project_id().await?;
        let authorization = ctx.backend.provider_url(ctx.provider, &project).await?;

        let state = pkce::generate_state();
        let pkce = PkcePair::generate();
        ctx.store
            .set_item(QueryParam::State.as_str(), &state)
            .await?;
        ctx.store
            .set_item(QueryParam::Verifiers.as_str(), &authorization.verifiers)
            .await?;
        ctx.store
            .set_item(QueryParam::CodeChallenge.as_str(), &pkce.challenge)
            .await?;
        ctx.store
            .set_item(QueryParam::CodeVerifier.as_str(), &pkce.verifier)
            .await?;

        let mut url = authorization.url;
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair(QueryParam::State.as_str(), &state)
                .append_pair(QueryParam::CodeChallenge.as_str(), &pkce.challenge)
                .append_pair("code_challenge_method", "S256");
            for (key, value) in &self.extra_params {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    async fn capture_uri(
        &self,
        ctx: &ResolverContext<'_>,
        _data: &BTreeMap<String, String>,
    ) -> Result<CaptureOutcome, Error> {
        let url = self.generate_redirect_url(ctx).await?;
        tracing::debug!(provider = ctx.provider, "Redirecting to identity provider");
        Ok(CaptureOutcome::Redirect(url))
    }

    async fn on_authentication_redirect(
        &self,
        _ctx: &ResolverContext<'_>,
        data: &BTreeMap<String, String>,
    ) -> Result<(), Error> {
        if let Some(err) = provider_error(data) {
            return Err(err);
        }
        if !data.contains_key(QueryParam::Code.as_str()) {
            return Err(Error::MissingParameter(QueryParam::Code.as_str()));
        }
        Ok(())
    }

    async fn get_user_registration_arguments(
        &self,
        ctx: &ResolverContext<'_>,
    ) -> Result<UserRegistrationArgument, Error> {
        Ok(UserRegistrationArgument::Web2 {
            provider: ctx.provider.to_string(),
            code: ctx.require(QueryParam::Code).await?,
            challenge: ctx.stored(QueryParam::CodeChallenge).await?,
            code_verifier: ctx.stored(QueryParam::CodeVerifier).await?,
            state: ctx.stored(QueryParam::State).await?,
        })
    }
}
