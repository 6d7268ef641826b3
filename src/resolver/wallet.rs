use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{CaptureOutcome, IdentityResolver, ResolverContext, ResolverKind, pick};
use crate::error::Error;
use crate::query::QueryParam;
use crate::types::UserRegistrationArgument;

/// Wallet login: the address (and signature, if one was requested) arrive
/// with the configuration, so the flow completes without navigating.
#[derive(Debug, Clone, Copy, Default)]
pub struct WalletResolver;

const GENERATED: &[QueryParam] = &[
    QueryParam::Signature,
    QueryParam::Code,
    QueryParam::Error,
    QueryParam::ErrorCode,
];

#[async_trait]
impl IdentityResolver for WalletResolver {
    fn kind(&self) -> ResolverKind {
        ResolverKind::Web3
    }

    fn generated_states(&self) -> &[QueryParam] {
        GENERATED
    }

    fn get_states(&self, data: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        pick(data, &[QueryParam::Address, QueryParam::ChainId])
    }

    async fn capture_uri(
        &self,
        ctx: &ResolverContext<'_>,
        _data: &BTreeMap<String, String>,
    ) -> Result<CaptureOutcome, Error> {
        ctx.require(QueryParam::Address).await?;
        Ok(CaptureOutcome::Completed)
    }

    async fn get_user_registration_arguments(
        &self,
        ctx: &ResolverContext<'_>,
    ) -> Result<UserRegistrationArgument, Error> {
        let message_sign_required = ctx
            .stored(QueryParam::MessageSignRequired)
            .await?
            .is_some_and(|flag| matches!(flag.as_str(), "true" | "1"));
        let signature = ctx.stored(QueryParam::Signature).await?;
        if message_sign_required && signature.is_none() {
            return Err(Error::MissingParameter(QueryParam::Signature.as_str()));
        }

        Ok(UserRegistrationArgument::Web3 {
            provider: ctx.provider.to_string(),
            address: ctx.require(QueryParam::Address).await?,
            signature,
            message_sign_required,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyValueStore, KeyValueStoreExt, MemoryStore};
    use crate::testing::FakeBackend;

    #[tokio::test]
    async fn completes_when_address_is_stored() {
        let store = MemoryStore::new("t");
        store.connect().await.unwrap();
        let backend = FakeBackend::default();
        let ctx = ResolverContext {
            provider: "ethereum",
            store: &store,
            backend: &backend,
        };

        assert!(matches!(
            WalletResolver.capture_uri(&ctx, &BTreeMap::new()).await,
            Err(Error::MissingParameter("address"))
        ));

        store.set_item("address", "0xabc").await.unwrap();
        assert_eq!(
            WalletResolver.capture_uri(&ctx, &BTreeMap::new()).await.unwrap(),
            CaptureOutcome::Completed
        );
    }

    #[tokio::test]
    async fn signature_required_when_flagged() {
        let store = MemoryStore::new("t");
        store.connect().await.unwrap();
        store.set_item("address", "0xabc").await.unwrap();
        store.set_item("message_sign_required", "true").await.unwrap();
        let backend = FakeBackend::default();
        let ctx = ResolverContext {
            provider: "ethereum",
            store: &store,
            backend: &backend,
        };

        assert!(matches!(
            WalletResolver.get_user_registration_arguments(&ctx).await,
            Err(Error::MissingParameter("signature"))
        ));

        store.set_item("signature", "0xsig").await.unwrap();
        let arg = WalletResolver
            .get_user_registration_arguments(&ctx)
            .await
            .unwrap();
        assert_eq!(
            arg,
            UserRegistrationArgument::Web3 {
                provider: "ethereum".into(),
                address: "0xabc".into(),
                signature: Some("0xsig".into()),
                message_sign_required: true,
            }
        );
    }
}
