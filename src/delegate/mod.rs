//! Authentication delegate: the flow state machine that survives navigation.
//!
//! A delegate collects the flow's configuration into a state map that is
//! mirrored into the [`KeyValueStore`] on every [`init`](AuthenticationDelegate::init).
//! Before leaving for an identity provider it [`freeze`](AuthenticationDelegate::freeze)s
//! that map into one checkpoint; the delegate built on return replays the
//! checkpoint with [`from_frozen_state`](AuthenticationDelegate::from_frozen_state),
//! verifies what the provider sent back and registers the user.
//!
//! ```rust,ignore
//! let deps = DelegateDeps::new(store, backend)
//!     .with_resolver("google", Arc::new(OAuthResolver::new()))
//!     .with_communicator("web", communicator);
//!
//! // Before the redirect
//! let mut delegate = AuthenticationDelegate::new(deps.clone());
//! let outcome = delegate.capture_data(ConfigurationSource::from_url(&start_url)).await;
//!
//! // After the redirect, possibly in another process
//! let outcome = AuthenticationDelegate::complete_redirect(
//!     deps,
//!     ConfigurationSource::from_url(&callback_url),
//! )
//! .await;
//! ```

mod flow;
mod frozen;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::Value;

use crate::backend::RegistrationBackend;
use crate::communicator::OriginFrameCommunicator;
use crate::error::Error;
use crate::query::{ConfigKey, QueryParam};
use crate::registry::{CommunicatorRegistry, ResolverRegistry};
use crate::resolver::{
    DEFAULT_GENERATED_STATES, IdentityResolver, ResolverContext, stored_string,
};
use crate::storage::{KeyValueStore, KeyValueStoreExt};
use crate::types::{
    AuthTokens, AuthenticationDelegateInitArgs, ProjectId, Session, UserIdentifier,
};

pub use flow::{ConfigurationSource, FlowOutcome};
pub use frozen::{FROZEN_STATE_KEY, FROZEN_STATE_VERSION, FrozenState, LEGACY_CONNECTOR_KEY};

/// Where a delegate is in the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegatePhase {
    Uninitialized,
    Configured,
    AwaitingRemote,
    Verifying,
    Registered,
    Failed,
}

/// Collaborators shared by every delegate of a flow.
#[derive(Clone)]
pub struct DelegateDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub backend: Arc<dyn RegistrationBackend>,
    pub resolvers: ResolverRegistry,
    pub communicators: CommunicatorRegistry,
}

impl DelegateDeps {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, backend: Arc<dyn RegistrationBackend>) -> Self {
        Self {
            store,
            backend,
            resolvers: ResolverRegistry::new(),
            communicators: CommunicatorRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_resolver(
        mut self,
        provider: impl Into<String>,
        resolver: Arc<dyn IdentityResolver>,
    ) -> Self {
        self.resolvers.register(provider, resolver);
        self
    }

    #[must_use]
    pub fn with_communicator(
        mut self,
        strategy: impl Into<String>,
        communicator: Arc<dyn OriginFrameCommunicator>,
    ) -> Self {
        self.communicators.register(strategy, communicator);
        self
    }
}

pub struct AuthenticationDelegate {
    deps: DelegateDeps,
    state: BTreeMap<String, String>,
    provider: Option<String>,
    resolver: Option<Arc<dyn IdentityResolver>>,
    respond_strategy: Option<String>,
    communicator: Option<Arc<dyn OriginFrameCommunicator>>,
    phase: DelegatePhase,
}

impl AuthenticationDelegate {
    #[must_use]
    pub fn new(deps: DelegateDeps) -> Self {
        Self {
            deps,
            state: BTreeMap::new(),
            provider: None,
            resolver: None,
            respond_strategy: None,
            communicator: None,
            phase: DelegatePhase::Uninitialized,
        }
    }

    #[must_use]
    pub fn phase(&self) -> DelegatePhase {
        self.phase
    }

    /// Everything learned about the in-flight flow.
    #[must_use]
    pub fn state(&self) -> &BTreeMap<String, String> {
        &self.state
    }

    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    #[must_use]
    pub fn respond_strategy(&self) -> Option<&str> {
        self.respond_strategy.as_deref()
    }

    #[must_use]
    pub fn resolver(&self) -> Option<&Arc<dyn IdentityResolver>> {
        self.resolver.as_ref()
    }

    #[must_use]
    pub fn communicator(&self) -> Option<&Arc<dyn OriginFrameCommunicator>> {
        self.communicator.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.deps.store
    }

    /// Record configuration.
    ///
    /// `provider` binds a resolver and `respond_strategy` binds a communicator,
    /// both looked up by name. Every key, bound or not, joins the state map,
    /// and the whole map is written to the store before this returns. Nothing
    /// changes if a name is unknown.
    ///
    /// # Errors
    ///
    /// [`Error::UnknownProvider`] / [`Error::UnknownRespondStrategy`] for
    /// unregistered names, or any store failure.
    pub async fn init<I, K, V>(&mut self, args: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entries: Vec<(String, String)> = args
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        let mut resolver = None;
        let mut communicator = None;
        for (key, value) in &entries {
            match ConfigKey::classify(key) {
                ConfigKey::Provider => {
                    let bound = self
                        .deps
                        .resolvers
                        .get(value)
                        .ok_or_else(|| Error::UnknownProvider(value.clone()))?;
                    resolver = Some((value.clone(), bound));
                }
                ConfigKey::RespondStrategy => {
                    let bound = self
                        .deps
                        .communicators
                        .get(value)
                        .ok_or_else(|| Error::UnknownRespondStrategy(value.clone()))?;
                    communicator = Some((value.clone(), bound));
                }
                ConfigKey::Param(_) | ConfigKey::Custom(_) => {}
            }
        }

        if let Some((name, bound)) = resolver {
            self.provider = Some(name);
            self.resolver = Some(bound);
        }
        if let Some((name, bound)) = communicator {
            self.respond_strategy = Some(name);
            self.communicator = Some(bound);
        }
        self.state.extend(entries);
        self.set_states().await?;

        if self.phase == DelegatePhase::Uninitialized {
            self.phase = DelegatePhase::Configured;
        }
        Ok(())
    }

    /// [`init`](Self::init) from the typed reload arguments.
    pub async fn init_with(&mut self, args: AuthenticationDelegateInitArgs) -> Result<(), Error> {
        self.init(args.into_query()).await
    }

    /// Write the whole state map, issuing all writes at once and joining them.
    async fn set_states(&self) -> Result<(), Error> {
        let store = self.deps.store.as_ref();
        try_join_all(
            self.state
                .iter()
                .map(|(key, value)| store.set_item(key, value)),
        )
        .await?;
        Ok(())
    }

    /// Checkpoint the state map under [`FROZEN_STATE_KEY`].
    ///
    /// Every `init` has already joined its writes, so the checkpoint never
    /// precedes the entries it describes.
    pub async fn freeze(&mut self) -> Result<(), Error> {
        let frozen = FrozenState::new(self.state.clone());
        self.deps.store.set_item(FROZEN_STATE_KEY, &frozen).await?;
        self.phase = DelegatePhase::AwaitingRemote;
        tracing::info!(
            provider = self.provider.as_deref().unwrap_or_default(),
            keys = self.state.len(),
            "Authentication delegate frozen"
        );
        Ok(())
    }

    /// Rebuild the delegate that called [`freeze`](Self::freeze).
    ///
    /// # Errors
    ///
    /// [`Error::NoFrozenState`] if there is no checkpoint,
    /// [`Error::UnsupportedFrozenState`] if it was written by an unknown schema.
    pub async fn from_frozen_state(deps: DelegateDeps) -> Result<Self, Error> {
        let raw = deps
            .store
            .get_value(FROZEN_STATE_KEY)
            .await?
            .ok_or(Error::NoFrozenState)?;
        let frozen = FrozenState::decode(raw)?;

        let mut delegate = Self::new(deps);
        delegate.init(frozen.state).await?;
        delegate.phase = DelegatePhase::AwaitingRemote;
        Ok(delegate)
    }

    /// Compare returned states against the store.
    ///
    /// False if the store is disconnected, if a key the bound resolver requires
    /// is absent from `states`, or if any key it does not declare as generated
    /// is missing or differs as JSON.
    pub async fn verify_states(&self, states: &BTreeMap<String, String>) -> bool {
        let store = self.deps.store.as_ref();
        if !store.is_connected().await {
            tracing::warn!("State verification against a disconnected store");
            return false;
        }

        let required = self
            .resolver
            .as_ref()
            .map_or(&[][..], |resolver| resolver.required_states());
        let absent = required
            .iter()
            .find(|param| !states.contains_key(param.as_str()));
        if let Some(missing) = absent {
            tracing::warn!(key = missing.as_str(), "Required state not returned");
            return false;
        }

        let excluded = self
            .resolver
            .as_ref()
            .map_or(DEFAULT_GENERATED_STATES, |resolver| resolver.generated_states());

        for (key, value) in states {
            if excluded.iter().any(|param| param.as_str() == key) {
                continue;
            }
            match store.get_value(key).await {
                Ok(Some(stored)) if stored == Value::String(value.clone()) => {}
                Ok(Some(_)) => {
                    tracing::warn!(key = %key, "State mismatch");
                    return false;
                }
                Ok(None) => {
                    tracing::warn!(key = %key, "State missing from store");
                    return false;
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "State lookup failed");
                    return false;
                }
            }
        }
        true
    }

    /// Ask the backend whether `project` exists, then store it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidProjectId`] if the backend does not verify it.
    pub async fn verify_project(&self, project: &ProjectId) -> Result<(), Error> {
        if !self.deps.backend.verify_project(project).await? {
            tracing::warn!(project = %project, "Project rejected by backend");
            return Err(Error::InvalidProjectId(project.to_string()));
        }
        self.deps
            .store
            .set_item(QueryParam::ProjectIdentifier.as_str(), &project.0)
            .await
    }

    /// Register the user with the bound resolver's argument and store the session.
    ///
    /// # Errors
    ///
    /// [`Error::ProjectIdentifierMissing`] before a project id is stored,
    /// [`Error::ResolverNotBound`] without a resolver, or any backend failure.
    pub async fn handle_user_registration(&self) -> Result<AuthTokens, Error> {
        let store = self.deps.store.as_ref();
        let project = stored_string(store, QueryParam::ProjectIdentifier.as_str())
            .await?
            .map(ProjectId::from)
            .ok_or(Error::ProjectIdentifierMissing)?;
        let resolver = self.bound_resolver()?;

        let argument = resolver
            .get_user_registration_arguments(&self.context())
            .await?;
        let user = stored_string(store, QueryParam::UserIdentifier.as_str())
            .await?
            .map(UserIdentifier::from);

        let tokens = self
            .deps
            .backend
            .register_user(&argument, &project, user.as_ref())
            .await?;

        let provider = argument.provider().to_string();
        let mut session = Session::new(&provider, tokens.clone());
        if let Some(connector) = stored_string(store, QueryParam::ConnectorType.as_str()).await? {
            session = session.with_connector_type(connector);
        }
        store
            .set_item(&Session::storage_key(&provider), &session)
            .await?;

        tracing::info!(provider = %provider, project = %project, "User registered");
        Ok(tokens)
    }

    /// Remove every flow key from the store: known query parameters, all
    /// state keys, the legacy connector key and the frozen checkpoint.
    pub async fn clean(&self) -> Result<(), Error> {
        let mut keys: BTreeSet<&str> = QueryParam::ALL.iter().map(|param| param.as_str()).collect();
        keys.extend(self.state.keys().map(String::as_str));
        keys.insert(LEGACY_CONNECTOR_KEY);
        keys.insert(FROZEN_STATE_KEY);

        let store = self.deps.store.as_ref();
        try_join_all(keys.into_iter().map(|key| store.remove_item(key))).await?;
        Ok(())
    }

    /// [`clean`](Self::clean), then tell the communicator to close.
    pub async fn close(&mut self) -> Result<(), Error> {
        let cleaned = self.clean().await;
        if let Some(communicator) = &self.communicator {
            communicator.close().await?;
        }
        cleaned
    }

    fn bound_resolver(&self) -> Result<Arc<dyn IdentityResolver>, Error> {
        self.resolver.clone().ok_or(Error::ResolverNotBound)
    }

    fn context(&self) -> ResolverContext<'_> {
        ResolverContext {
            provider: self.provider.as_deref().unwrap_or_default(),
            store: self.deps.store.as_ref(),
            backend: self.deps.backend.as_ref(),
        }
    }
}
