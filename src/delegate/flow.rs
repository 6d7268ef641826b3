use std::collections::BTreeMap;

use url::Url;

use super::{AuthenticationDelegate, DelegateDeps, DelegatePhase};
use crate::error::Error;
use crate::query::QueryParam;
use crate::resolver::{CaptureOutcome, ResolverKind, stored_string};
use crate::types::{AuthTokens, ProjectId};

/// Where a delegate reads its configuration from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationSource {
    /// Raw query string of the page the user landed on.
    Redirect(String),
    /// Every known query parameter already present in the store.
    PreResolved,
}

impl ConfigurationSource {
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::Redirect(url.query().unwrap_or_default().to_string())
    }

    /// Redirect providers read the landing URL; wallets find their data in the store.
    #[must_use]
    pub fn for_kind(kind: ResolverKind, landing: &Url) -> Self {
        match kind {
            ResolverKind::Web2 => Self::from_url(landing),
            ResolverKind::Web3 => Self::PreResolved,
        }
    }
}

/// Result of driving the flow one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Navigate here; the delegate has been frozen.
    Redirect(Url),
    Registered(AuthTokens),
    /// The error was reported to the origin and the store cleaned.
    Failed { error: String, error_code: String },
}

impl AuthenticationDelegate {
    /// Read the flow's configuration as a flat map.
    pub async fn get_configuration_data(
        &self,
        source: &ConfigurationSource,
    ) -> Result<BTreeMap<String, String>, Error> {
        match source {
            ConfigurationSource::Redirect(query) => Ok(url::form_urlencoded::parse(
                query.trim_start_matches('?').as_bytes(),
            )
            .into_owned()
            .collect()),
            ConfigurationSource::PreResolved => {
                let store = self.deps.store.as_ref();
                let mut data = BTreeMap::new();
                for param in QueryParam::ALL {
                    if let Some(value) = stored_string(store, param.as_str()).await? {
                        data.insert(param.to_string(), value);
                    }
                }
                Ok(data)
            }
        }
    }

    /// Start a flow: verify the project, bind resolver and communicator, then
    /// either hand back the provider redirect or finish registration directly.
    ///
    /// Failures never escape; they are reported through [`error_redirect`](Self::error_redirect).
    pub async fn capture_data(&mut self, source: ConfigurationSource) -> FlowOutcome {
        match self.try_capture(source).await {
            Ok(outcome) => outcome,
            Err(e) => self.error_redirect(e).await,
        }
    }

    async fn try_capture(&mut self, source: ConfigurationSource) -> Result<FlowOutcome, Error> {
        let data = self.get_configuration_data(&source).await?;

        // Bound before project verification so a rejection still reaches the origin.
        if let Some(strategy) = data.get(QueryParam::RespondStrategy.as_str()) {
            if let Some(communicator) = self.deps.communicators.get(strategy) {
                self.respond_strategy = Some(strategy.clone());
                self.communicator = Some(communicator);
            }
        }

        let project = match data.get(QueryParam::ProjectIdentifier.as_str()) {
            Some(project) => ProjectId::from(project.clone()),
            None => stored_string(
                self.deps.store.as_ref(),
                QueryParam::ProjectIdentifier.as_str(),
            )
            .await?
            .map(ProjectId::from)
            .ok_or(Error::ProjectIdentifierMissing)?,
        };
        self.verify_project(&project).await?;
        self.init(data.clone()).await?;

        let resolver = self.bound_resolver()?;
        let outcome = resolver.capture_uri(&self.context(), &data).await?;
        match outcome {
            CaptureOutcome::Redirect(url) => {
                self.freeze().await?;
                tracing::info!(
                    provider = self.provider().unwrap_or_default(),
                    "Handing off to identity provider"
                );
                Ok(FlowOutcome::Redirect(url))
            }
            CaptureOutcome::Completed => {
                // `init` wrote these states above, so this only fails when the
                // store lost or rewrote them. Forged values are caught on `resume`.
                let states = resolver.get_states(&data);
                self.phase = DelegatePhase::Verifying;
                if !self.verify_states(&states).await {
                    return Err(Error::StateMismatch);
                }
                self.register_and_respond().await
            }
        }
    }

    /// Continue a frozen flow with what the provider sent back.
    ///
    /// Returned states are verified before anything from the callback is
    /// written, so a forged `state` cannot overwrite the stored one.
    pub async fn resume(&mut self, callback: ConfigurationSource) -> FlowOutcome {
        match self.try_resume(callback).await {
            Ok(outcome) => outcome,
            Err(e) => self.error_redirect(e).await,
        }
    }

    /// [`resume`](Self::resume) with the full callback URL.
    pub async fn resume_from_url(&mut self, callback: &Url) -> FlowOutcome {
        self.resume(ConfigurationSource::from_url(callback)).await
    }

    async fn try_resume(&mut self, callback: ConfigurationSource) -> Result<FlowOutcome, Error> {
        let data = self.get_configuration_data(&callback).await?;
        let resolver = self.bound_resolver()?;

        let states = resolver.get_states(&data);
        self.phase = DelegatePhase::Verifying;
        if !self.verify_states(&states).await {
            return Err(Error::StateMismatch);
        }
        resolver
            .on_authentication_redirect(&self.context(), &data)
            .await?;

        self.init(data).await?;
        self.register_and_respond().await
    }

    /// Rebuild the frozen delegate and resume it in one step.
    ///
    /// A missing checkpoint is reported like any other flow failure.
    pub async fn complete_redirect(
        deps: DelegateDeps,
        callback: ConfigurationSource,
    ) -> FlowOutcome {
        match Self::from_frozen_state(deps.clone()).await {
            Ok(mut delegate) => delegate.resume(callback).await,
            Err(e) => Self::new(deps).error_redirect(e).await,
        }
    }

    async fn register_and_respond(&mut self) -> Result<FlowOutcome, Error> {
        let tokens = self.handle_user_registration().await?;
        self.phase = DelegatePhase::Registered;

        // The session is persisted; a failed relay does not undo it.
        if let Some(communicator) = self.communicator.clone() {
            let resolver = self.bound_resolver()?;
            if let Err(e) = resolver
                .authenticate_and_respond(&self.context(), communicator.as_ref(), &tokens)
                .await
            {
                tracing::warn!(error = %e, "Failed to relay registration to origin");
            }
        }
        if let Err(e) = self.close().await {
            tracing::warn!(error = %e, "Cleanup after registration failed");
        }
        Ok(FlowOutcome::Registered(tokens))
    }

    /// Report `error` to the origin, clean up and end the flow.
    pub async fn error_redirect(&mut self, error: Error) -> FlowOutcome {
        let message = error.to_string();
        let code = error.code().to_string();
        tracing::warn!(
            provider = self.provider().unwrap_or_default(),
            error = %message,
            error_code = %code,
            "Authentication flow failed"
        );

        if let Some(communicator) = &self.communicator {
            if let Err(e) = communicator.send_error(&message, &code).await {
                tracing::warn!(error = %e, "Failed to report error to origin");
            }
        }
        if let Err(e) = self.close().await {
            tracing::debug!(error = %e, "Cleanup after failure incomplete");
        }
        self.phase = DelegatePhase::Failed;

        FlowOutcome::Failed {
            error: message,
            error_code: code,
        }
    }
}
