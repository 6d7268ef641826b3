//! Server-hosted redirect flow for axum.
//!
//! ```rust,ignore
//! let config = ChainAuthConfig::from_env()?;
//! let store = Arc::new(FileStore::in_data_dir("my-app", config.settings.storage_prefix())?);
//! store.connect().await?;
//! let deps = config
//!     .delegate_deps(store)
//!     .with_resolver("google", Arc::new(OAuthResolver::new()));
//!
//! let app = axum::Router::new().merge(auth_routes(config.settings, deps));
//! ```
//!
//! Flows started with `respond_strategy=redirect&target_origin=...` report
//! their result by redirecting back to `target_origin`, which must belong to an
//! origin registered with [`ChainAuthConfig::with_allowed_origin`].
//!
//! [`ChainAuthConfig::with_allowed_origin`]: crate::ChainAuthConfig::with_allowed_origin

use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Json, Router};
use url::Url;

use crate::communicator::RedirectCommunicator;
use crate::config::AuthSettings;
use crate::delegate::{AuthenticationDelegate, ConfigurationSource, DelegateDeps, FlowOutcome};
use crate::error::Error;
use crate::query::QueryParam;
use crate::resolver::stored_string;

/// `respond_strategy` value answered by redirecting to `target_origin`.
pub const REDIRECT_STRATEGY: &str = "redirect";

#[derive(Clone)]
struct RouteState {
    deps: DelegateDeps,
    settings: Arc<AuthSettings>,
}

/// Create the authentication router.
///
/// All flows share `deps.store`, so one store holds one in-flight flow.
pub fn auth_routes(settings: AuthSettings, deps: DelegateDeps) -> Router {
    let auth_path = settings.auth_path.clone();
    let state = RouteState {
        deps,
        settings: Arc::new(settings),
    };

    Router::new()
        .route(&format!("{auth_path}/connect"), get(connect))
        .route(&format!("{auth_path}/callback"), get(callback))
        .with_state(state)
}

// ── Connect ────────────────────────────────────────────────────────

async fn connect(State(state): State<RouteState>, RawQuery(query): RawQuery) -> Response {
    let query = query.unwrap_or_default();
    let requested = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == QueryParam::TargetOrigin.as_str())
        .map(|(_, value)| value.into_owned());
    let target = match state.allowed_target(requested.as_deref()) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing to start flow");
            return login_error(&state.settings.error_redirect, e.code());
        }
    };

    let (deps, communicator) = state.with_redirect_target(target);
    let outcome = AuthenticationDelegate::new(deps)
        .capture_data(ConfigurationSource::Redirect(query))
        .await;
    state.respond(outcome, communicator.as_deref())
}

// ── Callback ───────────────────────────────────────────────────────

async fn callback(State(state): State<RouteState>, RawQuery(query): RawQuery) -> Response {
    let stored = match stored_string(
        state.deps.store.as_ref(),
        QueryParam::TargetOrigin.as_str(),
    )
    .await
    {
        Ok(stored) => stored,
        Err(e) => {
            tracing::error!(error = %e, "Store unavailable on callback");
            return login_error(&state.settings.error_redirect, e.code());
        }
    };
    let target = match state.allowed_target(stored.as_deref()) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "Refusing to relay callback result");
            return login_error(&state.settings.error_redirect, e.code());
        }
    };

    let (deps, communicator) = state.with_redirect_target(target);
    let outcome = AuthenticationDelegate::complete_redirect(
        deps,
        ConfigurationSource::Redirect(query.unwrap_or_default()),
    )
    .await;
    state.respond(outcome, communicator.as_deref())
}

// ── Helpers ────────────────────────────────────────────────────────

impl RouteState {
    /// The parsed `target_origin`, refused unless its origin is allowed.
    fn allowed_target(&self, value: Option<&str>) -> Result<Option<Url>, Error> {
        let Some(target) = value.and_then(parse_target) else {
            return Ok(None);
        };
        if self.settings.allows_target(&target) {
            Ok(Some(target))
        } else {
            Err(Error::InvalidTargetOrigin(target.origin().ascii_serialization()))
        }
    }

    /// Per-request dependencies with a redirect communicator bound to `target`.
    fn with_redirect_target(
        &self,
        target: Option<Url>,
    ) -> (DelegateDeps, Option<Arc<RedirectCommunicator>>) {
        match target {
            Some(target) => {
                let communicator = Arc::new(RedirectCommunicator::new(target));
                let deps = self
                    .deps
                    .clone()
                    .with_communicator(REDIRECT_STRATEGY, communicator.clone());
                (deps, Some(communicator))
            }
            None => (self.deps.clone(), None),
        }
    }

    fn respond(
        &self,
        outcome: FlowOutcome,
        communicator: Option<&RedirectCommunicator>,
    ) -> Response {
        let relayed = communicator.and_then(RedirectCommunicator::take_redirect);
        match outcome {
            FlowOutcome::Redirect(url) => Redirect::to(url.as_str()).into_response(),
            FlowOutcome::Registered(tokens) => match (relayed, &self.settings.success_redirect) {
                (Some(url), _) => Redirect::to(url.as_str()).into_response(),
                (None, Some(path)) => Redirect::to(path).into_response(),
                (None, None) => Json(tokens).into_response(),
            },
            FlowOutcome::Failed { error_code, .. } => match relayed {
                Some(url) => Redirect::to(url.as_str()).into_response(),
                None => login_error(&self.settings.error_redirect, &error_code),
            },
        }
    }
}

fn parse_target(value: &str) -> Option<Url> {
    match value.parse() {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::debug!(
                target_origin = %value,
                error = %e,
                "Ignoring unparsable target origin"
            );
            None
        }
    }
}

fn login_error(error_redirect: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{error_redirect}?error={encoded}")).into_response()
}
