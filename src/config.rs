#[cfg(feature = "http")]
use std::sync::Arc;
use std::time::Duration;

use url::{Origin, Url};

use crate::backend::BackendConfig;
#[cfg(feature = "http")]
use crate::backend::HttpBackend;
#[cfg(feature = "http")]
use crate::delegate::DelegateDeps;
use crate::error::Error;
#[cfg(feature = "http")]
use crate::storage::KeyValueStore;

/// Settings shared by the routes and the delegates they build.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub(crate) auth_path: String,
    pub(crate) success_redirect: Option<String>,
    pub(crate) error_redirect: String,
    pub(crate) storage_prefix: String,
    pub(crate) allowed_origins: Vec<Origin>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_path: "/api/auth".into(),
            success_redirect: None,
            error_redirect: "/login".into(),
            storage_prefix: "chainauth".into(),
            allowed_origins: Vec::new(),
        }
    }
}

impl AuthSettings {
    #[must_use]
    pub fn auth_path(&self) -> &str {
        &self.auth_path
    }

    /// Where a completed flow lands when no communicator redirect is available.
    #[must_use]
    pub fn success_redirect(&self) -> Option<&str> {
        self.success_redirect.as_deref()
    }

    #[must_use]
    pub fn error_redirect(&self) -> &str {
        &self.error_redirect
    }

    #[must_use]
    pub fn storage_prefix(&self) -> &str {
        &self.storage_prefix
    }

    /// Whether results may be redirected to `target`. Nothing is allowed by default.
    #[must_use]
    pub fn allows_target(&self, target: &Url) -> bool {
        self.allowed_origins.contains(&target.origin())
    }
}

/// Connector configuration.
///
/// The backend location is a constructor parameter; everything else has a
/// default and a `with_*` override. [`from_env`](ChainAuthConfig::from_env)
/// covers the conventional deployment.
#[derive(Debug, Clone)]
pub struct ChainAuthConfig {
    pub backend: BackendConfig,
    pub settings: AuthSettings,
}

impl ChainAuthConfig {
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            settings: AuthSettings::default(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `CHAINAUTH_BACKEND_URL`: base URL of the authentication backend
    ///
    /// # Optional env vars
    /// - `CHAINAUTH_STORAGE_PREFIX`: namespace for stored flow keys
    /// - `CHAINAUTH_AUTH_PATH`: mount point of the auth routes
    /// - `CHAINAUTH_ERROR_REDIRECT`: where failed flows are sent
    /// - `CHAINAUTH_SUCCESS_REDIRECT`: where completed flows are sent
    /// - `CHAINAUTH_REQUEST_TIMEOUT_SECS`: backend request timeout
    /// - `CHAINAUTH_ALLOWED_ORIGINS`: comma-separated origins `target_origin` may name
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the backend URL is missing or a value is malformed.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// [`from_env`](Self::from_env) over an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let base_url: Url = lookup("CHAINAUTH_BACKEND_URL")
            .ok_or_else(|| Error::Config("CHAINAUTH_BACKEND_URL is required".into()))?
            .parse()
            .map_err(|e| Error::Config(format!("CHAINAUTH_BACKEND_URL: {e}")))?;

        let mut backend = BackendConfig::new(base_url);
        if let Some(secs) = lookup("CHAINAUTH_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|e| Error::Config(format!("CHAINAUTH_REQUEST_TIMEOUT_SECS: {e}")))?;
            backend = backend.with_timeout(Duration::from_secs(secs));
        }

        let mut config = Self::new(backend);
        if let Some(prefix) = lookup("CHAINAUTH_STORAGE_PREFIX") {
            config = config.with_storage_prefix(prefix);
        }
        if let Some(path) = lookup("CHAINAUTH_AUTH_PATH") {
            config = config.with_auth_path(path);
        }
        if let Some(path) = lookup("CHAINAUTH_ERROR_REDIRECT") {
            config = config.with_error_redirect(path);
        }
        if let Some(path) = lookup("CHAINAUTH_SUCCESS_REDIRECT") {
            config = config.with_success_redirect(path);
        }
        if let Some(origins) = lookup("CHAINAUTH_ALLOWED_ORIGINS") {
            for origin in origins.split(',').map(str::trim).filter(|o| !o.is_empty()) {
                let origin: Url = origin
                    .parse()
                    .map_err(|e| Error::Config(format!("CHAINAUTH_ALLOWED_ORIGINS: {e}")))?;
                config = config.with_allowed_origin(&origin);
            }
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_success_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.success_redirect = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.error_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_storage_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.settings.storage_prefix = prefix.into();
        self
    }

    /// Allow `respond_strategy=redirect` results to go to `origin`. Only its
    /// scheme, host and port are kept.
    #[must_use]
    pub fn with_allowed_origin(mut self, origin: &Url) -> Self {
        self.settings.allowed_origins.push(origin.origin());
        self
    }
}

#[cfg(feature = "http")]
impl ChainAuthConfig {
    /// Delegate dependencies talking to the configured backend over HTTP.
    ///
    /// Resolvers and communicators are registered on the result.
    #[must_use]
    pub fn delegate_deps(&self, store: Arc<dyn KeyValueStore>) -> DelegateDeps {
        DelegateDeps::new(store, Arc::new(HttpBackend::new(self.backend.clone())))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn backend_url_is_required() {
        let err = ChainAuthConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("CHAINAUTH_BACKEND_URL")));
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let vars = [("CHAINAUTH_BACKEND_URL", "https://auth.example/api")];
        let config = ChainAuthConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.settings.auth_path(), "/api/auth");
        assert_eq!(config.settings.error_redirect(), "/login");
        assert_eq!(config.settings.storage_prefix(), "chainauth");
        assert!(config.settings.success_redirect().is_none());
        let target: Url = "https://app.example/done".parse().unwrap();
        assert!(!config.settings.allows_target(&target));
        assert_eq!(config.backend.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn overrides_are_read() {
        let config = ChainAuthConfig::from_lookup(lookup(&[
            ("CHAINAUTH_BACKEND_URL", "https://auth.example/api"),
            ("CHAINAUTH_STORAGE_PREFIX", "app"),
            ("CHAINAUTH_AUTH_PATH", "/auth"),
            ("CHAINAUTH_ERROR_REDIRECT", "/oops"),
            ("CHAINAUTH_SUCCESS_REDIRECT", "/home"),
            ("CHAINAUTH_REQUEST_TIMEOUT_SECS", "5"),
            ("CHAINAUTH_ALLOWED_ORIGINS", "https://app.example, http://localhost:3000"),
        ]))
        .unwrap();
        assert_eq!(config.settings.storage_prefix(), "app");
        assert_eq!(config.settings.auth_path(), "/auth");
        assert_eq!(config.settings.error_redirect(), "/oops");
        assert_eq!(config.settings.success_redirect(), Some("/home"));
        assert_eq!(config.backend.timeout(), Duration::from_secs(5));

        let allowed = |target: &str| config.settings.allows_target(&target.parse().unwrap());
        assert!(allowed("https://app.example/done?x=1"));
        assert!(allowed("http://localhost:3000/"));
        assert!(!allowed("http://app.example/done"));
        assert!(!allowed("https://evil.example/done"));
    }

    #[test]
    fn malformed_values_are_config_errors() {
        let err = ChainAuthConfig::from_lookup(lookup(&[("CHAINAUTH_BACKEND_URL", "not a url")]))
            .unwrap_err();
        assert_eq!(err.code(), "configuration_error");

        let err = ChainAuthConfig::from_lookup(lookup(&[
            ("CHAINAUTH_BACKEND_URL", "https://auth.example"),
            ("CHAINAUTH_REQUEST_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }
}
