//! Authentication backend: project verification, provider URLs and user registration.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::Error;
use crate::types::{AuthTokens, ProjectId, UserIdentifier, UserRegistrationArgument};

pub const PROJECT_HEADER: &str = "x-project-identifier";
pub const USER_HEADER: &str = "x-user-identifier";

/// Reply of `GET /provider/url/{provider}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderAuthorization {
    pub url: Url,
    #[serde(default)]
    pub verifiers: String,
}

#[derive(Debug, Deserialize)]
struct ProjectVerification {
    is_verified: bool,
}

/// The backend calls the delegate and resolvers depend on.
#[async_trait]
pub trait RegistrationBackend: Send + Sync {
    /// `Ok(false)` when the backend answers but does not know the project.
    async fn verify_project(&self, project: &ProjectId) -> Result<bool, Error>;

    async fn register_user(
        &self,
        argument: &UserRegistrationArgument,
        project: &ProjectId,
        user: Option<&UserIdentifier>,
    ) -> Result<AuthTokens, Error>;

    async fn provider_url(
        &self,
        provider: &str,
        project: &ProjectId,
    ) -> Result<ProviderAuthorization, Error>;
}

/// Backend location and HTTP settings.
///
/// ```rust,ignore
/// let config = BackendConfig::new("https://auth.example.com/api".parse()?)
///     .with_timeout(Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BackendConfig {
    pub(crate) base_url: Url,
    pub(crate) timeout: Duration,
}

impl BackendConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// [`RegistrationBackend`] over HTTP.
#[cfg(feature = "http")]
pub struct HttpBackend {
    config: BackendConfig,
    http: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpBackend {
    #[must_use]
    pub fn new(config: BackendConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("{} cannot be a base URL", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Backend {
            operation,
            status: Some(status),
            detail,
        })
    }
}

#[cfg(feature = "http")]
#[async_trait]
impl RegistrationBackend for HttpBackend {
    async fn verify_project(&self, project: &ProjectId) -> Result<bool, Error> {
        let response = self
            .http
            .get(self.endpoint(&["project", "ident"])?)
            .header(PROJECT_HEADER, project.to_string())
            .timeout(self.config.timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response, "project verification").await?;
        Ok(response.json::<ProjectVerification>().await?.is_verified)
    }

    async fn register_user(
        &self,
        argument: &UserRegistrationArgument,
        project: &ProjectId,
        user: Option<&UserIdentifier>,
    ) -> Result<AuthTokens, Error> {
        let mut request = self
            .http
            .post(self.endpoint(&["token"])?)
            .header(PROJECT_HEADER, project.to_string())
            .timeout(self.config.timeout)
            .json(argument);
        if let Some(user) = user {
            request = request.header(USER_HEADER, user.to_string());
        }

        let response = Self::ensure_success(request.send().await?, "user registration").await?;
        response.json::<AuthTokens>().await.map_err(Into::into)
    }

    async fn provider_url(
        &self,
        provider: &str,
        project: &ProjectId,
    ) -> Result<ProviderAuthorization, Error> {
        let response = self
            .http
            .get(self.endpoint(&["provider", "url", provider])?)
            .header(PROJECT_HEADER, project.to_string())
            .timeout(self.config.timeout)
            .send()
            .await?;

        let response = Self::ensure_success(response, "provider url").await?;
        response
            .json::<ProviderAuthorization>()
            .await
            .map_err(Into::into)
    }
}

#[cfg(all(test, feature = "http"))]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn backend(server: &MockServer) -> HttpBackend {
        HttpBackend::new(BackendConfig::new(
            format!("{}/api/", server.uri()).parse().unwrap(),
        ))
    }

    fn project() -> ProjectId {
        ProjectId::from("p1".to_string())
    }

    #[tokio::test]
    async fn verify_project_reads_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/project/ident"))
            .and(header(PROJECT_HEADER, "p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "is_verified": true })))
            .mount(&server)
            .await;

        assert!(backend(&server).verify_project(&project()).await.unwrap());
    }

    #[tokio::test]
    async fn register_user_posts_argument_with_headers() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header(PROJECT_HEADER, "p1"))
            .and(header(USER_HEADER, "u1"))
            .and(body_partial_json(json!({ "kind": "web3", "address": "0xabc" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access": "acc", "refresh": "ref" })),
            )
            .mount(&server)
            .await;

        let argument = UserRegistrationArgument::Web3 {
            provider: "ethereum".into(),
            address: "0xabc".into(),
            signature: None,
            message_sign_required: false,
        };
        let tokens = backend(&server)
            .register_user(&argument, &project(), Some(&UserIdentifier::from("u1".to_string())))
            .await
            .unwrap();
        assert_eq!(tokens.access, "acc");
        assert_eq!(tokens.refresh, "ref");
    }

    #[tokio::test]
    async fn non_success_status_becomes_backend_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/provider/url/google"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such provider"))
            .mount(&server)
            .await;

        let err = backend(&server)
            .provider_url("google", &project())
            .await
            .unwrap_err();
        match err {
            Error::Backend {
                operation,
                status,
                detail,
            } => {
                assert_eq!(operation, "provider url");
                assert_eq!(status, Some(404));
                assert_eq!(detail, "no such provider");
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn provider_url_decodes_reply() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/provider/url/google"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "url": "https://accounts.example/authorize?client_id=x",
                "verifiers": "v1",
            })))
            .mount(&server)
            .await;

        let auth = backend(&server)
            .provider_url("google", &project())
            .await
            .unwrap();
        assert_eq!(auth.verifiers, "v1");
        assert_eq!(auth.url.host_str(), Some("accounts.example"));
    }

    #[test]
    fn provider_authorization_without_verifiers() {
        let auth: ProviderAuthorization =
            serde_json::from_value(json!({ "url": "https://accounts.example/authorize" }))
                .unwrap();
        assert_eq!(auth.verifiers, "");
        assert_eq!(
            serde_json::to_value(&auth).unwrap()["url"],
            "https://accounts.example/authorize"
        );
    }
}
