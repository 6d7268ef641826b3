//! In-process doubles shared by unit tests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::backend::{ProviderAuthorization, RegistrationBackend};
use crate::error::Error;
use crate::types::{AuthTokens, ProjectId, UserIdentifier, UserRegistrationArgument};

type Registration = (UserRegistrationArgument, ProjectId, Option<UserIdentifier>);

/// Accepts every project unless rejected, and issues fixed tokens.
#[derive(Default)]
pub(crate) struct FakeBackend {
    rejected: BTreeSet<String>,
    fail_registration: bool,
    pub(crate) registrations: Mutex<Vec<Registration>>,
}

impl FakeBackend {
    pub(crate) fn rejecting(project: &str) -> Self {
        Self {
            rejected: BTreeSet::from([project.to_string()]),
            ..Self::default()
        }
    }

    pub(crate) fn failing_registration() -> Self {
        Self {
            fail_registration: true,
            ..Self::default()
        }
    }

    pub(crate) fn tokens() -> AuthTokens {
        AuthTokens {
            access: "access-token".into(),
            refresh: "refresh-token".into(),
        }
    }
}

#[async_trait]
impl RegistrationBackend for FakeBackend {
    async fn verify_project(&self, project: &ProjectId) -> Result<bool, Error> {
        Ok(!self.rejected.contains(&project.0))
    }

    async fn register_user(
        &self,
        argument: &UserRegistrationArgument,
        project: &ProjectId,
        user: Option<&UserIdentifier>,
    ) -> Result<AuthTokens, Error> {
        if self.fail_registration {
            return Err(Error::Backend {
                operation: "user registration",
                status: Some(500),
                detail: "registration disabled".into(),
            });
        }
        self.registrations
            .lock()
            .push((argument.clone(), project.clone(), user.cloned()));
        Ok(Self::tokens())
    }

    async fn provider_url(
        &self,
        _provider: &str,
        _project: &ProjectId,
    ) -> Result<ProviderAuthorization, Error> {
        Ok(ProviderAuthorization {
            url: "https://idp.example/authorize".parse()?,
            verifiers: "fake-verifiers".into(),
        })
    }
}
