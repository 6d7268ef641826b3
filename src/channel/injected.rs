use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use super::{ConnectOptions, DEFAULT_REQUEST_TIMEOUT, EventCallback, ProviderChannel, RpcRequest};
use crate::error::Error;

/// A provider object living in the same process, addressed by namespace.
///
/// This is the in-page injected wallet case: the channel does not own a pipe,
/// it calls straight into the provider under `provider_path`.
#[async_trait]
pub trait InjectedProvider: Send + Sync {
    /// Open a session, returning its payload.
    async fn connect(&self, namespace: &str, options: &ConnectOptions) -> Result<Value, Error>;

    async fn request(&self, namespace: &str, request: &RpcRequest) -> Result<Value, Error>;

    /// Validate a previous session payload.
    async fn check_session(&self, namespace: &str, session: &Value)
    -> Result<(bool, Value), Error>;

    fn subscribe(&self, namespace: &str, event: &str, callback: EventCallback);
}

pub struct InjectedChannel {
    provider: Arc<dyn InjectedProvider>,
    provider_path: Mutex<Option<&'static str>>,
    session: Mutex<Option<Value>>,
    connected: AtomicBool,
    default_timeout: Duration,
}

impl InjectedChannel {
    #[must_use]
    pub fn new(provider: Arc<dyn InjectedProvider>) -> Self {
        Self {
            provider,
            provider_path: Mutex::new(None),
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    fn namespace(&self) -> Result<&'static str, Error> {
        self.provider_path
            .lock()
            .ok_or_else(|| Error::Transport("provider path not set".into()))
    }
}

#[async_trait]
impl ProviderChannel for InjectedChannel {
    fn set_provider_path(&self, path: &'static str) {
        *self.provider_path.lock() = Some(path);
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), Error> {
        let namespace = self.namespace()?;
        let session = self.provider.connect(namespace, &options).await?;
        *self.session.lock() = Some(session);
        self.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.connected.store(false, Ordering::Release);
        *self.session.lock() = None;
        Ok(())
    }

    async fn check_session(&self) -> Result<(bool, Value), Error> {
        let namespace = self.namespace()?;
        let Some(session) = self.session.lock().clone() else {
            return Ok((false, Value::Null));
        };
        let (valid, payload) = self.provider.check_session(namespace, &session).await?;
        if valid {
            *self.session.lock() = Some(payload.clone());
        }
        Ok((valid, payload))
    }

    async fn request(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let namespace = self.namespace()?;
        let timeout = timeout.unwrap_or(self.default_timeout);
        tokio::time::timeout(timeout, self.provider.request(namespace, &request))
            .await
            .map_err(|_| Error::Timeout(timeout))?
    }

    fn on(&self, event: &str, callback: EventCallback) {
        let Ok(namespace) = self.namespace() else {
            tracing::warn!(event, "Subscription ignored: provider path not set");
            return;
        };
        self.provider.subscribe(namespace, event, callback);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct SlowProvider {
        subscribed: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InjectedProvider for SlowProvider {
        async fn connect(&self, namespace: &str, _: &ConnectOptions) -> Result<Value, Error> {
            Ok(json!({ "namespace": namespace }))
        }

        async fn request(&self, _: &str, request: &RpcRequest) -> Result<Value, Error> {
            if request.method == "slow" {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            Ok(json!(request.method))
        }

        async fn check_session(&self, _: &str, session: &Value) -> Result<(bool, Value), Error> {
            Ok((true, session.clone()))
        }

        fn subscribe(&self, namespace: &str, event: &str, _: EventCallback) {
            self.subscribed.lock().push(format!("{namespace}/{event}"));
        }
    }

    #[tokio::test]
    async fn routes_calls_to_the_provider_namespace() {
        let provider = Arc::new(SlowProvider::default());
        let channel = InjectedChannel::new(provider.clone());
        channel.set_provider_path("ethereum");

        channel.connect(ConnectOptions::default()).await.unwrap();
        assert!(channel.is_connected());

        let (valid, payload) = channel.check_session().await.unwrap();
        assert!(valid);
        assert_eq!(payload["namespace"], "ethereum");

        channel.on("chainChanged", Box::new(|_| {}));
        assert_eq!(*provider.subscribed.lock(), vec!["ethereum/chainChanged"]);
    }

    #[tokio::test]
    async fn slow_request_times_out() {
        let channel = InjectedChannel::new(Arc::new(SlowProvider::default()));
        channel.set_provider_path("ethereum");
        let err = channel
            .request(
                RpcRequest::new("slow", Value::Null),
                Some(Duration::from_millis(10)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn no_session_before_connect() {
        let channel = InjectedChannel::new(Arc::new(SlowProvider::default()));
        channel.set_provider_path("ethereum");
        let (valid, _) = channel.check_session().await.unwrap();
        assert!(!valid);
    }
}
