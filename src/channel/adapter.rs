use std::marker::PhantomData;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};

use super::{ConnectOptions, EventCallback, ProviderChannel, RpcRequest};
use crate::error::Error;

/// Chain family an adapter speaks for.
pub trait Chain: Send + Sync + 'static {
    /// Injected-provider namespace, e.g. `"ethereum"`.
    const PROVIDER_PATH: &'static str;
}

/// EVM chains.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ethereum;

impl Chain for Ethereum {
    const PROVIDER_PATH: &'static str = "ethereum";
}

/// Called after every successful connect.
pub type OnConnect = Box<dyn Fn(&AdapterHandle) + Send + Sync>;

/// Protocol layer bound on top of an adapter.
///
/// The protocol receives a weak handle so it can drive the adapter without the
/// adapter knowing the protocol's type.
pub trait ProtocolDefinition: Send + Sync {
    fn bind_adapter(&self, adapter: AdapterHandle);
}

struct Inner {
    provider_path: &'static str,
    channel: RwLock<Option<Arc<dyn ProviderChannel>>>,
    protocol: RwLock<Option<Arc<dyn ProtocolDefinition>>>,
    on_connect: Mutex<Vec<Arc<dyn Fn(&AdapterHandle) + Send + Sync>>>,
    request_timeout: Mutex<Option<Duration>>,
}

impl Inner {
    fn channel(&self) -> Result<Arc<dyn ProviderChannel>, Error> {
        self.channel.read().clone().ok_or(Error::ChannelIsNotDefined)
    }

    fn is_connected(&self) -> bool {
        self.channel
            .read()
            .as_ref()
            .is_some_and(|channel| channel.is_connected())
    }

    async fn request(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        let channel = self.channel()?;
        let timeout = timeout.or(*self.request_timeout.lock());
        channel.request(request, timeout).await
    }

    async fn check_session(&self) -> Result<(bool, Value), Error> {
        self.channel()?.check_session().await
    }
}

/// Chain-specific façade over a [`ProviderChannel`].
///
/// ```rust,ignore
/// use chainauth::channel::{BridgeChannel, ChainAdapter, ConnectOptions, Ethereum};
///
/// let (channel, endpoint) = BridgeChannel::new();
/// let adapter = ChainAdapter::<Ethereum>::new().with_channel(Arc::new(channel));
/// adapter.connect(ConnectOptions::default()).await?;
/// let accounts = adapter.accounts().await?;
/// ```
pub struct ChainAdapter<C: Chain> {
    inner: Arc<Inner>,
    _chain: PhantomData<C>,
}

impl<C: Chain> Clone for ChainAdapter<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _chain: PhantomData,
        }
    }
}

impl<C: Chain> Default for ChainAdapter<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Chain> ChainAdapter<C> {
    /// Adapter without a channel. Channel-dependent calls fail until one is attached.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                provider_path: C::PROVIDER_PATH,
                channel: RwLock::new(None),
                protocol: RwLock::new(None),
                on_connect: Mutex::new(Vec::new()),
                request_timeout: Mutex::new(None),
            }),
            _chain: PhantomData,
        }
    }

    #[must_use]
    pub fn with_channel(self, channel: Arc<dyn ProviderChannel>) -> Self {
        self.attach_channel(channel);
        self
    }

    /// Default timeout for requests made through this adapter.
    #[must_use]
    pub fn with_request_timeout(self, timeout: Duration) -> Self {
        *self.inner.request_timeout.lock() = Some(timeout);
        self
    }

    /// Attach (or replace) the channel, propagating the provider path to it.
    pub fn attach_channel(&self, channel: Arc<dyn ProviderChannel>) {
        channel.set_provider_path(C::PROVIDER_PATH);
        *self.inner.channel.write() = Some(channel);
    }

    /// Bind a protocol and hand it a back-reference to this adapter.
    pub fn bind_protocol(&self, protocol: Arc<dyn ProtocolDefinition>) {
        protocol.bind_adapter(self.handle());
        *self.inner.protocol.write() = Some(protocol);
    }

    #[must_use]
    pub fn protocol(&self) -> Option<Arc<dyn ProtocolDefinition>> {
        self.inner.protocol.read().clone()
    }

    #[must_use]
    pub fn provider_path(&self) -> &'static str {
        C::PROVIDER_PATH
    }

    #[must_use]
    pub fn handle(&self) -> AdapterHandle {
        AdapterHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn on_connect(&self, callback: OnConnect) {
        self.inner.on_connect.lock().push(Arc::from(callback));
    }

    /// # Errors
    ///
    /// [`Error::ChannelIsNotDefined`] without a channel, otherwise whatever the
    /// transport reports.
    pub async fn connect(&self, options: ConnectOptions) -> Result<(), Error> {
        let channel = self.inner.channel()?;
        channel.set_provider_path(C::PROVIDER_PATH);
        channel.connect(options).await?;
        tracing::debug!(provider_path = C::PROVIDER_PATH, "Adapter connected");

        let handle = self.handle();
        let callbacks = self.inner.on_connect.lock().clone();
        for callback in callbacks {
            callback(&handle);
        }
        Ok(())
    }

    /// # Errors
    ///
    /// [`Error::ChannelIsNotDefined`] without a channel.
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.inner.channel()?.disconnect().await
    }

    /// # Errors
    ///
    /// [`Error::ChannelIsNotDefined`] without a channel, [`Error::Timeout`] if
    /// the wallet does not answer in time.
    pub async fn request(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        self.inner.request(request, timeout).await
    }

    /// # Errors
    ///
    /// [`Error::ChannelIsNotDefined`] without a channel.
    pub async fn check_session(&self) -> Result<(bool, Value), Error> {
        self.inner.check_session().await
    }

    /// # Errors
    ///
    /// [`Error::ChannelIsNotDefined`] without a channel.
    pub fn on(&self, event: &str, callback: EventCallback) -> Result<(), Error> {
        self.inner.channel()?.on(event, callback);
        Ok(())
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

impl ChainAdapter<Ethereum> {
    /// `eth_accounts`.
    pub async fn accounts(&self) -> Result<Vec<String>, Error> {
        let reply = self
            .request(RpcRequest::new("eth_accounts", json!([])), None)
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// `eth_chainId`, decoded from its hex quantity.
    pub async fn chain_id(&self) -> Result<u64, Error> {
        let reply = self
            .request(RpcRequest::new("eth_chainId", json!([])), None)
            .await?;
        let hex = reply
            .as_str()
            .ok_or_else(|| Error::Transport(format!("unexpected eth_chainId reply: {reply}")))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|e| Error::Transport(format!("invalid chain id {hex}: {e}")))
    }

    /// `personal_sign` over a UTF-8 message.
    pub async fn personal_sign(&self, message: &str, address: &str) -> Result<String, Error> {
        let reply = self
            .request(RpcRequest::new("personal_sign", json!([message, address])), None)
            .await?;
        Ok(serde_json::from_value(reply)?)
    }
}

/// Weak back-reference to an adapter, held by a bound protocol.
#[derive(Clone)]
pub struct AdapterHandle {
    inner: Weak<Inner>,
}

impl AdapterHandle {
    fn upgrade(&self) -> Result<Arc<Inner>, Error> {
        self.inner
            .upgrade()
            .ok_or_else(|| Error::Transport("adapter dropped".into()))
    }

    #[must_use]
    pub fn provider_path(&self) -> Option<&'static str> {
        self.inner.upgrade().map(|inner| inner.provider_path)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| inner.is_connected())
    }

    pub async fn request(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        self.upgrade()?.request(request, timeout).await
    }

    pub async fn check_session(&self) -> Result<(bool, Value), Error> {
        self.upgrade()?.check_session().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::channel::{BridgeChannel, BridgeEndpoint};

    fn spawn_wallet(mut endpoint: BridgeEndpoint) {
        tokio::spawn(async move {
            while let Some(req) = endpoint.next_request().await {
                let reply = match req.request.method.as_str() {
                    "eth_accounts" => json!(["0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"]),
                    "eth_chainId" => json!("0x2a"),
                    "personal_sign" => json!("0xsig"),
                    _ => Value::Null,
                };
                endpoint.respond(req.id, reply);
            }
        });
    }

    fn connected_pair() -> ChainAdapter<Ethereum> {
        let (channel, endpoint) = BridgeChannel::new();
        spawn_wallet(endpoint);
        ChainAdapter::<Ethereum>::new().with_channel(Arc::new(channel))
    }

    #[tokio::test]
    async fn request_without_channel_fails() {
        let adapter = ChainAdapter::<Ethereum>::new();
        let err = adapter
            .request(RpcRequest::new("eth_accounts", json!([])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChannelIsNotDefined));
        assert!(matches!(
            adapter.connect(ConnectOptions::default()).await,
            Err(Error::ChannelIsNotDefined)
        ));
        assert!(!adapter.is_connected());
    }

    #[tokio::test]
    async fn typed_ethereum_calls() {
        let adapter = connected_pair();
        adapter.connect(ConnectOptions::default()).await.unwrap();
        assert!(adapter.is_connected());

        assert_eq!(adapter.chain_id().await.unwrap(), 42);
        assert_eq!(adapter.accounts().await.unwrap().len(), 1);
        assert_eq!(adapter.personal_sign("hi", "0x1").await.unwrap(), "0xsig");
    }

    #[tokio::test]
    async fn on_connect_callbacks_fire() {
        let adapter = connected_pair();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        adapter.on_connect(Box::new(move |handle| {
            assert_eq!(handle.provider_path(), Some("ethereum"));
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        adapter.connect(ConnectOptions::default()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn on_connect_callback_may_register_another() {
        let adapter = connected_pair();
        let hits = Arc::new(AtomicUsize::new(0));
        adapter.on_connect(Box::new({
            let adapter = adapter.clone();
            let hits = hits.clone();
            move |_| {
                let hits = hits.clone();
                adapter.on_connect(Box::new(move |_| {
                    hits.fetch_add(1, Ordering::SeqCst);
                }));
            }
        }));

        adapter.connect(ConnectOptions::default()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        adapter.connect(ConnectOptions::default()).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct SigningProtocol {
        adapter: OnceLock<AdapterHandle>,
    }

    impl ProtocolDefinition for SigningProtocol {
        fn bind_adapter(&self, adapter: AdapterHandle) {
            let _ = self.adapter.set(adapter);
        }
    }

    #[tokio::test]
    async fn bound_protocol_drives_the_adapter() {
        let adapter = connected_pair();
        let protocol = Arc::new(SigningProtocol::default());
        adapter.bind_protocol(protocol.clone());
        adapter.connect(ConnectOptions::default()).await.unwrap();

        let handle = protocol.adapter.get().unwrap();
        assert!(handle.is_connected());
        let reply = handle
            .request(RpcRequest::new("eth_chainId", json!([])), None)
            .await
            .unwrap();
        assert_eq!(reply, json!("0x2a"));
        assert!(adapter.protocol().is_some());
    }

    #[tokio::test]
    async fn handle_outliving_adapter_reports_error() {
        let handle = ChainAdapter::<Ethereum>::new().handle();
        assert!(!handle.is_connected());
        assert!(handle.check_session().await.is_err());
    }
}
