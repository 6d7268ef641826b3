//! Wallet transports behind one request / session / subscription interface.
//!
//! A [`ProviderChannel`] owns the transport. A [`ChainAdapter`] owns a channel
//! and adds chain-specific typed calls on top of it.

mod adapter;
mod bridge;
mod injected;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

pub use adapter::{AdapterHandle, Chain, ChainAdapter, Ethereum, OnConnect, ProtocolDefinition};
pub use bridge::{BridgeChannel, BridgeEndpoint, BridgeReply, BridgeRequest};
pub use injected::{InjectedChannel, InjectedProvider};

/// Used when a caller does not pass its own timeout to `request`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Callback for provider-pushed events such as account or chain changes.
pub type EventCallback = Box<dyn Fn(&Value) + Send + Sync>;

/// A JSON-RPC style call forwarded to the wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Options passed through to the transport on connect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

impl ConnectOptions {
    #[must_use]
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }
}

/// Transport-level connection to a wallet or provider.
#[async_trait]
pub trait ProviderChannel: Send + Sync {
    /// Injected-provider namespace to route calls to. Set before the first connect.
    fn set_provider_path(&self, path: &'static str);

    async fn connect(&self, options: ConnectOptions) -> Result<(), Error>;

    /// Drop the transport. Subscriptions stop firing and pending requests fail.
    async fn disconnect(&self) -> Result<(), Error>;

    /// Whether a previous session is still valid, plus its refreshed payload.
    async fn check_session(&self) -> Result<(bool, Value), Error>;

    /// Forward an RPC call. Resolves to [`Error::Timeout`] if no reply arrives in time.
    async fn request(&self, request: RpcRequest, timeout: Option<Duration>)
    -> Result<Value, Error>;

    /// Subscribe to a provider event. Several callbacks per event are allowed.
    fn on(&self, event: &str, callback: EventCallback);

    fn is_connected(&self) -> bool;
}
