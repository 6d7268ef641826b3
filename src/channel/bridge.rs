use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::{mpsc, oneshot};
use ulid::Ulid;

use super::{ConnectOptions, DEFAULT_REQUEST_TIMEOUT, EventCallback, ProviderChannel, RpcRequest};
use crate::error::Error;

const CONNECT_METHOD: &str = "bridge_connect";
const SESSION_METHOD: &str = "bridge_session";

/// Request posted to the wallet window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: Ulid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_path: Option<String>,
    #[serde(flatten)]
    pub request: RpcRequest,
}

/// Message posted back by the wallet window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeReply {
    Response {
        id: Ulid,
        #[serde(default)]
        result: Option<Value>,
        #[serde(default)]
        error: Option<String>,
    },
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
}

type Pending = oneshot::Sender<Result<Value, String>>;
type Subscriber = Arc<dyn Fn(&Value) + Send + Sync>;

struct Shared {
    outbound: mpsc::UnboundedSender<BridgeRequest>,
    provider_path: Mutex<Option<&'static str>>,
    pending: Mutex<HashMap<Ulid, Pending>>,
    subscribers: Mutex<HashMap<String, Vec<Subscriber>>>,
    session: Mutex<Option<Value>>,
    connected: AtomicBool,
}

impl Shared {
    fn deliver(&self, reply: BridgeReply) {
        match reply {
            BridgeReply::Response { id, result, error } => {
                let Some(waiter) = self.pending.lock().remove(&id) else {
                    tracing::debug!(%id, "Dropping reply for unknown or expired request");
                    return;
                };
                let outcome = match error {
                    Some(message) => Err(message),
                    None => Ok(result.unwrap_or(Value::Null)),
                };
                let _ = waiter.send(outcome);
            }
            BridgeReply::Event { event, payload } => {
                if !self.connected.load(Ordering::Acquire) {
                    return;
                }
                // Released before invoking so callbacks may subscribe again.
                let callbacks = self.subscribers.lock().get(&event).cloned().unwrap_or_default();
                for callback in callbacks {
                    callback(&payload);
                }
            }
        }
    }
}

/// Channel to a wallet living in another window, reached through a message pipe.
///
/// Requests are correlated with replies by ULID. The other side of the pipe is
/// the [`BridgeEndpoint`] returned from [`BridgeChannel::new`].
#[derive(Clone)]
pub struct BridgeChannel {
    shared: Arc<Shared>,
    default_timeout: Duration,
}

/// Wallet-side end of a [`BridgeChannel`].
pub struct BridgeEndpoint {
    requests: mpsc::UnboundedReceiver<BridgeRequest>,
    channel: Weak<Shared>,
}

impl BridgeChannel {
    #[must_use]
    pub fn new() -> (Self, BridgeEndpoint) {
        let (outbound, requests) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            outbound,
            provider_path: Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            session: Mutex::new(None),
            connected: AtomicBool::new(false),
        });
        let endpoint = BridgeEndpoint {
            requests,
            channel: Arc::downgrade(&shared),
        };
        let channel = Self {
            shared,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
        };
        (channel, endpoint)
    }

    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Number of requests still waiting for a reply.
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.lock().len()
    }

    async fn send(&self, request: RpcRequest, timeout: Duration) -> Result<Value, Error> {
        let id = Ulid::new();
        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().insert(id, tx);
        let _guard = PendingGuard {
            shared: &self.shared,
            id,
        };

        let provider_path = self.shared.provider_path.lock().map(str::to_string);
        tracing::debug!(%id, method = %request.method, "Bridge request");
        let envelope = BridgeRequest {
            id,
            provider_path,
            request,
        };
        if self.shared.outbound.send(envelope).is_err() {
            return Err(Error::Transport("bridge endpoint closed".into()));
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(Error::Transport(message)),
            Ok(Err(_)) => Err(Error::Transport("bridge disconnected".into())),
            Err(_) => Err(Error::Timeout(timeout)),
        }
    }
}

/// Removes a request from the pending table however `send` ends, including
/// when its future is dropped.
struct PendingGuard<'a> {
    shared: &'a Shared,
    id: Ulid,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.id);
    }
}

#[async_trait]
impl ProviderChannel for BridgeChannel {
    fn set_provider_path(&self, path: &'static str) {
        *self.shared.provider_path.lock() = Some(path);
    }

    async fn connect(&self, options: ConnectOptions) -> Result<(), Error> {
        let params = serde_json::to_value(&options)?;
        let session = self
            .send(RpcRequest::new(CONNECT_METHOD, params), self.default_timeout)
            .await?;
        *self.shared.session.lock() = Some(session);
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), Error> {
        self.shared.connected.store(false, Ordering::Release);
        self.shared.pending.lock().clear();
        self.shared.subscribers.lock().clear();
        *self.shared.session.lock() = None;
        Ok(())
    }

    async fn check_session(&self) -> Result<(bool, Value), Error> {
        let stored = self.shared.session.lock().clone();
        let reply = self
            .send(
                RpcRequest::new(SESSION_METHOD, json!({ "session": stored })),
                self.default_timeout,
            )
            .await?;
        let valid = reply.get("valid").and_then(Value::as_bool).unwrap_or(false);
        let payload = reply.get("payload").cloned().unwrap_or(Value::Null);
        if valid {
            *self.shared.session.lock() = Some(payload.clone());
        }
        Ok((valid, payload))
    }

    async fn request(
        &self,
        request: RpcRequest,
        timeout: Option<Duration>,
    ) -> Result<Value, Error> {
        if !self.is_connected() {
            return Err(Error::Transport("bridge is not connected".into()));
        }
        self.send(request, timeout.unwrap_or(self.default_timeout))
            .await
    }

    fn on(&self, event: &str, callback: EventCallback) {
        self.shared
            .subscribers
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Arc::from(callback));
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }
}

impl BridgeEndpoint {
    /// Next request posted by the channel, or `None` once the channel is gone.
    pub async fn next_request(&mut self) -> Option<BridgeRequest> {
        self.requests.recv().await
    }

    /// Post a reply or event back to the channel.
    pub fn reply(&self, reply: BridgeReply) {
        if let Some(shared) = self.channel.upgrade() {
            shared.deliver(reply);
        }
    }

    pub fn respond(&self, id: Ulid, result: Value) {
        self.reply(BridgeReply::Response {
            id,
            result: Some(result),
            error: None,
        });
    }

    pub fn reject(&self, id: Ulid, error: impl Into<String>) {
        self.reply(BridgeReply::Response {
            id,
            result: None,
            error: Some(error.into()),
        });
    }

    pub fn emit(&self, event: impl Into<String>, payload: Value) {
        self.reply(BridgeReply::Event {
            event: event.into(),
            payload,
        });
    }
}
