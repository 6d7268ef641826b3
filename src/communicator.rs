//! Relaying flow results back to the window that started authentication.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RespondType {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Message,
    CloseEvent,
}

/// Data reported on success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseMessageCallbackArgument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause_event: Option<String>,
}

/// Wire message delivered to the origin window.
///
/// Build with [`success`](FrameMessage::success), [`error`](FrameMessage::error)
/// or [`close`](FrameMessage::close): a success never carries error fields and
/// an error carries exactly `error` and `error_code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameMessage {
    pub respond_type: RespondType,
    pub message_type: MessageType,
    #[serde(flatten)]
    pub body: ResponseMessageCallbackArgument,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(
        default,
        rename = "error_code",
        skip_serializing_if = "Option::is_none"
    )]
    pub error_code: Option<String>,
}

impl FrameMessage {
    #[must_use]
    pub fn success(body: ResponseMessageCallbackArgument) -> Self {
        Self {
            respond_type: RespondType::Success,
            message_type: MessageType::Message,
            body,
            error: None,
            error_code: None,
        }
    }

    #[must_use]
    pub fn error(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            respond_type: RespondType::Error,
            message_type: MessageType::Message,
            body: ResponseMessageCallbackArgument::default(),
            error: Some(error.into()),
            error_code: Some(error_code.into()),
        }
    }

    #[must_use]
    pub fn close() -> Self {
        Self {
            respond_type: RespondType::Success,
            message_type: MessageType::CloseEvent,
            body: ResponseMessageCallbackArgument::default(),
            error: None,
            error_code: None,
        }
    }
}

/// Delivers [`FrameMessage`]s to the initiating window.
#[async_trait]
pub trait OriginFrameCommunicator: Send + Sync {
    async fn send(&self, message: FrameMessage) -> Result<(), Error>;

    async fn send_success(&self, body: ResponseMessageCallbackArgument) -> Result<(), Error> {
        self.send(FrameMessage::success(body)).await
    }

    async fn send_error(&self, error: &str, error_code: &str) -> Result<(), Error> {
        self.send(FrameMessage::error(error, error_code)).await
    }

    /// Tell the origin the auth window is going away.
    async fn close(&self) -> Result<(), Error> {
        self.send(FrameMessage::close()).await
    }
}

/// Posts messages into an async outbox, the way a popup posts to its opener.
#[derive(Debug, Clone)]
pub struct PostMessageCommunicator {
    outbox: mpsc::UnboundedSender<FrameMessage>,
}

impl PostMessageCommunicator {
    #[must_use]
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FrameMessage>) {
        let (outbox, inbox) = mpsc::unbounded_channel();
        (Self { outbox }, inbox)
    }
}

#[async_trait]
impl OriginFrameCommunicator for PostMessageCommunicator {
    async fn send(&self, message: FrameMessage) -> Result<(), Error> {
        self.outbox
            .send(message)
            .map_err(|_| Error::Transport("origin window closed".into()))
    }
}

/// Turns each message into a redirect back to the target origin.
///
/// The latest redirect is kept until [`take_redirect`](Self::take_redirect).
#[derive(Debug)]
pub struct RedirectCommunicator {
    target: Url,
    last: Mutex<Option<Url>>,
}

impl RedirectCommunicator {
    #[must_use]
    pub fn new(target: Url) -> Self {
        Self {
            target,
            last: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn take_redirect(&self) -> Option<Url> {
        self.last.lock().take()
    }

    fn redirect_for(&self, message: &FrameMessage) -> Result<Url, Error> {
        let fields = serde_json::to_value(message)?;
        let mut url = self.target.clone();
        if let Some(fields) = fields.as_object() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in fields {
                match value.as_str() {
                    Some(text) => pairs.append_pair(key, text),
                    None => pairs.append_pair(key, &value.to_string()),
                };
            }
        }
        Ok(url)
    }
}

#[async_trait]
impl OriginFrameCommunicator for RedirectCommunicator {
    async fn send(&self, message: FrameMessage) -> Result<(), Error> {
        let url = self.redirect_for(&message)?;
        let mut last = self.last.lock();
        // A close after a result must not overwrite the result redirect.
        if message.message_type == MessageType::CloseEvent && last.is_some() {
            return Ok(());
        }
        *last = Some(url);
        Ok(())
    }
}
