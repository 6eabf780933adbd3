// src/messaging/mod.rs
mod amqp;

pub use amqp::{AmqpMessaging, AmqpReceiver};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("Invalid messaging connection string: {0}")]
    ConnectionString(#[from] crate::connection::ConnectionStringError),

    #[error("Failed to {operation}: {source}")]
    Amqp {
        operation: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("Timed out after {1:?} while trying to {0}")]
    Timeout(&'static str, Duration),

    #[error("Message {0} was not accepted by the broker: {1}")]
    Rejected(String, String),

    #[error("Unknown message {0}; it was not received through this receiver")]
    UnknownMessage(String),
}

impl MessagingError {
    pub(crate) fn amqp<E>(operation: &'static str) -> impl FnOnce(E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        move |e| MessagingError::Amqp {
            operation,
            source: Box::new(e),
        }
    }
}

/// Address of a topic subscription, as used when attaching a receiver.
pub fn subscription_path(topic: &str, subscription: &str) -> String {
    format!("{}/Subscriptions/{}", topic, subscription)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub message_id: String,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub application_properties: BTreeMap<String, String>,
}

impl OutgoingMessage {
    /// New message with a fresh UUID v4 message id.
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.into(),
            content_type: None,
            application_properties: BTreeMap::new(),
        }
    }

    pub fn with_message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = id.into();
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: Option<String>,
    pub body: Vec<u8>,
    /// Set by the sender or by a subscription rule action.
    pub to: Option<String>,
    /// Receiver-local handle used to settle the message.
    pub lock_token: u64,
}

impl ReceivedMessage {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn display_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("<none>")
    }
}

/// Send/receive capability. `entity` is a queue, a topic, or a subscription
/// path from [`subscription_path`].
#[async_trait]
pub trait QueueMessaging: Send + Sized {
    type Receiver: QueueReceiver;

    /// Attach a sender, send one message, close the sender. Returns the
    /// message id.
    async fn send(&mut self, entity: &str, message: OutgoingMessage) -> Result<String, MessagingError>;

    /// Send every message over one sender link. Stops at the first message
    /// the broker does not accept. Returns the ids in order.
    async fn send_batch(
        &mut self,
        entity: &str,
        messages: Vec<OutgoingMessage>,
    ) -> Result<Vec<String>, MessagingError>;

    async fn open_receiver(&mut self, entity: &str) -> Result<Self::Receiver, MessagingError>;

    async fn close(self) -> Result<(), MessagingError>;
}

#[async_trait]
pub trait QueueReceiver: Send + Sized {
    /// Wait for up to `max` messages. Returns early once `max` arrived; an
    /// empty batch after `wait` is not an error.
    async fn receive(&mut self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>, MessagingError>;

    /// Acknowledge a message so the broker removes it from the queue.
    async fn complete(&mut self, message: &ReceivedMessage) -> Result<(), MessagingError>;

    async fn close(self) -> Result<(), MessagingError>;
}
