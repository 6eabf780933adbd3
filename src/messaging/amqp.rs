// ────────────────────────────────
// src/messaging/amqp.rs
// AMQP 1.0 implementation of the messaging capability. The emulator accepts
// SASL PLAIN with the shared access key over plaintext AMQP.
// ────────────────────────────────
use super::{
    MessagingError, OutgoingMessage, QueueMessaging, QueueReceiver, ReceivedMessage,
};
use crate::connection::ConnectionString;
use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::link::delivery::Delivery;
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::session::SessionHandle;
use fe2o3_amqp::types::messaging::{
    AmqpValue, ApplicationProperties, Body, Message, MessageId, Outcome, Properties,
};
use fe2o3_amqp::types::primitives::{Binary, SimpleValue, Symbol, Value};
use fe2o3_amqp::{Connection, Receiver, Sender, Session};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

async fn with_timeout<T, E, F>(
    limit: Duration,
    operation: &'static str,
    fut: F,
) -> Result<T, MessagingError>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    timeout(limit, fut)
        .await
        .map_err(|_| MessagingError::Timeout(operation, limit))?
        .map_err(MessagingError::amqp(operation))
}

/// Bounded close whose failure is only logged.
async fn close_quietly<E, F>(limit: Duration, operation: &'static str, fut: F)
where
    F: Future<Output = Result<(), E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    if let Err(e) = with_timeout(limit, operation, fut).await {
        warn!(error = %e, "{} failed", operation);
    }
}

pub struct AmqpMessaging {
    connection: ConnectionHandle<()>,
    session: SessionHandle<()>,
    operation_timeout: Duration,
    links_opened: u64,
}

impl AmqpMessaging {
    /// Open a connection and a session. The runtime descriptor carries no
    /// port, so the AMQP port is passed separately.
    pub async fn connect(
        connection_string: &str,
        amqp_port: u16,
        operation_timeout: Duration,
    ) -> Result<Self, MessagingError> {
        let conn = ConnectionString::parse(connection_string)?;
        let url = format!("amqp://{}:{}", conn.host(), amqp_port);
        let container_id = format!("servicebus-emulator-demo-{}", uuid::Uuid::new_v4());

        debug!(%url, %container_id, "opening AMQP connection");
        let mut connection = with_timeout(
            operation_timeout,
            "open AMQP connection",
            Connection::builder()
                .container_id(container_id)
                .sasl_profile(SaslProfile::Plain {
                    username: conn.shared_access_key_name.clone(),
                    password: conn.shared_access_key.clone(),
                })
                .open(url.as_str()),
        )
        .await?;

        let session = match with_timeout(
            operation_timeout,
            "begin AMQP session",
            Session::begin(&mut connection),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                close_quietly(operation_timeout, "close AMQP connection", connection.close()).await;
                return Err(e);
            }
        };

        info!(%url, "connected to messaging endpoint");
        Ok(Self {
            connection,
            session,
            operation_timeout,
            links_opened: 0,
        })
    }

    fn next_link_name(&mut self, role: &str) -> String {
        self.links_opened += 1;
        format!("{}-link-{}", role, self.links_opened)
    }
}

#[async_trait]
impl QueueMessaging for AmqpMessaging {
    type Receiver = AmqpReceiver;

    async fn send(&mut self, entity: &str, message: OutgoingMessage) -> Result<String, MessagingError> {
        let message_id = message.message_id.clone();
        self.send_batch(entity, vec![message]).await?;
        Ok(message_id)
    }

    async fn send_batch(
        &mut self,
        entity: &str,
        messages: Vec<OutgoingMessage>,
    ) -> Result<Vec<String>, MessagingError> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let link_name = self.next_link_name("sender");
        let mut sender = with_timeout(
            self.operation_timeout,
            "create sender",
            Sender::attach(&mut self.session, link_name, entity),
        )
        .await?;

        let limit = self.operation_timeout;
        let sent = send_each(&mut sender, messages, limit).await;

        // The sender is closed whatever the outcome of the sends.
        close_quietly(limit, "close sender", sender.close()).await;

        sent
    }

    async fn open_receiver(&mut self, entity: &str) -> Result<AmqpReceiver, MessagingError> {
        let link_name = self.next_link_name("receiver");
        let receiver = with_timeout(
            self.operation_timeout,
            "create receiver",
            Receiver::attach(&mut self.session, link_name, entity),
        )
        .await?;

        Ok(AmqpReceiver {
            receiver,
            pending: PendingDeliveries::default(),
            operation_timeout: self.operation_timeout,
        })
    }

    async fn close(mut self) -> Result<(), MessagingError> {
        let limit = self.operation_timeout;
        let session = with_timeout(limit, "end AMQP session", self.session.end()).await;
        // The connection is closed even when ending the session failed.
        let connection = with_timeout(limit, "close AMQP connection", self.connection.close()).await;

        session.and(connection)
    }
}

async fn send_each(
    sender: &mut Sender,
    messages: Vec<OutgoingMessage>,
    limit: Duration,
) -> Result<Vec<String>, MessagingError> {
    let mut ids = Vec::with_capacity(messages.len());
    for message in messages {
        let message_id = message.message_id;

        let mut properties = Properties::builder().message_id(MessageId::String(message_id.clone()));
        if let Some(content_type) = message.content_type {
            properties = properties.content_type(Symbol::from(content_type));
        }

        let mut builder = Message::builder().properties(properties.build());
        if !message.application_properties.is_empty() {
            let mut application = ApplicationProperties::builder();
            for (key, value) in message.application_properties {
                application = application.insert(key, SimpleValue::String(value));
            }
            builder = builder.application_properties(application.build());
        }
        let amqp_message = builder.data(Binary::from(message.body)).build();

        let outcome = with_timeout(limit, "send message", sender.send(amqp_message)).await?;
        settle_outcome(&message_id, outcome)?;
        ids.push(message_id);
    }
    Ok(ids)
}

/// Anything but `Accepted` means the broker did not take the message.
fn settle_outcome(message_id: &str, outcome: Outcome) -> Result<(), MessagingError> {
    match outcome {
        Outcome::Accepted(_) => Ok(()),
        other => Err(MessagingError::Rejected(
            message_id.to_string(),
            format!("{:?}", other),
        )),
    }
}

/// Unsettled deliveries keyed by the lock token handed out with each
/// [`ReceivedMessage`]. A token can be redeemed once.
#[derive(Debug)]
struct PendingDeliveries<D> {
    pending: HashMap<u64, D>,
    next_token: u64,
}

impl<D> Default for PendingDeliveries<D> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
            next_token: 0,
        }
    }
}

impl<D> PendingDeliveries<D> {
    fn track(&mut self, delivery: D) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.pending.insert(token, delivery);
        token
    }

    fn take(&mut self, message: &ReceivedMessage) -> Result<D, MessagingError> {
        self.pending
            .remove(&message.lock_token)
            .ok_or_else(|| MessagingError::UnknownMessage(message.display_id().to_string()))
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// One incoming delivery at a time.
#[async_trait]
trait DeliverySource: Send {
    type Delivery: Send;

    async fn next_delivery(&mut self) -> Result<Self::Delivery, MessagingError>;
}

#[async_trait]
impl DeliverySource for Receiver {
    type Delivery = Delivery<Body<Value>>;

    async fn next_delivery(&mut self) -> Result<Self::Delivery, MessagingError> {
        self.recv::<Body<Value>>()
            .await
            .map_err(MessagingError::amqp("receive messages"))
    }
}

/// Pull deliveries until `max` arrived or `deadline` passed.
async fn collect_deliveries<S: DeliverySource>(
    source: &mut S,
    max: usize,
    deadline: Instant,
) -> Result<Vec<S::Delivery>, MessagingError> {
    let mut deliveries = Vec::new();
    while deliveries.len() < max {
        match timeout_at(deadline, source.next_delivery()).await {
            Ok(delivery) => deliveries.push(delivery?),
            Err(_) => break,
        }
    }
    Ok(deliveries)
}

pub struct AmqpReceiver {
    receiver: Receiver,
    pending: PendingDeliveries<Delivery<Body<Value>>>,
    operation_timeout: Duration,
}

#[async_trait]
impl QueueReceiver for AmqpReceiver {
    async fn receive(&mut self, max: usize, wait: Duration) -> Result<Vec<ReceivedMessage>, MessagingError> {
        let deliveries = collect_deliveries(&mut self.receiver, max, Instant::now() + wait).await?;

        let mut messages = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            let mut message = to_received(&delivery);
            message.lock_token = self.pending.track(delivery);
            messages.push(message);
        }
        debug!(received = messages.len(), unsettled = self.pending.len(), "receive finished");

        Ok(messages)
    }

    async fn complete(&mut self, message: &ReceivedMessage) -> Result<(), MessagingError> {
        let delivery = self.pending.take(message)?;

        with_timeout(
            self.operation_timeout,
            "complete message",
            self.receiver.accept(&delivery),
        )
        .await
    }

    async fn close(self) -> Result<(), MessagingError> {
        with_timeout(self.operation_timeout, "close receiver", self.receiver.close()).await
    }
}

fn to_received(delivery: &Delivery<Body<Value>>) -> ReceivedMessage {
    let properties = delivery.message().properties.as_ref();

    ReceivedMessage {
        message_id: properties
            .and_then(|p| p.message_id.as_ref())
            .map(message_id_to_string),
        body: body_bytes(delivery.body()),
        to: properties.and_then(|p| p.to.clone()),
        lock_token: 0,
    }
}

fn message_id_to_string(id: &MessageId) -> String {
    match id {
        MessageId::String(s) => s.clone(),
        other => format!("{:?}", other),
    }
}

/// Flatten a body into bytes. Data sections are concatenated; string and
/// binary values are taken as-is.
fn body_bytes(body: &Body<Value>) -> Vec<u8> {
    match body {
        Body::Data(sections) => sections
            .iter()
            .flat_map(|section| section.0.iter().copied())
            .collect(),
        Body::Value(AmqpValue(Value::String(s))) => s.as_bytes().to_vec(),
        Body::Value(AmqpValue(Value::Binary(b))) => b.to_vec(),
        Body::Value(AmqpValue(other)) => format!("{:?}", other).into_bytes(),
        _ => Vec::new(),
    }
}
