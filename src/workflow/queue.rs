// ────────────────────────────────
// src/workflow/queue.rs
// create queue → send → receive/complete → delete queue
// ────────────────────────────────
use super::{close_within, EntityName, WorkflowError, DEFAULT_CLOSE_TIMEOUT};
use crate::admin::QueueAdmin;
use crate::messaging::{
    MessagingError, OutgoingMessage, QueueMessaging, QueueReceiver, ReceivedMessage,
};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const DEMO_PAYLOAD: &str = "Hello, Azure Service Bus!";

#[derive(Debug)]
pub struct QueueRunReport {
    pub queue: EntityName,
    pub sent_message_id: String,
    pub received: Vec<ReceivedMessage>,
    pub completed: usize,
    pub queue_deleted: bool,
}

struct Exchange {
    sent_message_id: String,
    received: Vec<ReceivedMessage>,
    completed: usize,
}

pub struct QueueWorkflow {
    queue: EntityName,
    payload: Vec<u8>,
    max_messages: usize,
    receive_timeout: Duration,
    close_timeout: Duration,
}

impl QueueWorkflow {
    pub fn new(queue: EntityName, receive_timeout: Duration) -> Self {
        Self {
            queue,
            payload: DEMO_PAYLOAD.as_bytes().to_vec(),
            max_messages: 1,
            receive_timeout,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }

    pub fn with_close_timeout(mut self, limit: Duration) -> Self {
        self.close_timeout = limit;
        self
    }

    pub fn queue(&self) -> &EntityName {
        &self.queue
    }

    /// Run once without an external cancellation source.
    pub async fn run<A, M, C, Fut>(&self, admin: &A, connect: C) -> Result<QueueRunReport, WorkflowError>
    where
        A: QueueAdmin + ?Sized,
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
    {
        self.run_until(admin, connect, std::future::pending()).await
    }

    /// Run the demo once. The queue is deleted exactly once after its
    /// creation was attempted, whatever happens in between. When `cancel`
    /// resolves first the in-flight step is abandoned, the queue is still
    /// deleted and the run ends with [`WorkflowError::Interrupted`].
    pub async fn run_until<A, M, C, Fut, X>(
        &self,
        admin: &A,
        connect: C,
        cancel: X,
    ) -> Result<QueueRunReport, WorkflowError>
    where
        A: QueueAdmin + ?Sized,
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
        X: Future<Output = ()>,
    {
        tokio::pin!(cancel);
        let queue = self.queue.as_str();

        tokio::select! {
            created = admin.create_queue(queue) => {
                created.map_err(WorkflowError::CreateQueue)?;
            }
            _ = &mut cancel => {
                warn!("interrupted while creating queue {}", queue);
                // The PUT may already have been applied.
                self.delete_queue(admin).await;
                return Err(WorkflowError::Interrupted);
            }
        }
        info!("created queue: {}", queue);

        let outcome = tokio::select! {
            outcome = self.exchange(connect) => outcome,
            _ = &mut cancel => {
                warn!("interrupted; deleting queue {}", queue);
                Err(WorkflowError::Interrupted)
            }
        };
        let queue_deleted = self.delete_queue(admin).await;

        let exchange = outcome?;
        Ok(QueueRunReport {
            queue: self.queue.clone(),
            sent_message_id: exchange.sent_message_id,
            received: exchange.received,
            completed: exchange.completed,
            queue_deleted,
        })
    }

    async fn exchange<M, C, Fut>(&self, connect: C) -> Result<Exchange, WorkflowError>
    where
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
    {
        let mut client = connect().await.map_err(WorkflowError::Connect)?;

        let result = self.send_and_receive(&mut client).await;

        close_within(self.close_timeout, "messaging client", client.close()).await;
        result
    }

    async fn send_and_receive<M: QueueMessaging>(&self, client: &mut M) -> Result<Exchange, WorkflowError> {
        let queue = self.queue.as_str();

        let sent_message_id = client
            .send(queue, OutgoingMessage::new(self.payload.clone()))
            .await
            .map_err(WorkflowError::Send)?;
        info!(
            message_id = %sent_message_id,
            "Message sent: {}",
            String::from_utf8_lossy(&self.payload)
        );

        let mut receiver = client
            .open_receiver(queue)
            .await
            .map_err(WorkflowError::CreateReceiver)?;

        let result = self.receive_and_complete(&mut receiver).await;

        close_within(self.close_timeout, "receiver", receiver.close()).await;

        let (received, completed) = result?;
        Ok(Exchange {
            sent_message_id,
            received,
            completed,
        })
    }

    async fn receive_and_complete<R: QueueReceiver>(
        &self,
        receiver: &mut R,
    ) -> Result<(Vec<ReceivedMessage>, usize), WorkflowError> {
        let messages = receiver
            .receive(self.max_messages, self.receive_timeout)
            .await
            .map_err(WorkflowError::Receive)?;

        if messages.is_empty() {
            warn!(
                "no message arrived on {} within {:?}",
                self.queue, self.receive_timeout
            );
        }

        let completed = complete_all(receiver, &messages).await;
        Ok((messages, completed))
    }

    async fn delete_queue<A: QueueAdmin + ?Sized>(&self, admin: &A) -> bool {
        match admin.delete_queue(self.queue.as_str()).await {
            Ok(()) => {
                info!("deleted queue: {}", self.queue);
                true
            }
            Err(e) => {
                warn!("failed to delete queue {}: {}", self.queue, e);
                false
            }
        }
    }
}

/// Complete every message; failures are logged. Returns how many succeeded.
pub(super) async fn complete_all<R: QueueReceiver>(receiver: &mut R, messages: &[ReceivedMessage]) -> usize {
    let mut completed = 0;
    for message in messages {
        info!("Received message: {}", message.body_text());
        match receiver.complete(message).await {
            Ok(()) => completed += 1,
            Err(e) => warn!(
                "failed to complete message {}: {}",
                message.display_id(),
                e
            ),
        }
    }
    completed
}
