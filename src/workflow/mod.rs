// src/workflow/mod.rs
mod entity_name;
mod queue;
mod topic;

pub use entity_name::EntityName;
pub use queue::{QueueRunReport, QueueWorkflow, DEMO_PAYLOAD};
pub use topic::{
    demo_batches, demo_subscriptions, SubscriptionDelivery, SubscriptionPlan, TopicRunReport,
    TopicWorkflow, DEMO_MESSAGES_PER_BATCH,
};

use crate::admin::AdminError;
use crate::messaging::MessagingError;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// Failures that end a run. Cleanup and completion problems are only logged
/// and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("failed to create queue: {0}")]
    CreateQueue(#[source] AdminError),

    #[error("failed to create topic: {0}")]
    CreateTopic(#[source] AdminError),

    #[error("failed to create subscription `{subscription}`: {source}")]
    CreateSubscription {
        subscription: String,
        #[source]
        source: AdminError,
    },

    #[error("no subscriptions configured for topic `{0}`")]
    NoSubscriptions(String),

    #[error("failed to create messaging client: {0}")]
    Connect(#[source] MessagingError),

    #[error("failed to send message: {0}")]
    Send(#[source] MessagingError),

    #[error("failed to create receiver: {0}")]
    CreateReceiver(#[source] MessagingError),

    #[error("failed to receive messages: {0}")]
    Receive(#[source] MessagingError),

    #[error("interrupted")]
    Interrupted,
}

/// Run a close step with an upper bound. Errors and timeouts are logged and
/// swallowed so cleanup further down always gets its turn.
pub(crate) async fn close_within<F, E>(limit: Duration, what: &str, close: F)
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match timeout(limit, close).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("failed to close {}: {}", what, e),
        Err(_) => warn!("gave up closing {} after {:?}", what, limit),
    }
}
