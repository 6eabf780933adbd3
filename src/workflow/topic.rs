// ────────────────────────────────
// src/workflow/topic.rs
// create topic + subscriptions → publish batches → drain each subscription
// → delete subscriptions and topic
// ────────────────────────────────
use super::queue::complete_all;
use super::{close_within, EntityName, WorkflowError, DEFAULT_CLOSE_TIMEOUT};
use crate::admin::{
    CorrelationFilter, RuleDescription, SubscriptionSettings, TopicAdmin, TopicSettings,
};
use crate::messaging::{
    subscription_path, MessagingError, OutgoingMessage, QueueMessaging, QueueReceiver,
    ReceivedMessage,
};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

pub const DEMO_MESSAGES_PER_BATCH: usize = 3;

#[derive(Debug, Clone)]
pub struct SubscriptionPlan {
    pub name: EntityName,
    /// `None` keeps the catch-all rule, so every message is delivered.
    pub rule: Option<RuleDescription>,
}

/// Four subscriptions: content type, application property, catch-all, and a
/// SQL filter whose action stamps `To`.
pub fn demo_subscriptions() -> Vec<SubscriptionPlan> {
    vec![
        SubscriptionPlan {
            name: EntityName::with_prefix("sub-1"),
            rule: Some(RuleDescription::correlation(
                "app-prop-filter-1",
                CorrelationFilter::content_type("application/text"),
            )),
        },
        SubscriptionPlan {
            name: EntityName::with_prefix("sub-2"),
            rule: Some(RuleDescription::correlation(
                "user-prop-filter-1",
                CorrelationFilter::property("prop1", "value1"),
            )),
        },
        SubscriptionPlan {
            name: EntityName::with_prefix("sub-3"),
            rule: None,
        },
        SubscriptionPlan {
            name: EntityName::with_prefix("sub-4"),
            rule: Some(
                RuleDescription::sql(
                    "sql-filter-1",
                    "sys.MessageId = '123456' AND userProp1 = 'value1'",
                )
                .with_action("SET sys.To = 'Entity'"),
            ),
        },
    ]
}

/// Three batches, one per rule in [`demo_subscriptions`], numbered
/// consecutively across batches.
pub fn demo_batches(per_batch: usize) -> Vec<Vec<OutgoingMessage>> {
    let body = |n: usize| format!("Message number : {}", n);

    let content_typed = (0..per_batch)
        .map(|n| OutgoingMessage::new(body(n)).with_content_type("application/text"))
        .collect();
    let with_prop = (per_batch..per_batch * 2)
        .map(|n| OutgoingMessage::new(body(n)).with_property("prop1", "value1"))
        .collect();
    let sql_matched = (per_batch * 2..per_batch * 3)
        .map(|n| {
            OutgoingMessage::new(body(n))
                .with_message_id("123456")
                .with_property("userProp1", "value1")
        })
        .collect();

    vec![content_typed, with_prop, sql_matched]
}

#[derive(Debug)]
pub struct SubscriptionDelivery {
    pub subscription: String,
    pub received: Vec<ReceivedMessage>,
    pub completed: usize,
}

#[derive(Debug)]
pub struct TopicRunReport {
    pub topic: EntityName,
    pub sent: usize,
    pub deliveries: Vec<SubscriptionDelivery>,
    /// Every subscription and the topic itself were deleted.
    pub teardown_complete: bool,
}

pub struct TopicWorkflow {
    topic: EntityName,
    topic_settings: TopicSettings,
    subscription_settings: SubscriptionSettings,
    subscriptions: Vec<SubscriptionPlan>,
    batches: Vec<Vec<OutgoingMessage>>,
    receive_timeout: Duration,
    close_timeout: Duration,
}

impl TopicWorkflow {
    pub fn new(
        topic: EntityName,
        subscriptions: Vec<SubscriptionPlan>,
        batches: Vec<Vec<OutgoingMessage>>,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            topic,
            topic_settings: TopicSettings::default(),
            subscription_settings: SubscriptionSettings::default(),
            subscriptions,
            batches,
            receive_timeout,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    /// Fresh topic, the four demo subscriptions and three batches of three.
    pub fn demo(receive_timeout: Duration) -> Self {
        Self::new(
            EntityName::topic(),
            demo_subscriptions(),
            demo_batches(DEMO_MESSAGES_PER_BATCH),
            receive_timeout,
        )
    }

    pub fn with_close_timeout(mut self, limit: Duration) -> Self {
        self.close_timeout = limit;
        self
    }

    pub fn topic(&self) -> &EntityName {
        &self.topic
    }

    pub fn subscriptions(&self) -> &[SubscriptionPlan] {
        &self.subscriptions
    }

    pub async fn run<A, M, C, Fut>(&self, admin: &A, connect: C) -> Result<TopicRunReport, WorkflowError>
    where
        A: TopicAdmin + ?Sized,
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
    {
        self.run_until(admin, connect, std::future::pending()).await
    }

    /// Provision, exchange and tear down. Once the topic creation was
    /// attempted, every subscription that was created and the topic are
    /// deleted exactly once, even when a later step fails or `cancel`
    /// resolves.
    pub async fn run_until<A, M, C, Fut, X>(
        &self,
        admin: &A,
        connect: C,
        cancel: X,
    ) -> Result<TopicRunReport, WorkflowError>
    where
        A: TopicAdmin + ?Sized,
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
        X: Future<Output = ()>,
    {
        if self.subscriptions.is_empty() {
            return Err(WorkflowError::NoSubscriptions(self.topic.to_string()));
        }
        tokio::pin!(cancel);
        let topic = self.topic.as_str();

        tokio::select! {
            created = admin.create_topic(topic, &self.topic_settings) => {
                created.map_err(WorkflowError::CreateTopic)?;
            }
            _ = &mut cancel => {
                warn!("interrupted while creating topic {}", topic);
                self.teardown(admin, &[]).await;
                return Err(WorkflowError::Interrupted);
            }
        }
        info!("created topic: {}", topic);

        let mut created = Vec::with_capacity(self.subscriptions.len());
        let provisioned = tokio::select! {
            provisioned = self.provision(admin, &mut created) => provisioned,
            _ = &mut cancel => {
                warn!("interrupted while creating subscriptions of {}", topic);
                Err(WorkflowError::Interrupted)
            }
        };

        let outcome = match provisioned {
            Ok(()) => tokio::select! {
                outcome = self.exchange(connect) => outcome,
                _ = &mut cancel => {
                    warn!("interrupted; tearing down topic {}", topic);
                    Err(WorkflowError::Interrupted)
                }
            },
            Err(e) => Err(e),
        };

        let teardown_complete = self.teardown(admin, &created).await;

        let (sent, deliveries) = outcome?;
        Ok(TopicRunReport {
            topic: self.topic.clone(),
            sent,
            deliveries,
            teardown_complete,
        })
    }

    async fn provision<'a, A: TopicAdmin + ?Sized>(
        &'a self,
        admin: &A,
        created: &mut Vec<&'a str>,
    ) -> Result<(), WorkflowError> {
        let topic = self.topic.as_str();
        for plan in &self.subscriptions {
            let name = plan.name.as_str();
            admin
                .create_subscription(topic, name, &self.subscription_settings, plan.rule.as_ref())
                .await
                .map_err(|source| WorkflowError::CreateSubscription {
                    subscription: name.to_string(),
                    source,
                })?;
            created.push(name);
            info!("created subscription: {}", name);
        }
        Ok(())
    }

    async fn exchange<M, C, Fut>(&self, connect: C) -> Result<(usize, Vec<SubscriptionDelivery>), WorkflowError>
    where
        M: QueueMessaging,
        C: FnOnce() -> Fut,
        Fut: Future<Output = Result<M, MessagingError>>,
    {
        let mut client = connect().await.map_err(WorkflowError::Connect)?;

        let result = self.publish_and_drain(&mut client).await;

        close_within(self.close_timeout, "messaging client", client.close()).await;
        result
    }

    async fn publish_and_drain<M: QueueMessaging>(
        &self,
        client: &mut M,
    ) -> Result<(usize, Vec<SubscriptionDelivery>), WorkflowError> {
        let topic = self.topic.as_str();

        let mut sent = 0;
        for batch in &self.batches {
            let ids = client
                .send_batch(topic, batch.clone())
                .await
                .map_err(WorkflowError::Send)?;
            sent += ids.len();
        }
        info!("Sent {} messages to the topic: {}", sent, topic);

        let mut deliveries = Vec::with_capacity(self.subscriptions.len());
        for plan in &self.subscriptions {
            let delivery = self.drain(client, plan.name.as_str(), sent.max(1)).await?;
            deliveries.push(delivery);
        }
        Ok((sent, deliveries))
    }

    async fn drain<M: QueueMessaging>(
        &self,
        client: &mut M,
        subscription: &str,
        max: usize,
    ) -> Result<SubscriptionDelivery, WorkflowError> {
        info!("Starting to receive messages from {}", subscription);
        let path = subscription_path(self.topic.as_str(), subscription);

        let mut receiver = client
            .open_receiver(&path)
            .await
            .map_err(WorkflowError::CreateReceiver)?;

        let result = receiver
            .receive(max, self.receive_timeout)
            .await
            .map_err(WorkflowError::Receive);

        let delivery = match result {
            Ok(received) => {
                let completed = complete_all(&mut receiver, &received).await;
                for message in &received {
                    if let Some(to) = &message.to {
                        info!(subscription, to = %to, "message was routed by a rule action");
                    }
                }
                Ok(SubscriptionDelivery {
                    subscription: subscription.to_string(),
                    received,
                    completed,
                })
            }
            Err(e) => Err(e),
        };

        close_within(self.close_timeout, "receiver", receiver.close()).await;
        delivery
    }

    /// Subscriptions first, then the topic. Returns whether everything was
    /// deleted.
    async fn teardown<A: TopicAdmin + ?Sized>(&self, admin: &A, created: &[&str]) -> bool {
        let topic = self.topic.as_str();
        let mut complete = true;

        for subscription in created {
            match admin.delete_subscription(topic, subscription).await {
                Ok(()) => info!("deleted subscription: {}", subscription),
                Err(e) => {
                    warn!("failed to delete subscription {}: {}", subscription, e);
                    complete = false;
                }
            }
        }

        match admin.delete_topic(topic).await {
            Ok(()) => info!("deleted topic: {}", topic),
            Err(e) => {
                warn!("failed to delete topic {}: {}", topic, e);
                complete = false;
            }
        }

        complete
    }
}
