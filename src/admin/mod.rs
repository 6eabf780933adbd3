// src/admin/mod.rs
mod client;
mod entities;
mod sas;

pub use client::{AdminClient, EmulatorAdminClient, HttpsClient, API_VERSION};
pub use entities::{
    CorrelationFilter, RuleDescription, RuleFilter, SubscriptionSettings, TopicSettings,
};
pub use sas::{generate_sas_token, SasError, DEFAULT_TOKEN_TTL_SECS};

use crate::connection::ConnectionStringError;
use async_trait::async_trait;
use hyper::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("Invalid admin connection string: {0}")]
    ConnectionString(#[from] ConnectionStringError),

    #[error("Invalid request for `{entity}`: {reason}")]
    InvalidRequest { entity: String, reason: String },

    #[error("Failed to sign admin request: {0}")]
    Signature(#[from] SasError),

    #[error("Admin request failed: {0}")]
    Transport(#[source] tower::BoxError),

    #[error("Admin API returned {status} for `{entity}`: {body}")]
    Status {
        entity: String,
        status: StatusCode,
        body: String,
    },
}

/// Queue lifecycle management.
#[async_trait]
pub trait QueueAdmin: Send + Sync {
    async fn create_queue(&self, name: &str) -> Result<(), AdminError>;

    async fn delete_queue(&self, name: &str) -> Result<(), AdminError>;
}

/// Topic, subscription and rule lifecycle management.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn create_topic(&self, name: &str, settings: &TopicSettings) -> Result<(), AdminError>;

    /// `default_rule` replaces the catch-all rule a new subscription gets.
    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        settings: &SubscriptionSettings,
        default_rule: Option<&RuleDescription>,
    ) -> Result<(), AdminError>;

    async fn create_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: &RuleDescription,
    ) -> Result<(), AdminError>;

    async fn delete_subscription(&self, topic: &str, subscription: &str) -> Result<(), AdminError>;

    async fn delete_topic(&self, name: &str) -> Result<(), AdminError>;
}
