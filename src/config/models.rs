// src/config/models.rs
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_HTTP_PORT: u16 = 5300;
pub const DEFAULT_AMQP_PORT: u16 = 5672;

pub const SHARED_ACCESS_KEY_NAME: &str = "RootManageSharedAccessKey";
pub const SHARED_ACCESS_KEY: &str = "SAS_KEY_VALUE";

/// Raw values as they come out of the environment. Everything is a string so a
/// bad port can be reported and ignored instead of failing deserialization.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct RawSettings {
    pub host: Option<String>,
    pub http_port: Option<String>,
    pub amqp_port: Option<String>,
    pub health_timeout_secs: Option<String>,
}

/// Endpoint configuration for one run. Built once at startup and passed by
/// reference to every consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmulatorConfig {
    pub host: String,
    pub http_port: u16,
    pub amqp_port: u16,
    pub key_name: String,
    pub key: String,

    /// Per-attempt timeout of a health probe.
    pub probe_timeout: Duration,
    /// Pause between two failed health probes.
    pub probe_interval: Duration,
    /// Overall bound on the health wait. `None` waits forever.
    pub health_deadline: Option<Duration>,

    pub receive_timeout: Duration,
    /// How long each subscription is drained in the topic run.
    pub subscription_receive_timeout: Duration,
    /// Applies to admin requests, link attach, send and complete.
    pub operation_timeout: Duration,
    /// Bound on closing a link, session or connection.
    pub close_timeout: Duration,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_HTTP_PORT)
    }
}

impl EmulatorConfig {
    pub fn new(host: impl Into<String>, http_port: u16) -> Self {
        Self {
            host: host.into(),
            http_port,
            amqp_port: DEFAULT_AMQP_PORT,
            key_name: SHARED_ACCESS_KEY_NAME.to_string(),
            key: SHARED_ACCESS_KEY.to_string(),
            probe_timeout: Duration::from_secs(3),
            probe_interval: Duration::from_secs(1),
            health_deadline: None,
            receive_timeout: Duration::from_secs(10),
            subscription_receive_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(10),
        }
    }

    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.host, self.http_port)
    }

    /// Runtime (AMQP) descriptor. Never carries a port.
    pub fn connection_string(&self) -> String {
        self.render_connection_string(&self.host)
    }

    /// Administrative descriptor. Collapses to the runtime descriptor on port 80.
    pub fn admin_connection_string(&self) -> String {
        if self.http_port == 80 {
            return self.connection_string();
        }
        self.render_connection_string(&format!("{}:{}", self.host, self.http_port))
    }

    fn render_connection_string(&self, authority: &str) -> String {
        format!(
            "Endpoint=sb://{};SharedAccessKeyName={};SharedAccessKey={};UseDevelopmentEmulator=true;",
            authority, self.key_name, self.key
        )
    }
}
