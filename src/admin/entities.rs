// ────────────────────────────────
// src/admin/entities.rs
// ATOM entity descriptions for queues, topics, subscriptions and rules.
// ────────────────────────────────
use std::collections::BTreeMap;
use std::time::Duration;

const ENTITY_NS: &str = "http://schemas.microsoft.com/netservices/2010/10/servicebus/connect";
const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";
const XSD_NS: &str = "http://www.w3.org/2001/XMLSchema";

/// Topic properties sent on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSettings {
    pub default_message_ttl: Duration,
    pub requires_duplicate_detection: bool,
    pub duplicate_detection_window: Duration,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            default_message_ttl: Duration::from_secs(60 * 60),
            requires_duplicate_detection: false,
            duplicate_detection_window: Duration::from_secs(20),
        }
    }
}

/// Subscription properties sent on creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionSettings {
    pub lock_duration: Duration,
    pub requires_session: bool,
    pub default_message_ttl: Duration,
    pub dead_lettering_on_expiration: bool,
    pub max_delivery_count: u32,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            lock_duration: Duration::from_secs(60),
            requires_session: false,
            default_message_ttl: Duration::from_secs(60 * 60),
            dead_lettering_on_expiration: false,
            max_delivery_count: 3,
        }
    }
}

/// Matches on system properties and application properties by equality.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationFilter {
    pub correlation_id: Option<String>,
    pub message_id: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub content_type: Option<String>,
    pub properties: BTreeMap<String, String>,
}

impl CorrelationFilter {
    pub fn content_type(value: impl Into<String>) -> Self {
        Self {
            content_type: Some(value.into()),
            ..Self::default()
        }
    }

    pub fn property(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::default().with_property(key, value)
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleFilter {
    Correlation(CorrelationFilter),
    Sql(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescription {
    pub name: String,
    pub filter: RuleFilter,
    /// SQL action applied to matching messages, e.g. `SET sys.To = 'Entity'`.
    pub action: Option<String>,
}

impl RuleDescription {
    pub fn correlation(name: impl Into<String>, filter: CorrelationFilter) -> Self {
        Self {
            name: name.into(),
            filter: RuleFilter::Correlation(filter),
            action: None,
        }
    }

    pub fn sql(name: impl Into<String>, expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filter: RuleFilter::Sql(expression.into()),
            action: None,
        }
    }

    pub fn with_action(mut self, expression: impl Into<String>) -> Self {
        self.action = Some(expression.into());
        self
    }
}

pub(crate) fn queue_entry() -> String {
    atom_entry(&format!(
        r#"<QueueDescription xmlns="{}" xmlns:i="{}"/>"#,
        ENTITY_NS, XSI_NS
    ))
}

pub(crate) fn topic_entry(settings: &TopicSettings) -> String {
    atom_entry(&format!(
        concat!(
            r#"<TopicDescription xmlns="{}" xmlns:i="{}">"#,
            "<DefaultMessageTimeToLive>{}</DefaultMessageTimeToLive>",
            "<RequiresDuplicateDetection>{}</RequiresDuplicateDetection>",
            "<DuplicateDetectionHistoryTimeWindow>{}</DuplicateDetectionHistoryTimeWindow>",
            "</TopicDescription>",
        ),
        ENTITY_NS,
        XSI_NS,
        iso8601_duration(settings.default_message_ttl),
        settings.requires_duplicate_detection,
        iso8601_duration(settings.duplicate_detection_window),
    ))
}

/// Element order follows the service's data contract; it rejects reordered
/// children.
pub(crate) fn subscription_entry(
    settings: &SubscriptionSettings,
    default_rule: Option<&RuleDescription>,
) -> String {
    let rule = default_rule
        .map(|rule| format!("<DefaultRuleDescription>{}</DefaultRuleDescription>", rule_body(rule)))
        .unwrap_or_default();

    atom_entry(&format!(
        concat!(
            r#"<SubscriptionDescription xmlns="{}" xmlns:i="{}">"#,
            "<LockDuration>{}</LockDuration>",
            "<RequiresSession>{}</RequiresSession>",
            "<DefaultMessageTimeToLive>{}</DefaultMessageTimeToLive>",
            "<DeadLetteringOnMessageExpiration>{}</DeadLetteringOnMessageExpiration>",
            "{}",
            "<MaxDeliveryCount>{}</MaxDeliveryCount>",
            "</SubscriptionDescription>",
        ),
        ENTITY_NS,
        XSI_NS,
        iso8601_duration(settings.lock_duration),
        settings.requires_session,
        iso8601_duration(settings.default_message_ttl),
        settings.dead_lettering_on_expiration,
        rule,
        settings.max_delivery_count,
    ))
}

pub(crate) fn rule_entry(rule: &RuleDescription) -> String {
    atom_entry(&format!(
        r#"<RuleDescription xmlns="{}" xmlns:i="{}">{}</RuleDescription>"#,
        ENTITY_NS,
        XSI_NS,
        rule_body(rule)
    ))
}

fn rule_body(rule: &RuleDescription) -> String {
    let filter = match &rule.filter {
        RuleFilter::Correlation(filter) => correlation_filter(filter),
        RuleFilter::Sql(expression) => format!(
            r#"<Filter i:type="SqlFilter"><SqlExpression>{}</SqlExpression><CompatibilityLevel>20</CompatibilityLevel></Filter>"#,
            escape(expression)
        ),
    };

    let action = match &rule.action {
        Some(expression) => format!(
            r#"<Action i:type="SqlRuleAction"><SqlExpression>{}</SqlExpression><CompatibilityLevel>20</CompatibilityLevel></Action>"#,
            escape(expression)
        ),
        None => r#"<Action i:type="EmptyRuleAction"/>"#.to_string(),
    };

    format!("{}{}<Name>{}</Name>", filter, action, escape(&rule.name))
}

fn correlation_filter(filter: &CorrelationFilter) -> String {
    let mut xml = String::from(r#"<Filter i:type="CorrelationFilter">"#);

    let fields = [
        ("CorrelationId", &filter.correlation_id),
        ("MessageId", &filter.message_id),
        ("To", &filter.to),
        ("Label", &filter.subject),
        ("ContentType", &filter.content_type),
    ];
    for (element, value) in fields {
        if let Some(value) = value {
            xml.push_str(&format!("<{0}>{1}</{0}>", element, escape(value)));
        }
    }

    if !filter.properties.is_empty() {
        xml.push_str("<Properties>");
        for (key, value) in &filter.properties {
            xml.push_str(&format!(
                r#"<KeyValueOfstringanyType><Key>{}</Key><Value i:type="d6p1:string" xmlns:d6p1="{}">{}</Value></KeyValueOfstringanyType>"#,
                escape(key),
                XSD_NS,
                escape(value)
            ));
        }
        xml.push_str("</Properties>");
    }

    xml.push_str("</Filter>");
    xml
}

fn atom_entry(description: &str) -> String {
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<entry xmlns="http://www.w3.org/2005/Atom">"#,
            r#"<content type="application/xml">{}</content>"#,
            "</entry>",
        ),
        description
    )
}

/// `PT1H`, `PT1M`, `PT20S`. Sub-second precision is dropped.
pub(crate) fn iso8601_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs {
        0 => "PT0S".to_string(),
        s if s % 3600 == 0 => format!("PT{}H", s / 3600),
        s if s % 60 == 0 => format!("PT{}M", s / 60),
        s => format!("PT{}S", s),
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
