// ────────────────────────────────
// src/admin/client.rs
// REST client for the administrative API (ATOM entity descriptions).
// ────────────────────────────────
use super::entities::{queue_entry, rule_entry, subscription_entry, topic_entry};
use super::sas::{generate_sas_token, DEFAULT_TOKEN_TTL_SECS};
use super::{
    AdminError, QueueAdmin, RuleDescription, SubscriptionSettings, TopicAdmin, TopicSettings,
};
use crate::connection::ConnectionString;
use crate::transport::{PlainHttp, PlainHttpLayer};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use hyper::client::HttpConnector;
use hyper::{header, Body, Method, Request, Response, StatusCode};
use hyper_tls::HttpsConnector;
use std::time::Duration;
use tower::timeout::{Timeout, TimeoutLayer};
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};
use tracing::debug;
use url::Url;

pub const API_VERSION: &str = "2021-05";

const ATOM_CONTENT_TYPE: &str = "application/atom+xml;type=entry;charset=utf-8";

const CREATED: &[StatusCode] = &[StatusCode::OK, StatusCode::CREATED];
const DELETED: &[StatusCode] = &[StatusCode::OK];

pub type HttpsClient = hyper::Client<HttpsConnector<HttpConnector>, Body>;

/// The client the demo uses against the emulator.
pub type EmulatorAdminClient = AdminClient<Timeout<PlainHttp<HttpsClient>>>;

#[derive(Clone)]
pub struct AdminClient<S> {
    service: S,
    base_url: Url,
    key_name: String,
    key: String,
}

impl EmulatorAdminClient {
    /// Per-request timeout, scheme downgrade, then the regular https-capable
    /// hyper client.
    pub fn for_emulator(connection_string: &str, request_timeout: Duration) -> Result<Self, AdminError> {
        let connection = ConnectionString::parse(connection_string)?;
        let client: HttpsClient = hyper::Client::builder().build(HttpsConnector::new());

        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(request_timeout))
            .layer(PlainHttpLayer)
            .service(client);

        Self::new(service, &connection)
    }
}

impl<S> AdminClient<S> {
    pub fn new(service: S, connection: &ConnectionString) -> Result<Self, AdminError> {
        Ok(Self {
            service,
            base_url: connection.management_base_url()?,
            key_name: connection.shared_access_key_name.clone(),
            key: connection.shared_access_key.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn entity_url(&self, entity: &str) -> Result<Url, AdminError> {
        if entity.split('/').any(str::is_empty) {
            return Err(AdminError::InvalidRequest {
                entity: entity.to_string(),
                reason: "entity path has an empty segment".to_string(),
            });
        }

        self.base_url
            .join(entity)
            .map_err(|e| AdminError::InvalidRequest {
                entity: entity.to_string(),
                reason: e.to_string(),
            })
    }

    fn build_request(&self, method: Method, entity: &str, body: Body) -> Result<Request<Body>, AdminError> {
        let resource = self.entity_url(entity)?;
        let token = generate_sas_token(
            resource.as_str(),
            &self.key_name,
            &self.key,
            Utc::now() + ChronoDuration::seconds(DEFAULT_TOKEN_TTL_SECS),
        )?;

        let mut url = resource;
        url.query_pairs_mut().append_pair("api-version", API_VERSION);

        Request::builder()
            .method(method)
            .uri(url.as_str())
            .header(header::AUTHORIZATION, token)
            .header(header::CONTENT_TYPE, ATOM_CONTENT_TYPE)
            .body(body)
            .map_err(|e| AdminError::InvalidRequest {
                entity: entity.to_string(),
                reason: e.to_string(),
            })
    }
}

impl<S> AdminClient<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn execute(
        &self,
        request: Request<Body>,
        entity: &str,
        accepted: &[StatusCode],
    ) -> Result<(), AdminError> {
        debug!(method = %request.method(), uri = %request.uri(), "admin request");

        let response = self
            .service
            .clone()
            .oneshot(request)
            .await
            .map_err(|e| AdminError::Transport(e.into()))?;

        let status = response.status();
        if accepted.contains(&status) {
            return Ok(());
        }

        let body = hyper::body::to_bytes(response.into_body())
            .await
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();

        Err(AdminError::Status {
            entity: entity.to_string(),
            status,
            body,
        })
    }
}

fn subscription_path(topic: &str, subscription: &str) -> String {
    format!("{}/Subscriptions/{}", topic, subscription)
}

fn rule_path(topic: &str, subscription: &str, rule: &str) -> String {
    format!("{}/Rules/{}", subscription_path(topic, subscription), rule)
}

#[async_trait]
impl<S> QueueAdmin for AdminClient<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn create_queue(&self, name: &str) -> Result<(), AdminError> {
        let request = self.build_request(Method::PUT, name, Body::from(queue_entry()))?;
        self.execute(request, name, CREATED).await
    }

    async fn delete_queue(&self, name: &str) -> Result<(), AdminError> {
        let request = self.build_request(Method::DELETE, name, Body::empty())?;
        self.execute(request, name, DELETED).await
    }
}

#[async_trait]
impl<S> TopicAdmin for AdminClient<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + Sync + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
{
    async fn create_topic(&self, name: &str, settings: &TopicSettings) -> Result<(), AdminError> {
        let request = self.build_request(Method::PUT, name, Body::from(topic_entry(settings)))?;
        self.execute(request, name, CREATED).await
    }

    async fn create_subscription(
        &self,
        topic: &str,
        subscription: &str,
        settings: &SubscriptionSettings,
        default_rule: Option<&RuleDescription>,
    ) -> Result<(), AdminError> {
        let path = subscription_path(topic, subscription);
        let body = Body::from(subscription_entry(settings, default_rule));
        let request = self.build_request(Method::PUT, &path, body)?;
        self.execute(request, &path, CREATED).await
    }

    async fn create_rule(
        &self,
        topic: &str,
        subscription: &str,
        rule: &RuleDescription,
    ) -> Result<(), AdminError> {
        let path = rule_path(topic, subscription, &rule.name);
        let request = self.build_request(Method::PUT, &path, Body::from(rule_entry(rule)))?;
        self.execute(request, &path, CREATED).await
    }

    async fn delete_subscription(&self, topic: &str, subscription: &str) -> Result<(), AdminError> {
        let path = subscription_path(topic, subscription);
        let request = self.build_request(Method::DELETE, &path, Body::empty())?;
        self.execute(request, &path, DELETED).await
    }

    async fn delete_topic(&self, name: &str) -> Result<(), AdminError> {
        let request = self.build_request(Method::DELETE, name, Body::empty())?;
        self.execute(request, name, DELETED).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tower::service_fn;

    fn connection() -> ConnectionString {
        ConnectionString::parse(
            "Endpoint=sb://localhost:5300;SharedAccessKeyName=RootManageSharedAccessKey;SharedAccessKey=SAS_KEY_VALUE;UseDevelopmentEmulator=true;",
        )
        .unwrap()
    }

    #[test]
    fn test_create_request_shape() {
        let client = AdminClient::new((), &connection()).unwrap();
        let request = client
            .build_request(Method::PUT, "queue-7", Body::from(queue_entry()))
            .unwrap();

        assert_eq!(request.method(), Method::PUT);
        assert_eq!(
            request.uri().to_string(),
            "https://localhost:5300/queue-7?api-version=2021-05"
        );
        assert_eq!(request.headers()[header::CONTENT_TYPE], ATOM_CONTENT_TYPE);

        let auth = request.headers()[header::AUTHORIZATION].to_str().unwrap();
        assert!(auth.starts_with("SharedAccessSignature sr=https%3A%2F%2Flocalhost%3A5300%2Fqueue-7&sig="));
        assert!(auth.ends_with("&skn=RootManageSharedAccessKey"));
    }

    #[test]
    fn test_empty_entity_rejected() {
        let client = AdminClient::new((), &connection()).unwrap();
        for path in ["", "topic-1/Subscriptions/", "/queue-1"] {
            let result = client.build_request(Method::DELETE, path, Body::empty());
            assert!(matches!(result, Err(AdminError::InvalidRequest { .. })), "{path:?}");
        }
    }

    #[tokio::test]
    async fn test_unexpected_status_carries_body() {
        let service = service_fn(|_req: Request<Body>| async {
            Ok::<_, Infallible>(
                Response::builder()
                    .status(StatusCode::CONFLICT)
                    .body(Body::from("queue already exists"))
                    .unwrap(),
            )
        });

        let client = AdminClient::new(service, &connection()).unwrap();
        let err = client.create_queue("queue-1").await.unwrap_err();

        match err {
            AdminError::Status { entity, status, body } => {
                assert_eq!(entity, "queue-1");
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(body, "queue already exists");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_delete_issues_single_delete() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let service = {
            let calls = calls.clone();
            service_fn(move |req: Request<Body>| {
                calls
                    .lock()
                    .unwrap()
                    .push((req.method().clone(), req.uri().path().to_string()));
                async { Ok::<_, Infallible>(Response::new(Body::empty())) }
            })
        };

        let client = AdminClient::new(service, &connection()).unwrap();
        client.delete_queue("queue-9").await.unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(Method::DELETE, "/queue-9".to_string())]);
    }

    type Seen = Arc<Mutex<Vec<(Method, String, String)>>>;

    fn recording_service(
        seen: Seen,
    ) -> impl Service<Request<Body>, Response = Response<Body>, Error = Infallible, Future = impl Send>
           + Clone
           + Send
           + Sync
           + 'static {
        service_fn(move |req: Request<Body>| {
            let seen = seen.clone();
            async move {
                let (parts, body) = req.into_parts();
                let body = hyper::body::to_bytes(body).await.unwrap();
                seen.lock().unwrap().push((
                    parts.method,
                    parts.uri.path().to_string(),
                    String::from_utf8_lossy(&body).into_owned(),
                ));
                Ok::<_, Infallible>(
                    Response::builder()
                        .status(StatusCode::CREATED)
                        .body(Body::empty())
                        .unwrap(),
                )
            }
        })
    }

    #[tokio::test]
    async fn test_topic_hierarchy_paths() {
        let seen: Seen = Arc::default();
        let client = AdminClient::new(recording_service(seen.clone()), &connection()).unwrap();
        let rule = RuleDescription::sql("sql-filter-1", "userProp1 = 'value1'");

        client.create_topic("topic-1", &TopicSettings::default()).await.unwrap();
        client
            .create_subscription("topic-1", "sub-1", &SubscriptionSettings::default(), Some(&rule))
            .await
            .unwrap();
        client.create_rule("topic-1", "sub-1", &rule).await.unwrap();

        let seen = seen.lock().unwrap();
        let paths: Vec<_> = seen.iter().map(|(m, p, _)| (m.clone(), p.as_str())).collect();
        assert_eq!(
            paths,
            vec![
                (Method::PUT, "/topic-1"),
                (Method::PUT, "/topic-1/Subscriptions/sub-1"),
                (Method::PUT, "/topic-1/Subscriptions/sub-1/Rules/sql-filter-1"),
            ]
        );
        assert!(seen[0].2.contains("<TopicDescription "));
        assert!(seen[1].2.contains("<DefaultRuleDescription>"));
        assert!(seen[2].2.contains("<RuleDescription "));
    }

    #[tokio::test]
    async fn test_delete_subscription_expects_ok() {
        let seen: Seen = Arc::default();
        let client = AdminClient::new(recording_service(seen.clone()), &connection()).unwrap();

        // The recording service answers 201, which is not a delete success.
        let err = client.delete_subscription("topic-1", "sub-1").await.unwrap_err();

        match err {
            AdminError::Status { entity, status, .. } => {
                assert_eq!(entity, "topic-1/Subscriptions/sub-1");
                assert_eq!(status, StatusCode::CREATED);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(seen.lock().unwrap()[0].0, Method::DELETE);
    }
}
