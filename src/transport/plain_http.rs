// ────────────────────────────────
// src/transport/plain_http.rs
// Temporary shim: the emulator's admin API only speaks plaintext HTTP while the
// admin client always builds https:// URLs. Remove once either side changes.
// ────────────────────────────────
use hyper::http::uri::{Scheme, Uri};
use hyper::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Wraps a request-executing service and rewrites every request URI to `http`.
#[derive(Debug, Clone)]
pub struct PlainHttp<S> {
    inner: S,
}

impl<S> PlainHttp<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<Request<B>> for PlainHttp<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // The request is owned here, so the caller never observes the rewrite.
        let (mut parts, body) = req.into_parts();
        parts.uri = downgrade_scheme(&parts.uri);
        self.inner.call(Request::from_parts(parts, body))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHttpLayer;

impl<S> Layer<S> for PlainHttpLayer {
    type Service = PlainHttp<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PlainHttp::new(inner)
    }
}

/// Replace only the scheme. Relative URIs (no scheme, no authority) pass through.
pub fn downgrade_scheme(uri: &Uri) -> Uri {
    if uri.scheme().is_none() {
        return uri.clone();
    }

    let mut parts = uri.clone().into_parts();
    parts.scheme = Some(Scheme::HTTP);
    Uri::from_parts(parts).unwrap_or_else(|_| uri.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hyper::{header, Body, Method, Response, StatusCode, Version};
    use std::convert::Infallible;
    use std::sync::{Arc, Mutex};
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[test]
    fn test_downgrade_keeps_authority_path_and_query() {
        let uri: Uri = "https://localhost:5300/queue-1?api-version=2021-05".parse().unwrap();
        let plain = downgrade_scheme(&uri);

        assert_eq!(plain.scheme_str(), Some("http"));
        assert_eq!(plain.authority(), uri.authority());
        assert_eq!(plain.path(), "/queue-1");
        assert_eq!(plain.query(), Some("api-version=2021-05"));
    }

    #[test]
    fn test_downgrade_without_port_stays_portless() {
        let plain = downgrade_scheme(&"https://emulator/q".parse().unwrap());
        assert_eq!(plain.to_string(), "http://emulator/q");
    }

    #[test]
    fn test_relative_uri_is_untouched() {
        let uri: Uri = "/health".parse().unwrap();
        assert_eq!(downgrade_scheme(&uri), uri);
    }

    #[tokio::test]
    async fn test_forwards_identical_request_except_scheme() {
        let seen: Arc<Mutex<Option<(Method, Uri, Version, header::HeaderMap, Vec<u8>)>>> =
            Arc::new(Mutex::new(None));

        let recorder = {
            let seen = seen.clone();
            service_fn(move |req: Request<Body>| {
                let seen = seen.clone();
                async move {
                    let (parts, body) = req.into_parts();
                    let body = hyper::body::to_bytes(body).await.unwrap().to_vec();
                    *seen.lock().unwrap() =
                        Some((parts.method, parts.uri, parts.version, parts.headers, body));
                    Ok::<_, Infallible>(
                        Response::builder()
                            .status(StatusCode::CREATED)
                            .body(Body::from("created"))
                            .unwrap(),
                    )
                }
            })
        };

        let svc = ServiceBuilder::new().layer(PlainHttpLayer).service(recorder);

        let request = Request::builder()
            .method(Method::PUT)
            .uri("https://127.0.0.1:5300/queue-42?api-version=2021-05&timeout=5")
            .version(Version::HTTP_11)
            .header(header::CONTENT_TYPE, "application/atom+xml")
            .header(header::AUTHORIZATION, "SharedAccessSignature sr=x")
            .body(Body::from("<entry/>"))
            .unwrap();

        let response = svc.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
        assert_eq!(&body[..], b"created");

        let (method, uri, version, headers, body) = seen.lock().unwrap().take().unwrap();
        assert_eq!(method, Method::PUT);
        assert_eq!(
            uri.to_string(),
            "http://127.0.0.1:5300/queue-42?api-version=2021-05&timeout=5"
        );
        assert_eq!(version, Version::HTTP_11);
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[header::CONTENT_TYPE], "application/atom+xml");
        assert_eq!(headers[header::AUTHORIZATION], "SharedAccessSignature sr=x");
        assert_eq!(body, b"<entry/>");
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let failing = service_fn(|_req: Request<Body>| async {
            Err::<Response<Body>, _>("connection refused")
        });

        let result = PlainHttp::new(failing)
            .oneshot(Request::get("https://localhost/").body(Body::empty()).unwrap())
            .await;

        assert_eq!(result.unwrap_err(), "connection refused");
    }
}
