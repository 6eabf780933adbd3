// tests/common/mod.rs
// Local stand-in for the emulator's health endpoint.
#![allow(dead_code)]

use hyper::{
    service::{make_service_fn, service_fn},
    Body, Request, Response, Server, StatusCode,
};
use std::{
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::oneshot;

pub struct HealthServer {
    pub addr: SocketAddr,
    hits: Arc<AtomicU64>,
    _shutdown: oneshot::Sender<()>,
}

impl HealthServer {
    /// Answers 503 to the first `failures` health requests and 200 afterwards.
    /// `None` keeps it unhealthy forever.
    pub async fn start(failures: Option<u64>) -> Self {
        Self::start_with_delay(failures, Duration::ZERO).await
    }

    /// Like [`Self::start`], but every answer is held back for `delay`.
    pub async fn start_with_delay(failures: Option<u64>, delay: Duration) -> Self {
        let hits = Arc::new(AtomicU64::new(0));

        let counter = hits.clone();
        let make_svc = make_service_fn(move |_conn| {
            let counter = counter.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let counter = counter.clone();
                    async move {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        handle(req, counter, failures).await
                    }
                }))
            }
        });

        let server = Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0))).serve(make_svc);
        let addr = server.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        tokio::spawn(server.with_graceful_shutdown(async {
            rx.await.ok();
        }));

        Self {
            addr,
            hits,
            _shutdown: tx,
        }
    }

    pub fn health_url(&self) -> String {
        format!("http://{}/health", self.addr)
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn handle(
    req: Request<Body>,
    hits: Arc<AtomicU64>,
    failures: Option<u64>,
) -> Result<Response<Body>, Infallible> {
    if req.uri().path() != "/health" {
        return Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .unwrap());
    }

    let n = hits.fetch_add(1, Ordering::SeqCst) + 1;
    match failures {
        Some(failures) if n > failures => Ok(Response::new(Body::from("Healthy"))),
        _ => Ok(Response::builder()
            .status(StatusCode::SERVICE_UNAVAILABLE)
            .body(Body::from("Unhealthy"))
            .unwrap()),
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
