//! Shared fixtures: a recording fake upstream and a gateway wired to it.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::{self, Next},
    response::Response,
    Router,
};
use axum_test::TestServer;
use campus_gateway::config::{AppConfig, EdgeConfig, UploadsConfig, UpstreamConfig};
use campus_gateway::server::create_app;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// One request as the upstream saw it.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub uri: String,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl RecordedCall {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("recorded body is JSON")
    }
}

/// Real TCP server standing in for the backend API.
pub struct FakeUpstream {
    pub base_url: String,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    handle: JoinHandle<()>,
}

impl FakeUpstream {
    pub async fn start(routes: Router) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&calls);

        let app = routes.layer(middleware::from_fn(move |request: Request, next: Next| {
            let recorder = Arc::clone(&recorder);
            async move { record(recorder, request, next).await }
        }));

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake upstream");
        let addr = listener.local_addr().expect("local addr");
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("fake upstream");
        });

        Self {
            base_url: format!("http://{addr}/api"),
            calls,
            handle,
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

impl Drop for FakeUpstream {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn record(calls: Arc<Mutex<Vec<RecordedCall>>>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("read upstream body");

    let header_str = |name: header::HeaderName| {
        parts
            .headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned)
    };

    calls.lock().push(RecordedCall {
        method: parts.method.to_string(),
        uri: parts.uri.to_string(),
        authorization: header_str(header::AUTHORIZATION),
        content_type: header_str(header::CONTENT_TYPE),
        body: bytes.to_vec(),
    });

    next.run(Request::from_parts(parts, axum::body::Body::from(bytes)))
        .await
}

/// Gateway configuration pointed at `base_url`, storing uploads below
/// `upload_root`.
pub fn test_config(base_url: &str, upload_root: &Path) -> AppConfig {
    AppConfig {
        upstream: UpstreamConfig {
            base_url: Some(base_url.to_string()),
            ..UpstreamConfig::default()
        },
        uploads: UploadsConfig {
            root_dir: upload_root.to_path_buf(),
            ..UploadsConfig::default()
        },
        edge: EdgeConfig::default(),
        ..AppConfig::default()
    }
}

pub async fn gateway(config: AppConfig) -> TestServer {
    let app = create_app(config).await.expect("create app");
    TestServer::new(app).expect("test server")
}

/// An address nothing listens on.
pub async fn unreachable_base_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    drop(listener);
    format!("http://{addr}/api")
}

/// Value of the `auth_token` cookie set by `response`, if any.
pub fn session_set_cookie(response: &axum_test::TestResponse) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("auth_token="))
        .map(str::to_owned)
}
