#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::sync::broadcast;

use stockdash_api::auth::jwt::JwtConfig;
use stockdash_api::config::ServerConfig;
use stockdash_api::router::build_app_router;
use stockdash_api::state::AppState;
use stockdash_client::reconnect::ReconnectConfig;
use stockdash_client::ClientConfig;
use stockdash_db::MemoryUserStore;

pub const ADMIN_EMAIL: &str = "admin@example.com";

/// Frame that makes the stub close every open socket.
const CLOSE_SENTINEL: &str = "__close__";

/// Serve `app` on an ephemeral localhost port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Spawn the real identity service over a fresh in-memory user store.
pub async fn spawn_identity_service() -> String {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        admin_email: Some(ADMIN_EMAIL.to_string()),
        jwt: JwtConfig {
            secret: "client-test-secret".to_string(),
            token_expiry_hours: 1,
        },
    };
    let state = AppState {
        users: Arc::new(MemoryUserStore::new()),
        config: Arc::new(config.clone()),
    };
    serve(build_app_router(state, &config)).await
}

/// Client configuration pointed at the given services, with short timers.
pub fn client_config(user_api_url: &str, job_api_url: &str) -> ClientConfig {
    ClientConfig {
        user_api_url: user_api_url.to_string(),
        job_api_url: job_api_url.to_string(),
        job_ws_url: job_api_url.replacen("http://", "ws://", 1),
        poll_interval: Duration::from_millis(50),
        verify_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        reconnect: ReconnectConfig {
            max_attempts: 2,
            delay: Duration::from_millis(20),
        },
        ..ClientConfig::default()
    }
}

/// Poll `condition` every 10 ms for up to five seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within 5s"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// ---------------------------------------------------------------------------
// Stub job service
// ---------------------------------------------------------------------------

/// One request seen by the stub job service.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub path: String,
    pub authorization: Option<String>,
    pub body: Option<Value>,
}

struct StubInner {
    jobs: Mutex<BTreeMap<String, Value>>,
    requests: Mutex<Vec<RecordedRequest>>,
    sockets: Mutex<Vec<(String, Option<String>)>>,
    push: broadcast::Sender<String>,
    next_id: AtomicUsize,
}

/// In-process job service speaking the REST and push protocol.
#[derive(Clone)]
pub struct StubJobService {
    inner: Arc<StubInner>,
}

impl StubJobService {
    /// Start the stub and return it with its base URL.
    pub async fn spawn() -> (Self, String) {
        let (push, _) = broadcast::channel(64);
        let stub = Self {
            inner: Arc::new(StubInner {
                jobs: Mutex::new(BTreeMap::new()),
                requests: Mutex::new(Vec::new()),
                sockets: Mutex::new(Vec::new()),
                push,
                next_id: AtomicUsize::new(0),
            }),
        };

        let app = Router::new()
            .route("/search", post(submit))
            .route("/jobs", get(list_jobs))
            .route("/jobs/clear-all", delete(clear_all))
            .route("/jobs/{job_id}", get(get_job).delete(delete_job))
            .route("/jobs/{job_id}/logs", get(job_logs))
            .route("/ws/{client_id}", get(push_channel))
            .with_state(stub.clone());

        let url = serve(app).await;
        (stub, url)
    }

    /// Insert or replace a job row as the service would report it.
    pub fn set_job(&self, job: Value) {
        let job_id = job["job_id"].as_str().unwrap().to_string();
        self.inner.jobs.lock().unwrap().insert(job_id, job);
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.inner.jobs.lock().unwrap().contains_key(job_id)
    }

    /// Send one text frame to every open socket.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.inner.push.send(frame.into());
    }

    /// Close every open socket from the server side.
    pub fn close_sockets(&self) {
        self.push(CLOSE_SENTINEL);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// `(client_id, token)` for every socket accepted so far.
    pub fn sockets(&self) -> Vec<(String, Option<String>)> {
        self.inner.sockets.lock().unwrap().clone()
    }

    fn record(&self, method: &'static str, path: String, headers: &HeaderMap, body: Option<Value>) {
        let authorization = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.inner.requests.lock().unwrap().push(RecordedRequest {
            method,
            path,
            authorization,
            body,
        });
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"detail": "Job not found"}))).into_response()
}

async fn submit(
    State(stub): State<StubJobService>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    stub.record("POST", "/search".into(), &headers, Some(body.clone()));
    let n = stub.inner.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let job_id = format!("job-{n}");
    stub.set_job(json!({
        "job_id": job_id,
        "search_text": body["text"],
        "status": "queued",
        "progress": 0.0,
        "created_at": "2024-03-01T12:00:00.123456",
    }));
    Json(json!({
        "job_id": job_id,
        "status": "queued",
        "message": "Search job created",
    }))
}

async fn list_jobs(State(stub): State<StubJobService>, headers: HeaderMap) -> Json<Value> {
    stub.record("GET", "/jobs".into(), &headers, None);
    let jobs: Vec<Value> = stub.inner.jobs.lock().unwrap().values().cloned().collect();
    Json(Value::Array(jobs))
}

async fn get_job(
    State(stub): State<StubJobService>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    stub.record("GET", format!("/jobs/{job_id}"), &headers, None);
    match stub.inner.jobs.lock().unwrap().get(&job_id) {
        Some(job) => Json(job.clone()).into_response(),
        None => not_found(),
    }
}

async fn job_logs(
    State(stub): State<StubJobService>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    stub.record("GET", format!("/jobs/{job_id}/logs"), &headers, None);
    if !stub.has_job(&job_id) {
        return not_found();
    }
    Json(json!([
        {"timestamp": "2024-03-01T12:00:00", "status": "queued", "progress": 0.0, "worker_id": null},
        {"timestamp": "2024-03-01T12:00:02", "status": "running", "progress": 50.0, "worker_id": "worker-1"},
        {"timestamp": "2024-03-01T12:00:04", "status": "completed", "progress": 100.0, "worker_id": "worker-1"},
    ]))
    .into_response()
}

async fn delete_job(
    State(stub): State<StubJobService>,
    Path(job_id): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    stub.record("DELETE", format!("/jobs/{job_id}"), &headers, None);
    stub.inner.jobs.lock().unwrap().remove(&job_id);
    Json(json!({"message": "Job deleted"}))
}

async fn clear_all(State(stub): State<StubJobService>, headers: HeaderMap) -> Json<Value> {
    stub.record("DELETE", "/jobs/clear-all".into(), &headers, None);
    stub.inner.jobs.lock().unwrap().clear();
    Json(json!({"message": "All jobs cleared"}))
}

async fn push_channel(
    State(stub): State<StubJobService>,
    Path(client_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Response {
    stub.inner
        .sockets
        .lock()
        .unwrap()
        .push((client_id, params.get("token").cloned()));
    let frames = stub.inner.push.subscribe();
    ws.on_upgrade(move |socket| forward_frames(socket, frames))
}

async fn forward_frames(mut socket: WebSocket, mut frames: broadcast::Receiver<String>) {
    while let Ok(frame) = frames.recv().await {
        if frame == CLOSE_SENTINEL {
            let _ = socket.send(Message::Close(None)).await;
            break;
        }
        if socket.send(Message::Text(frame.into())).await.is_err() {
            break;
        }
    }
}
