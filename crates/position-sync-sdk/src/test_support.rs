//! 测试辅助：可编排响应的 HTTP 桩服务器、可记录移动的测试实体

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::entity::{MovementSink, PositionSource};
use crate::payload::Position;

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("position_sync_sdk=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// 桩服务器收到的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub user_agent: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn json_body(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).unwrap()
    }
}

/// 预设响应
#[derive(Debug, Clone)]
pub struct StubResponse {
    status: u16,
    body: String,
    delay: Option<Duration>,
}

impl StubResponse {
    pub fn ok(body: &str) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[derive(Default)]
struct StubState {
    routes: Mutex<HashMap<String, StubResponse>>,
    requests: Mutex<Vec<RecordedRequest>>,
    completed: Mutex<usize>,
}

/// HTTP 桩服务器，绑定 127.0.0.1 随机端口，随 drop 关闭
pub struct StubServer {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start() -> Self {
        init_tracing();

        let state = Arc::new(StubState::default());
        let app = Router::new().fallback(handle_request).with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, handle }
    }

    /// 为某个路径设置响应；未设置的路径返回 404
    pub fn respond(&self, path: &str, response: StubResponse) {
        self.state.routes.lock().insert(path.to_string(), response);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn request_count(&self, method: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// 已返回响应的请求数
    pub fn completed_count(&self) -> usize {
        *self.state.completed.lock()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle_request(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: String,
) -> Response {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };

    state.requests.lock().push(RecordedRequest {
        method: method.to_string(),
        path: uri.path().to_string(),
        content_type: header_value(header::CONTENT_TYPE),
        user_agent: header_value(header::USER_AGENT),
        body,
    });

    let route = state.routes.lock().get(uri.path()).cloned();
    let response = match route {
        Some(route) => {
            if let Some(delay) = route.delay {
                tokio::time::sleep(delay).await;
            }
            let status = StatusCode::from_u16(route.status).unwrap();
            (status, route.body).into_response()
        }
        None => (StatusCode::NOT_FOUND, "no route".to_string()).into_response(),
    };

    *state.completed.lock() += 1;
    response
}

/// 一个当前没有监听者的本地地址，连接会被拒绝
pub fn unused_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

/// 轮询等待条件成立
pub async fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// 记录所有移动的测试实体
pub struct RecordingEntity {
    position: Mutex<Option<Position>>,
    moves: Mutex<Vec<Position>>,
}

impl RecordingEntity {
    pub fn at(position: Position) -> Arc<Self> {
        Arc::new(Self {
            position: Mutex::new(Some(position)),
            moves: Mutex::new(Vec::new()),
        })
    }

    /// 位置不可用的实体
    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            position: Mutex::new(None),
            moves: Mutex::new(Vec::new()),
        })
    }

    pub fn moves(&self) -> Vec<Position> {
        self.moves.lock().clone()
    }
}

impl PositionSource for RecordingEntity {
    fn position(&self) -> Option<Position> {
        *self.position.lock()
    }
}

impl MovementSink for RecordingEntity {
    fn move_to(&self, position: Position) {
        *self.position.lock() = Some(position);
        self.moves.lock().push(position);
    }
}
