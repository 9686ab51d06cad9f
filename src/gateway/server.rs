//! axum HTTP / WebSocket 外壳
//!
//! - /api/chat：对话 Agent 一轮
//! - /api/task/*：启动、确认、中止、查询研究任务
//! - /api/memory/*：语义记忆与规则记忆的只读视图
//! - /api/keys/*：运行时设置与检查厂商凭证
//! - /ws：进度事件推送（连接时回放历史），支持 ping / pong

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::agent::{ChatAgent, ChatReply, ChatRequest};
use crate::core::ShutdownManager;
use crate::credentials::KeyStore;
use crate::gateway::{ChannelSink, ConnectionHub};
use crate::memory::{MemoryError, RuleMemory, SemanticMemory};
use crate::runner::{AbortResponse, RunConfig, StartResponse, TaskRunner};
use crate::tools::TaskProposal;

/// 所有路由共享的状态
pub struct AppState {
    pub agent: ChatAgent,
    pub runner: Arc<TaskRunner>,
    pub hub: Arc<ConnectionHub>,
    pub keys: Arc<KeyStore>,
    pub semantic: Arc<dyn SemanticMemory>,
    pub rules: Arc<RuleMemory>,
    pub default_chat_model: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/task/run", post(api_task_run))
        .route("/api/task/confirm", post(api_task_confirm))
        .route("/api/task/abort", post(api_task_abort))
        .route("/api/task/status", get(api_task_status))
        .route("/api/memory/comet", get(api_comet_nodes))
        .route("/api/memory/comet/sessions", get(api_comet_sessions))
        .route(
            "/api/memory/comet/sessions/:session_id",
            get(api_comet_session_nodes),
        )
        .route("/api/memory/comet/:node_id", get(api_comet_node))
        .route("/api/memory/gcri", get(api_gcri_memory))
        .route("/api/keys/set", post(api_keys_set))
        .route("/api/keys/check", post(api_keys_check))
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { Json(json!({"status": "ok"})) }))
        .with_state(state)
}

/// 绑定地址并服务，直到收到关闭信号
pub async fn serve(
    state: Arc<AppState>,
    bind_addr: &str,
    shutdown: Arc<ShutdownManager>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("RUI backend listening on http://{}", bind_addr);

    let token = shutdown.token();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
}

async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatReply> {
    Json(state.agent.run_turn(request).await)
}

#[derive(Debug, Deserialize)]
struct RunTaskRequest {
    task: String,
    #[serde(default)]
    config: RunConfig,
}

async fn api_task_run(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RunTaskRequest>,
) -> Json<StartResponse> {
    Json(state.runner.start(request.task, request.config).await)
}

async fn api_task_confirm(
    State(state): State<Arc<AppState>>,
    Json(proposal): Json<TaskProposal>,
) -> Json<StartResponse> {
    Json(state.runner.confirm(proposal).await)
}

async fn api_task_abort(State(state): State<Arc<AppState>>) -> Json<AbortResponse> {
    Json(state.runner.abort())
}

async fn api_task_status(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({"running": state.runner.is_running()}))
}

async fn api_comet_nodes(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(match state.semantic.list_all().await {
        Ok(nodes) => json!({"nodes": nodes}),
        Err(e) => json!({"nodes": [], "error": e.to_string()}),
    })
}

async fn api_comet_sessions(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(match state.semantic.list_sessions().await {
        Ok(sessions) => json!({"sessions": sessions}),
        Err(e) => json!({"sessions": [], "error": e.to_string()}),
    })
}

async fn api_comet_session_nodes(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    Json(match state.semantic.list_session(&session_id).await {
        Ok(nodes) => json!({"nodes": nodes}),
        Err(e) => json!({"nodes": [], "error": e.to_string()}),
    })
}

#[derive(Debug, Deserialize)]
struct DepthQuery {
    #[serde(default)]
    depth: u32,
}

async fn api_comet_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
    Query(q): Query<DepthQuery>,
) -> Json<Value> {
    Json(match state.semantic.read_node(&node_id, q.depth).await {
        Ok(Some(content)) => json!({"node_id": node_id, "content": content, "depth": q.depth}),
        Ok(None) => json!({"error": MemoryError::NotFound.to_string()}),
        Err(e) => json!({"error": e.to_string()}),
    })
}

async fn api_gcri_memory(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.rules.read().await)
}

#[derive(Debug, Deserialize)]
struct SetKeysRequest {
    keys: HashMap<String, String>,
}

async fn api_keys_set(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SetKeysRequest>,
) -> Json<Value> {
    for (provider, key) in request.keys {
        if key.is_empty() {
            continue;
        }
        if let Err(e) = state.keys.set(&provider, &key) {
            tracing::warn!(provider = %provider, "Failed to set API key: {}", e);
        }
    }
    Json(json!({"status": "ok"}))
}

#[derive(Debug, Deserialize)]
struct CheckKeysRequest {
    #[serde(default)]
    config: RunConfig,
}

async fn api_keys_check(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckKeysRequest>,
) -> Json<Value> {
    let missing = state
        .keys
        .missing_providers(&request.config, &state.default_chat_model);
    Json(json!({"missing": missing}))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (sink, mut rx) = ChannelSink::pair();

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let id = state.hub.connect(Arc::new(sink)).await;

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!(connection = %id, "WebSocket receive error: {}", e);
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                let Ok(data) = serde_json::from_str::<Value>(&text) else {
                    tracing::warn!(connection = %id, "Non-JSON client frame, closing");
                    break;
                };
                if data.get("type").and_then(Value::as_str) == Some("ping")
                    && state.hub.send_to(id, r#"{"type":"pong"}"#).await.is_err()
                {
                    break;
                }
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    state.hub.disconnect(id).await;
    writer.abort();
}
