//! 连接扇出中枢
//!
//! 持有所有活跃连接与有界回放历史：
//! - connect：注册连接；历史非空时先单独给它发一条 `{"type": "history", "data": [...]}`
//! - broadcast：持久事件（phase_change / node_update）追加到历史，满则淘汰最旧；再发给每个连接，发送失败的连接在本轮结束后移除
//! 注册、快照与广播都在同一把锁内完成，所以晚加入的客户端既不会漏事件也不会收到重复事件。

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

use crate::runner::ProgressEvent;

/// 连接 id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ws_{}", self.0)
    }
}

#[derive(Error, Debug)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// 客户端通道的发送端
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, payload: &str) -> Result<(), DeliveryError>;
}

/// 基于无界通道的 sink：WebSocket 写任务从另一端取消息写入 socket
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    pub fn pair() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        self.tx
            .send(payload.to_string())
            .map_err(|e| DeliveryError(e.to_string()))
    }
}

/// 有界 FIFO 回放历史
#[derive(Debug)]
struct HistoryLog {
    entries: VecDeque<Value>,
    capacity: usize,
}

impl HistoryLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    fn push(&mut self, entry: Value) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn snapshot_message(&self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        let data: Vec<&Value> = self.entries.iter().collect();
        Some(json!({"type": "history", "data": data}).to_string())
    }
}

struct HubState {
    connections: Vec<(ConnectionId, Arc<dyn EventSink>)>,
    history: HistoryLog,
}

/// 连接扇出中枢
pub struct ConnectionHub {
    state: Mutex<HubState>,
}

impl ConnectionHub {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(HubState {
                connections: Vec::new(),
                history: HistoryLog::new(history_capacity),
            }),
        }
    }

    /// 注册连接并回放历史；回放失败的连接不会被注册
    pub async fn connect(&self, sink: Arc<dyn EventSink>) -> ConnectionId {
        let id = ConnectionId::new();
        let mut state = self.state.lock().await;

        if let Some(snapshot) = state.history.snapshot_message() {
            if let Err(e) = sink.send(&snapshot).await {
                tracing::warn!(connection = %id, "History replay failed: {}", e);
                return id;
            }
        }

        state.connections.push((id, sink));
        tracing::info!(
            connection = %id,
            total = state.connections.len(),
            "Client connected"
        );
        id
    }

    /// 移除连接；重复调用无副作用
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        let before = state.connections.len();
        state.connections.retain(|(cid, _)| *cid != id);
        if state.connections.len() < before {
            tracing::info!(
                connection = %id,
                total = state.connections.len(),
                "Client disconnected"
            );
        }
    }

    /// 广播进度事件
    pub async fn broadcast(&self, event: &ProgressEvent) {
        let value = match serde_json::to_value(event) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!("Failed to serialize {} event: {}", event.kind(), e);
                return;
            }
        };
        let payload = value.to_string();

        let mut state = self.state.lock().await;
        if event.is_durable() {
            state.history.push(value);
        }

        let mut failed = Vec::new();
        for (id, sink) in &state.connections {
            if let Err(e) = sink.send(&payload).await {
                tracing::warn!(connection = %id, "Dropping connection: {}", e);
                failed.push(*id);
            }
        }
        if !failed.is_empty() {
            state.connections.retain(|(id, _)| !failed.contains(id));
        }
    }

    /// 直接发给单个连接（如 pong）；失败则移除该连接
    pub async fn send_to(&self, id: ConnectionId, payload: &str) -> Result<(), DeliveryError> {
        let mut state = self.state.lock().await;
        let Some(sink) = state
            .connections
            .iter()
            .find(|(cid, _)| *cid == id)
            .map(|(_, s)| Arc::clone(s))
        else {
            return Err(DeliveryError(format!("unknown connection {}", id)));
        };
        let result = sink.send(payload).await;
        if result.is_err() {
            state.connections.retain(|(cid, _)| *cid != id);
        }
        result
    }

    pub async fn clear_history(&self) {
        self.state.lock().await.history.entries.clear();
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.entries.len()
    }

    /// 当前历史快照（最旧在前）
    pub async fn history(&self) -> Vec<Value> {
        self.state.lock().await.history.entries.iter().cloned().collect()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::Phase;

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn send(&self, _payload: &str) -> Result<(), DeliveryError> {
            Err(DeliveryError("closed".into()))
        }
    }

    fn node(i: usize) -> ProgressEvent {
        ProgressEvent::NodeUpdate {
            branch_index: Some(i),
            node: "hypothesis".into(),
            status: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn test_history_bounded_keeps_most_recent() {
        let hub = ConnectionHub::new(3);
        for i in 0..5 {
            hub.broadcast(&node(i)).await;
        }
        hub.broadcast(&ProgressEvent::system_message("transient")).await;

        let history = hub.history().await;
        let indices: Vec<u64> = history
            .iter()
            .map(|v| v["branch_index"].as_u64().unwrap())
            .collect();
        assert_eq!(indices, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn test_late_joiner_gets_snapshot_only_when_history_exists() {
        let hub = ConnectionHub::new(10);
        let (early, mut early_rx) = ChannelSink::pair();
        hub.connect(Arc::new(early)).await;
        assert!(early_rx.try_recv().is_err());

        hub.broadcast(&ProgressEvent::phase(Phase::Strategy)).await;
        let (late, mut late_rx) = ChannelSink::pair();
        hub.connect(Arc::new(late)).await;

        let snapshot: Value = serde_json::from_str(&late_rx.recv().await.unwrap()).unwrap();
        assert_eq!(snapshot["type"], "history");
        assert_eq!(snapshot["data"][0]["phase"], "strategy");
        assert!(late_rx.try_recv().is_err());
        assert!(early_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_failed_sink_removed_after_sweep() {
        let hub = ConnectionHub::new(10);
        let (ok, mut ok_rx) = ChannelSink::pair();
        hub.connect(Arc::new(FailingSink)).await;
        hub.connect(Arc::new(ok)).await;
        assert_eq!(hub.connection_count().await, 2);

        hub.broadcast(&ProgressEvent::system_message("hello")).await;
        assert_eq!(hub.connection_count().await, 1);
        assert!(ok_rx.recv().await.unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        let hub = ConnectionHub::new(10);
        let (sink, _rx) = ChannelSink::pair();
        let id = hub.connect(Arc::new(sink)).await;
        hub.disconnect(id).await;
        hub.disconnect(id).await;
        assert_eq!(hub.connection_count().await, 0);
        assert!(hub.send_to(id, "{}").await.is_err());
    }

    #[tokio::test]
    async fn test_clear_history() {
        let hub = ConnectionHub::new(10);
        hub.broadcast(&node(0)).await;
        assert_eq!(hub.history_len().await, 1);
        hub.clear_history().await;
        assert_eq!(hub.history_len().await, 0);
    }
}
