//! 引擎线程 -> 异步运行时 的事件桥
//!
//! 引擎线程通过有界 mpsc 的 blocking_send 投递事件；运行时上只有一个消费任务按序广播，
//! 因此同一次运行的事件对每个连接都保持产生顺序。

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::gateway::ConnectionHub;
use crate::runner::{EngineCallbacks, ProgressEvent};

/// 写入端：交给引擎线程使用
pub struct ChannelCallbacks {
    tx: mpsc::Sender<ProgressEvent>,
}

impl ChannelCallbacks {
    pub fn new(tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl EngineCallbacks for ChannelCallbacks {
    fn emit(&self, event: ProgressEvent) {
        let kind = event.kind();
        if self.tx.blocking_send(event).is_err() {
            tracing::warn!(event = kind, "event consumer closed, dropping progress event");
        }
    }
}

/// 创建事件桥：返回写入端与消费任务句柄；写入端全部 drop 后消费任务在排空队列后结束
pub fn spawn_bridge(
    hub: Arc<ConnectionHub>,
    buffer: usize,
) -> (ChannelCallbacks, tokio::task::JoinHandle<usize>) {
    let (tx, mut rx) = mpsc::channel::<ProgressEvent>(buffer.max(1));
    let consumer = tokio::spawn(async move {
        let mut forwarded = 0usize;
        while let Some(event) = rx.recv().await {
            hub.broadcast(&event).await;
            forwarded += 1;
        }
        forwarded
    });
    (ChannelCallbacks::new(tx), consumer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChannelSink;
    use crate::runner::Phase;

    #[tokio::test]
    async fn test_events_from_blocking_thread_arrive_in_order() {
        let hub = Arc::new(ConnectionHub::new(100));
        let (sink, mut rx) = ChannelSink::pair();
        hub.connect(Arc::new(sink)).await;

        let (callbacks, consumer) = spawn_bridge(Arc::clone(&hub), 2);
        tokio::task::spawn_blocking(move || {
            for i in 0..10u32 {
                callbacks.emit(ProgressEvent::IterationStart {
                    iteration: i,
                    max_iterations: None,
                });
            }
            callbacks.emit(ProgressEvent::phase(Phase::Complete));
        })
        .await
        .unwrap();

        assert_eq!(consumer.await.unwrap(), 11);
        for i in 0..10u32 {
            let msg: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
            assert_eq!(msg["type"], "iteration_start");
            assert_eq!(msg["iteration"], i);
        }
        let last: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(last["phase"], "complete");
        assert_eq!(hub.history_len().await, 1);
    }
}
