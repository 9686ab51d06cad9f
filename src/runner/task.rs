//! 研究任务运行器
//!
//! - start：分支数超过上限直接拒绝；否则原子占用单任务槽位（失败则不改变任何状态）、复位中止标志、清空回放历史，再在后台运行引擎
//! - 引擎在 spawn_blocking 线程上执行，进度经事件桥广播；结束事件也走同一条通道，保证在所有进度事件之后
//! - 无论成功、失败、中止还是 panic，消费任务排空后才释放槽位
//! - abort 只置位协作式中止标志，立即返回

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::core::{AbortFlag, RunSlot};
use crate::gateway::ConnectionHub;
use crate::runner::bridge::spawn_bridge;
use crate::runner::engine::final_output;
use crate::runner::{
    build_engine_config, EngineCallbacks, EngineError, Phase, ProgressEvent, ResearchEngine,
    RunConfig, MAX_BRANCH_COUNT,
};
use crate::tools::TaskProposal;

/// start / confirm 的响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StartResponse {
    fn started(task: &str) -> Self {
        Self {
            status: "started".to_string(),
            task: Some(task.to_string()),
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            task: None,
            message: Some(message.into()),
        }
    }

    pub fn is_started(&self) -> bool {
        self.status == "started"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbortResponse {
    pub status: String,
}

/// 研究任务运行器（全局唯一，至多一个运行中的任务）
pub struct TaskRunner {
    engine: Arc<dyn ResearchEngine>,
    hub: Arc<ConnectionHub>,
    slot: RunSlot,
    abort: AbortFlag,
    baseline_model: String,
    event_buffer: usize,
    max_branches: usize,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskRunner {
    pub fn new(
        engine: Arc<dyn ResearchEngine>,
        hub: Arc<ConnectionHub>,
        baseline_model: impl Into<String>,
        event_buffer: usize,
    ) -> Self {
        Self {
            engine,
            hub,
            slot: RunSlot::new(),
            abort: AbortFlag::new(),
            baseline_model: baseline_model.into(),
            event_buffer,
            max_branches: MAX_BRANCH_COUNT,
            handle: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn with_max_branches(mut self, max_branches: usize) -> Self {
        self.max_branches = max_branches.max(1);
        self
    }

    pub fn max_branches(&self) -> usize {
        self.max_branches
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_busy()
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.is_requested()
    }

    /// 启动研究任务；立即返回，不等待引擎
    pub async fn start(&self, task: String, config: RunConfig) -> StartResponse {
        let requested = config.branch_count();
        if requested > self.max_branches {
            tracing::warn!(
                requested,
                max = self.max_branches,
                "Rejected task start: too many branches"
            );
            return StartResponse::error(format!(
                "branchCount {} exceeds the limit of {}",
                requested, self.max_branches
            ));
        }

        let Some(guard) = self.slot.try_acquire() else {
            tracing::warn!("Rejected task start: a task is already running");
            return StartResponse::error("A task is already running");
        };

        self.abort.reset();
        self.hub.clear_history().await;

        let engine_config = build_engine_config(&config, &self.baseline_model);
        let (callbacks, consumer) = spawn_bridge(Arc::clone(&self.hub), self.event_buffer);
        let engine = Arc::clone(&self.engine);
        let abort = self.abort.clone();
        let hub = Arc::clone(&self.hub);
        let response = StartResponse::started(&task);

        tracing::info!(
            task = %task,
            branches = engine_config.num_branches,
            accept_all = engine_config.accept_all,
            started_at = %chrono::Local::now().to_rfc3339(),
            "Research task started"
        );

        // 持锁 spawn，句柄按启动顺序写入，不会被上一次 start 覆盖
        let mut stored = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = Some(tokio::spawn(async move {
            let started = Instant::now();
            let blocking = tokio::task::spawn_blocking(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    engine.invoke(&task, &engine_config, &abort, &callbacks)
                }))
                .unwrap_or_else(|panic| Err(EngineError::Failed(panic_message(panic.as_ref()))));

                let label = outcome_label(&outcome);
                for event in terminal_events(outcome, started.elapsed().as_secs_f64()) {
                    callbacks.emit(event);
                }
                label
            })
            .await;

            let label = match blocking {
                Ok(label) => label,
                Err(e) => {
                    tracing::error!("Research task worker failed: {}", e);
                    for event in terminal_events(Err(EngineError::Failed(e.to_string())), 0.0) {
                        hub.broadcast(&event).await;
                    }
                    "failed"
                }
            };

            if let Err(e) = consumer.await {
                tracing::error!("Progress event consumer failed: {}", e);
            }

            tracing::info!(
                outcome = label,
                elapsed_secs = started.elapsed().as_secs_f64(),
                "Research task finished"
            );
            drop(guard);
        }));
        drop(stored);
        response
    }

    /// 从已确认的提案启动
    pub async fn confirm(&self, proposal: TaskProposal) -> StartResponse {
        let config = proposal.to_run_config();
        self.start(proposal.task_description, config).await
    }

    /// 请求中止：只置位标志，引擎在当前阶段结束后退出
    pub fn abort(&self) -> AbortResponse {
        self.abort.request();
        tracing::info!(running = self.is_running(), "Abort requested");
        AbortResponse {
            status: "abort_requested".to_string(),
        }
    }

    /// 等待当前后台任务（若有）结束
    pub async fn wait_idle(&self) {
        let handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Research task join failed: {}", e);
            }
        }
    }
}

fn outcome_label(outcome: &Result<serde_json::Value, EngineError>) -> &'static str {
    match outcome {
        Ok(_) => "complete",
        Err(EngineError::Aborted) => "aborted",
        Err(EngineError::Failed(_)) => "failed",
    }
}

/// 引擎结束后追加的事件
fn terminal_events(
    outcome: Result<serde_json::Value, EngineError>,
    elapsed: f64,
) -> Vec<ProgressEvent> {
    match outcome {
        Ok(result) => {
            let mut events = vec![ProgressEvent::PhaseChange {
                phase: Phase::Complete,
                iteration: None,
                max_iterations: None,
                elapsed: Some(elapsed),
            }];
            if let Some(final_output) = final_output(&result) {
                events.push(ProgressEvent::GcriResult { final_output });
            }
            events
        }
        Err(EngineError::Aborted) => vec![
            ProgressEvent::TaskAborted { iteration: None },
            ProgressEvent::phase(Phase::Aborted),
        ],
        Err(EngineError::Failed(message)) => {
            tracing::error!("Research task failed: {}", message);
            vec![
                ProgressEvent::system_message(format!("GCRI task error: {}", message)),
                ProgressEvent::phase(Phase::Idle),
            ]
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("engine panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("engine panicked: {}", s)
    } else {
        "engine panicked".to_string()
    }
}
