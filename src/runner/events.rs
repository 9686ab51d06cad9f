//! 研究任务进度事件（与前端共享的 JSON 协议）
//!
//! 以 `type` 字段区分种类（snake_case）；phase_change 与 node_update 为持久事件，会进入回放历史。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 研究引擎所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Strategy,
    Hypothesis,
    Verification,
    Aggregation,
    Decision,
    Memory,
    Complete,
    Aborted,
}

/// 引擎 -> 前端 的进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    PhaseChange {
        phase: Phase,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<u32>,
        #[serde(
            default,
            rename = "maxIterations",
            alias = "max_iterations",
            skip_serializing_if = "Option::is_none"
        )]
        max_iterations: Option<u32>,
        /// 自任务开始的秒数
        #[serde(default, skip_serializing_if = "Option::is_none")]
        elapsed: Option<f64>,
    },
    NodeUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        branch_index: Option<usize>,
        node: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    IterationStart {
        iteration: u32,
        #[serde(
            default,
            rename = "maxIterations",
            alias = "max_iterations",
            skip_serializing_if = "Option::is_none"
        )]
        max_iterations: Option<u32>,
    },
    IterationComplete {
        iteration: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Strategies {
        iteration: u32,
        strategies: Vec<Value>,
    },
    Hypothesis {
        iteration: u32,
        branch: usize,
        hypothesis: String,
    },
    Verification {
        iteration: u32,
        branch: usize,
        #[serde(
            default,
            rename = "counterStrength",
            alias = "counter_strength",
            skip_serializing_if = "Option::is_none"
        )]
        counter_strength: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
    },
    Decision {
        iteration: u32,
        decision: bool,
        #[serde(
            default,
            rename = "bestBranch",
            alias = "best_branch",
            skip_serializing_if = "Option::is_none"
        )]
        best_branch: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        feedback: Option<String>,
    },
    TaskComplete {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<u32>,
    },
    TaskError {
        message: String,
    },
    TaskAborted {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iteration: Option<u32>,
    },
    SystemMessage {
        content: String,
    },
    /// 任务最终结果
    GcriResult {
        final_output: String,
    },
}

impl ProgressEvent {
    pub fn phase(phase: Phase) -> Self {
        ProgressEvent::PhaseChange {
            phase,
            iteration: None,
            max_iterations: None,
            elapsed: None,
        }
    }

    pub fn system_message(content: impl Into<String>) -> Self {
        ProgressEvent::SystemMessage {
            content: content.into(),
        }
    }

    /// 持久事件进入回放历史，晚加入的客户端可据此重建进度视图
    pub fn is_durable(&self) -> bool {
        matches!(
            self,
            ProgressEvent::PhaseChange { .. } | ProgressEvent::NodeUpdate { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ProgressEvent::PhaseChange { .. } => "phase_change",
            ProgressEvent::NodeUpdate { .. } => "node_update",
            ProgressEvent::IterationStart { .. } => "iteration_start",
            ProgressEvent::IterationComplete { .. } => "iteration_complete",
            ProgressEvent::Strategies { .. } => "strategies",
            ProgressEvent::Hypothesis { .. } => "hypothesis",
            ProgressEvent::Verification { .. } => "verification",
            ProgressEvent::Decision { .. } => "decision",
            ProgressEvent::TaskComplete { .. } => "task_complete",
            ProgressEvent::TaskError { .. } => "task_error",
            ProgressEvent::TaskAborted { .. } => "task_aborted",
            ProgressEvent::SystemMessage { .. } => "system_message",
            ProgressEvent::GcriResult { .. } => "gcri_result",
        }
    }
}
