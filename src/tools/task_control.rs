//! check_task_status / abort_task

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::runner::{RunConfig, TaskRunner};
use crate::tools::Tool;

pub struct CheckTaskStatusTool {
    runner: Arc<TaskRunner>,
}

impl CheckTaskStatusTool {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for CheckTaskStatusTool {
    fn name(&self) -> &str {
        "check_task_status"
    }

    fn description(&self) -> &str {
        "Check whether a GCRI task is currently running and get its status."
    }

    async fn execute(&self, _args: Value, _config: &RunConfig) -> Result<String, String> {
        let running = self.runner.is_running();
        let message = if running {
            "GCRI task is currently running."
        } else {
            "No active task."
        };
        Ok(json!({"running": running, "message": message}).to_string())
    }
}

/// 只置中止标志，不等待任务结束
pub struct AbortTaskTool {
    runner: Arc<TaskRunner>,
}

impl AbortTaskTool {
    pub fn new(runner: Arc<TaskRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for AbortTaskTool {
    fn name(&self) -> &str {
        "abort_task"
    }

    fn description(&self) -> &str {
        "Abort the currently running GCRI task. Use when the user wants to cancel."
    }

    async fn execute(&self, _args: Value, _config: &RunConfig) -> Result<String, String> {
        if !self.runner.is_running() {
            return Ok(json!({"message": "No task is running to abort."}).to_string());
        }
        self.runner.abort();
        Ok(json!({
            "message": "Abort signal sent. The task will stop after the current phase."
        })
        .to_string())
    }
}
