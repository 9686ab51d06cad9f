//! propose_gcri_task：生成研究任务提案（纯值，不启动任务）
//!
//! 提案作为工具结果回到对话里，由前端渲染为确认卡片；用户确认后走 TaskRunner::confirm。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::runner::{BranchInput, CommitMode, RunConfig, TaskRunner, DEFAULT_BRANCH_COUNT};
use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

fn proposal_kind() -> String {
    "gcri_proposal".to_string()
}

fn default_branch_count() -> usize {
    DEFAULT_BRANCH_COUNT
}

/// 研究任务提案；确认接口接收同样的结构
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskProposal {
    #[serde(rename = "type", default = "proposal_kind")]
    pub kind: String,
    pub task_description: String,
    #[serde(default)]
    pub commit_mode: CommitMode,
    #[serde(default = "default_branch_count")]
    pub branch_count: usize,
    #[serde(default)]
    pub branch_models: Vec<String>,
    #[serde(default)]
    pub global_roles: BTreeMap<String, String>,
}

impl TaskProposal {
    /// 由任务描述与当前运行配置生成；分支数不超过 max_branches，分支截断到 branch_count，
    /// 未指定模型的分支用基线模型
    pub fn from_config(
        task_description: impl Into<String>,
        commit_mode: CommitMode,
        config: &RunConfig,
        baseline_model: &str,
        max_branches: usize,
    ) -> Self {
        let branch_count = config.branch_count().min(max_branches);
        let branch_models = config
            .branches
            .iter()
            .take(branch_count)
            .map(|b| b.primary_model(baseline_model))
            .collect();

        Self {
            kind: proposal_kind(),
            task_description: task_description.into(),
            commit_mode,
            branch_count,
            branch_models,
            global_roles: config.global_roles.clone(),
        }
    }

    /// 确认后转回运行配置
    pub fn to_run_config(&self) -> RunConfig {
        RunConfig {
            chat_model: None,
            branch_count: Some(self.branch_count),
            branches: self
                .branch_models
                .iter()
                .cloned()
                .map(BranchInput::Model)
                .collect(),
            global_roles: self.global_roles.clone(),
            commit_mode: Some(self.commit_mode),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ProposeArgs {
    #[schemars(description = "A clear, detailed description of the research task to solve.")]
    task_description: String,
    #[schemars(
        description = "How to handle successful results. \"manual\" requires user approval before committing. \"auto-accept\" commits automatically."
    )]
    commit_mode: Option<CommitMode>,
}

pub struct ProposeTaskTool {
    runner: Arc<TaskRunner>,
    baseline_model: String,
}

impl ProposeTaskTool {
    pub fn new(runner: Arc<TaskRunner>, baseline_model: impl Into<String>) -> Self {
        Self {
            runner,
            baseline_model: baseline_model.into(),
        }
    }
}

#[async_trait]
impl Tool for ProposeTaskTool {
    fn name(&self) -> &str {
        "propose_gcri_task"
    }

    fn description(&self) -> &str {
        "Propose a GCRI research task for the user to review. This does NOT start execution: \
         it returns a task scheme that the user must explicitly confirm through the UI before \
         GCRI begins. Always call this after discussing the task with the user."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<ProposeArgs>()
    }

    async fn execute(&self, args: Value, config: &RunConfig) -> Result<String, String> {
        if self.runner.is_running() {
            return Ok(json!({
                "error": "A GCRI task is already running. Abort it first or wait."
            })
            .to_string());
        }

        let args: ProposeArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;
        let proposal = TaskProposal::from_config(
            args.task_description,
            args.commit_mode.unwrap_or_default(),
            config,
            &self.baseline_model,
            self.runner.max_branches(),
        );
        tracing::info!(
            branches = proposal.branch_count,
            commit_mode = ?proposal.commit_mode,
            "Task proposal created"
        );
        serde_json::to_string(&proposal).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proposal_truncates_and_fills_baseline() {
        let config: RunConfig = serde_json::from_value(json!({
            "branchCount": 2,
            "branches": [{"model": "claude-4-opus"}, 7, {"model": "extra"}],
            "globalRoles": {"verifier": "o3"}
        }))
        .unwrap();
        let p =
            TaskProposal::from_config("prove it", CommitMode::AutoAccept, &config, "gpt-4o", 16);
        assert_eq!(p.kind, "gcri_proposal");
        assert_eq!(p.branch_models, vec!["claude-4-opus", "gpt-4o"]);
        assert_eq!(p.global_roles["verifier"], "o3");

        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["type"], "gcri_proposal");
        assert_eq!(v["commit_mode"], "auto-accept");
    }

    #[test]
    fn test_proposal_branch_count_capped() {
        let config: RunConfig =
            serde_json::from_value(json!({"branchCount": usize::MAX, "branches": ["a", "b"]}))
                .unwrap();
        let p = TaskProposal::from_config("wide", CommitMode::Manual, &config, "gpt-4o", 16);
        assert_eq!(p.branch_count, 16);
        assert_eq!(p.branch_models, vec!["a", "b"]);
        assert_eq!(p.to_run_config().branch_count, Some(16));
    }

    #[test]
    fn test_confirm_payload_defaults() {
        let p: TaskProposal =
            serde_json::from_value(json!({"task_description": "x"})).unwrap();
        assert_eq!(p.commit_mode, CommitMode::Manual);
        assert_eq!(p.branch_count, 3);

        let config = p.to_run_config();
        assert_eq!(config.branch_count, Some(3));
        assert!(config.branches.is_empty());
    }

    #[test]
    fn test_schema_requires_task_description() {
        let s = parameters_schema_for::<ProposeArgs>();
        assert_eq!(s["required"], json!(["task_description"]));
        assert_eq!(
            s["properties"]["commit_mode"]["enum"],
            json!(["manual", "auto-accept"])
        );
    }
}
