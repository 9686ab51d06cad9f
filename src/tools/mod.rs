//! 工具层：工具目录、注册表、带超时与审计日志的分发器，以及四个研究编排工具

pub mod executor;
pub mod memory_query;
pub mod propose;
pub mod registry;
pub mod schema;
pub mod task_control;

use std::sync::Arc;

pub use executor::ToolExecutor;
pub use memory_query::QueryMemoryTool;
pub use propose::{ProposeTaskTool, TaskProposal};
pub use registry::{Tool, ToolRegistry, ToolSpec};
pub use task_control::{AbortTaskTool, CheckTaskStatusTool};

use crate::memory::{RuleMemory, SemanticMemory};
use crate::runner::TaskRunner;

/// 注册对话 Agent 可用的全部工具（顺序即工具目录顺序）
pub fn research_tools(
    runner: Arc<TaskRunner>,
    semantic: Arc<dyn SemanticMemory>,
    rules: Arc<RuleMemory>,
    baseline_model: &str,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ProposeTaskTool::new(Arc::clone(&runner), baseline_model));
    registry.register(CheckTaskStatusTool::new(Arc::clone(&runner)));
    registry.register(AbortTaskTool::new(runner));
    registry.register(QueryMemoryTool::new(semantic, rules));
    registry
}
