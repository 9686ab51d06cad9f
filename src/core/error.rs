//! 编排层错误类型
//!
//! 对话循环内的错误统一收敛为 AgentError；run_turn 再把它转成面向用户的回复文本，不向传输层抛出。

use thiserror::Error;

/// 对话、工具分发与任务启动过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 模型路由、凭证或网络失败
    #[error("{0}")]
    ProviderUnavailable(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("A task is already running")]
    AlreadyRunning,

    #[error("Engine failure: {0}")]
    EngineFailure(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<crate::llm::LlmError> for AgentError {
    fn from(e: crate::llm::LlmError) -> Self {
        AgentError::ProviderUnavailable(e.to_string())
    }
}

impl From<config::ConfigError> for AgentError {
    fn from(e: config::ConfigError) -> Self {
        AgentError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;

    #[test]
    fn test_llm_error_maps_to_provider_unavailable() {
        let err: AgentError = LlmError::MissingCredential("anthropic".into()).into();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
        assert!(err.to_string().contains("anthropic"));
    }

    #[test]
    fn test_already_running_message() {
        assert_eq!(AgentError::AlreadyRunning.to_string(), "A task is already running");
    }
}
