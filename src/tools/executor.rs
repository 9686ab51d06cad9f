//! 工具执行器（分发器）
//!
//! 持有 ToolRegistry 与全局超时：try_execute 在超时内调用工具，超时或失败时转为 AgentError；
//! execute 再把错误统一成 `{"error": ...}` 结果字符串交回对话循环，循环不会因单个工具失败而中断。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::{json, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::runner::RunConfig;
use crate::tools::{ToolRegistry, ToolSpec};

/// 工具执行器：对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行并返回结果字符串；未知工具、失败与超时都变成 `{"error": ...}`
    pub async fn execute(&self, tool_name: &str, args: Value, config: &RunConfig) -> String {
        match self.try_execute(tool_name, args, config).await {
            Ok(content) => content,
            Err(AgentError::UnknownTool(name)) => {
                json!({"error": format!("Unknown tool: {}", name)}).to_string()
            }
            Err(e) => json!({"error": e.to_string()}).to_string(),
        }
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed；输出 JSON 审计日志
    pub async fn try_execute(
        &self,
        tool_name: &str,
        args: Value,
        config: &RunConfig,
    ) -> Result<String, AgentError> {
        let Some(tool) = self.registry.get(tool_name) else {
            tracing::warn!(tool = %tool_name, "LLM requested unknown tool");
            return Err(AgentError::UnknownTool(tool_name.to_string()));
        };

        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, tool.execute(args, config)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.registry.catalog()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::Tool;
    use async_trait::async_trait;

    struct Slow;

    #[async_trait]
    impl Tool for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value, _config: &RunConfig) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("{}".into())
        }
    }

    struct Broken;

    #[async_trait]
    impl Tool for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn description(&self) -> &str {
            "always fails"
        }

        async fn execute(&self, _args: Value, _config: &RunConfig) -> Result<String, String> {
            Err("disk on fire".into())
        }
    }

    fn executor() -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(Slow);
        reg.register(Broken);
        ToolExecutor {
            registry: reg,
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_error() {
        let out = executor()
            .execute("teleport", json!({}), &RunConfig::default())
            .await;
        assert_eq!(out, r#"{"error":"Unknown tool: teleport"}"#);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_become_error_payloads() {
        let ex = executor();
        let failed: Value =
            serde_json::from_str(&ex.execute("broken", json!({}), &RunConfig::default()).await)
                .unwrap();
        assert_eq!(failed["error"], "Tool execution failed: disk on fire");

        let timed_out: Value =
            serde_json::from_str(&ex.execute("slow", json!({}), &RunConfig::default()).await)
                .unwrap();
        assert_eq!(timed_out["error"], "Tool timeout: slow");
    }
}
