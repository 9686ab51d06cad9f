//! 有界工具调用循环
//!
//! 请求 LLM -> 若无工具调用则结束 -> 否则按顺序执行每个调用，每个调用回写一条 tool 消息 -> 下一轮。
//! 达到轮数上限后再请求一次，不论是否仍有工具调用都以其文本作为回复。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::{ChatProvider, Message};
use crate::runner::RunConfig;
use crate::tools::ToolExecutor;

/// 轮数耗尽且最后一次响应没有文本时的固定回复
pub const COMPLETION_FALLBACK: &str = "Task processing complete.";

/// 一次工具调用的审计记录，随回复返回给前端
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub arguments: Value,
    pub result: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub reply: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// 运行工具调用循环；任何一轮中的 LLM 错误都会终止循环并向上返回
pub async fn tool_loop(
    provider: &dyn ChatProvider,
    executor: &ToolExecutor,
    system_prompt: &str,
    mut messages: Vec<Message>,
    config: &RunConfig,
    max_rounds: usize,
) -> Result<LoopOutcome, AgentError> {
    let catalog = executor.catalog();
    let mut records = Vec::new();

    for round in 0..max_rounds {
        let response = provider
            .complete(system_prompt, &messages, &catalog)
            .await?;

        let calls = match response.tool_calls {
            Some(calls) if !calls.is_empty() => calls,
            _ => {
                tracing::info!(round, tools = records.len(), "Chat turn finished");
                return Ok(LoopOutcome {
                    reply: response.content.unwrap_or_default(),
                    tool_calls: records,
                });
            }
        };

        tracing::info!(
            round,
            provider = provider.provider_name(),
            calls = calls.len(),
            "LLM requested tool calls"
        );
        messages.push(Message::assistant_with_calls(
            response.content.unwrap_or_default(),
            calls.clone(),
        ));

        for call in calls {
            let result = executor
                .execute(&call.name, call.arguments.clone(), config)
                .await;
            messages.push(Message::tool(call.id, result.clone()));
            records.push(ToolCallRecord {
                tool: call.name,
                arguments: call.arguments,
                result,
            });
        }
    }

    tracing::warn!(max_rounds, "Tool round limit reached, requesting final answer");
    let last = provider
        .complete(system_prompt, &messages, &catalog)
        .await?;
    let reply = last
        .content
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| COMPLETION_FALLBACK.to_string());

    Ok(LoopOutcome {
        reply,
        tool_calls: records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, NormalizedResponse, Role, ScriptedProvider, ToolCall};
    use crate::tools::{Tool, ToolRegistry};
    use async_trait::async_trait;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl Tool for Upper {
        fn name(&self) -> &str {
            "upper"
        }
        fn description(&self) -> &str {
            "Uppercase text"
        }
        async fn execute(&self, args: Value, _config: &RunConfig) -> Result<String, String> {
            let text = args["text"].as_str().unwrap_or_default().to_uppercase();
            Ok(json!({"text": text}).to_string())
        }
    }

    fn executor() -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Upper);
        ToolExecutor::new(registry, 5)
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: args,
            thought_signature: None,
        }
    }

    #[tokio::test]
    async fn test_plain_reply_without_tools() {
        let provider = ScriptedProvider::new(vec![NormalizedResponse::text("hello")]);
        let out = tool_loop(
            &provider,
            &executor(),
            "sys",
            vec![Message::user("hi")],
            &RunConfig::default(),
            5,
        )
        .await
        .unwrap();
        assert_eq!(out.reply, "hello");
        assert!(out.tool_calls.is_empty());
        assert_eq!(provider.requests()[0].tool_names, vec!["upper"]);
    }

    #[tokio::test]
    async fn test_one_tool_message_per_call_in_order() {
        let provider = ScriptedProvider::new(vec![
            NormalizedResponse::calls(vec![
                call("a1", "upper", json!({"text": "x"})),
                call("a2", "missing", json!({})),
            ]),
            NormalizedResponse::text("done"),
        ]);
        let out = tool_loop(
            &provider,
            &executor(),
            "sys",
            vec![Message::user("go")],
            &RunConfig::default(),
            5,
        )
        .await
        .unwrap();

        assert_eq!(out.reply, "done");
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(out.tool_calls[1].result, r#"{"error":"Unknown tool: missing"}"#);

        let second = &provider.requests()[1].messages;
        let tools: Vec<&Message> = second.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].tool_call_id.as_deref(), Some("a1"));
        assert_eq!(tools[1].tool_call_id.as_deref(), Some("a2"));
        assert_eq!(second[1].role, Role::Assistant);
        assert_eq!(second[1].tool_calls.len(), 2);
    }

    #[tokio::test]
    async fn test_round_bound_falls_back_to_fixed_reply() {
        let looping = || NormalizedResponse::calls(vec![call("c", "upper", json!({"text": "y"}))]);
        let provider = ScriptedProvider::new(vec![looping(), looping(), looping()]);
        let out = tool_loop(
            &provider,
            &executor(),
            "sys",
            vec![Message::user("go")],
            &RunConfig::default(),
            2,
        )
        .await
        .unwrap();
        assert_eq!(out.reply, COMPLETION_FALLBACK);
        assert_eq!(out.tool_calls.len(), 2);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_stops_loop() {
        let provider = ScriptedProvider::new(vec![]);
        provider.push_error(LlmError::Network("connection refused".into()));
        let err = tool_loop(
            &provider,
            &executor(),
            "sys",
            vec![Message::user("go")],
            &RunConfig::default(),
            5,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::ProviderUnavailable(_)));
    }
}
