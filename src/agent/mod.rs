//! 对话 Agent
//!
//! 每个 /api/chat 请求跑一轮：拼系统提示（带当前配置摘要）、回放最近历史、
//! 按 chatModel 选提供方，然后进入有界工具调用循环。所有错误都转成回复文本，不会抛给传输层。

mod loop_;
pub mod prompt;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use loop_::{tool_loop, LoopOutcome, ToolCallRecord, COMPLETION_FALLBACK};
pub use prompt::{build_system_prompt, SYSTEM_PROMPT};

use crate::config::AgentSection;
use crate::core::AgentError;
use crate::llm::{Message, ProviderResolver};
use crate::runner::RunConfig;
use crate::tools::ToolExecutor;

fn default_history_role() -> String {
    "user".to_string()
}

/// 前端回传的一条历史记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default = "default_history_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub config: RunConfig,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatReply {
    pub reply: String,
    pub tool_calls: Vec<ToolCallRecord>,
}

pub struct ChatAgent {
    resolver: Arc<dyn ProviderResolver>,
    executor: Arc<ToolExecutor>,
    settings: AgentSection,
}

impl ChatAgent {
    pub fn new(
        resolver: Arc<dyn ProviderResolver>,
        executor: Arc<ToolExecutor>,
        settings: AgentSection,
    ) -> Self {
        Self {
            resolver,
            executor,
            settings,
        }
    }

    /// 处理一条用户消息；失败时回复 "Error communicating with the LLM: ..."
    pub async fn run_turn(&self, request: ChatRequest) -> ChatReply {
        match self.try_run_turn(&request).await {
            Ok(outcome) => ChatReply {
                reply: outcome.reply,
                tool_calls: outcome.tool_calls,
            },
            Err(e) => {
                tracing::error!("Chat error: {}", e);
                ChatReply {
                    reply: format!("Error communicating with the LLM: {}", e),
                    tool_calls: Vec::new(),
                }
            }
        }
    }

    async fn try_run_turn(&self, request: &ChatRequest) -> Result<LoopOutcome, AgentError> {
        let chat_model = request
            .config
            .chat_model
            .as_deref()
            .unwrap_or(&self.settings.default_chat_model);
        let provider = self.resolver.resolve(chat_model)?;

        let system_prompt =
            build_system_prompt(&request.config, chat_model, request.session_id.as_deref());
        let messages = self.replay_history(&request.history, &request.message);

        tracing::info!(
            model = %chat_model,
            provider = provider.provider_name(),
            history = messages.len() - 1,
            "Chat turn started"
        );
        tool_loop(
            provider.as_ref(),
            &self.executor,
            &system_prompt,
            messages,
            &request.config,
            self.settings.max_tool_rounds,
        )
        .await
    }

    /// 只保留最近 history_window 条中 user / assistant 的记录，末尾追加本次消息
    fn replay_history(&self, history: &[HistoryEntry], message: &str) -> Vec<Message> {
        let start = history.len().saturating_sub(self.settings.history_window);
        let mut messages: Vec<Message> = history[start..]
            .iter()
            .filter_map(|entry| match entry.role.as_str() {
                "user" => Some(Message::user(entry.content.clone())),
                "assistant" => Some(Message::assistant(entry.content.clone())),
                _ => None,
            })
            .collect();
        messages.push(Message::user(message));
        messages
    }
}
