//! LLM 提供方抽象
//!
//! 所有厂商适配器（OpenAI / Anthropic / Gemini / Mock）实现 ChatProvider：
//! 输入系统提示、统一消息列表与工具目录，输出 NormalizedResponse。
//! ProviderResolver 负责按模型 id 选出适配器，对话循环只依赖这两个 trait。

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{Message, NormalizedResponse};
use crate::tools::ToolSpec;

/// 厂商调用失败的原因
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("No API key configured for provider '{0}'")]
    MissingCredential(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => LlmError::Api {
                status: status.as_u16(),
                body: e.to_string(),
            },
            None => LlmError::Network(e.to_string()),
        }
    }
}

/// 函数调用能力的统一入口
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// 发送一次请求；messages 不含 system，系统提示单独传入，由适配器按厂商格式放置
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<NormalizedResponse, LlmError>;

    /// 日志用的提供方名称
    fn provider_name(&self) -> &'static str;
}

/// 模型 id -> 提供方实例
pub trait ProviderResolver: Send + Sync {
    fn resolve(&self, model: &str) -> Result<Arc<dyn ChatProvider>, LlmError>;
}
