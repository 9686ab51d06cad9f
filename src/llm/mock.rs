//! 脚本化 Mock 提供方（用于测试，无需 API）
//!
//! 按顺序返回预先排好的响应；队列耗尽后返回一条固定文本。每次请求的消息列表都会记录下来供断言。

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::llm::{ChatProvider, LlmError, Message, NormalizedResponse, ProviderResolver};
use crate::tools::ToolSpec;

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// Mock 提供方：按脚本回放响应
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<NormalizedResponse, LlmError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<NormalizedResponse>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次失败
    pub fn push_error(&self, error: LlmError) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<NormalizedResponse, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                system_prompt: system_prompt.to_string(),
                messages: messages.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(NormalizedResponse::text("(script exhausted)")))
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// 任意模型都解析到同一个 ScriptedProvider，并记录被请求的模型 id
pub struct ScriptedResolver {
    provider: Arc<ScriptedProvider>,
    models: Mutex<Vec<String>>,
}

impl ScriptedResolver {
    pub fn new(provider: Arc<ScriptedProvider>) -> Self {
        Self {
            provider,
            models: Mutex::new(Vec::new()),
        }
    }

    pub fn resolved_models(&self) -> Vec<String> {
        self.models.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl ProviderResolver for ScriptedResolver {
    fn resolve(&self, model: &str) -> Result<Arc<dyn ChatProvider>, LlmError> {
        if let Ok(mut models) = self.models.lock() {
            models.push(model.to_string());
        }
        let provider: Arc<dyn ChatProvider> = self.provider.clone();
        Ok(provider)
    }
}
