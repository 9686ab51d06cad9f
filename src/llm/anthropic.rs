//! Anthropic Messages API 适配器
//!
//! - system 提示放在独立字段
//! - assistant 的工具调用转为 tool_use 块，tool 消息转为 user 轮次里的 tool_result 块
//! - 相邻同角色轮次合并（连续的 tool_result 自然落在同一个 user 轮次）

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::message::synthesize_call_id;
use crate::llm::{ChatProvider, LlmError, Message, NormalizedResponse, Role, ToolCall};
use crate::tools::ToolSpec;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
    /// thinking 等本层不关心的块
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

/// Anthropic 提供方
pub struct AnthropicProvider {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(client: Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://api.anthropic.com/v1".to_string(),
            temperature: Some(0.7),
            max_tokens: 4096,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn build_request(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> AnthropicRequest {
        let tools: Vec<AnthropicTool> = tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect();

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: if system_prompt.is_empty() {
                None
            } else {
                Some(system_prompt.to_string())
            },
            messages: to_anthropic_messages(messages),
            tools: if tools.is_empty() { None } else { Some(tools) },
            temperature: self.temperature,
        }
    }
}

fn to_anthropic_messages(messages: &[Message]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for m in messages {
        let (role, blocks) = match m.role {
            Role::System => continue,
            Role::User => ("user", text_block(&m.content)),
            Role::Assistant => {
                let mut blocks = text_block(&m.content);
                blocks.extend(m.tool_calls.iter().map(|c| ContentBlock::ToolUse {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    input: c.arguments.clone(),
                }));
                ("assistant", blocks)
            }
            Role::Tool => (
                "user",
                vec![ContentBlock::ToolResult {
                    tool_use_id: m.tool_call_id.clone().unwrap_or_default(),
                    content: m.content.clone(),
                }],
            ),
        };

        if blocks.is_empty() {
            continue;
        }

        match out.last_mut() {
            Some(last) if last.role == role => last.content.extend(blocks),
            _ => out.push(AnthropicMessage {
                role: role.to_string(),
                content: blocks,
            }),
        }
    }

    out
}

fn text_block(text: &str) -> Vec<ContentBlock> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![ContentBlock::Text {
            text: text.to_string(),
        }]
    }
}

fn normalize(content: Vec<ContentBlock>) -> NormalizedResponse {
    let mut text = String::new();
    let mut calls = Vec::new();
    for block in content {
        match block {
            ContentBlock::Text { text: t } => text.push_str(&t),
            ContentBlock::ToolUse { id, name, input } => {
                let id = if id.is_empty() {
                    synthesize_call_id(calls.len(), &name)
                } else {
                    id
                };
                let arguments = if input.is_object() {
                    input
                } else {
                    Value::Object(Default::default())
                };
                calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                    thought_signature: None,
                });
            }
            ContentBlock::ToolResult { .. } | ContentBlock::Other => {}
        }
    }
    NormalizedResponse::from_parts(text, calls)
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<NormalizedResponse, LlmError> {
        let request = self.build_request(system_prompt, messages, tools);
        let url = format!("{}/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        Ok(normalize(parsed.content))
    }

    fn provider_name(&self) -> &'static str {
        "anthropic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(id: &str, name: &str) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments: json!({}),
            thought_signature: None,
        }
    }

    #[test]
    fn test_tool_results_merge_into_one_user_turn() {
        let messages = vec![
            Message::system("ignored"),
            Message::user("run it"),
            Message::assistant_with_calls(
                "checking",
                vec![call("toolu_1", "check_task_status"), call("toolu_2", "query_memory")],
            ),
            Message::tool("toolu_1", "a"),
            Message::tool("toolu_2", "b"),
        ];
        let out = to_anthropic_messages(&messages);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].role, "user");
        assert_eq!(out[1].role, "assistant");
        assert_eq!(out[1].content.len(), 3);
        assert_eq!(out[2].role, "user");
        assert_eq!(
            out[2].content,
            vec![
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_1".into(),
                    content: "a".into()
                },
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_2".into(),
                    content: "b".into()
                },
            ]
        );
    }

    #[test]
    fn test_request_puts_system_in_own_field() {
        let provider = AnthropicProvider::new(Client::new(), "claude-4-sonnet", "k");
        let req = provider.build_request("be brief", &[Message::user("hi")], &[]);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["system"], "be brief");
        assert_eq!(v["max_tokens"], 4096);
        assert!(v.get("tools").is_none());
        assert_eq!(v["messages"][0]["content"][0]["type"], "text");
    }

    #[test]
    fn test_normalize_response_blocks() {
        let body = json!({
            "content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Let me "},
                {"type": "text", "text": "check."},
                {"type": "tool_use", "id": "toolu_9", "name": "check_task_status", "input": {}},
                {"type": "tool_use", "id": "", "name": "abort_task", "input": {}}
            ]
        });
        let parsed: AnthropicResponse = serde_json::from_value(body).unwrap();
        let n = normalize(parsed.content);
        assert_eq!(n.content.as_deref(), Some("Let me check."));
        let calls = n.tool_calls.unwrap();
        assert_eq!(calls[0].id, "toolu_9");
        assert_eq!(calls[1].id, "call_1_abort_task");
    }
}
