//! OpenAI 适配器
//!
//! 通过 async_openai 调用 Chat Completions（可配置 base_url，兼容自建代理）。
//! 请求先按线上格式拼成 JSON（扁平角色列表、function 调用、字符串参数），
//! 再反序列化为 CreateChatCompletionRequest 发送；响应同样转回 JSON 后统一解析。

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::llm::message::{parse_arguments, synthesize_call_id};
use crate::llm::{ChatProvider, LlmError, Message, NormalizedResponse, Role, ToolCall};
use crate::tools::ToolSpec;

/// OpenAI 提供方：持有 Client、模型名与（可选）温度
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiProvider {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, temperature: Option<f32>) -> Self {
        let config = if let Some(url) = base_url {
            OpenAIConfig::new()
                .with_api_base(url)
                .with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
        }
    }
}

/// 工具目录信封：{type: function, function: {name, description, parameters}}
pub(crate) fn tools_to_openai(tools: &[ToolSpec]) -> Vec<Value> {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.parameters,
                }
            })
        })
        .collect()
}

fn message_to_openai(m: &Message) -> Value {
    match m.role {
        Role::Assistant if !m.tool_calls.is_empty() => {
            let calls: Vec<Value> = m
                .tool_calls
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if m.content.is_empty() {
                Value::Null
            } else {
                Value::String(m.content.clone())
            };
            json!({"role": "assistant", "content": content, "tool_calls": calls})
        }
        Role::Tool => json!({
            "role": "tool",
            "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
            "content": m.content,
        }),
        _ => json!({"role": m.role.as_str(), "content": m.content}),
    }
}

/// 拼出请求体（线上 JSON 格式）
pub(crate) fn build_request_body(
    model: &str,
    temperature: Option<f32>,
    system_prompt: &str,
    messages: &[Message],
    tools: &[ToolSpec],
) -> Value {
    let mut wire = Vec::with_capacity(messages.len() + 1);
    wire.push(json!({"role": "system", "content": system_prompt}));
    wire.extend(messages.iter().map(message_to_openai));

    let mut body = json!({
        "model": model,
        "messages": wire,
    });
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools_to_openai(tools));
    }
    if let Some(t) = temperature {
        body["temperature"] = json!(t);
    }
    body
}

/// 解析 choices[0].message：content 文本 + tool_calls（字符串参数转 JSON）
pub(crate) fn parse_response(response: &Value) -> Result<NormalizedResponse, LlmError> {
    let message = response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, call)| {
                    let function = call.get("function")?;
                    let name = function.get("name")?.as_str()?.to_string();
                    let arguments = match function.get("arguments") {
                        Some(Value::String(raw)) => parse_arguments(raw),
                        Some(v @ Value::Object(_)) => v.clone(),
                        _ => json!({}),
                    };
                    let id = call
                        .get("id")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .unwrap_or_else(|| synthesize_call_id(i, &name));
                    Some(ToolCall {
                        id,
                        name,
                        arguments,
                        thought_signature: None,
                    })
                })
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(NormalizedResponse::from_parts(content, tool_calls))
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<NormalizedResponse, LlmError> {
        let body = build_request_body(&self.model, self.temperature, system_prompt, messages, tools);
        let request: CreateChatCompletionRequest = serde_json::from_value(body)
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(map_openai_error)?;

        let value = serde_json::to_value(&response)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_response(&value)
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn map_openai_error(e: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;
    match e {
        // async_openai 不透出 HTTP 状态码，status 置 0
        OpenAIError::ApiError(api) => LlmError::Api {
            status: 0,
            body: api.message,
        },
        other => LlmError::Network(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ToolSpec {
        ToolSpec {
            name: "check_task_status".to_string(),
            description: "Check status".to_string(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        }
    }

    #[test]
    fn test_request_body_flattens_tool_exchange() {
        let call = ToolCall {
            id: "call_abc".to_string(),
            name: "check_task_status".to_string(),
            arguments: json!({}),
            thought_signature: None,
        };
        let messages = vec![
            Message::user("status?"),
            Message::assistant_with_calls("", vec![call]),
            Message::tool("call_abc", r#"{"running":false}"#),
        ];
        let body = build_request_body("gpt-4o", Some(0.7), "sys", &messages, &[spec()]);

        let wire = body["messages"].as_array().unwrap();
        assert_eq!(wire.len(), 4);
        assert_eq!(wire[0]["role"], "system");
        assert_eq!(wire[2]["content"], Value::Null);
        assert_eq!(wire[2]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(wire[3]["tool_call_id"], "call_abc");
        assert_eq!(body["tools"][0]["type"], "function");
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_request_body_omits_temperature_for_reasoning() {
        let body = build_request_body("o3", None, "sys", &[Message::user("hi")], &[]);
        assert!(body.get("temperature").is_none());
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let response = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "call_1", "type": "function",
                         "function": {"name": "abort_task", "arguments": "{}"}},
                        {"id": "", "type": "function",
                         "function": {"name": "query_memory", "arguments": "{\"source\":\"gcri\"}"}}
                    ]
                }
            }]
        });
        let parsed = parse_response(&response).unwrap();
        assert_eq!(parsed.content, None);
        let calls = parsed.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[1].id, "call_1_query_memory");
        assert_eq!(calls[1].arguments, json!({"source": "gcri"}));
    }

    #[test]
    fn test_parse_response_without_choices_is_invalid() {
        assert!(matches!(
            parse_response(&json!({"choices": []})),
            Err(LlmError::InvalidResponse(_))
        ));
    }
}
