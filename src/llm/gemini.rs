//! Google Gemini generateContent 适配器
//!
//! 角色改名（assistant -> model），文本包进 parts；工具调用与结果分别是 functionCall / functionResponse 部件。
//! Gemini 的 functionResponse 只认函数名不认 id，名字从前面 assistant 消息里的同 id 调用找回。

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::llm::message::synthesize_call_id;
use crate::llm::{ChatProvider, LlmError, Message, NormalizedResponse, Role, ToolCall};
use crate::tools::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTools {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTools>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<Value>,
}

/// Gemini 提供方
pub struct GeminiProvider {
    client: Client,
    model: String,
    api_key: String,
    base_url: String,
    temperature: Option<f32>,
}

impl GeminiProvider {
    pub fn new(client: Client, model: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            api_key: api_key.into(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            temperature: Some(0.7),
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

    fn build_request(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> GeminiRequest {
        let declarations: Vec<FunctionDeclaration> = tools
            .iter()
            .map(|t| FunctionDeclaration {
                name: t.name.clone(),
                description: t.description.clone(),
                parameters: t.parameters.clone(),
            })
            .collect();

        GeminiRequest {
            contents: to_gemini_contents(messages),
            system_instruction: if system_prompt.is_empty() {
                None
            } else {
                Some(Content {
                    role: String::new(),
                    parts: vec![text_part(system_prompt)],
                })
            },
            tools: if declarations.is_empty() {
                None
            } else {
                Some(vec![GeminiTools {
                    function_declarations: declarations,
                }])
            },
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        ..Default::default()
    }
}

/// tool 结果是 JSON 字符串；functionResponse.response 必须是对象
fn response_payload(content: &str) -> Value {
    match serde_json::from_str::<Value>(content) {
        Ok(v @ Value::Object(_)) => v,
        Ok(other) => json!({ "result": other }),
        Err(_) => json!({ "result": content }),
    }
}

fn to_gemini_contents(messages: &[Message]) -> Vec<Content> {
    let mut call_names: HashMap<&str, &str> = HashMap::new();
    let mut out: Vec<Content> = Vec::new();

    for m in messages {
        let (role, parts) = match m.role {
            Role::System => continue,
            Role::User => ("user", vec![text_part(&m.content)]),
            Role::Assistant => {
                let mut parts = Vec::new();
                if !m.content.is_empty() {
                    parts.push(text_part(&m.content));
                }
                for c in &m.tool_calls {
                    call_names.insert(c.id.as_str(), c.name.as_str());
                    parts.push(Part {
                        function_call: Some(FunctionCall {
                            name: c.name.clone(),
                            args: c.arguments.clone(),
                        }),
                        thought_signature: c.thought_signature.clone(),
                        ..Default::default()
                    });
                }
                ("model", parts)
            }
            Role::Tool => {
                let id = m.tool_call_id.as_deref().unwrap_or_default();
                let name = call_names.get(id).copied().unwrap_or(id);
                (
                    "user",
                    vec![Part {
                        function_response: Some(FunctionResponse {
                            name: name.to_string(),
                            response: response_payload(&m.content),
                        }),
                        ..Default::default()
                    }],
                )
            }
        };

        if parts.is_empty() {
            continue;
        }

        match out.last_mut() {
            Some(last) if last.role == role => last.parts.extend(parts),
            _ => out.push(Content {
                role: role.to_string(),
                parts,
            }),
        }
    }

    out
}

fn normalize(response: GeminiResponse) -> Result<NormalizedResponse, LlmError> {
    if response.candidates.is_empty() {
        let reason = response
            .prompt_feedback
            .map(|f| f.to_string())
            .unwrap_or_else(|| "no candidates".to_string());
        return Err(LlmError::InvalidResponse(reason));
    }

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in response
        .candidates
        .into_iter()
        .filter_map(|c| c.content)
        .flat_map(|c| c.parts)
    {
        if let Some(t) = part.text {
            text.push_str(&t);
        }
        if let Some(fc) = part.function_call {
            let arguments = if fc.args.is_object() {
                fc.args
            } else {
                Value::Object(Default::default())
            };
            calls.push(ToolCall {
                id: synthesize_call_id(calls.len(), &fc.name),
                name: fc.name,
                arguments,
                thought_signature: part.thought_signature,
            });
        }
    }
    Ok(NormalizedResponse::from_parts(text, calls))
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<NormalizedResponse, LlmError> {
        let request = self.build_request(system_prompt, messages, tools);
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        normalize(parsed)
    }

    fn provider_name(&self) -> &'static str {
        "google"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles_renamed_and_function_response_named() {
        let messages = vec![
            Message::user("what is in memory?"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "call_0_query_memory".into(),
                    name: "query_memory".into(),
                    arguments: json!({"source": "gcri"}),
                    thought_signature: None,
                }],
            ),
            Message::tool("call_0_query_memory", r#"{"source":"gcri","data":{}}"#),
        ];
        let contents = to_gemini_contents(&messages);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1].role, "model");
        let fr = contents[2].parts[0].function_response.as_ref().unwrap();
        assert_eq!(fr.name, "query_memory");
        assert_eq!(fr.response["source"], "gcri");
    }

    #[test]
    fn test_request_wire_shape() {
        let provider = GeminiProvider::new(Client::new(), "gemini-2.5-pro", "k");
        let tool = ToolSpec {
            name: "abort_task".into(),
            description: "Abort".into(),
            parameters: json!({"type": "object", "properties": {}, "required": []}),
        };
        let req = provider.build_request("sys", &[Message::user("hi")], &[tool]);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(v["tools"][0]["functionDeclarations"][0]["name"], "abort_task");
        assert_eq!(v["contents"][0]["parts"][0]["text"], "hi");
        assert!(v["contents"][0]["parts"][0].get("functionCall").is_none());
    }

    #[test]
    fn test_normalize_synthesizes_ids() {
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Checking"},
                        {"functionCall": {"name": "check_task_status", "args": {}}},
                        {"functionCall": {"name": "check_task_status"}}
                    ]
                }
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(body).unwrap();
        let n = normalize(parsed).unwrap();
        assert_eq!(n.content.as_deref(), Some("Checking"));
        let calls = n.tool_calls.unwrap();
        assert_eq!(calls[0].id, "call_0_check_task_status");
        assert_eq!(calls[1].id, "call_1_check_task_status");
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn test_thought_signature_echoed_on_next_request() {
        let body = json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [{
                        "functionCall": {"name": "check_task_status", "args": {}},
                        "thoughtSignature": "c2lnLTE="
                    }]
                }
            }]
        });
        let parsed: GeminiResponse = serde_json::from_value(body).unwrap();
        let calls = normalize(parsed).unwrap().tool_calls.unwrap();
        assert_eq!(calls[0].thought_signature.as_deref(), Some("c2lnLTE="));

        let messages = vec![
            Message::user("status?"),
            Message::assistant_with_calls("", calls),
            Message::tool("call_0_check_task_status", r#"{"running":false}"#),
        ];
        let v = serde_json::to_value(to_gemini_contents(&messages)).unwrap();
        assert_eq!(v[1]["parts"][0]["thoughtSignature"], "c2lnLTE=");
        assert_eq!(v[1]["parts"][0]["functionCall"]["name"], "check_task_status");
        assert!(v[2]["parts"][0].get("thoughtSignature").is_none());
    }

    #[test]
    fn test_no_candidates_is_invalid() {
        let parsed: GeminiResponse =
            serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}})).unwrap();
        assert!(matches!(normalize(parsed), Err(LlmError::InvalidResponse(_))));
    }
}
