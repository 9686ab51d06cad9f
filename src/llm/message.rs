//! 统一消息模型：三家厂商的函数调用协议都先映射到这里

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// 一次工具调用：只由 assistant 响应产生，执行后恰好对应一条 tool 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// 参数对象（各厂商返回的字符串参数在解析时已转成 JSON）
    pub arguments: Value,
    /// Gemini 思考模型附在 functionCall 部件上的签名，下一轮必须原样带回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// 对话中的一条消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// 仅 assistant 消息可能非空
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// 仅 tool 消息携带，指向产生它的调用
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// assistant 发起工具调用的消息（content 可以为空）
    pub fn assistant_with_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// 厂商无关的响应：文本与工具调用，空则为 None
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedResponse {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl NormalizedResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: None,
            tool_calls: Some(tool_calls),
        }
    }

    /// 由解析结果组装：空字符串与空列表都归一为 None
    pub fn from_parts(content: String, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content: if content.is_empty() { None } else { Some(content) },
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|c| !c.is_empty())
    }
}

/// 厂商未给出（或给出空）调用 id 时合成一个，保证同一响应内唯一
pub fn synthesize_call_id(index: usize, name: &str) -> String {
    format!("call_{}_{}", index, name)
}

/// 将字符串形式的参数解析为 JSON 对象；解析失败或非对象时返回空对象
pub fn parse_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(v @ Value::Object(_)) => v,
        _ => Value::Object(Default::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_parts_normalizes_empty() {
        let r = NormalizedResponse::from_parts(String::new(), vec![]);
        assert_eq!(r.content, None);
        assert_eq!(r.tool_calls, None);
        assert!(!r.has_tool_calls());
    }

    #[test]
    fn test_parse_arguments_tolerates_garbage() {
        assert_eq!(parse_arguments(r#"{"a": 1}"#), json!({"a": 1}));
        assert_eq!(parse_arguments("not json"), json!({}));
        assert_eq!(parse_arguments("[1,2]"), json!({}));
    }

    #[test]
    fn test_tool_message_serialization() {
        let m = Message::tool("call_0_x", "{}");
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["role"], "tool");
        assert_eq!(v["tool_call_id"], "call_0_x");
        assert!(v.get("tool_calls").is_none());
    }
}
