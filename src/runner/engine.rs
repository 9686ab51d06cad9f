//! 研究引擎契约
//!
//! 引擎是阻塞调用，运行在 spawn_blocking 线程上；通过 EngineCallbacks 推送进度，
//! 在阶段之间轮询 AbortFlag，观察到中止时返回 EngineError::Aborted。

use serde_json::Value;
use thiserror::Error;

use crate::core::AbortFlag;
use crate::runner::{EngineConfig, ProgressEvent};

/// 引擎调用失败
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("{0}")]
    Failed(String),

    /// 引擎观察到中止标志后提前退出
    #[error("aborted")]
    Aborted,
}

/// 引擎结果：JSON 对象、纯字符串或 Null（无结果）
pub type EngineOutput = Value;

/// 引擎进度回调；在引擎线程上同步调用，事件入队后即返回
pub trait EngineCallbacks: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// 研究引擎（黑盒）
pub trait ResearchEngine: Send + Sync {
    fn invoke(
        &self,
        task: &str,
        config: &EngineConfig,
        abort: &AbortFlag,
        callbacks: &dyn EngineCallbacks,
    ) -> Result<EngineOutput, EngineError>;
}

/// 未配置引擎命令时使用：每次调用都失败
#[derive(Debug, Default)]
pub struct UnconfiguredEngine;

impl ResearchEngine for UnconfiguredEngine {
    fn invoke(
        &self,
        _task: &str,
        _config: &EngineConfig,
        _abort: &AbortFlag,
        _callbacks: &dyn EngineCallbacks,
    ) -> Result<EngineOutput, EngineError> {
        Err(EngineError::Failed(
            "research engine is not configured (set runner.engine_command)".to_string(),
        ))
    }
}

/// 从引擎结果提取展示给用户的最终输出；结果为空时返回 None
pub fn final_output(result: &EngineOutput) -> Option<String> {
    match result {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) if map.is_empty() => None,
        Value::Object(map) => match map.get("final_output") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => serde_json::to_string_pretty(result).ok(),
        },
        Value::Array(items) if items.is_empty() => None,
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_final_output_prefers_field() {
        assert_eq!(
            final_output(&json!({"final_output": "answer", "iterations": 3})).as_deref(),
            Some("answer")
        );
    }

    #[test]
    fn test_final_output_falls_back_to_pretty_json() {
        let out = final_output(&json!({"score": 1})).unwrap();
        assert!(out.contains("\"score\": 1"));
    }

    #[test]
    fn test_final_output_empty_results() {
        assert_eq!(final_output(&Value::Null), None);
        assert_eq!(final_output(&json!("")), None);
        assert_eq!(final_output(&json!({})), None);
        assert_eq!(final_output(&json!("plain")).as_deref(), Some("plain"));
    }
}
