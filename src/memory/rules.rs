//! 规则记忆（GCRI 外部记忆文件）读取
//!
//! 文件不存在时返回空结构；解析失败时返回空结构并附带 error 字段。

use std::path::{Path, PathBuf};

use serde_json::{json, Value};

/// 规则记忆文件读取器
#[derive(Debug, Clone)]
pub struct RuleMemory {
    path: PathBuf,
}

impl RuleMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// ~/.gcri/external_memory.json
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gcri")
            .join("external_memory.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Value {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return empty_memory(),
            Err(e) => return with_error(e.to_string()),
        };

        match serde_json::from_str::<Value>(&raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "Failed to read rule memory: {}", e);
                with_error(e.to_string())
            }
        }
    }
}

fn empty_memory() -> Value {
    json!({
        "global_rules": [],
        "domain_rules": {},
        "knowledge": {},
    })
}

fn with_error(error: String) -> Value {
    let mut v = empty_memory();
    v["error"] = Value::String(error);
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mem = RuleMemory::new(dir.path().join("nope.json"));
        assert_eq!(mem.read().await, empty_memory());
    }

    #[tokio::test]
    async fn test_reads_file_and_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external_memory.json");

        std::fs::write(&path, r#"{"global_rules": ["verify twice"]}"#).unwrap();
        let mem = RuleMemory::new(&path);
        assert_eq!(mem.read().await["global_rules"][0], "verify twice");

        std::fs::write(&path, "{broken").unwrap();
        let v = mem.read().await;
        assert!(v["error"].is_string());
        assert_eq!(v["knowledge"], json!({}));
    }
}
