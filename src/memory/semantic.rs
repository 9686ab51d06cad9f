//! 语义记忆（CoMeT）协作方
//!
//! 本 crate 不实现索引与嵌入，只消费搜索 / 列举 / 读取接口：
//! - InMemorySemanticMemory：关键词重叠打分，供测试构造固定记忆
//! - RemoteSemanticMemory：通过 HTTP 访问独立部署的记忆服务
//! - UnavailableMemory：未配置时使用，每次调用返回 Unavailable

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::memory::MemoryError;

fn default_recall_mode() -> String {
    "active".to_string()
}

/// 记忆节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryNode {
    pub node_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_recall_mode")]
    pub recall_mode: String,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub depth_level: u32,
    #[serde(default)]
    pub created_at: String,
}

/// 搜索命中（rank 从 1 开始）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub node_id: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub trigger: String,
    #[serde(default)]
    pub topic_tags: Vec<String>,
    pub score: f64,
    pub rank: usize,
}

/// 语义记忆接口
#[async_trait]
pub trait SemanticMemory: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<MemoryHit>, MemoryError>;

    async fn list_all(&self) -> Result<Vec<MemoryNode>, MemoryError>;

    async fn list_sessions(&self) -> Result<Vec<Value>, MemoryError>;

    async fn list_session(&self, session_id: &str) -> Result<Vec<MemoryNode>, MemoryError>;

    /// 按深度读取节点内容；节点不存在返回 None
    async fn read_node(&self, node_id: &str, depth: u32) -> Result<Option<String>, MemoryError>;
}

/// 内存实现
#[derive(Debug, Default)]
pub struct InMemorySemanticMemory {
    /// (节点, 完整内容)
    nodes: Vec<(MemoryNode, String)>,
    top_k: usize,
}

impl InMemorySemanticMemory {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            top_k: 10,
        }
    }

    pub fn with_node(mut self, node: MemoryNode, content: impl Into<String>) -> Self {
        self.nodes.push((node, content.into()));
        self
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

#[async_trait]
impl SemanticMemory for InMemorySemanticMemory {
    async fn search(&self, query: &str) -> Result<Vec<MemoryHit>, MemoryError> {
        let wanted = tokens(query);
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f64, &MemoryNode)> = self
            .nodes
            .iter()
            .filter_map(|(node, content)| {
                let haystack = tokens(&format!(
                    "{} {} {} {}",
                    node.summary,
                    node.trigger,
                    node.topic_tags.join(" "),
                    content
                ));
                let hits = wanted.iter().filter(|t| haystack.contains(*t)).count();
                (hits > 0).then(|| (hits as f64 / wanted.len() as f64, node))
            })
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(self.top_k)
            .enumerate()
            .map(|(i, (score, node))| MemoryHit {
                node_id: node.node_id.clone(),
                summary: node.summary.clone(),
                trigger: node.trigger.clone(),
                topic_tags: node.topic_tags.clone(),
                score,
                rank: i + 1,
            })
            .collect())
    }

    async fn list_all(&self) -> Result<Vec<MemoryNode>, MemoryError> {
        Ok(self.nodes.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn list_sessions(&self) -> Result<Vec<Value>, MemoryError> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for (node, _) in &self.nodes {
            if let Some(session) = node.session_id.as_deref() {
                *counts.entry(session).or_default() += 1;
            }
        }
        Ok(counts
            .into_iter()
            .map(|(session_id, node_count)| json!({"session_id": session_id, "node_count": node_count}))
            .collect())
    }

    async fn list_session(&self, session_id: &str) -> Result<Vec<MemoryNode>, MemoryError> {
        Ok(self
            .nodes
            .iter()
            .filter(|(n, _)| n.session_id.as_deref() == Some(session_id))
            .map(|(n, _)| n.clone())
            .collect())
    }

    async fn read_node(&self, node_id: &str, depth: u32) -> Result<Option<String>, MemoryError> {
        Ok(self
            .nodes
            .iter()
            .find(|(n, _)| n.node_id == node_id)
            .map(|(n, content)| {
                if depth == 0 {
                    n.summary.clone()
                } else {
                    content.clone()
                }
            }))
    }
}

/// HTTP 记忆服务客户端
///
/// 约定的端点：`GET /search?q=`、`GET /nodes`、`GET /sessions`、`GET /sessions/{id}`、
/// `GET /nodes/{id}?depth=`（返回 `{"content": ...}`，404 表示不存在）。
pub struct RemoteSemanticMemory {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSemanticMemory {
    pub fn new(base_url: &str, timeout_secs: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build memory HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, MemoryError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MemoryError::Backend(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(MemoryError::Backend(format!(
                "memory service returned {}",
                response.status()
            )));
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| MemoryError::Parse(e.to_string()))
    }
}

#[derive(Deserialize)]
struct NodeContent {
    content: String,
}

#[async_trait]
impl SemanticMemory for RemoteSemanticMemory {
    async fn search(&self, query: &str) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(self
            .get_json("/search", &[("q", query.to_string())])
            .await?
            .unwrap_or_default())
    }

    async fn list_all(&self) -> Result<Vec<MemoryNode>, MemoryError> {
        Ok(self.get_json("/nodes", &[]).await?.unwrap_or_default())
    }

    async fn list_sessions(&self) -> Result<Vec<Value>, MemoryError> {
        Ok(self.get_json("/sessions", &[]).await?.unwrap_or_default())
    }

    async fn list_session(&self, session_id: &str) -> Result<Vec<MemoryNode>, MemoryError> {
        Ok(self
            .get_json(&format!("/sessions/{}", session_id), &[])
            .await?
            .unwrap_or_default())
    }

    async fn read_node(&self, node_id: &str, depth: u32) -> Result<Option<String>, MemoryError> {
        let detail: Option<NodeContent> = self
            .get_json(&format!("/nodes/{}", node_id), &[("depth", depth.to_string())])
            .await?;
        Ok(detail.map(|d| d.content))
    }
}

/// 未配置语义记忆服务
#[derive(Debug, Default)]
pub struct UnavailableMemory;

#[async_trait]
impl SemanticMemory for UnavailableMemory {
    async fn search(&self, _query: &str) -> Result<Vec<MemoryHit>, MemoryError> {
        Err(MemoryError::Unavailable)
    }

    async fn list_all(&self) -> Result<Vec<MemoryNode>, MemoryError> {
        Err(MemoryError::Unavailable)
    }

    async fn list_sessions(&self) -> Result<Vec<Value>, MemoryError> {
        Err(MemoryError::Unavailable)
    }

    async fn list_session(&self, _session_id: &str) -> Result<Vec<MemoryNode>, MemoryError> {
        Err(MemoryError::Unavailable)
    }

    async fn read_node(&self, _node_id: &str, _depth: u32) -> Result<Option<String>, MemoryError> {
        Err(MemoryError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, summary: &str, session: &str) -> MemoryNode {
        MemoryNode {
            node_id: id.to_string(),
            summary: summary.to_string(),
            trigger: String::new(),
            session_id: Some(session.to_string()),
            recall_mode: default_recall_mode(),
            topic_tags: vec![],
            depth_level: 0,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    fn store() -> InMemorySemanticMemory {
        InMemorySemanticMemory::new()
            .with_node(node("n1", "Rust async runtime notes", "s1"), "tokio spawn_blocking details")
            .with_node(node("n2", "Graph coloring heuristics", "s1"), "greedy ordering")
            .with_node(node("n3", "Async graph traversal", "s2"), "bfs over futures")
    }

    #[tokio::test]
    async fn test_search_ranks_by_overlap() {
        let hits = store().search("async graph").await.unwrap();
        assert_eq!(hits[0].node_id, "n3");
        assert_eq!(hits[0].rank, 1);
        assert!((hits[0].score - 1.0).abs() < f64::EPSILON);
        assert_eq!(hits.len(), 3);
        assert!(store().search("  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sessions_and_nodes() {
        let s = store();
        let sessions = s.list_sessions().await.unwrap();
        assert_eq!(sessions[0]["session_id"], "s1");
        assert_eq!(sessions[0]["node_count"], 2);
        assert_eq!(s.list_session("s2").await.unwrap().len(), 1);
        assert_eq!(
            s.read_node("n1", 1).await.unwrap().as_deref(),
            Some("tokio spawn_blocking details")
        );
        assert_eq!(s.read_node("missing", 0).await.unwrap(), None);
    }

    #[test]
    fn test_node_defaults() {
        let n: MemoryNode = serde_json::from_value(json!({"node_id": "x"})).unwrap();
        assert_eq!(n.recall_mode, "active");
        assert!(n.topic_tags.is_empty());
    }

    #[tokio::test]
    async fn test_unavailable() {
        let err = UnavailableMemory.list_all().await.unwrap_err();
        assert_eq!(err.to_string(), "CoMeT not available");
    }
}
