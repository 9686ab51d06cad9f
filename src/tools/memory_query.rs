//! query_memory：查询语义记忆（comet）或规则记忆（gcri）
//!
//! 协作方失败不算工具失败，错误放进结果的 error 字段交给 LLM 处理。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::memory::{RuleMemory, SemanticMemory};
use crate::runner::RunConfig;
use crate::tools::schema::parameters_schema_for;
use crate::tools::Tool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
enum MemorySource {
    Comet,
    Gcri,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryMemoryArgs {
    #[schemars(description = "Which memory system to query.")]
    source: MemorySource,
    #[schemars(
        description = "Search query for semantic retrieval (CoMeT). Leave empty to list all."
    )]
    query: Option<String>,
}

pub struct QueryMemoryTool {
    semantic: Arc<dyn SemanticMemory>,
    rules: Arc<RuleMemory>,
}

impl QueryMemoryTool {
    pub fn new(semantic: Arc<dyn SemanticMemory>, rules: Arc<RuleMemory>) -> Self {
        Self { semantic, rules }
    }

    async fn query_semantic(&self, query: Option<&str>) -> Value {
        match query.map(str::trim).filter(|q| !q.is_empty()) {
            Some(q) => match self.semantic.search(q).await {
                Ok(results) => json!({"query": q, "results": results}),
                Err(e) => {
                    tracing::warn!("Semantic memory search failed: {}", e);
                    json!({"query": q, "results": [], "error": e.to_string()})
                }
            },
            None => match self.semantic.list_all().await {
                Ok(nodes) => json!({"nodes": nodes}),
                Err(e) => {
                    tracing::warn!("Semantic memory listing failed: {}", e);
                    json!({"nodes": [], "error": e.to_string()})
                }
            },
        }
    }
}

#[async_trait]
impl Tool for QueryMemoryTool {
    fn name(&self) -> &str {
        "query_memory"
    }

    fn description(&self) -> &str {
        "Search past experiment memory. CoMeT: semantic memory from conversations. If a query \
         is provided, performs semantic search and returns ranked results. Without query, \
         returns all nodes. GCRI: rules and domain-specific knowledge learned from previous tasks."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<QueryMemoryArgs>()
    }

    async fn execute(&self, args: Value, _config: &RunConfig) -> Result<String, String> {
        let args: QueryMemoryArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))?;

        let data = match args.source {
            MemorySource::Comet => self.query_semantic(args.query.as_deref()).await,
            MemorySource::Gcri => self.rules.read().await,
        };
        Ok(data.to_string())
    }
}
