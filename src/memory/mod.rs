//! 记忆协作方：语义记忆（CoMeT）与规则记忆（GCRI 外部记忆文件）

pub mod rules;
pub mod semantic;

use thiserror::Error;

pub use rules::RuleMemory;
pub use semantic::{
    InMemorySemanticMemory, MemoryHit, MemoryNode, RemoteSemanticMemory, SemanticMemory,
    UnavailableMemory,
};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("CoMeT not available")]
    Unavailable,

    #[error("Node not found")]
    NotFound,

    #[error("{0}")]
    Backend(String),

    #[error("Invalid memory response: {0}")]
    Parse(String),
}
