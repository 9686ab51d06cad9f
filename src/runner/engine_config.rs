//! 运行配置 -> 引擎配置
//!
//! 前端侧边栏发来的 RunConfig 形状比较随意（分支可以是模型名字符串、`{"model": ..}` 或按角色的映射），
//! 在这里统一归一为 EngineConfig：每个分支都是按角色展开的 BranchAgents，且条数恰好等于 num_branches。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 未指定分支数时的默认值
pub const DEFAULT_BRANCH_COUNT: usize = 3;

/// 单个任务允许的最大分支数（runner.max_branches 的默认值）
pub const MAX_BRANCH_COUNT: usize = 16;

/// 分支内的角色
pub const BRANCH_ROLES: [&str; 3] = ["strategy", "hypothesis", "refiner"];

/// 前端全局角色 -> 引擎配置键；按此顺序应用，后者覆盖前者（decision 覆盖 verifier）
const GLOBAL_ROLE_MAP: [(&str, &str); 5] = [
    ("strategy_generator", "strategy_generator"),
    ("aggregator", "aggregator"),
    ("verifier", "decision"),
    ("decision", "decision"),
    ("memory", "memory"),
];

/// 成功结果的提交方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum CommitMode {
    #[default]
    Manual,
    AutoAccept,
}

/// 单个分支的输入形式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BranchInput {
    /// 直接给模型名
    Model(String),
    /// `{"model": ..}` 或按角色 `{"strategy": .., "hypothesis": .., "refiner": ..}`
    Roles(BranchRoles),
    /// 无法识别的条目，按未指定处理
    Other(Value),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BranchRoles {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refiner: Option<String>,
}

impl BranchRoles {
    fn role(&self, role: &str) -> Option<&str> {
        match role {
            "strategy" => self.strategy.as_deref(),
            "hypothesis" => self.hypothesis.as_deref(),
            "refiner" => self.refiner.as_deref(),
            _ => None,
        }
    }
}

impl BranchInput {
    /// 某个角色实际使用的模型：角色专属 > 分支整体 > 基线
    pub fn model_for_role(&self, role: &str, baseline: &str) -> String {
        match self {
            BranchInput::Model(m) if !m.is_empty() => m.clone(),
            BranchInput::Roles(r) => r
                .role(role)
                .or(r.model.as_deref())
                .filter(|m| !m.is_empty())
                .unwrap_or(baseline)
                .to_string(),
            _ => baseline.to_string(),
        }
    }

    /// 分支的代表模型（提案展示用）
    pub fn primary_model(&self, baseline: &str) -> String {
        match self {
            BranchInput::Model(m) if !m.is_empty() => m.clone(),
            BranchInput::Roles(r) => r
                .model
                .as_deref()
                .or(r.strategy.as_deref())
                .filter(|m| !m.is_empty())
                .unwrap_or(baseline)
                .to_string(),
            _ => baseline.to_string(),
        }
    }

    /// 显式写出的角色模型（凭证检查只看这些）
    pub fn explicit_role_models(&self) -> Vec<&str> {
        match self {
            BranchInput::Roles(r) => BRANCH_ROLES.iter().filter_map(|role| r.role(role)).collect(),
            _ => Vec::new(),
        }
    }
}

/// 前端发来的运行配置；所有字段可缺省
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "chatModel", default, skip_serializing_if = "Option::is_none")]
    pub chat_model: Option<String>,
    #[serde(rename = "branchCount", default, skip_serializing_if = "Option::is_none")]
    pub branch_count: Option<usize>,
    #[serde(default)]
    pub branches: Vec<BranchInput>,
    #[serde(rename = "globalRoles", default)]
    pub global_roles: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_mode: Option<CommitMode>,
}

impl RunConfig {
    pub fn branch_count(&self) -> usize {
        self.branch_count.unwrap_or(DEFAULT_BRANCH_COUNT)
    }

    pub fn commit_mode(&self) -> CommitMode {
        self.commit_mode.unwrap_or_default()
    }
}

/// 单个智能体的引擎参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub model_id: String,
    pub max_tokens: u32,
    pub reasoning_effort: String,
    pub use_code_tools: bool,
    pub use_web_search: bool,
}

impl AgentSpec {
    pub fn for_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            max_tokens: 25600,
            reasoning_effort: "low".to_string(),
            use_code_tools: true,
            use_web_search: true,
        }
    }
}

/// 一个分支：角色名 -> 智能体参数
pub type BranchAgents = BTreeMap<String, AgentSpec>;

/// 交给研究引擎的规范配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub num_branches: usize,
    pub branches: Vec<BranchAgents>,
    pub global_roles: BTreeMap<String, String>,
    pub accept_all: bool,
    pub dashboard_enabled: bool,
}

fn branch_agents(input: &BranchInput, baseline: &str) -> BranchAgents {
    BRANCH_ROLES
        .iter()
        .map(|role| {
            (
                role.to_string(),
                AgentSpec::for_model(input.model_for_role(role, baseline)),
            )
        })
        .collect()
}

/// 归一化：分支截断到 num_branches，不足用最后一条补齐，一条都没有则全部用基线模型
pub fn build_engine_config(config: &RunConfig, baseline_model: &str) -> EngineConfig {
    let num_branches = config.branch_count().max(1);

    let mut branches: Vec<BranchAgents> = config
        .branches
        .iter()
        .take(num_branches)
        .map(|b| branch_agents(b, baseline_model))
        .collect();

    let filler = branches
        .last()
        .cloned()
        .unwrap_or_else(|| branch_agents(&BranchInput::Model(baseline_model.to_string()), baseline_model));
    branches.resize(num_branches, filler);

    let mut global_roles = BTreeMap::new();
    for (ui_role, engine_key) in GLOBAL_ROLE_MAP {
        if let Some(model) = config.global_roles.get(ui_role) {
            global_roles.insert(engine_key.to_string(), model.clone());
        }
    }

    EngineConfig {
        num_branches,
        branches,
        global_roles,
        accept_all: config.commit_mode() == CommitMode::AutoAccept,
        dashboard_enabled: false,
    }
}
