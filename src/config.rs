//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RUI__*` 覆盖（双下划线表示嵌套，如 `RUI__AGENT__MAX_TOOL_ROUNDS=3`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub agent: AgentSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub runner: RunnerSection,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub credentials: CredentialsSection,
}

/// [server] 段：HTTP / WebSocket 监听地址
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// [agent] 段：对话模型、工具轮数上限、历史窗口
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    /// 请求未指定 chatModel 时使用的对话模型
    #[serde(default = "default_chat_model")]
    pub default_chat_model: String,
    /// 分支未指定模型时的基线模型
    #[serde(default = "default_baseline_model")]
    pub baseline_model: String,
    /// 单次对话内工具调用轮数上限
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,
    /// 回放给 LLM 的最近历史条数
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_baseline_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tool_rounds() -> usize {
    5
}

fn default_history_window() -> usize {
    20
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            default_chat_model: default_chat_model(),
            baseline_model: default_baseline_model(),
            max_tool_rounds: default_max_tool_rounds(),
            history_window: default_history_window(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// [llm] 段：采样温度、输出上限、超时与各厂商端点
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub openai_base_url: Option<String>,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_request_timeout() -> u64 {
    120
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
            openai_base_url: None,
            anthropic_base_url: default_anthropic_base_url(),
            gemini_base_url: default_gemini_base_url(),
        }
    }
}

/// [runner] 段：事件回放容量、跨线程事件通道容量、研究引擎命令
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerSection {
    /// HistoryLog 最多保留的持久事件数
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// 引擎线程 -> 广播任务的有界通道容量
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// 研究引擎命令行（程序 + 参数，任务描述追加在末尾）；为空则引擎不可用
    #[serde(default)]
    pub engine_command: Vec<String>,
    /// 单个任务的分支数上限；超出的启动请求直接拒绝
    #[serde(default = "default_max_branches")]
    pub max_branches: usize,
}

fn default_history_capacity() -> usize {
    500
}

fn default_event_buffer() -> usize {
    256
}

fn default_max_branches() -> usize {
    crate::runner::MAX_BRANCH_COUNT
}

impl Default for RunnerSection {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            event_buffer: default_event_buffer(),
            engine_command: Vec::new(),
            max_branches: default_max_branches(),
        }
    }
}

/// [memory] 段：语义记忆服务地址、规则记忆文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MemorySection {
    /// 语义记忆（CoMeT）HTTP 服务地址；未设置时查询返回 "not available"
    pub comet_url: Option<String>,
    /// 规则记忆 JSON 文件，未设置时用 ~/.gcri/external_memory.json
    pub gcri_memory_path: Option<PathBuf>,
}

/// [credentials] 段：API Key 缓存文件
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CredentialsSection {
    /// 未设置时用 ~/.rui/keys.json
    pub cache_path: Option<PathBuf>,
}

/// 从 config 目录加载配置，环境变量 RUI__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RUI__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RUI")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.agent.max_tool_rounds, 5);
        assert_eq!(cfg.agent.history_window, 20);
        assert_eq!(cfg.runner.history_capacity, 500);
        assert!((cfg.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert!(cfg.runner.engine_command.is_empty());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rui.toml");
        std::fs::write(
            &path,
            "[agent]\nmax_tool_rounds = 2\n\n[runner]\nhistory_capacity = 10\nengine_command = [\"gcri\", \"run\"]\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.agent.max_tool_rounds, 2);
        assert_eq!(cfg.agent.default_chat_model, "gpt-4o");
        assert_eq!(cfg.runner.history_capacity, 10);
        assert_eq!(cfg.runner.engine_command, vec!["gcri", "run"]);
    }
}
