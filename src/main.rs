//! RUI 后端入口
//!
//! 加载配置、初始化日志，组装凭证 / 模型路由 / 事件中枢 / 任务运行器 / 记忆 / 工具 / 对话 Agent，
//! 然后启动 HTTP + WebSocket 服务，直到 Ctrl+C 或 SIGTERM。

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use rui::agent::ChatAgent;
use rui::config::load_config;
use rui::core::ShutdownManager;
use rui::credentials::KeyStore;
use rui::gateway::{serve, AppState, ConnectionHub};
use rui::llm::VendorRouter;
use rui::memory::{RemoteSemanticMemory, RuleMemory, SemanticMemory, UnavailableMemory};
use rui::runner::{ResearchEngine, SubprocessEngine, TaskRunner, UnconfiguredEngine};
use rui::tools::{research_tools, ToolExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rui::observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let keys = Arc::new(KeyStore::load(
        cfg.credentials
            .cache_path
            .clone()
            .unwrap_or_else(KeyStore::default_cache_path),
    ));
    let resolver = Arc::new(VendorRouter::new(Arc::clone(&keys), cfg.llm.clone()));

    let hub = Arc::new(ConnectionHub::new(cfg.runner.history_capacity));
    let engine: Arc<dyn ResearchEngine> =
        match SubprocessEngine::from_command(&cfg.runner.engine_command) {
            Some(engine) => Arc::new(engine),
            None => {
                tracing::warn!("runner.engine_command not set, research tasks will fail");
                Arc::new(UnconfiguredEngine)
            }
        };
    let runner = Arc::new(
        TaskRunner::new(
            engine,
            Arc::clone(&hub),
            cfg.agent.baseline_model.clone(),
            cfg.runner.event_buffer,
        )
        .with_max_branches(cfg.runner.max_branches),
    );

    let semantic: Arc<dyn SemanticMemory> = match cfg.memory.comet_url.as_deref() {
        Some(url) => Arc::new(RemoteSemanticMemory::new(url, cfg.llm.request_timeout_secs)),
        None => {
            tracing::warn!("memory.comet_url not set, semantic memory unavailable");
            Arc::new(UnavailableMemory)
        }
    };
    let rules = Arc::new(RuleMemory::new(
        cfg.memory
            .gcri_memory_path
            .clone()
            .unwrap_or_else(RuleMemory::default_path),
    ));

    let registry = research_tools(
        Arc::clone(&runner),
        Arc::clone(&semantic),
        Arc::clone(&rules),
        &cfg.agent.baseline_model,
    );
    let executor = Arc::new(ToolExecutor::new(registry, cfg.agent.tool_timeout_secs));
    let agent = ChatAgent::new(resolver, executor, cfg.agent.clone());

    let state = Arc::new(AppState {
        agent,
        runner: Arc::clone(&runner),
        hub,
        keys,
        semantic,
        rules,
        default_chat_model: cfg.agent.default_chat_model.clone(),
    });

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    serve(state, &cfg.server.bind_addr, Arc::clone(&shutdown))
        .await
        .context("Server failed")?;

    if runner.is_running() {
        tracing::info!("Shutting down with a running task, requesting abort");
        runner.abort();
        runner.wait_idle().await;
    }
    tracing::info!("RUI backend stopped");
    Ok(())
}
