//! 研究任务运行层：进度事件、引擎契约与配置归一化、跨线程事件桥、任务运行器、子进程引擎

pub mod bridge;
pub mod engine;
pub mod engine_config;
pub mod events;
pub mod subprocess;
pub mod task;

pub use bridge::{spawn_bridge, ChannelCallbacks};
pub use engine::{
    final_output, EngineCallbacks, EngineError, EngineOutput, ResearchEngine, UnconfiguredEngine,
};
pub use engine_config::{
    build_engine_config, AgentSpec, BranchAgents, BranchInput, BranchRoles, CommitMode,
    EngineConfig, RunConfig, BRANCH_ROLES, DEFAULT_BRANCH_COUNT, MAX_BRANCH_COUNT,
};
pub use events::{Phase, ProgressEvent};
pub use subprocess::SubprocessEngine;
pub use task::{AbortResponse, StartResponse, TaskRunner};
