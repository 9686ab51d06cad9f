//! RUI - 研究编排核心
//!
//! 模块划分：
//! - **agent**: 对话 Agent（系统提示、历史回放、有界工具调用循环）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、单任务槽位与中止标志、优雅关闭
//! - **credentials**: 厂商 API Key 存储
//! - **gateway**: 进度事件扇出中枢与 HTTP / WebSocket 外壳
//! - **llm**: 统一消息模型、模型路由与 OpenAI / Anthropic / Gemini 适配器
//! - **memory**: 语义记忆与规则记忆协作方
//! - **observability**: tracing 初始化
//! - **runner**: 研究任务运行器、引擎契约与事件桥
//! - **tools**: 工具目录、注册表、分发器与研究编排工具

pub mod agent;
pub mod config;
pub mod core;
pub mod credentials;
pub mod gateway;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod runner;
pub mod tools;
