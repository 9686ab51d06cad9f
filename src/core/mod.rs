//! 核心层：错误类型、单任务槽位与中止标志、优雅关闭

pub mod error;
pub mod run_slot;
pub mod shutdown;

pub use error::AgentError;
pub use run_slot::{AbortFlag, RunGuard, RunSlot};
pub use shutdown::{ShutdownManager, ShutdownReason};
