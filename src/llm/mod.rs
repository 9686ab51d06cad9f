//! LLM 层：统一消息模型、提供方抽象、模型路由与三家厂商适配器（OpenAI / Anthropic / Gemini / Mock）

pub mod anthropic;
pub mod gemini;
pub mod message;
pub mod mock;
pub mod openai;
pub mod routing;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use message::{Message, NormalizedResponse, Role, ToolCall};
pub use mock::{ScriptedProvider, ScriptedResolver};
pub use openai::OpenAiProvider;
pub use routing::{is_reasoning_model, Vendor, VendorRouter};
pub use traits::{ChatProvider, LlmError, ProviderResolver};
