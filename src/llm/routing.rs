//! 模型路由：静态表把模型 id 映射到厂商，未知 id 回落到 OpenAI
//!
//! VendorRouter 是生产环境的 ProviderResolver：路由 -> 取凭证 -> 构造适配器。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::LlmSection;
use crate::credentials::KeyStore;
use crate::llm::{
    AnthropicProvider, ChatProvider, GeminiProvider, LlmError, OpenAiProvider, ProviderResolver,
};

/// LLM 厂商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    OpenAi,
    Anthropic,
    Google,
}

const MODEL_TABLE: &[(&str, Vendor)] = &[
    ("gpt-5.2", Vendor::OpenAi),
    ("gpt-5", Vendor::OpenAi),
    ("gpt-5-mini", Vendor::OpenAi),
    ("gpt-5-nano", Vendor::OpenAi),
    ("gpt-4.1", Vendor::OpenAi),
    ("gpt-4.1-mini", Vendor::OpenAi),
    ("gpt-4.1-nano", Vendor::OpenAi),
    ("gpt-4o", Vendor::OpenAi),
    ("gpt-4o-mini", Vendor::OpenAi),
    ("o3", Vendor::OpenAi),
    ("o3-mini", Vendor::OpenAi),
    ("o4-mini", Vendor::OpenAi),
    ("claude-opus-4.6", Vendor::Anthropic),
    ("claude-sonnet-4.5", Vendor::Anthropic),
    ("claude-4-opus", Vendor::Anthropic),
    ("claude-4-sonnet", Vendor::Anthropic),
    ("claude-4-haiku", Vendor::Anthropic),
    ("claude-3.5-sonnet", Vendor::Anthropic),
    ("claude-3.5-haiku", Vendor::Anthropic),
    ("gemini-3-pro-preview", Vendor::Google),
    ("gemini-3-flash-preview", Vendor::Google),
    ("gemini-2.5-pro", Vendor::Google),
    ("gemini-2.5-flash", Vendor::Google),
    ("gemini-2.5-flash-lite", Vendor::Google),
    ("gemini-2.0-flash", Vendor::Google),
];

impl Vendor {
    pub const FALLBACK: Vendor = Vendor::OpenAi;

    /// 查表，不回落；凭证检查只统计表内已知模型
    pub fn lookup(model: &str) -> Option<Vendor> {
        MODEL_TABLE
            .iter()
            .find(|(id, _)| *id == model)
            .map(|(_, v)| *v)
    }

    /// 查表，未知 id 回落到 FALLBACK
    pub fn for_model(model: &str) -> Vendor {
        Self::lookup(model).unwrap_or(Self::FALLBACK)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "openai",
            Vendor::Anthropic => "anthropic",
            Vendor::Google => "google",
        }
    }

    pub fn parse(name: &str) -> Option<Vendor> {
        match name {
            "openai" => Some(Vendor::OpenAi),
            "anthropic" => Some(Vendor::Anthropic),
            "google" => Some(Vendor::Google),
            _ => None,
        }
    }

    /// 该厂商 API Key 对应的环境变量
    pub fn env_var(&self) -> &'static str {
        match self {
            Vendor::OpenAi => "OPENAI_API_KEY",
            Vendor::Anthropic => "ANTHROPIC_API_KEY",
            Vendor::Google => "GOOGLE_API_KEY",
        }
    }

    pub fn all() -> [Vendor; 3] {
        [Vendor::OpenAi, Vendor::Anthropic, Vendor::Google]
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 推理系列模型不接受 temperature
pub fn is_reasoning_model(model: &str) -> bool {
    ["o1", "o3", "o4", "gpt-5"]
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// 该模型请求应携带的温度；推理模型返回 None
pub fn temperature_for(model: &str, configured: f32) -> Option<f32> {
    if is_reasoning_model(model) {
        None
    } else {
        Some(configured)
    }
}

/// 生产 resolver：每次调用按当前凭证构造适配器，凭证更新后立即生效
pub struct VendorRouter {
    keys: Arc<KeyStore>,
    settings: LlmSection,
    http: reqwest::Client,
}

impl VendorRouter {
    pub fn new(keys: Arc<KeyStore>, settings: LlmSection) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to build HTTP client with timeout: {}", e);
                reqwest::Client::new()
            });
        Self {
            keys,
            settings,
            http,
        }
    }
}

impl ProviderResolver for VendorRouter {
    fn resolve(&self, model: &str) -> Result<Arc<dyn ChatProvider>, LlmError> {
        let vendor = Vendor::for_model(model);
        let api_key = self
            .keys
            .get(vendor)
            .ok_or_else(|| LlmError::MissingCredential(vendor.to_string()))?;
        let temperature = temperature_for(model, self.settings.temperature);

        tracing::debug!(model = %model, vendor = %vendor, "resolved provider");

        let provider: Arc<dyn ChatProvider> = match vendor {
            Vendor::OpenAi => Arc::new(OpenAiProvider::new(
                self.settings.openai_base_url.as_deref(),
                model,
                &api_key,
                temperature,
            )),
            Vendor::Anthropic => Arc::new(
                AnthropicProvider::new(self.http.clone(), model, api_key)
                    .with_base_url(&self.settings.anthropic_base_url)
                    .with_temperature(temperature)
                    .with_max_tokens(self.settings.max_tokens),
            ),
            Vendor::Google => Arc::new(
                GeminiProvider::new(self.http.clone(), model, api_key)
                    .with_base_url(&self.settings.gemini_base_url)
                    .with_temperature(temperature),
            ),
        };
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_models_route_to_their_vendor() {
        assert_eq!(Vendor::for_model("gpt-4o"), Vendor::OpenAi);
        assert_eq!(Vendor::for_model("claude-sonnet-4.5"), Vendor::Anthropic);
        assert_eq!(Vendor::for_model("gemini-2.5-flash"), Vendor::Google);
    }

    #[test]
    fn test_unknown_model_falls_back() {
        assert_eq!(Vendor::for_model("my-local-llama"), Vendor::FALLBACK);
        assert_eq!(Vendor::for_model(""), Vendor::OpenAi);
        assert_eq!(Vendor::lookup("my-local-llama"), None);
    }

    #[test]
    fn test_reasoning_models_omit_temperature() {
        assert_eq!(temperature_for("o3-mini", 0.7), None);
        assert_eq!(temperature_for("gpt-5.2", 0.7), None);
        assert_eq!(temperature_for("o1-preview", 0.7), None);
        assert_eq!(temperature_for("gpt-4o", 0.7), Some(0.7));
        assert_eq!(temperature_for("claude-4-opus", 0.7), Some(0.7));
    }

    #[test]
    fn test_vendor_parse_and_env() {
        for v in Vendor::all() {
            assert_eq!(Vendor::parse(v.as_str()), Some(v));
        }
        assert_eq!(Vendor::parse("mistral"), None);
        assert_eq!(Vendor::Google.env_var(), "GOOGLE_API_KEY");
    }

    #[test]
    fn test_router_reports_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(KeyStore::empty(dir.path().join("keys.json")));
        let router = VendorRouter::new(keys, LlmSection::default());
        match router.resolve("claude-4-haiku") {
            Err(LlmError::MissingCredential(p)) => assert_eq!(p, "anthropic"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected missing credential"),
        }
    }

    #[test]
    fn test_router_builds_provider_when_key_present() {
        let dir = tempfile::tempdir().unwrap();
        let keys = Arc::new(KeyStore::empty(dir.path().join("keys.json")));
        keys.set("google", "g-key-123456").unwrap();
        let router = VendorRouter::new(keys, LlmSection::default());
        let provider = router.resolve("gemini-2.0-flash").unwrap();
        assert_eq!(provider.provider_name(), "google");
    }
}
