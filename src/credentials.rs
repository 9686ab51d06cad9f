//! 厂商 API Key 存储
//!
//! 查找顺序：运行时设置的值 > 环境变量（OPENAI_API_KEY / ANTHROPIC_API_KEY / GOOGLE_API_KEY）。
//! 运行时设置的值持久化到 JSON 缓存文件（默认 ~/.rui/keys.json，unix 下权限 0600），启动时加载。
//! 日志里只出现掩码后的 key。

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use thiserror::Error;

use crate::llm::Vendor;
use crate::runner::RunConfig;

#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Failed to persist key cache: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode key cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 凭证存储
#[derive(Debug)]
pub struct KeyStore {
    runtime: RwLock<HashMap<Vendor, String>>,
    cache_path: PathBuf,
    use_env: bool,
}

impl KeyStore {
    /// ~/.rui/keys.json
    pub fn default_cache_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".rui")
            .join("keys.json")
    }

    /// 不读环境变量、不加载缓存的空存储（测试用）
    pub fn empty(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            runtime: RwLock::new(HashMap::new()),
            cache_path: cache_path.into(),
            use_env: false,
        }
    }

    /// 加载缓存文件；文件缺失或损坏时从空开始
    pub fn load(cache_path: impl Into<PathBuf>) -> Self {
        let cache_path = cache_path.into();
        let runtime = read_cache(&cache_path);
        if !runtime.is_empty() {
            let mut providers: Vec<&str> = runtime.keys().map(|v| v.as_str()).collect();
            providers.sort_unstable();
            tracing::info!("Loaded cached API keys for: {:?}", providers);
        }
        Self {
            runtime: RwLock::new(runtime),
            cache_path,
            use_env: true,
        }
    }

    pub fn get(&self, vendor: Vendor) -> Option<String> {
        let runtime = self
            .runtime
            .read()
            .ok()
            .and_then(|keys| keys.get(&vendor).cloned())
            .filter(|k| !k.is_empty());
        runtime.or_else(|| {
            if self.use_env {
                std::env::var(vendor.env_var()).ok().filter(|k| !k.is_empty())
            } else {
                None
            }
        })
    }

    /// 设置某厂商的 key 并写回缓存
    pub fn set(&self, provider: &str, secret: &str) -> Result<(), KeyStoreError> {
        let vendor = Vendor::parse(provider)
            .ok_or_else(|| KeyStoreError::UnknownProvider(provider.to_string()))?;

        let snapshot = {
            let mut keys = self
                .runtime
                .write()
                .map_err(|_| KeyStoreError::Io(std::io::Error::other("key store lock poisoned")))?;
            keys.insert(vendor, secret.to_string());
            keys.clone()
        };
        write_cache(&self.cache_path, &snapshot)?;

        tracing::info!("API key set for {} ({})", vendor, mask_key(secret));
        Ok(())
    }

    /// 配置用到的（路由表内已知的）模型中，缺少 key 的厂商，按名称排序
    pub fn missing_providers(&self, config: &RunConfig, default_chat_model: &str) -> Vec<Vendor> {
        let chat_model = config.chat_model.as_deref().unwrap_or(default_chat_model);
        let needed: BTreeSet<Vendor> = std::iter::once(chat_model)
            .chain(config.branches.iter().flat_map(|b| b.explicit_role_models()))
            .filter_map(Vendor::lookup)
            .collect();

        let mut missing: Vec<Vendor> = needed
            .into_iter()
            .filter(|v| self.get(*v).is_none())
            .collect();
        missing.sort_by_key(|v| v.as_str());
        missing
    }

    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }
}

/// 前 4 + ... + 后 4；长度不超过 8 时只露前 2 位
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        let head: String = chars.iter().take(2).collect();
        format!("{}***", head)
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", head, tail)
    }
}

/// 缓存格式：{"OPENAI_API_KEY": "...", ...}
fn read_cache(path: &Path) -> HashMap<Vendor, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return HashMap::new(),
    };
    match serde_json::from_str::<HashMap<String, String>>(&raw) {
        Ok(entries) => entries
            .into_iter()
            .filter_map(|(env_var, key)| {
                Vendor::all()
                    .into_iter()
                    .find(|v| v.env_var() == env_var)
                    .map(|v| (v, key))
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to load cached keys: {}", e);
            HashMap::new()
        }
    }
}

fn write_cache(path: &Path, keys: &HashMap<Vendor, String>) -> Result<(), KeyStoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let by_env: HashMap<&str, &String> = keys.iter().map(|(v, k)| (v.env_var(), k)).collect();
    std::fs::write(path, serde_json::to_string_pretty(&by_env)?)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-abcdefghijkl"), "sk-a...ijkl");
        assert_eq!(mask_key("short"), "sh***");
    }

    #[test]
    fn test_set_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("keys.json");
        let store = KeyStore::empty(&path);
        store.set("anthropic", "sk-ant-123456789").unwrap();
        assert_eq!(store.get(Vendor::Anthropic).as_deref(), Some("sk-ant-123456789"));

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["ANTHROPIC_API_KEY"], "sk-ant-123456789");

        let reloaded = KeyStore::load(&path);
        assert_eq!(reloaded.get(Vendor::Anthropic).as_deref(), Some("sk-ant-123456789"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::empty(dir.path().join("keys.json"));
        assert!(matches!(
            store.set("mistral", "x"),
            Err(KeyStoreError::UnknownProvider(_))
        ));
    }

    #[test]
    fn test_missing_providers_sorted_known_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = KeyStore::empty(dir.path().join("keys.json"));
        store.set("openai", "sk-openai-123456").unwrap();

        let config: RunConfig = serde_json::from_value(json!({
            "chatModel": "gpt-4o",
            "branches": [
                {"strategy": "gemini-2.5-pro", "hypothesis": "claude-4-opus", "refiner": "my-local"},
                "claude-3.5-haiku"
            ]
        }))
        .unwrap();
        assert_eq!(
            store.missing_providers(&config, "gpt-4o"),
            vec![Vendor::Anthropic, Vendor::Google]
        );

        let chat_only = RunConfig {
            chat_model: Some("unknown-model".into()),
            ..Default::default()
        };
        assert!(store.missing_providers(&chat_only, "gpt-4o").is_empty());
    }
}
