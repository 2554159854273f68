//! 模型名稱到端點設定的註冊表。
//!
//! CLI 的 `--language-model-name` / `--visual-model-name` 透過這裡解析成
//! 可呼叫的模型客戶端；TOML 設定檔的 `[models.<name>]` 會覆蓋或新增條目。

use crate::adapters::openai::{EndpointSettings, OpenAiModel, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
use crate::domain::ports::{LanguageModel, VisionModel};
use crate::utils::error::{Result, SmrError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// 單一註冊模型的設定；未填的欄位沿用 [`ApiDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// 送給 API 的模型 id
    pub model: String,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl ModelSpec {
    pub fn hosted(model: &str) -> Self {
        Self {
            model: model.to_string(),
            ..Self::default()
        }
    }
}

/// 所有模型共用的 API 預設值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefaults {
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ApiDefaults {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.0,
            timeout_seconds: 120,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    specs: HashMap<String, ModelSpec>,
    defaults: ApiDefaults,
}

impl ModelRegistry {
    pub fn new(defaults: ApiDefaults) -> Self {
        Self {
            specs: HashMap::new(),
            defaults,
        }
    }

    /// 內建條目：OpenAI 託管模型，以及預設的本地 Qwen2-VL（vLLM 相容端點）
    pub fn with_builtin_models(defaults: ApiDefaults) -> Self {
        let mut registry = Self::new(defaults);
        for name in ["gpt-3.5-turbo", "gpt-4o", "gpt-4o-mini", "gpt-4-turbo"] {
            registry.register(name, ModelSpec::hosted(name));
        }
        registry.register(
            "qwen2-VL-7B",
            ModelSpec {
                model: "Qwen/Qwen2-VL-7B-Instruct".to_string(),
                base_url: Some("http://localhost:8000/v1".to_string()),
                ..ModelSpec::default()
            },
        );
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, spec: ModelSpec) {
        self.specs.insert(name.into(), spec);
    }

    pub fn get(&self, name: &str) -> Result<&ModelSpec> {
        self.specs
            .get(name)
            .ok_or_else(|| SmrError::ModelNotRegistered {
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.specs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 合併預設值並從環境變數讀取 API key
    pub fn endpoint_settings(&self, name: &str) -> Result<EndpointSettings> {
        let spec = self.get(name)?;
        let base_url = spec
            .base_url
            .clone()
            .unwrap_or_else(|| self.defaults.base_url.clone());
        let key_env = spec
            .api_key_env
            .as_deref()
            .unwrap_or(&self.defaults.api_key_env);
        let api_key = std::env::var(key_env).ok().filter(|k| !k.trim().is_empty());

        // 託管的 OpenAI 端點一定要有 key；本地端點可以省略
        if api_key.is_none() && base_url.starts_with(DEFAULT_BASE_URL) {
            return Err(SmrError::MissingConfigError {
                field: key_env.to_string(),
            });
        }

        Ok(EndpointSettings {
            base_url,
            api_key,
            model: spec.model.clone(),
            temperature: spec.temperature.unwrap_or(self.defaults.temperature),
            max_tokens: spec.max_tokens,
            timeout_seconds: self.defaults.timeout_seconds,
            retry_attempts: self.defaults.retry_attempts,
            retry_delay_ms: self.defaults.retry_delay_ms,
        })
    }

    pub fn build_language_model(&self, name: &str, device: &str) -> Result<Arc<dyn LanguageModel>> {
        let settings = self.endpoint_settings(name)?;
        tracing::info!(
            "🧠 Language model '{}' -> {} at {} (requested device: {})",
            name,
            settings.model,
            settings.base_url,
            device
        );
        Ok(Arc::new(OpenAiModel::new(settings)))
    }

    pub fn build_vision_model(&self, name: &str, device: &str) -> Result<Arc<dyn VisionModel>> {
        let settings = self.endpoint_settings(name)?;
        tracing::info!(
            "👁️ Vision model '{}' -> {} at {} (requested device: {})",
            name,
            settings.model,
            settings.base_url,
            device
        );
        Ok(Arc::new(OpenAiModel::new(settings)))
    }
}

/// 已註冊的問答方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    SmrAgents,
}

impl MethodKind {
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "SMRAgents" => Ok(MethodKind::SmrAgents),
            other => Err(SmrError::MethodNotRegistered {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MethodKind::SmrAgents => "SMRAgents",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_rejected() {
        let registry = ModelRegistry::with_builtin_models(ApiDefaults::default());
        assert!(matches!(
            registry.get("llava-unknown"),
            Err(SmrError::ModelNotRegistered { .. })
        ));
    }

    #[test]
    fn test_local_model_does_not_need_api_key() {
        let defaults = ApiDefaults {
            api_key_env: "SMR_TEST_UNSET_KEY".to_string(),
            ..ApiDefaults::default()
        };
        let registry = ModelRegistry::with_builtin_models(defaults);

        let settings = registry.endpoint_settings("qwen2-VL-7B").unwrap();
        assert_eq!(settings.base_url, "http://localhost:8000/v1");
        assert_eq!(settings.model, "Qwen/Qwen2-VL-7B-Instruct");
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_hosted_model_requires_api_key() {
        let defaults = ApiDefaults {
            api_key_env: "SMR_TEST_UNSET_KEY_2".to_string(),
            ..ApiDefaults::default()
        };
        let registry = ModelRegistry::with_builtin_models(defaults);

        assert!(matches!(
            registry.endpoint_settings("gpt-3.5-turbo"),
            Err(SmrError::MissingConfigError { field }) if field == "SMR_TEST_UNSET_KEY_2"
        ));
    }

    #[test]
    fn test_registered_spec_overrides_defaults() {
        let mut registry = ModelRegistry::new(ApiDefaults::default());
        registry.register(
            "local-llama",
            ModelSpec {
                model: "llama3.1".to_string(),
                base_url: Some("http://localhost:11434/v1".to_string()),
                temperature: Some(0.7),
                ..ModelSpec::default()
            },
        );

        let settings = registry.endpoint_settings("local-llama").unwrap();
        assert_eq!(settings.temperature, 0.7);
        assert_eq!(registry.names(), vec!["local-llama"]);
    }

    #[test]
    fn test_method_lookup() {
        assert_eq!(MethodKind::from_name("SMRAgents").unwrap(), MethodKind::SmrAgents);
        assert!(MethodKind::from_name("MCCoT").is_err());
    }
}
