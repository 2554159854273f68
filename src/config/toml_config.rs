use crate::adapters::registry::{ApiDefaults, ModelRegistry, ModelSpec};
use crate::utils::error::{Result, SmrError};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// `--config` 指定的 TOML 設定檔
///
/// ```toml
/// [api]
/// base_url = "https://api.openai.com/v1"
/// api_key_env = "OPENAI_API_KEY"
///
/// [models."llava-med"]
/// model = "microsoft/llava-med-v1.5-mistral-7b"
/// base_url = "http://localhost:8001/v1"
///
/// [run]
/// request_delay_ms = 500
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub models: BTreeMap<String, ModelSpec>,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    pub request_delay_ms: Option<u64>,
    pub max_feedback_iterations: Option<usize>,
    pub max_knowledge_per_entity: Option<usize>,
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| SmrError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${LOCAL_VLM_URL})，未設定的保持原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| SmrError::ConfigValidationError {
            field: "env_substitution".to_string(),
            message: e.to_string(),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn api_defaults(&self) -> ApiDefaults {
        let defaults = ApiDefaults::default();
        ApiDefaults {
            base_url: self.api.base_url.clone().unwrap_or(defaults.base_url),
            api_key_env: self.api.api_key_env.clone().unwrap_or(defaults.api_key_env),
            temperature: self.api.temperature.unwrap_or(defaults.temperature),
            timeout_seconds: self.api.timeout_seconds.unwrap_or(defaults.timeout_seconds),
            retry_attempts: self.api.retry_attempts.unwrap_or(defaults.retry_attempts),
            retry_delay_ms: self.api.retry_delay_ms.unwrap_or(defaults.retry_delay_ms),
        }
    }

    /// 內建模型加上設定檔中的 `[models.*]`（同名時覆蓋內建）
    pub fn model_registry(&self) -> ModelRegistry {
        let mut registry = ModelRegistry::with_builtin_models(self.api_defaults());
        for (name, spec) in &self.models {
            registry.register(name.clone(), spec.clone());
        }
        registry
    }

    pub fn validate_config(&self) -> Result<()> {
        if let Some(base_url) = &self.api.base_url {
            validate_url("api.base_url", base_url)?;
        }
        if let Some(key_env) = &self.api.api_key_env {
            validate_non_empty_string("api.api_key_env", key_env)?;
        }
        if let Some(temperature) = self.api.temperature {
            validate_range("api.temperature", temperature, 0.0, 2.0)?;
        }
        if let Some(timeout) = self.api.timeout_seconds {
            validate_positive_number("api.timeout_seconds", timeout as usize, 1)?;
        }

        for (name, spec) in &self.models {
            validate_non_empty_string(&format!("models.{}.model", name), &spec.model)?;
            if let Some(base_url) = &spec.base_url {
                validate_url(&format!("models.{}.base_url", name), base_url)?;
            }
            if let Some(temperature) = spec.temperature {
                validate_range(&format!("models.{}.temperature", name), temperature, 0.0, 2.0)?;
            }
        }

        if let Some(iterations) = self.run.max_feedback_iterations {
            validate_positive_number("run.max_feedback_iterations", iterations, 1)?;
        }

        Ok(())
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
