use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmrError {
    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Model API returned {status}: {message}")]
    ModelResponseError { status: u16, message: String },

    #[error("Model '{name}' is not registered")]
    ModelNotRegistered { name: String },

    #[error("Method '{name}' is not registered")]
    MethodNotRegistered { name: String },

    #[error("Dataset error: {message}")]
    DatasetError { message: String },

    #[error("Knowledge base error: {message}")]
    KnowledgeBaseError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Model,
    Configuration,
    Data,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SmrError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SmrError::ApiError(_) => ErrorCategory::Network,
            SmrError::ModelResponseError { .. } | SmrError::ModelNotRegistered { .. } => {
                ErrorCategory::Model
            }
            SmrError::ConfigValidationError { .. }
            | SmrError::MissingConfigError { .. }
            | SmrError::InvalidConfigValueError { .. }
            | SmrError::MethodNotRegistered { .. } => ErrorCategory::Configuration,
            SmrError::IoError(_) => ErrorCategory::Storage,
            SmrError::CsvError(_)
            | SmrError::SerializationError(_)
            | SmrError::DatasetError { .. }
            | SmrError::KnowledgeBaseError { .. }
            | SmrError::ProcessingError { .. }
            | SmrError::ValidationError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            // 重試即可能恢復
            SmrError::ApiError(_) => ErrorSeverity::Medium,
            SmrError::ModelResponseError { status, .. } if *status == 429 || *status >= 500 => {
                ErrorSeverity::Medium
            }
            SmrError::ValidationError { .. } => ErrorSeverity::Low,
            SmrError::IoError(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            SmrError::ApiError(_) => "Check network connectivity and the model API base URL",
            SmrError::ModelResponseError { status, .. } if *status == 401 || *status == 403 => {
                "Check that OPENAI_API_KEY (or the configured api_key_env) holds a valid key"
            }
            SmrError::ModelResponseError { .. } => {
                "The model API rejected the request; retry later or lower the request rate"
            }
            SmrError::ModelNotRegistered { .. } => {
                "Use a built-in model name or add a [models.<name>] entry to the TOML config"
            }
            SmrError::MethodNotRegistered { .. } => "Use --method SMRAgents",
            SmrError::ConfigValidationError { .. }
            | SmrError::MissingConfigError { .. }
            | SmrError::InvalidConfigValueError { .. } => {
                "Review the command line flags and the TOML configuration file"
            }
            SmrError::DatasetError { .. } | SmrError::CsvError(_) => {
                "Make sure the dataset file has image, question and answer fields"
            }
            SmrError::KnowledgeBaseError { .. } => {
                "Re-run preprocessing with --preprocess-kb or point --knowledge-base-path at a processed directory"
            }
            SmrError::IoError(_) => "Check file paths and permissions",
            SmrError::SerializationError(_) => "The file may be corrupted; remove it and retry",
            SmrError::ProcessingError { .. } | SmrError::ValidationError { .. } => {
                "Inspect the logs with --verbose for details"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not reach the model service: {}", self),
            ErrorCategory::Model => format!("Model call failed: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::Data => format!("Data problem: {}", self),
            ErrorCategory::Storage => format!("File system problem: {}", self),
        }
    }

    /// 可重試的錯誤（網路錯誤、429、5xx）
    pub fn is_retryable(&self) -> bool {
        match self {
            SmrError::ApiError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            SmrError::ModelResponseError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<toml::de::Error> for SmrError {
    fn from(e: toml::de::Error) -> Self {
        SmrError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SmrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = SmrError::ModelResponseError {
            status: 429,
            message: "slow down".to_string(),
        };
        assert!(err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert_eq!(err.category(), ErrorCategory::Model);
    }

    #[test]
    fn test_auth_error_is_not_retryable() {
        let err = SmrError::ModelResponseError {
            status: 401,
            message: "bad key".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.recovery_suggestion().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn test_config_errors_are_configuration_category() {
        let err = SmrError::MissingConfigError {
            field: "dataset_path".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert!(err.user_friendly_message().starts_with("Invalid configuration"));
    }
}
