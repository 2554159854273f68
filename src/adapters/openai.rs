//! OpenAI 相容的 chat-completions 客戶端。
//!
//! 同一個客戶端同時實作 [`LanguageModel`] 與 [`VisionModel`]；
//! 影像以 base64 data URL 內嵌在 `image_url` 內容區塊中，
//! 因此也能對接 vLLM、Ollama 等提供相同介面的本地服務（例如 Qwen2-VL）。

use crate::domain::ports::{LanguageModel, VisionModel};
use crate::utils::error::{Result, SmrError};
use crate::utils::text::preview;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// 單一模型端點的連線設定
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
}

impl EndpointSettings {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.into(),
            temperature: 0.0,
            max_tokens: None,
            timeout_seconds: 120,
            retry_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

pub struct OpenAiModel {
    client: Client,
    settings: EndpointSettings,
}

impl OpenAiModel {
    pub fn new(settings: EndpointSettings) -> Self {
        Self {
            client: Client::new(),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }

    async fn complete(&self, content: MessageContent) -> Result<String> {
        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content,
            }],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let mut attempt = 0;
        loop {
            match self.send_once(&request).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.settings.retry_attempts => {
                    let delay = self.settings.retry_delay_ms.saturating_mul(1u64 << attempt.min(10));
                    tracing::warn!(
                        "🔁 Model '{}' call failed (attempt {}/{}): {}. Retrying in {}ms",
                        self.settings.model,
                        attempt + 1,
                        self.settings.retry_attempts + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_once(&self, request: &ChatRequest) -> Result<String> {
        let mut builder = self
            .client
            .post(self.completions_url())
            .timeout(Duration::from_secs(self.settings.timeout_seconds))
            .json(request);

        if let Some(api_key) = &self.settings.api_key {
            builder = builder.bearer_auth(api_key);
        }

        tracing::debug!(
            "Sending chat completion to {} (model: {})",
            self.settings.base_url,
            self.settings.model
        );

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SmrError::ModelResponseError {
                status: status.as_u16(),
                message: preview(&body, 200),
            });
        }

        let chat_response: ChatResponse = response.json().await?;
        chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| SmrError::ProcessingError {
                message: format!(
                    "Model '{}' returned no message content",
                    self.settings.model
                ),
            })
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiModel {
    async fn get_response(&self, prompt: &str) -> Result<String> {
        self.complete(MessageContent::Text(prompt.to_string())).await
    }
}

#[async_trait::async_trait]
impl VisionModel for OpenAiModel {
    async fn get_response(&self, prompt: &str, image_path: &Path) -> Result<String> {
        let image_url = encode_image_data_url(image_path).await?;
        let content = MessageContent::Parts(vec![
            ContentPart::Text {
                text: prompt.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl { url: image_url },
            },
        ]);
        self.complete(content).await
    }
}

/// 讀取影像並轉為 `data:<mime>;base64,...`
pub async fn encode_image_data_url(image_path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(image_path).await.map_err(|e| SmrError::DatasetError {
        message: format!("Cannot read image {}: {}", image_path.display(), e),
    })?;
    Ok(format!(
        "data:{};base64,{}",
        mime_type_for(image_path),
        STANDARD.encode(bytes)
    ))
}

fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "image/jpeg",
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn settings_for(server: &MockServer) -> EndpointSettings {
        EndpointSettings {
            base_url: server.base_url(),
            api_key: Some("test-key".to_string()),
            retry_delay_ms: 0,
            ..EndpointSettings::new("gpt-3.5-turbo")
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": text}}]
        })
    }

    #[tokio::test]
    async fn test_text_completion_returns_first_choice() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .header("Authorization", "Bearer test-key")
                .body_contains("\"model\":\"gpt-3.5-turbo\"")
                .body_contains("Which organ is shown?");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(completion("Answer: lung"));
        });

        let model = OpenAiModel::new(settings_for(&server));
        let text = LanguageModel::get_response(&model, "Which organ is shown?")
            .await
            .unwrap();

        api_mock.assert();
        assert_eq!(text, "Answer: lung");
    }

    #[tokio::test]
    async fn test_vision_completion_embeds_image_as_data_url() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/chat/completions")
                .body_contains("\"type\":\"image_url\"")
                .body_contains("data:image/png;base64,");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(completion("{\"objects\": []}"));
        });

        let mut image = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        image.write_all(&[0x89, b'P', b'N', b'G']).unwrap();

        let model = OpenAiModel::new(settings_for(&server));
        let text = VisionModel::get_response(&model, "Describe the scan", image.path())
            .await
            .unwrap();

        api_mock.assert();
        assert_eq!(text, "{\"objects\": []}");
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(401).body("invalid api key");
        });

        let model = OpenAiModel::new(settings_for(&server));
        let err = LanguageModel::get_response(&model, "hello")
            .await
            .unwrap_err();

        api_mock.assert_hits(1);
        assert!(matches!(err, SmrError::ModelResponseError { status: 401, .. }));
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_exhausted() {
        let server = MockServer::start();
        let api_mock = server.mock(|when, then| {
            when.method(POST).path("/chat/completions");
            then.status(503).body("overloaded");
        });

        let settings = EndpointSettings {
            retry_attempts: 2,
            ..settings_for(&server)
        };
        let model = OpenAiModel::new(settings);
        let err = LanguageModel::get_response(&model, "hello")
            .await
            .unwrap_err();

        api_mock.assert_hits(3);
        assert!(matches!(err, SmrError::ModelResponseError { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_missing_image_is_dataset_error() {
        let model = OpenAiModel::new(EndpointSettings::new("qwen2-VL-7B"));
        let missing = NamedTempFile::new().unwrap().path().with_extension("missing.png");
        let err = VisionModel::get_response(&model, "Describe", &missing)
            .await
            .unwrap_err();
        assert!(matches!(err, SmrError::DatasetError { .. }));
    }

    #[test]
    fn test_mime_type_by_extension() {
        assert_eq!(mime_type_for(Path::new("a/scan.PNG")), "image/png");
        assert_eq!(mime_type_for(Path::new("a/scan.jpg")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("a/scan")), "image/jpeg");
    }
}
