use crate::domain::model::RunSummary;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::Path;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
    /// 給使用者看的實際位置
    fn location(&self, path: &str) -> String {
        path.to_string()
    }
}

pub trait ConfigProvider: Send + Sync {
    fn dataset_name(&self) -> &str;
    fn language_model_name(&self) -> &str;
    fn visual_model_name(&self) -> &str;
    fn method(&self) -> &str;
    fn max_retries(&self) -> usize;
    /// 對應原本的 ff_print：逐步輸出每位 agent 的回應預覽
    fn trace_agents(&self) -> bool;
    fn max_feedback_iterations(&self) -> usize {
        3
    }
    fn request_delay_ms(&self) -> u64 {
        0
    }
}

/// 純文字語言模型
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn get_response(&self, prompt: &str) -> Result<String>;
}

/// 多模態模型：提示詞加上一張影像
#[async_trait]
pub trait VisionModel: Send + Sync {
    async fn get_response(&self, prompt: &str, image_path: &Path) -> Result<String>;
}

/// 問答方法的共同介面
#[async_trait]
pub trait Method: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self) -> Result<RunSummary>;
}
