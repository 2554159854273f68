pub mod toml_config;

#[cfg(feature = "cli")]
use crate::core::ConfigProvider;
#[cfg(feature = "cli")]
use crate::utils::error::Result;
#[cfg(feature = "cli")]
use crate::utils::validation::{
    validate_file_extension, validate_non_empty_string, validate_path, validate_positive_number,
    Validate,
};
#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "cli")]
use toml_config::RunConfig;

pub const DEFAULT_MAX_FEEDBACK_ITERATIONS: usize = 3;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "smr-agents")]
#[command(about = "Scene-graph guided multi-agent medical visual question answering")]
pub struct CliConfig {
    #[arg(long, help = "Name used in the results file")]
    pub dataset_name: String,

    #[arg(long, help = "Dataset file (.json, .jsonl, .csv) or a directory with dataset.json")]
    pub dataset_path: Option<String>,

    #[arg(long, default_value = "gpt-3.5-turbo")]
    pub language_model_name: String,

    #[arg(long, default_value = "qwen2-VL-7B")]
    pub visual_model_name: String,

    #[arg(long, default_value = "cuda", help = "Device hint for the language model")]
    pub l_device: String,

    #[arg(long, default_value = "cuda", help = "Device hint for the vision model")]
    pub v_device: String,

    #[arg(long, default_value = "SMRAgents")]
    pub method: String,

    #[arg(long, default_value = "3", help = "Rounds over unanswered questions")]
    pub max_retries: usize,

    #[arg(long, help = "Print every agent exchange")]
    pub ff_print: bool,

    #[arg(long, default_value = "knowledge_base/processed")]
    pub knowledge_base_path: String,

    #[arg(long, help = "Build the knowledge base before answering")]
    pub preprocess_kb: bool,

    #[arg(long, default_value = "knowledge_base/raw/radgraph.json")]
    pub radgraph_path: String,

    #[arg(long, default_value = "knowledge_base/raw/tcga_reports.json")]
    pub tcga_reports_path: String,

    #[arg(long, default_value = "outputs")]
    pub output_dir: String,

    #[arg(long, help = "Fail instead of answering without a knowledge base")]
    pub require_kb: bool,

    #[arg(long, help = "TOML file with API and model settings")]
    pub config: Option<String>,

    #[arg(long, help = "Pause between questions, in milliseconds")]
    pub request_delay_ms: Option<u64>,

    #[arg(long, help = "Maximum review rounds per question")]
    pub max_feedback_iterations: Option<usize>,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage")]
    pub monitor: bool,

    #[arg(long, help = "Emit logs as JSON")]
    pub log_json: bool,

    /// 設定檔中的 `[run]`，命令列參數優先
    #[arg(skip)]
    #[serde(skip)]
    pub run: RunConfig,
}

#[cfg(feature = "cli")]
impl CliConfig {
    pub fn with_run_config(mut self, run: RunConfig) -> Self {
        self.run = run;
        self
    }

    pub fn max_knowledge_per_entity(&self) -> Option<usize> {
        self.run.max_knowledge_per_entity
    }
}

#[cfg(feature = "cli")]
impl ConfigProvider for CliConfig {
    fn dataset_name(&self) -> &str {
        &self.dataset_name
    }

    fn language_model_name(&self) -> &str {
        &self.language_model_name
    }

    fn visual_model_name(&self) -> &str {
        &self.visual_model_name
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn max_retries(&self) -> usize {
        self.max_retries
    }

    fn trace_agents(&self) -> bool {
        self.ff_print
    }

    fn max_feedback_iterations(&self) -> usize {
        self.max_feedback_iterations
            .or(self.run.max_feedback_iterations)
            .unwrap_or(DEFAULT_MAX_FEEDBACK_ITERATIONS)
    }

    fn request_delay_ms(&self) -> u64 {
        self.request_delay_ms
            .or(self.run.request_delay_ms)
            .unwrap_or(0)
    }
}

#[cfg(feature = "cli")]
impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validate_non_empty_string("dataset_name", &self.dataset_name)?;
        validate_non_empty_string("language_model_name", &self.language_model_name)?;
        validate_non_empty_string("visual_model_name", &self.visual_model_name)?;
        validate_positive_number("max_retries", self.max_retries, 1)?;
        validate_path("output_dir", &self.output_dir)?;
        validate_path("knowledge_base_path", &self.knowledge_base_path)?;

        if let Some(dataset_path) = &self.dataset_path {
            validate_path("dataset_path", dataset_path)?;
            validate_file_extension(
                "dataset_path",
                dataset_path,
                &crate::core::dataset::DATASET_EXTENSIONS,
            )?;
        }

        if self.preprocess_kb {
            validate_path("radgraph_path", &self.radgraph_path)?;
            validate_path("tcga_reports_path", &self.tcga_reports_path)?;
        }

        if let Some(iterations) = self.max_feedback_iterations {
            validate_positive_number("max_feedback_iterations", iterations, 1)?;
        }

        Ok(())
    }
}
