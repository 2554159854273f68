pub mod agents;
pub mod dataset;
pub mod engine;
pub mod prompts;
pub mod refiner;
pub mod results;

pub use crate::domain::model::{AnswerRecord, RunSummary, Sample};
pub use crate::domain::ports::{ConfigProvider, LanguageModel, Method, Storage, VisionModel};
pub use crate::utils::error::Result;
