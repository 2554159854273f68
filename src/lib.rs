pub mod adapters;
pub mod config;
pub mod core;
pub mod domain;
pub mod knowledge;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use adapters::registry::{MethodKind, ModelRegistry};
pub use adapters::storage::LocalStorage;
pub use config::toml_config::TomlConfig;
pub use core::{agents::SmrAgents, engine::MethodEngine, refiner::SceneGraphRefiner};
pub use knowledge::{KnowledgeBasePreprocessor, KnowledgeBaseRetriever};
pub use utils::error::{Result, SmrError};
