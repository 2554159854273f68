use clap::Parser;
use smr_agents::core::dataset::load_dataset;
use smr_agents::core::refiner::SceneGraphRefiner;
use smr_agents::domain::model::RunSummary;
use smr_agents::domain::ports::LanguageModel;
use smr_agents::knowledge::preprocessor::TRIPLETS_FILE;
use smr_agents::utils::error::ErrorSeverity;
use smr_agents::utils::validation::{validate_required_field, Validate};
use smr_agents::utils::logger;
use smr_agents::utils::monitor::SystemMonitor;
use smr_agents::{
    CliConfig, KnowledgeBasePreprocessor, KnowledgeBaseRetriever, LocalStorage, MethodEngine,
    MethodKind, Result, SmrAgents, SmrError, TomlConfig,
};
use std::path::Path;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let config = CliConfig::parse();

    // 初始化日誌
    if config.log_json {
        logger::init_json_logger(config.verbose);
    } else {
        logger::init_cli_logger(config.verbose);
    }

    tracing::info!("Starting smr-agents CLI");
    if config.verbose {
        tracing::debug!("CLI config: {:?}", config);
    }

    // 驗證配置
    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    match run(config).await {
        Ok(summary) => {
            tracing::info!("✅ SMRAgents run completed!");
            println!(
                "✅ Answered {} question(s), {} failed, {} remaining",
                summary.answered, summary.failed, summary.remaining
            );
            println!("📁 Results saved to: {}", summary.output_path);
        }
        Err(e) => {
            tracing::error!(
                "❌ SMRAgents run failed: {} (Category: {:?}, Severity: {:?})",
                e,
                e.category(),
                e.severity()
            );
            tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());

            eprintln!("❌ {}", e.user_friendly_message());
            eprintln!("💡 建議: {}", e.recovery_suggestion());

            // 根據錯誤嚴重程度決定退出碼
            let exit_code = match e.severity() {
                ErrorSeverity::Low => 0,
                ErrorSeverity::Medium => 2,
                ErrorSeverity::High => 1,
                ErrorSeverity::Critical => 3,
            };

            if exit_code > 0 {
                std::process::exit(exit_code);
            }
        }
    }

    Ok(())
}

async fn run(config: CliConfig) -> Result<RunSummary> {
    let toml_config = match &config.config {
        Some(path) => {
            let toml_config = TomlConfig::from_file(path)?;
            toml_config.validate()?;
            tracing::info!("⚙️ Loaded settings from {}", path);
            toml_config
        }
        None => TomlConfig::default(),
    };
    let config = config.with_run_config(toml_config.run.clone());

    if config.preprocess_kb {
        let metadata = KnowledgeBasePreprocessor::new(
            &config.radgraph_path,
            &config.tcga_reports_path,
            &config.knowledge_base_path,
        )
        .preprocess()?;
        tracing::info!(
            "📚 Knowledge base ready: {} triplets, {} entities",
            metadata.total_triplets,
            metadata.unique_entities
        );
    }

    let dataset_path = validate_required_field("dataset_path", &config.dataset_path)?;
    let dataset = load_dataset(Path::new(dataset_path))?;
    if dataset.is_empty() {
        return Err(SmrError::DatasetError {
            message: format!("Dataset {} contains no questions", dataset_path),
        });
    }
    tracing::info!("📄 Loaded {} question(s) from {}", dataset.len(), dataset_path);

    let method = MethodKind::from_name(&config.method)?;
    tracing::info!("Method: {}", method.name());

    let registry = toml_config.model_registry();
    let language_model =
        registry.build_language_model(&config.language_model_name, &config.l_device)?;
    let vision_model = registry.build_vision_model(&config.visual_model_name, &config.v_device)?;

    let refiner = load_refiner(&config, language_model.clone())?;

    let monitor = SystemMonitor::new(config.monitor);
    if monitor.is_enabled() {
        tracing::info!("🔍 System monitoring enabled");
    }

    let storage = LocalStorage::new(&config.output_dir);
    let mut agents = match method {
        MethodKind::SmrAgents => {
            SmrAgents::new(config, dataset, storage, language_model, vision_model)
                .with_monitor(monitor.clone())
        }
    };
    if let Some(refiner) = refiner {
        agents = agents.with_refiner(refiner);
    }

    let engine = MethodEngine::with_monitor(agents, monitor);
    engine.run().await
}

/// 知識庫不存在時預設略過修正；`--require-kb` 時視為錯誤
fn load_refiner(
    config: &CliConfig,
    language_model: Arc<dyn LanguageModel>,
) -> Result<Option<SceneGraphRefiner>> {
    let kb_dir = Path::new(&config.knowledge_base_path);

    if !kb_dir.join(TRIPLETS_FILE).exists() {
        if config.require_kb {
            return Err(SmrError::KnowledgeBaseError {
                message: format!(
                    "No processed knowledge base at {} (run with --preprocess-kb or preprocess-kb)",
                    kb_dir.display()
                ),
            });
        }
        tracing::warn!(
            "⚠️ Knowledge base not found at {}, answering without scene graph refinement",
            kb_dir.display()
        );
        return Ok(None);
    }

    let retriever = KnowledgeBaseRetriever::load(kb_dir)?;
    let mut refiner = SceneGraphRefiner::new(retriever, language_model);
    if let Some(max) = config.max_knowledge_per_entity() {
        refiner = refiner.with_max_knowledge_per_entity(max);
    }
    Ok(Some(refiner))
}
