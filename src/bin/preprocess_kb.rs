use anyhow::Context;
use clap::Parser;
use smr_agents::knowledge::preprocessor::{ENTITY_INDEX_FILE, METADATA_FILE, TRIPLETS_FILE};
use smr_agents::utils::logger;
use smr_agents::{KnowledgeBasePreprocessor, KnowledgeBaseRetriever};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "preprocess-kb")]
#[command(about = "Build the medical knowledge base from RadGraph and TCGA-Reports")]
struct Args {
    /// RadGraph JSON file
    #[arg(long, default_value = "knowledge_base/raw/radgraph.json")]
    radgraph_path: PathBuf,

    /// TCGA-Reports file (.json or .csv)
    #[arg(long, default_value = "knowledge_base/raw/tcga_reports.json")]
    tcga_reports_path: PathBuf,

    /// Directory for the processed files
    #[arg(long, default_value = "knowledge_base/processed")]
    output_dir: PathBuf,

    /// Load the result back and run a sample lookup
    #[arg(long)]
    check: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    logger::init_cli_logger(args.verbose);
    tracing::info!("🚀 Starting knowledge base preprocessing");

    let preprocessor = KnowledgeBasePreprocessor::new(
        &args.radgraph_path,
        &args.tcga_reports_path,
        &args.output_dir,
    );
    let metadata = preprocessor
        .preprocess()
        .with_context(|| format!("preprocessing into {}", args.output_dir.display()))?;

    println!("✅ Knowledge base written to {}", args.output_dir.display());
    println!("   {} ({} triplets)", TRIPLETS_FILE, metadata.total_triplets);
    println!(
        "   {} ({} entities)",
        ENTITY_INDEX_FILE, metadata.unique_entities
    );
    println!(
        "   {} (RadGraph: {}, TCGA: {})",
        METADATA_FILE, metadata.radgraph_triplets, metadata.tcga_triplets
    );

    if let Some(entity) = args.check {
        let retriever = KnowledgeBaseRetriever::load(&args.output_dir)
            .context("loading the processed knowledge base")?;
        let triplets = retriever.retrieve_entity_knowledge(&entity, 10);
        if triplets.is_empty() {
            anyhow::bail!("no knowledge found for '{}'", entity);
        }
        println!("🔎 Knowledge about '{}':", entity);
        for triplet in triplets {
            println!("   - {}", triplet);
        }
    }

    Ok(())
}
