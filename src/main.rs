use anyhow::Result;
use clap::{Parser, Subcommand};
use docs_retriever::commands::{
    DEFAULT_DOCUMENTS_DIR, DEFAULT_QUERY, QueryOverrides, run_index, run_query,
};
use docs_retriever::config::{get_config_dir, run_interactive_config, show_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docs-retriever")]
#[command(about = "Index documents as embeddings and retrieve the ones most similar to a query")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the embedding provider, vector store and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed every file in a directory and add it to the vector store
    Index {
        /// Directory of text documents
        #[arg(default_value = DEFAULT_DOCUMENTS_DIR)]
        dir: PathBuf,
    },
    /// Find stored documents similar to a query and print them as JSON
    Query {
        /// Query text
        #[arg(default_value = DEFAULT_QUERY)]
        text: String,
        /// Minimum cosine similarity for a result
        #[arg(long)]
        threshold: Option<f32>,
        /// Number of nearest neighbours to fetch from the store
        #[arg(long)]
        limit: Option<usize>,
        /// Maximum number of results to print
        #[arg(long)]
        top_k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = get_config_dir(cli.config_dir.as_deref())?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Index { dir } => {
            run_index(&config_dir, &dir).await?;
        }
        Commands::Query {
            text,
            threshold,
            limit,
            top_k,
        } => {
            let overrides = QueryOverrides {
                threshold,
                candidate_limit: limit,
                top_k,
            };
            run_query(&config_dir, &text, &overrides).await?;
        }
    }

    Ok(())
}
