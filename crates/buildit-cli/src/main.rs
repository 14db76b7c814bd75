//! BuildIt CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "buildit")]
#[command(about = "BuildIt input resolution tools", long_about = None)]
struct Cli {
    /// Log resolver decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a pipeline configuration
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "buildit.kdl")]
        path: PathBuf,
    },
    /// Resolve the inputs of a job's next build
    Resolve {
        /// Pipeline configuration
        #[arg(long, default_value = "buildit.kdl")]
        pipeline: PathBuf,
        /// Job whose inputs to resolve
        #[arg(long)]
        job: String,
        /// JSON history dump to resolve against
        #[arg(long)]
        history: Option<PathBuf>,
        /// PostgreSQL database to resolve against, when no history is given
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        /// JSON file of job and resource IDs, required with a database
        #[arg(long)]
        ids: Option<PathBuf>,
        /// Scheduler settings file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Builds fetched per page, overriding the settings file
        #[arg(long)]
        page_size: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
        Commands::Resolve {
            pipeline,
            job,
            history,
            database_url,
            ids,
            config,
            page_size,
        } => {
            let source = match (history, database_url) {
                (Some(path), _) => commands::resolve::Source::History(path),
                (None, Some(url)) => {
                    let ids = ids.ok_or_else(|| {
                        anyhow::anyhow!("--ids is required when resolving against a database")
                    })?;
                    commands::resolve::Source::Database { url, ids }
                }
                (None, None) => anyhow::bail!("either --history or --database-url is required"),
            };

            commands::resolve::run(commands::resolve::ResolveArgs {
                pipeline,
                job,
                source,
                config,
                page_size,
            })
            .await?;
        }
    }

    Ok(())
}
