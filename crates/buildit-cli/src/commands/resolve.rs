//! Offline and database-backed input resolution.

use anyhow::{Context, Result};
use buildit_config::{SchedulerConfig, load_pipeline, load_scheduler_config};
use buildit_core::{InputMapping, InputResult, PipelineIds};
use buildit_db::{HistoryDump, MemoryVersionsDb, PgVersionsDb, VersionsDb, create_pool};
use buildit_scheduler::{InputMapper, build_input_configs};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Where version and build history comes from.
pub enum Source {
    History(PathBuf),
    Database { url: String, ids: PathBuf },
}

pub struct ResolveArgs {
    pub pipeline: PathBuf,
    pub job: String,
    pub source: Source,
    pub config: Option<PathBuf>,
    pub page_size: Option<usize>,
}

/// Resolve the inputs of a job and print the mapping as JSON.
pub async fn run(args: ResolveArgs) -> Result<()> {
    let pipeline = load_pipeline(&args.pipeline)
        .with_context(|| format!("Failed to load pipeline: {}", args.pipeline.display()))?;

    let mut settings = match &args.config {
        Some(path) => load_scheduler_config(path)
            .with_context(|| format!("Failed to load scheduler config: {}", path.display()))?,
        None => SchedulerConfig::default(),
    };
    if let Some(page_size) = args.page_size {
        anyhow::ensure!(page_size > 0, "--page-size must be positive");
        settings.page_size = page_size;
    }

    let (db, ids): (Arc<dyn VersionsDb>, PipelineIds) = match &args.source {
        Source::History(path) => {
            let dump = HistoryDump::load(path)
                .with_context(|| format!("Failed to load history: {}", path.display()))?;
            let db = MemoryVersionsDb::from_dump(&dump, settings.page_size)
                .context("Invalid history")?;
            info!(history = %path.display(), builds = dump.builds.len(), "loaded history");
            (Arc::new(db), dump.pipeline)
        }
        Source::Database { url, ids } => {
            let text = std::fs::read_to_string(ids)
                .with_context(|| format!("Failed to read IDs: {}", ids.display()))?;
            let ids: PipelineIds = serde_json::from_str(&text).context("Invalid IDs file")?;

            info!("Connecting to database...");
            let pool = create_pool(url).await?;
            info!("Database connected");
            (Arc::new(PgVersionsDb::new(pool, settings.page_size)), ids)
        }
    };

    let (job_id, inputs) = build_input_configs(&pipeline, &args.job, &ids)?;
    let outcome = InputMapper::new(db.clone()).map_inputs(job_id, &inputs).await?;

    let report = json!({
        "pipeline": pipeline.name,
        "job": args.job,
        "resolved": outcome.resolved,
        "has_next": outcome.has_next,
        "inputs": outcome.mapping,
        "versions": version_fields(db.as_ref(), &outcome.mapping).await?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

/// Fields of each resolved version, by input name.
async fn version_fields(
    db: &dyn VersionsDb,
    mapping: &InputMapping,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let mut fields = serde_json::Map::new();
    for (name, result) in mapping {
        let InputResult::Resolved(resolved) = result else {
            continue;
        };
        let version = &resolved.input.version;
        if let Some(found) = db.version_fields(version.resource_id, &version.version).await? {
            fields.insert(name.clone(), serde_json::to_value(found)?);
        }
    }
    Ok(fields)
}
