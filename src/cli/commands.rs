use crate::cli::args::{Cli, Command};
use crate::core::cancel::CancelToken;
use crate::core::catalog::{CatalogRegistry, ImportPayload};
use crate::core::config::{ConfigLoader, RouterConfig};
use crate::core::embedding::{Embedder, HashedEmbedder};
use crate::core::executor::NullExecutor;
use crate::core::pipeline::{SupervisorPipeline, TracingSink};
use crate::Result;
use anyhow::{anyhow, Context};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Run the parsed CLI command. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;

    match cli.command {
        Command::Route { prompt, params } => {
            let pipeline = build_pipeline(config)?;
            let response = pipeline
                .set_goal(&prompt, parse_params(params.as_deref())?, &CancelToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Command::Execute { prompt, params } => {
            let pipeline = build_pipeline(config)?;
            let response = pipeline
                .execute(&prompt, parse_params(params.as_deref())?, &CancelToken::new())
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Command::Call { tool, params } => {
            let pipeline = build_pipeline(config)?;
            let response = pipeline
                .process_call(
                    &tool,
                    parse_params(params.as_deref())?.unwrap_or_default(),
                    &CancelToken::new(),
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(0)
        }
        Command::Import { path, overwrite } => {
            let pipeline = build_pipeline(config)?;
            let outcome = pipeline.import_workflow(ImportPayload::File(&path), overwrite)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(0)
        }
        Command::Validate { path } => validate_directory(&path, &config),
        Command::Status => {
            let pipeline = build_pipeline(config)?;
            println!("{}", serde_json::to_string_pretty(&pipeline.get_status())?);
            Ok(0)
        }
    }
}

fn load_config(cli: &Cli) -> Result<RouterConfig> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ConfigLoader::load_or_default(Path::new("."))?,
    };
    Ok(config)
}

fn build_pipeline(config: RouterConfig) -> Result<SupervisorPipeline> {
    let embedder = default_embedder()?;
    let pipeline = SupervisorPipeline::new(
        config,
        Arc::new(NullExecutor),
        embedder,
        Arc::new(TracingSink),
    )?;
    Ok(pipeline)
}

#[cfg(feature = "embeddings")]
fn default_embedder() -> Result<Arc<dyn Embedder>> {
    use crate::core::embedding::FastEmbedder;
    match FastEmbedder::try_new() {
        Ok(embedder) => Ok(Arc::new(embedder)),
        Err(err) => {
            tracing::warn!(error = %err, "embedding model unavailable; using hashed fallback");
            Ok(Arc::new(HashedEmbedder::default()))
        }
    }
}

#[cfg(not(feature = "embeddings"))]
fn default_embedder() -> Result<Arc<dyn Embedder>> {
    Ok(Arc::new(HashedEmbedder::default()))
}

fn parse_params(params: Option<&str>) -> Result<Option<Map<String, Value>>> {
    let Some(text) = params else {
        return Ok(None);
    };
    let value: Value = serde_json::from_str(text).context("parsing --params")?;
    value
        .as_object()
        .cloned()
        .map(Some)
        .ok_or_else(|| anyhow!("--params must be a JSON object"))
}

fn validate_directory(path: &Path, config: &RouterConfig) -> Result<i32> {
    if !path.is_dir() {
        return Err(anyhow!("{} is not a directory", path.display()));
    }
    let registry = CatalogRegistry::new(config.max_workflow_steps);
    let report = registry.load_roots(Some(path), None);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.errors.is_empty() { 0 } else { 1 })
}
