//! Stage wiring: Collect, then Load and Classify side by side, then Transform.

pub mod dag;
pub mod stages;

use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use medlake_collector::ChannelTarget;
use medlake_core::{AppConfig, ChannelName};
use medlake_lake::Lake;

use self::dag::{Dag, RunReport, StageFuture};

pub const COLLECT: &str = "collect";
pub const LOAD: &str = "load";
pub const CLASSIFY: &str = "classify";
pub const TRANSFORM: &str = "transform";

/// Every pipeline stage with its direct dependencies.
pub const STAGES: [(&str, &[&str]); 4] = [
    (COLLECT, &[]),
    (LOAD, &[COLLECT]),
    (CLASSIFY, &[COLLECT]),
    (TRANSFORM, &[LOAD, CLASSIFY]),
];

/// Everything a stage needs, shared across the stages of a run.
pub struct PipelineContext {
    pub config: AppConfig,
    pub lake: Lake,
    /// Replaces the channels file for a single-channel collect.
    channel_override: Option<ChannelTarget>,
}

impl PipelineContext {
    #[must_use]
    pub fn from_config(config: AppConfig) -> Self {
        let lake = Lake::new(&config.lake_root);
        Self {
            config,
            lake,
            channel_override: None,
        }
    }

    /// A copy of this context that collects only `raw_name`. A per-channel
    /// limit from the channels file still applies when the channel is listed.
    ///
    /// # Errors
    ///
    /// Fails if `raw_name` is not a valid channel name.
    pub fn only_channel(&self, raw_name: &str) -> anyhow::Result<Self> {
        let name = ChannelName::parse(raw_name)?;
        let limit = self
            .channel_targets()
            .ok()
            .and_then(|targets| targets.into_iter().find(|t| t.name == name))
            .and_then(|t| t.limit);
        Ok(Self {
            config: self.config.clone(),
            lake: self.lake.clone(),
            channel_override: Some(ChannelTarget { name, limit }),
        })
    }

    /// Channels to collect, read from the channels file on every call so a
    /// scheduled run picks up edits.
    ///
    /// # Errors
    ///
    /// Fails if the channels file cannot be read or does not validate.
    pub fn channel_targets(&self) -> anyhow::Result<Vec<ChannelTarget>> {
        if let Some(target) = &self.channel_override {
            return Ok(vec![target.clone()]);
        }
        let path = &self.config.channels_path;
        let file = medlake_core::load_channels(path)
            .with_context(|| format!("loading channels from {}", path.display()))?;
        file.channels
            .iter()
            .map(|c| {
                Ok(ChannelTarget {
                    name: c.channel_name()?,
                    limit: c.limit,
                })
            })
            .collect()
    }
}

fn runner(
    name: &'static str,
    context: Arc<PipelineContext>,
) -> impl Fn() -> StageFuture + Send + Sync + 'static {
    move || -> StageFuture {
        let context = Arc::clone(&context);
        Box::pin(async move {
            match name {
                COLLECT => stages::collect(&context).await,
                LOAD => stages::load(&context).await,
                CLASSIFY => stages::classify(&context).await,
                TRANSFORM => stages::transform(&context).await,
                other => anyhow::bail!("no runner for stage {other}"),
            }
        })
    }
}

/// Build the pipeline graph with fresh stage state.
///
/// # Errors
///
/// Fails only if the stage table is inconsistent.
pub fn pipeline_graph(context: &Arc<PipelineContext>) -> anyhow::Result<Dag> {
    STAGES
        .iter()
        .fold(Dag::builder(), |builder, &(name, depends_on)| {
            builder.stage(name, depends_on, runner(name, Arc::clone(context)))
        })
        .build()
}

/// Human-readable stage list with dependencies, in execution order.
#[must_use]
pub fn describe() -> String {
    let shape = STAGES
        .iter()
        .fold(Dag::builder(), |builder, &(name, depends_on)| {
            builder.stage(name, depends_on, || async { Ok::<_, anyhow::Error>(String::new()) })
        })
        .build();

    let mut out = String::new();
    match shape {
        Ok(dag) => {
            for (name, deps) in dag.dependencies() {
                if deps.is_empty() {
                    let _ = writeln!(out, "{name}");
                } else {
                    let _ = writeln!(out, "{name} <- {}", deps.join(", "));
                }
            }
        }
        Err(e) => {
            let _ = writeln!(out, "invalid pipeline graph: {e}");
        }
    }
    out
}

/// One orchestrated run of the full graph.
///
/// # Errors
///
/// Fails only if the graph cannot be built; stage failures are in the report.
pub async fn run_once(context: &Arc<PipelineContext>) -> anyhow::Result<RunReport> {
    let dag = pipeline_graph(context)?;
    tracing::info!("pipeline run started");
    let report = dag.execute().await;
    tracing::info!(succeeded = report.succeeded(), "pipeline run finished");
    Ok(report)
}
