//! The four stage bodies. Each returns a one-line summary on success; an
//! error fails the stage and blocks its dependents.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use anyhow::Context;
use medlake_collector::{Collector, CollectorSettings, GatewayClient};
use medlake_vision::{classify_lake_images, HttpDetector};
use tokio::process::Command;

use super::PipelineContext;

/// Lines of tool output kept in a transform failure message.
const OUTPUT_TAIL_LINES: usize = 20;

/// Collect every configured channel into the lake.
///
/// Fails only when every channel aborted.
pub async fn collect(context: &PipelineContext) -> anyhow::Result<String> {
    let config = &context.config;
    let targets = context.channel_targets()?;

    let source = GatewayClient::new(
        &config.channel_api_url,
        config.channel_api_token.as_deref(),
        config.collector_request_timeout_secs,
        &config.collector_user_agent,
    )?;
    let settings = CollectorSettings {
        message_limit: config.collector_message_limit,
        call_timeout: Duration::from_secs(config.collector_request_timeout_secs),
    };

    let report = Collector::new(&source, &context.lake, settings)
        .run(&targets)
        .await;

    if report.all_aborted() {
        anyhow::bail!("all {} channels aborted", report.channels.len());
    }

    let completed = report.channels.iter().filter(|c| c.is_completed()).count();
    Ok(format!(
        "{completed}/{} channels, {} messages, {} partitions",
        report.channels.len(),
        report.messages_buffered(),
        report.partitions_written()
    ))
}

/// Replace the raw messages table from every readable lake partition.
pub async fn load(context: &PipelineContext) -> anyhow::Result<String> {
    let scan = context.lake.scan_messages();
    let pool = medlake_db::connect_from_config(&context.config)
        .await
        .context("connecting to warehouse")?;

    let loaded = medlake_db::load_messages(&pool, &scan).await;
    pool.close().await;
    let rows = loaded?;

    Ok(format!(
        "{rows} rows from {} partitions ({} skipped)",
        scan.files_read, scan.files_skipped
    ))
}

/// Classify lake images and replace the raw detections table.
///
/// With zero classified images the table is left untouched and the stage
/// still succeeds.
pub async fn classify(context: &PipelineContext) -> anyhow::Result<String> {
    let config = &context.config;
    let detector = HttpDetector::new(&config.detector_url, config.detector_timeout_secs)?;
    let report = classify_lake_images(
        &context.lake,
        &detector,
        Duration::from_secs(config.detector_timeout_secs),
    )
    .await;

    if report.detections.is_empty() {
        tracing::info!(
            failed = report.failures.len(),
            "no images classified; detections table left untouched"
        );
        return Ok(format!(
            "no images classified ({} failed)",
            report.failures.len()
        ));
    }

    let pool = medlake_db::connect_from_config(config)
        .await
        .context("connecting to warehouse")?;
    let replaced = medlake_db::replace_detections(&pool, &report.detections).await;
    pool.close().await;
    let rows = replaced?;

    Ok(format!(
        "{rows} images classified, {} failed",
        report.failures.len()
    ))
}

/// Run the transformation project: `run`, then `test`.
pub async fn transform(context: &PipelineContext) -> anyhow::Result<String> {
    let config = &context.config;
    for step in ["run", "test"] {
        run_transform_step(&config.transform_command, &config.transform_dir, step).await?;
    }
    Ok(format!("{} run and test passed", config.transform_command))
}

async fn run_transform_step(command: &str, dir: &Path, step: &str) -> anyhow::Result<()> {
    tracing::info!(command, step, dir = %dir.display(), "running transformation step");

    let output = Command::new(command)
        .arg(step)
        .current_dir(dir)
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to launch `{command} {step}` in {}", dir.display()))?;

    if !output.status.success() {
        anyhow::bail!(
            "`{command} {step}` exited with {}:\n{}",
            output.status,
            output_tail(&output)
        );
    }
    Ok(())
}

/// The last lines of stderr, or of stdout when stderr is empty (some tools
/// report failures on stdout).
fn output_tail(output: &Output) -> String {
    let stream = if output.stderr.iter().all(u8::is_ascii_whitespace) {
        &output.stdout
    } else {
        &output.stderr
    };
    let text = String::from_utf8_lossy(stream);
    let lines: Vec<&str> = text.lines().collect();
    lines[lines.len().saturating_sub(OUTPUT_TAIL_LINES)..].join("\n")
}
