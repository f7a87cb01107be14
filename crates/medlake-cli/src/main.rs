mod pipeline;
mod scheduler;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::pipeline::{stages, PipelineContext};

#[derive(Debug, Parser)]
#[command(name = "medlake")]
#[command(about = "Channel collection, lake loading and image enrichment pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full pipeline once: collect, then load and classify, then transform
    Run,
    /// Collect channel messages and photos into the lake
    Collect {
        /// Collect only this channel instead of the configured list
        #[arg(long)]
        channel: Option<String>,
    },
    /// Replace the raw messages table from every lake partition
    Load,
    /// Classify lake images and replace the raw detections table
    Classify,
    /// Run the transformation project (`run`, then `test`)
    Transform,
    /// Trigger the full pipeline on the configured cron schedule until Ctrl-C
    Schedule,
    /// Print the pipeline stages and their dependencies
    Graph,
    /// Warehouse utilities
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the warehouse is reachable
    Ping,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Commands::Graph = cli.command {
        print!("{}", pipeline::describe());
        return Ok(());
    }

    let config = medlake_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::debug!(env = %config.env, "configuration loaded");

    let context = Arc::new(PipelineContext::from_config(config));

    match cli.command {
        Commands::Run => {
            let report = pipeline::run_once(&context).await?;
            print!("{report}");
            if !report.succeeded() {
                anyhow::bail!("pipeline run did not complete successfully");
            }
        }
        Commands::Collect { channel } => {
            let context = match channel {
                Some(name) => Arc::new(context.only_channel(&name)?),
                None => context,
            };
            println!("{}", stages::collect(&context).await?);
        }
        Commands::Load => println!("{}", stages::load(&context).await?),
        Commands::Classify => println!("{}", stages::classify(&context).await?),
        Commands::Transform => println!("{}", stages::transform(&context).await?),
        Commands::Schedule => scheduler::run_schedule(context).await?,
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            let pool = medlake_db::connect_from_config(&context.config).await?;
            medlake_db::health_check(&pool).await?;
            pool.close().await;
            println!("database ok");
        }
        Commands::Graph => {}
    }

    Ok(())
}
