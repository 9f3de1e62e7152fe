//! Quality checker agent: rejects empty annotation results, flags low-confidence
//! ones for review, and approves the rest.

use std::time::Duration;

use anyhow::{Context, Result};
use avala_agents::prelude::*;
use avala_agents::telemetry::{self, TelemetryConfig};
use clap::Parser;
use serde_json::Value;
use tracing::{info, warn};

/// Annotation quality checker for the Avala platform.
///
/// Credentials and defaults come from `AVALA_*` environment variables; flags
/// override them.
#[derive(Parser, Debug)]
#[command(name = "quality-checker", version, about, long_about = None)]
struct Cli {
    /// Agent name shown in the platform dashboard
    #[arg(long, default_value = "quality-checker")]
    name: String,

    /// Only receive executions from this project
    #[arg(long)]
    project: Option<String>,

    /// Only receive executions for these task types (repeatable)
    #[arg(long = "task-type")]
    task_types: Vec<String>,

    /// Seconds between polls
    #[arg(long)]
    poll_interval: Option<f64>,

    /// Results whose `confidence` metadata falls below this are flagged
    #[arg(long, default_value_t = 0.5)]
    min_confidence: f64,

    /// Process the pending queue once and exit
    #[arg(long)]
    once: bool,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&TelemetryConfig::default().with_directive(cli.log.clone()))?;

    let mut config = AgentConfig::from_env()?.with_name(cli.name.clone());
    if let Some(project) = &cli.project {
        config = config.with_project(project.clone());
    }
    if !cli.task_types.is_empty() {
        config = config.with_task_types(cli.task_types.clone());
    }
    if let Some(secs) = cli.poll_interval {
        let interval = Duration::try_from_secs_f64(secs).context("invalid --poll-interval")?;
        config = config.with_poll_interval(interval);
    }

    let mut agent = config.build_agent()?;
    let min_confidence = cli.min_confidence;
    agent
        .on("result.submitted", move |ctx| review(ctx, min_confidence))?
        .on("task.completed", |ctx| async move {
            info!(task_id = %ctx.task_id(), "task completed");
            ctx.skip().await?;
            Ok(())
        })?;

    if cli.once {
        let processed = agent.run_once().await?;
        info!(processed, "pending queue drained");
        return Ok(());
    }

    let stop = agent.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received; stopping after the current batch");
            stop.stop();
        }
    });

    agent.run().await?;
    Ok(())
}

async fn review(ctx: ExecutionContext, min_confidence: f64) -> HandlerResult {
    let Some(result) = ctx.as_result() else {
        return Err(HandlerError::custom("expected a result event"));
    };

    if result.is_empty() {
        ctx.reject("No annotations provided").await?;
        return Ok(());
    }

    let confidence = result
        .result_metadata()
        .get("confidence")
        .and_then(Value::as_f64);
    match confidence {
        Some(score) if score < min_confidence => {
            warn!(execution_id = %ctx.execution_id(), score, "low confidence result");
            ctx.flag(format!("confidence {score:.2} below {min_confidence:.2}"))
                .await?;
        }
        _ => {
            ctx.approve("").await?;
        }
    }
    Ok(())
}
