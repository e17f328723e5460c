use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use browser_driver::{BrowserDriver, ChromiumLauncher, SessionProvider};
use clap::Args;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webjob_engine::{ExecutionContext, RunEvent, RunOutcome, RunSupervisor};
use webjob_event_bus::{to_mpsc, InMemoryBus};

use super::context::CliContext;
use super::output::{emit, render_record, OutputFormat};
use crate::job_file::load_job;
use crate::sink::JsonFileSink;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Job definition (JSON or YAML)
    pub job: PathBuf,

    /// Show the browser window
    #[arg(long)]
    pub headful: bool,

    /// Override the maximum number of executed instructions
    #[arg(long)]
    pub max_steps: Option<u64>,

    /// Write the finished record as JSON into this directory
    #[arg(long, value_name = "DIR")]
    pub record_dir: Option<PathBuf>,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let job = load_job(&args.job).await?;
    let mut config = ctx.config().clone();
    if args.headful {
        config.driver.headless = false;
    }
    if let Some(max_steps) = args.max_steps {
        config.engine.max_steps = max_steps;
    }

    // Reject broken jobs before paying for a browser launch.
    job.validate(config.engine.max_depth)
        .with_context(|| format!("{} is not a valid job", args.job.display()))?;

    let launcher = ChromiumLauncher::new(config.driver.clone());
    let (session_id, driver) = launcher
        .open_session()
        .await
        .context("Failed to start the browser")?;
    info!(session_id = %session_id, job = %job.name, "Browser session ready");

    let cancel = CancellationToken::new();
    let bus = InMemoryBus::<RunEvent>::new(256);
    let progress = spawn_progress_logger(to_mpsc(Arc::clone(&bus), 256));

    let mut supervisor = RunSupervisor::new(config.engine.clone())
        .with_cancellation(cancel.clone())
        .with_events(bus);
    if let Some(dir) = args.record_dir.or(config.record_dir) {
        supervisor = supervisor.with_sink(Arc::new(JsonFileSink::new(dir)));
    }

    let interrupts = spawn_interrupt_handler(cancel, Arc::clone(&driver));
    let result = supervisor
        .run(&job, driver.as_ref(), ExecutionContext::new())
        .await;
    interrupts.abort();

    if let Err(err) = driver.close().await {
        warn!(error = %err, "Failed to close browser session");
    }
    // Dropping the supervisor drops the last bus sender and ends the logger.
    drop(supervisor);
    let _ = progress.await;

    let record = result?;
    emit(&record, output, render_record)?;

    match record.outcome {
        RunOutcome::Completed => Ok(()),
        RunOutcome::Cancelled => bail!("run {} was cancelled", record.run_id),
        RunOutcome::Failed => {
            let reason = record
                .failure
                .as_ref()
                .map(|failure| failure.error.message.clone())
                .unwrap_or_else(|| "unknown failure".to_string());
            bail!("run {} failed: {}", record.run_id, reason)
        }
    }
}

fn spawn_progress_logger(mut events: mpsc::Receiver<RunEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RunEvent::RunStarted {
                    run_id,
                    job_name,
                    total_instructions,
                    ..
                } => {
                    info!(run_id = %run_id, job = %job_name, total_instructions, "Run started");
                }
                RunEvent::InstructionFinished {
                    entry, progress, ..
                } => {
                    info!(
                        position = %entry.position,
                        kind = %entry.kind,
                        status = ?entry.status,
                        latency_ms = entry.latency_ms,
                        "[{}/{}] instruction finished",
                        progress.executed,
                        progress.total
                    );
                }
                RunEvent::RunFinished { .. } => break,
            }
        }
    })
}

/// First Ctrl-C cancels at the next instruction boundary; the second closes
/// the browser so an in-flight driver call fails immediately.
fn spawn_interrupt_handler(
    cancel: CancellationToken,
    driver: Arc<dyn BrowserDriver>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received; stopping after the current instruction (Ctrl-C again to abort)");
        cancel.cancel();

        if signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Second interrupt; closing the browser");
        if let Err(err) = driver.close().await {
            warn!(error = %err, "Failed to close browser session");
        }
    })
}
