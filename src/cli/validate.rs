use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::context::CliContext;
use super::output::{emit, OutputFormat};
use crate::job_file::load_job;

#[derive(Args, Clone, Debug)]
pub struct ValidateArgs {
    /// Job definition (JSON or YAML)
    pub job: PathBuf,
}

#[derive(Debug, Serialize)]
struct ValidationSummary {
    job: String,
    start_url: String,
    addressing: &'static str,
    top_level: usize,
    instructions: usize,
}

pub async fn cmd_validate(args: ValidateArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    let job = load_job(&args.job).await?;
    let mode = job
        .validate(ctx.config().engine.max_depth)
        .with_context(|| format!("{} is not a valid job", args.job.display()))?;

    let summary = ValidationSummary {
        job: job.name.clone(),
        start_url: job.start_url.clone(),
        addressing: mode.as_str(),
        top_level: job.instructions.len(),
        instructions: job.count_instructions(),
    };

    emit(&summary, output, |s| {
        format!(
            "{} is valid\n  job: {}\n  addressing: {}\n  instructions: {} ({} top-level)",
            args.job.display(),
            s.job,
            s.addressing,
            s.instructions,
            s.top_level
        )
    })
}
