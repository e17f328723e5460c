use anyhow::Result;
use clap::Args;

use super::context::CliContext;
use super::output::{emit, OutputFormat};

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    /// Also print where the configuration was looked up
    #[arg(long)]
    pub show_path: bool,
}

pub fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    if args.show_path {
        eprintln!("config path: {}", ctx.config_path().display());
    }
    emit(ctx.config(), output, |config| {
        serde_yaml::to_string(config).unwrap_or_else(|err| format!("<unrenderable: {err}>"))
    })
}
