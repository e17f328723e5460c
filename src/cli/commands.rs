use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;
use super::validate::ValidateArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a job against a fresh browser session
    Run(RunArgs),

    /// Check a job file without launching a browser
    Validate(ValidateArgs),

    /// Show the effective configuration
    Config(ConfigArgs),
}
