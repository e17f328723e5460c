//! Command-line front end for the webjob engine.
//!
//! Loads configuration and job files, launches a Chromium session and hands
//! both to the run supervisor. Finished records are printed and optionally
//! written to disk.

pub mod cli;
pub mod config;
pub mod job_file;
pub mod sink;

pub use config::AppConfig;
pub use job_file::{load_job, parse_job};
pub use sink::JsonFileSink;
