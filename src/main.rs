//! CLI entry point for galfetch.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod app;
mod app_config;
mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    app::run(args).await
}
