use anyhow::Result;
use clap::Parser;

mod app;
mod build;
mod cli;
mod error;
mod runner;
mod sources;
mod toolchain;

fn main() -> Result<()> {
    let cli = crate::cli::Cli::parse();
    crate::app::run(cli)
}
