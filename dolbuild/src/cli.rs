use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dolbuild")]
#[command(about = "Builds the boot DOL and the overlay REL with the CodeWarrior toolchain")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Compile all sources, then link and pack both artifacts.
    Build {
        /// Compile concurrency
        #[arg(short = 'j', long, default_value_t = default_concurrency())]
        concurrency: usize,

        /// Only compile sources whose path contains PATTERN
        #[arg(long = "match", value_name = "PATTERN")]
        match_filter: Option<String>,

        /// Skip compilation and link from existing objects
        #[arg(long = "link_only")]
        link_only: bool,
    },

    /// Apply the scheduling fix to the substituted compiler build (idempotent).
    FixCompiler,

    /// Remove generated objects and artifacts. Never touches the baseline.
    Clean,
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZero::get)
        .unwrap_or(1)
}
