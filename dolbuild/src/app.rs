use anyhow::{Context, Result};

use crate::build;
use crate::toolchain::Toolchain;

pub fn run(cli: crate::cli::Cli) -> Result<()> {
    match cli.cmd {
        crate::cli::Cmd::Build {
            concurrency,
            match_filter,
            link_only,
        } => build::run(&build::BuildOptions {
            concurrency,
            match_filter,
            link_only,
        }),
        crate::cli::Cmd::FixCompiler => Toolchain::locate()?.fix_compiler(),
        crate::cli::Cmd::Clean => clean(),
    }
}

/// Remove everything the pipeline generates: objects, rendered control
/// files, and packed artifacts. The published baseline stays.
fn clean() -> Result<()> {
    for dir in [build::OUT_DIR, build::TARGET_DIR] {
        let path = std::path::Path::new(dir);
        if path.exists() {
            std::fs::remove_dir_all(path)
                .with_context(|| format!("failed to remove {dir}"))?;
            println!("  Removed: {dir}");
        }
    }
    for file in [
        "pack/boot.lcf",
        "pack/boot_slices.csv",
        "pack/overlay.lcf",
        "pack/overlay_slices.csv",
    ] {
        let path = std::path::Path::new(file);
        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove {file}"))?;
            println!("  Removed: {file}");
        }
    }
    Ok(())
}
