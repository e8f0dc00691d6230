//! Build pipeline for the boot image and the overlay module.
//!
//! Structure:
//! - `compile` - job queue + bounded worker pool over the external compiler
//! - `lcf` - slice computation and link-control-file generation
//! - `link` - external linker invocation (full and partial)
//! - `patch` - check-then-apply byte patching
//! - `dol` - boot image packing
//! - `rel` - overlay module packing against the baseline image

pub mod compile;
pub mod dol;
pub mod lcf;
pub mod link;
pub mod patch;
pub mod rel;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::sources::{LinkUnit, SOURCES};
use crate::toolchain::Toolchain;

pub const OUT_DIR: &str = "out";
pub const PACK_DIR: &str = "pack";
pub const TARGET_DIR: &str = "artifacts/target/pal";
pub const BASELINE_DIR: &str = "artifacts/orig";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub concurrency: usize,
    pub match_filter: Option<String>,
    pub link_only: bool,
}

/// Run the whole pipeline: compile, then link and pack both artifacts.
/// Linking never starts before every compile job has terminated.
pub fn run(options: &BuildOptions) -> Result<()> {
    let toolchain = Toolchain::locate()?;
    crate::sources::validate(SOURCES)?;

    if options.link_only {
        println!("Skipping compilation (--link_only)");
    } else {
        if let Some(pattern) = &options.match_filter {
            println!("[NOTE] Only compiling sources matching \"{pattern}\"");
        }
        let jobs = compile::build_jobs(
            &toolchain,
            SOURCES,
            Path::new(OUT_DIR),
            options.match_filter.as_deref(),
        )?;
        let scheduler = compile::Scheduler::new(toolchain.runner.as_ref());
        scheduler.run(&jobs, options.concurrency, Path::new(OUT_DIR))?;
    }

    link_boot(&toolchain)?;
    link_overlay(&toolchain)?;

    println!("\n=== Build complete ===");
    Ok(())
}

/// Object files feeding one link unit, in manifest order.
fn objects_for(unit: LinkUnit) -> Vec<PathBuf> {
    SOURCES
        .iter()
        .filter(|desc| desc.unit == unit)
        .map(|desc| compile::object_path(Path::new(OUT_DIR), desc.src))
        .collect()
}

fn target_dir() -> Result<PathBuf> {
    let dir = PathBuf::from(TARGET_DIR);
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    Ok(dir)
}

/// Link the boot image, patch it, and pack it into a DOL.
fn link_boot(toolchain: &Toolchain) -> Result<()> {
    println!("\n=== Linking boot image ===");
    let objects = objects_for(LinkUnit::Boot);

    let control_file = lcf::generate(
        Path::new(PACK_DIR),
        "boot",
        &objects,
        lcf::BOOT_POLICY,
        LinkUnit::Boot,
    )?;

    let dest_dir = target_dir()?;
    let elf_path = dest_dir.join("main.elf");
    let job = link::LinkJob {
        dest: elf_path.clone(),
        objects,
        control_file,
        map_file: dest_dir.join("main.map"),
        mode: link::LinkMode::Full,
    };
    link::run(toolchain, &job)?;

    patch::apply_patch_set(&elf_path, patch::BOOT_IMAGE_PATCHES)?;
    dol::write(&elf_path, &dest_dir.join("main.dol"))
}

/// Link the overlay partially and pack it into a REL against the baseline.
fn link_overlay(toolchain: &Toolchain) -> Result<()> {
    println!("\n=== Linking overlay module ===");
    let objects = objects_for(LinkUnit::Overlay);

    let control_file = lcf::generate(
        Path::new(PACK_DIR),
        "overlay",
        &objects,
        lcf::OVERLAY_POLICY,
        LinkUnit::Overlay,
    )?;

    let dest_dir = target_dir()?;
    let elf_path = dest_dir.join("overlay.elf");
    let job = link::LinkJob {
        dest: elf_path.clone(),
        objects,
        control_file,
        map_file: dest_dir.join("overlay.map"),
        mode: link::LinkMode::Partial,
    };
    link::run(toolchain, &job)?;

    let baseline = Path::new(BASELINE_DIR).join("main.elf");
    rel::write(&elf_path, &baseline, &dest_dir.join("overlay.rel"))
}
