//! Link-control-file generation.
//!
//! The linker lays the image out in the order objects appear, so the control
//! file is the single source of truth for memory layout. Objects are grouped
//! into named slices by an ordering policy; the slices, concatenated, must
//! be exactly the input list. Rendering is plain string building and is
//! byte-identical for identical input.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::error::BuildError;
use crate::sources::LinkUnit;

/// A named, contiguous run of object files in the final layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub name: &'static str,
    pub objects: Vec<PathBuf>,
}

/// One ordering rule: objects whose file stem starts with any of `prefixes`
/// belong to the slice `name`. Rules are tried in order; an object matching
/// no rule falls into the `common` slice.
#[derive(Debug, Clone, Copy)]
pub struct SliceRule {
    pub name: &'static str,
    pub prefixes: &'static [&'static str],
}

const DEFAULT_SLICE: &str = "common";

/// Layout policy for the boot image.
pub const BOOT_POLICY: &[SliceRule] = &[
    SliceRule { name: "init", prefixes: &["init"] },
    SliceRule { name: "hostsys", prefixes: &["host_"] },
    SliceRule { name: "sdk", prefixes: &["os_", "vi_", "pad_"] },
    SliceRule { name: "libc", prefixes: &["msl_"] },
    SliceRule { name: "framework", prefixes: &["egg_"] },
    SliceRule { name: "middleware", prefixes: &["nw4r_", "rfl_"] },
];

/// Layout policy for the overlay module.
pub const OVERLAY_POLICY: &[SliceRule] = &[
    SliceRule { name: "runtime", prefixes: &["rt_"] },
    SliceRule { name: "game", prefixes: &["game_"] },
    SliceRule { name: "spy", prefixes: &["spy_"] },
];

fn slice_name_for(object: &Path, policy: &[SliceRule]) -> &'static str {
    let stem = object
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    policy
        .iter()
        .find(|rule| rule.prefixes.iter().any(|p| stem.starts_with(p)))
        .map_or(DEFAULT_SLICE, |rule| rule.name)
}

/// Partition `objects` into slices, preserving order. Consecutive objects
/// assigned the same name share a slice.
pub fn compute_slices(objects: &[PathBuf], policy: &[SliceRule]) -> Vec<Slice> {
    let mut slices: Vec<Slice> = Vec::new();
    for object in objects {
        let name = slice_name_for(object, policy);
        match slices.last_mut() {
            Some(last) if last.name == name => last.objects.push(object.clone()),
            _ => slices.push(Slice {
                name,
                objects: vec![object.clone()],
            }),
        }
    }
    slices
}

/// Check that concatenating the slices reproduces `objects` exactly.
pub fn check_partition(slices: &[Slice], objects: &[PathBuf]) -> Result<()> {
    let flattened: Vec<&PathBuf> = slices.iter().flat_map(|s| s.objects.iter()).collect();
    if flattened.len() != objects.len() || !flattened.iter().zip(objects).all(|(a, b)| *a == b) {
        bail!(BuildError::Configuration(
            "slice partition does not cover the object list exactly".to_string()
        ));
    }
    Ok(())
}

const BOOT_SECTIONS: &[&str] = &[
    ".init", "extab", "extabindex", ".text", ".ctors", ".dtors", ".rodata", ".data", ".bss",
    ".sdata", ".sbss", ".sdata2", ".sbss2",
];

const OVERLAY_SECTIONS: &[&str] = &[
    ".init", ".text", ".ctors", ".dtors", ".rodata", ".data", ".bss",
];

/// Render the control file for one link unit.
pub fn render_lcf(slices: &[Slice], unit: LinkUnit) -> String {
    let mut out = String::new();

    if unit == LinkUnit::Boot {
        out.push_str("MEMORY {\n");
        out.push_str("\ttext : origin = 0x80004000\n");
        out.push_str("}\n\n");
    }

    out.push_str("SECTIONS {\n");
    out.push_str("\tGROUP: {\n");
    let sections = match unit {
        LinkUnit::Boot => BOOT_SECTIONS,
        LinkUnit::Overlay => OVERLAY_SECTIONS,
    };
    for section in sections {
        out.push_str(&format!("\t\t{section} ALIGN(0x20):{{}}\n"));
    }
    match unit {
        LinkUnit::Boot => out.push_str("\t} > text\n"),
        LinkUnit::Overlay => out.push_str("\t}\n"),
    }
    out.push_str("}\n\n");

    out.push_str("FORCEFILES {\n");
    for slice in slices {
        out.push_str(&format!("\t// slice: {}\n", slice.name));
        for object in &slice.objects {
            let file = object
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or_default();
            out.push_str(&format!("\t{file}\n"));
        }
    }
    out.push_str("}\n");

    out
}

/// Render the slice table side artifact.
pub fn render_slices_csv(slices: &[Slice]) -> String {
    let mut out = String::from("slice,object\n");
    for slice in slices {
        for object in &slice.objects {
            let file = object
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or_default();
            out.push_str(&format!("{},{}\n", slice.name, file));
        }
    }
    out
}

/// Generate the control file and slice table for `objects` under `dir`.
/// Returns the control file path.
pub fn generate(
    dir: &Path,
    basename: &str,
    objects: &[PathBuf],
    policy: &[SliceRule],
    unit: LinkUnit,
) -> Result<PathBuf> {
    let slices = compute_slices(objects, policy);
    check_partition(&slices, objects)?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;

    let lcf_path = dir.join(basename).with_extension("lcf");
    std::fs::write(&lcf_path, render_lcf(&slices, unit))
        .with_context(|| format!("failed to write {}", lcf_path.display()))?;

    let csv_path = dir.join(format!("{basename}_slices.csv"));
    std::fs::write(&csv_path, render_slices_csv(&slices))
        .with_context(|| format!("failed to write {}", csv_path.display()))?;

    println!("  Generated: {}", lcf_path.display());
    Ok(lcf_path)
}
