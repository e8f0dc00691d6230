//! Toolchain location and compiler-variant table.
//!
//! The CodeWarrior toolchain is bundled under `tools/` or pointed at with
//! `CW_ROOT`. Different parts of the tree were shipped with different
//! compiler builds, so every source names a variant.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::build::patch::Patch;
use crate::error::BuildError;
use crate::runner::{self, ProcessRunner};

pub const ROOT_ENV: &str = "CW_ROOT";
const DEFAULT_ROOT: &str = "tools";

const LINKER: &str = "mwldeppc.exe";

/// Compiler variant -> executable, relative to the toolchain root.
///
/// `4201_127` is the build the overlay code was originally compiled with. We
/// only have build 142, which mis-schedules instructions after paired-single
/// operations; `fix_compiler` patches that, so the substitution is exact.
/// Build 60726 is likewise served by the 60831 executable.
const COMPILERS: &[(&str, &str)] = &[
    ("default", "4199_60831/mwcceppc.exe"),
    ("4201_127", "4201_142/mwcceppc.exe"),
    ("4199_60831", "4199_60831/mwcceppc.exe"),
    ("4199_60726", "4199_60831/mwcceppc.exe"),
];

/// Base option set shared by every compile, before per-source presets.
const DEFAULT_CFLAGS: &[&str] = &[
    "-nodefaults",
    "-align powerpc",
    "-enc SJIS",
    "-c",
    "-gccinc",
    "-i ./source/ -i ./source/platform",
    "-proc gekko",
    "-enum int",
    "-O4,p",
    "-inline auto",
    "-W all",
    "-fp hardware",
    "-Cpp_exceptions off",
    "-RTTI on",
    "-inline off",
    "-w notinlined -W noimplicitconv -w nounwanted",
    "-nostdinc",
    "-msgstyle gcc -lang=c99 -DREVOKART",
    "-func_align 4",
    "-pragma \"warning off(10178)\"",
];

/// Scheduling fix for the substituted `4201_127` compiler build: treat the
/// instructions following a paired-single operation as data-dependent in
/// gekko mode. Safe to re-apply.
const COMPILER_FIX: &[Patch] = &[Patch {
    at: 0x1A_8540,
    before: &[0x66, 0x83, 0x3D, 0x40, 0xF3],
    after: &[0xE9, 0x8B, 0x0D, 0x00, 0x00],
}];

pub struct Toolchain {
    root: PathBuf,
    pub runner: Box<dyn ProcessRunner>,
}

impl Toolchain {
    /// Locate the toolchain: `CW_ROOT` when set, otherwise the bundled
    /// default, which must exist. Also picks the process runner for this
    /// host.
    pub fn locate() -> Result<Self> {
        let root = match env::var_os(ROOT_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => {
                let default = PathBuf::from(DEFAULT_ROOT);
                if !default.is_dir() {
                    bail!(BuildError::Configuration(format!(
                        "toolchain not found under \"{}\" and ${} is not set",
                        default.display(),
                        ROOT_ENV
                    )));
                }
                default
            }
        };
        Ok(Self {
            root,
            runner: runner::detect()?,
        })
    }

    pub fn compiler(&self, variant: &str) -> Result<PathBuf> {
        let Some((_, exe)) = COMPILERS.iter().find(|(name, _)| *name == variant) else {
            bail!(BuildError::Configuration(format!(
                "unknown compiler variant \"{variant}\""
            )));
        };
        Ok(self.root.join(exe))
    }

    pub fn linker(&self) -> PathBuf {
        self.root.join(LINKER)
    }

    /// Default compiler options as one splittable string.
    pub fn default_options() -> String {
        DEFAULT_CFLAGS.join(" ")
    }

    /// Apply the scheduling fix to the substituted compiler build.
    /// Idempotent; a compiler in any other state is rejected.
    pub fn fix_compiler(&self) -> Result<()> {
        let compiler = self.compiler("4201_127")?;
        if !compiler.is_file() {
            bail!(BuildError::Configuration(format!(
                "compiler \"{}\" not found",
                compiler.display()
            )));
        }
        crate::build::patch::apply_patch_set(&compiler, COMPILER_FIX)?;
        println!("Scheduling fix applied to {}", compiler.display());
        Ok(())
    }
}
