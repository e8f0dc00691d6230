//! External linker invocation.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::BuildError;
use crate::toolchain::Toolchain;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Full,
    /// Relocatable output (`-r`); relocations stay unresolved for packing.
    Partial,
}

#[derive(Debug, Clone)]
pub struct LinkJob {
    pub dest: PathBuf,
    pub objects: Vec<PathBuf>,
    pub control_file: PathBuf,
    pub map_file: PathBuf,
    pub mode: LinkMode,
}

impl LinkJob {
    fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = self
            .objects
            .iter()
            .map(|o| o.display().to_string())
            .collect();
        args.extend([
            "-o".to_string(),
            self.dest.display().to_string(),
            "-lcf".to_string(),
            self.control_file.display().to_string(),
            "-fp".to_string(),
            "hard".to_string(),
            "-linkmode".to_string(),
            "moreram".to_string(),
            "-map".to_string(),
            self.map_file.display().to_string(),
        ]);
        if self.mode == LinkMode::Partial {
            args.push("-r".to_string());
        }
        args
    }
}

/// Run the linker. Its output is relayed verbatim; a non-zero exit aborts
/// the build with the full command context.
pub fn run(toolchain: &Toolchain, job: &LinkJob) -> Result<()> {
    println!("LD {}", job.dest.display());

    let linker = toolchain.linker();
    let args = job.args();
    let result = toolchain.runner.run(&linker, &args)?;
    for line in result.output.lines() {
        println!("{line}");
    }

    if !result.success() {
        return Err(BuildError::ToolchainInvocation {
            command: format!("{} {}", linker.display(), args.join(" ")),
            status: result.status,
            output: result.output,
        }
        .into());
    }
    Ok(())
}
