//! External process execution.
//!
//! The toolchain ships as Windows executables. On Windows they run natively;
//! everywhere else they go through a compatibility layer. Callers only see
//! `ProcessRunner`, picked once at startup.

use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};

use crate::error::BuildError;

/// Captured result of one external process invocation.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub status: i32,
    /// Merged stdout and stderr.
    pub output: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

pub trait ProcessRunner: Send + Sync {
    fn run(&self, exe: &Path, args: &[String]) -> Result<ProcessOutput>;
}

/// Runs the executable directly.
pub struct NativeRunner;

impl ProcessRunner for NativeRunner {
    fn run(&self, exe: &Path, args: &[String]) -> Result<ProcessOutput> {
        capture(Command::new(exe).args(args))
    }
}

/// Runs the executable through `wine`.
pub struct CompatRunner {
    wine: PathBuf,
}

impl ProcessRunner for CompatRunner {
    fn run(&self, exe: &Path, args: &[String]) -> Result<ProcessOutput> {
        capture(Command::new(&self.wine).arg(exe).args(args))
    }
}

fn capture(command: &mut Command) -> Result<ProcessOutput> {
    let out = command
        .output()
        .with_context(|| format!("failed to spawn {:?}", command.get_program()))?;

    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    Ok(ProcessOutput {
        status: out.status.code().unwrap_or(-1),
        output,
    })
}

/// Pick the runner for this host.
pub fn detect() -> Result<Box<dyn ProcessRunner>> {
    if cfg!(windows) {
        return Ok(Box::new(NativeRunner));
    }
    let wine = which::which("wine").map_err(|_| {
        BuildError::Configuration(
            "wine is required to run the toolchain on this host and was not found in PATH"
                .to_string(),
        )
    })?;
    Ok(Box::new(CompatRunner { wine }))
}

/// Split an option string into argv elements, honoring double quotes.
/// Compiler presets contain arguments like `-pragma "warning off(10178)"`.
pub fn split_options(options: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for ch in options.chars() {
        match ch {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}
