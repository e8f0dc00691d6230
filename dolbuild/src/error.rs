//! Build failure taxonomy.
//!
//! Stage code returns `anyhow::Result`; these typed variants travel inside
//! `anyhow::Error` so callers and tests can `downcast_ref` on the category.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// An external compiler or linker exited non-zero.
    #[error("`{command}` exited with status {status}\n{output}")]
    ToolchainInvocation {
        command: String,
        status: i32,
        output: String,
    },

    /// A patch site matched neither its expected before nor after bytes.
    #[error("{path}: bytes at {offset:#x} match no expected pattern (wrong input image or toolchain version?)")]
    IntegrityCheck { path: PathBuf, offset: u64 },

    /// A relocation references a symbol that neither the module nor the
    /// baseline image defines.
    #[error("relocation against `{symbol}` resolves in neither the module nor the baseline image")]
    RelocationResolution { symbol: String },

    /// Bad build definition or environment.
    #[error("{0}")]
    Configuration(String),
}
