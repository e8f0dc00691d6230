//! Byte-level patching with an integrity check.
//!
//! Every patch records the bytes it expects to replace. A site that already
//! holds the replacement is skipped, so a patch set can be re-applied to the
//! same image; anything else at the site means the image is not what the
//! patch was written against, and the build stops there.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};

use crate::error::BuildError;

#[derive(Debug, Clone, Copy)]
pub struct Patch {
    pub at: u64,
    pub before: &'static [u8],
    pub after: &'static [u8],
}

/// Fixes for the linked boot image. The substituted compiler build emits a
/// conditional short branch in the interrupt dispatcher where the original
/// emitted an unconditional one; the difference is dead in practice but
/// changes the image bytes.
pub const BOOT_IMAGE_PATCHES: &[Patch] = &[Patch {
    at: 0x10_07C0,
    before: &[0x41, 0x82, 0x00, 0x10],
    after: &[0x48, 0x00, 0x00, 0x10],
}];

/// Apply `patches` to `path` in order. Idempotent: re-running over an
/// already patched file changes nothing.
pub fn apply_patch_set(path: &Path, patches: &[Patch]) -> Result<()> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("failed to open {} for patching", path.display()))?;

    for patch in patches {
        ensure!(
            patch.before.len() == patch.after.len(),
            BuildError::Configuration(format!(
                "patch at {:#x} replaces {} bytes with {}",
                patch.at,
                patch.before.len(),
                patch.after.len()
            ))
        );

        let mut current = vec![0u8; patch.before.len()];
        file.seek(SeekFrom::Start(patch.at))?;
        file.read_exact(&mut current)
            .with_context(|| format!("{} is shorter than patch site {:#x}", path.display(), patch.at))?;

        if current == patch.after {
            continue;
        }
        if current != patch.before {
            bail!(BuildError::IntegrityCheck {
                path: path.to_path_buf(),
                offset: patch.at,
            });
        }

        file.seek(SeekFrom::Start(patch.at))?;
        file.write_all(patch.after)?;
    }

    Ok(())
}
