//! The source manifest: every compilable file, its compiler variant, its
//! option preset, and the link unit it feeds.

use anyhow::{bail, Result};

use crate::error::BuildError;

pub const HOSTSYS_OPTS: &str = "-ipa file -rostr -sdata 0 -sdata2 0";
pub const RVL_OPTS: &str = "-ipa file";
pub const MSL_LIBC_OPTS: &str = "-ipa file";
pub const NW4R_OPTS: &str =
    "-ipa file -inline auto -O4,p -pragma \"legacy_struct_alignment on\"";
pub const SPY_OPTS: &str = "-ipa file -w nounusedexpr -w nounusedarg";
pub const RFL_OPTS: &str = "-ipa file -O4,p";
pub const EGG_OPTS: &str = "-use_lmw_stmw=on -ipa function -rostr";
pub const REL_OPTS: &str =
    "-ipa file -rostr -sdata 0 -sdata2 0 -use_lmw_stmw=on -pragma \"legacy_struct_alignment on\"";

/// Which linked artifact a source contributes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkUnit {
    /// The monolithic boot image.
    Boot,
    /// The relocatable overlay module.
    Overlay,
}

#[derive(Debug, Clone, Copy)]
pub struct SourceDescriptor {
    pub src: &'static str,
    /// Compiler variant name, resolved by the toolchain.
    pub cc: &'static str,
    /// Options appended after the default set.
    pub opts: &'static str,
    pub unit: LinkUnit,
}

const fn src(
    src: &'static str,
    cc: &'static str,
    opts: &'static str,
    unit: LinkUnit,
) -> SourceDescriptor {
    SourceDescriptor {
        src,
        cc,
        opts,
        unit,
    }
}

/// Every source in link order. Object files inherit the file stem, so stems
/// must be unique across the whole manifest (see `validate`).
pub const SOURCES: &[SourceDescriptor] = &[
    // Boot image: startup and host system.
    src("source/host/init.cpp", "4199_60831", HOSTSYS_OPTS, LinkUnit::Boot),
    src("source/host/host_main.cpp", "4199_60831", HOSTSYS_OPTS, LinkUnit::Boot),
    // SDK.
    src("source/rvl/os_system.cpp", "4199_60831", RVL_OPTS, LinkUnit::Boot),
    src("source/rvl/vi_display.cpp", "4199_60831", RVL_OPTS, LinkUnit::Boot),
    src("source/rvl/pad_input.cpp", "4199_60726", RVL_OPTS, LinkUnit::Boot),
    // C runtime.
    src("source/msl/msl_mem.cpp", "4199_60831", MSL_LIBC_OPTS, LinkUnit::Boot),
    src("source/msl/msl_string.cpp", "4199_60831", MSL_LIBC_OPTS, LinkUnit::Boot),
    // Application framework.
    src("source/egg/egg_heap.cpp", "default", EGG_OPTS, LinkUnit::Boot),
    src("source/egg/egg_thread.cpp", "default", EGG_OPTS, LinkUnit::Boot),
    // Middleware.
    src("source/nw4r/nw4r_g3d.cpp", "4199_60831", NW4R_OPTS, LinkUnit::Boot),
    src("source/rfl/rfl_database.cpp", "4199_60831", RFL_OPTS, LinkUnit::Boot),
    // Overlay module: runtime glue, then game code.
    src("source/rt/rt_module.cpp", "4201_127", REL_OPTS, LinkUnit::Overlay),
    src("source/game/game_system.cpp", "4201_127", REL_OPTS, LinkUnit::Overlay),
    src("source/game/game_scene.cpp", "4201_127", REL_OPTS, LinkUnit::Overlay),
    src("source/spy/spy_codes.cpp", "4201_127", SPY_OPTS, LinkUnit::Overlay),
];

/// File stem of a source path, used to derive its object file name.
pub fn stem(source: &str) -> &str {
    let file = source.rsplit('/').next().unwrap_or(source);
    file.rsplit_once('.').map_or(file, |(stem, _)| stem)
}

/// Enforce the manifest invariants: unique paths, and unique stems since
/// every object lands in one flat output directory.
pub fn validate(sources: &[SourceDescriptor]) -> Result<()> {
    if sources.is_empty() {
        bail!(BuildError::Configuration(
            "the source manifest is empty".to_string()
        ));
    }
    let mut seen_paths = std::collections::BTreeSet::new();
    let mut seen_stems = std::collections::BTreeSet::new();
    for desc in sources {
        if !seen_paths.insert(desc.src) {
            bail!(BuildError::Configuration(format!(
                "duplicate source path \"{}\"",
                desc.src
            )));
        }
        if !seen_stems.insert(stem(desc.src)) {
            bail!(BuildError::Configuration(format!(
                "\"{}\" collides with another source of the same stem",
                desc.src
            )));
        }
    }
    Ok(())
}
