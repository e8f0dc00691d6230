//! Overlay module packing.
//!
//! The overlay is linked partially (`-r`), so its image still carries
//! relocations. Each one resolves in one of two places: a symbol the module
//! itself defines becomes a self-import with a section-relative target, and
//! a symbol published by the baseline image becomes a module-0 import with
//! an absolute target address. A symbol in neither is a build error; the
//! overlay would fail at load time.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use rvl_image::elf::Image;
use rvl_image::rel::{RelEntrypoint, RelImage, RelReloc, RelSection};

/// Module id of the overlay; 0 is reserved for the boot image.
pub const MODULE_ID: u32 = 1;

const PROLOG: &str = "_prolog";
const EPILOG: &str = "_epilog";
const UNRESOLVED: &str = "_unresolved";

/// Convert a partially linked image plus the published baseline into a
/// relocatable module.
pub fn pack(module: &Image, baseline: &Image) -> Result<RelImage> {
    // Allocated sections become the module's section table, numbered from 1.
    let mut section_numbers: HashMap<usize, u8> = HashMap::new();
    let mut sections = Vec::new();
    for (position, section) in module.sections.iter().enumerate() {
        section_numbers.insert(section.index, (position + 1) as u8);
        sections.push(RelSection {
            exec: section.kind == rvl_image::elf::SectionKind::Text,
            align: section.align,
            data: section.data.clone(),
            size: section.size,
        });
    }

    let entrypoint = |name: &str| -> RelEntrypoint {
        module
            .lookup(name)
            .and_then(|sym| {
                let section = *section_numbers.get(&sym.section?)?;
                Some(RelEntrypoint {
                    section,
                    offset: sym.value,
                })
            })
            .unwrap_or_default()
    };

    let mut relocs = Vec::new();
    for (holder, section_relocs) in &module.relocations {
        // Relocations held by non-allocated (metadata) sections are dropped
        // with their sections.
        let Some(&source) = section_numbers.get(holder) else {
            continue;
        };
        for reloc in section_relocs {
            let symbol = module.symbol(reloc.symbol).ok_or_else(|| {
                crate::error::BuildError::RelocationResolution {
                    symbol: format!("<symbol #{}>", reloc.symbol),
                }
            })?;

            let defined_here = symbol
                .section
                .and_then(|s| section_numbers.get(&s).copied());
            let resolved = if let Some(target_section) = defined_here {
                RelReloc {
                    module: MODULE_ID,
                    section: source,
                    offset: reloc.offset,
                    kind: reloc.kind,
                    target_section,
                    addend: symbol.value.wrapping_add(reloc.addend as u32),
                }
            } else if let Some(published) = baseline.lookup(&symbol.name) {
                RelReloc {
                    module: 0,
                    section: source,
                    offset: reloc.offset,
                    kind: reloc.kind,
                    target_section: 0,
                    addend: published.value.wrapping_add(reloc.addend as u32),
                }
            } else {
                return Err(crate::error::BuildError::RelocationResolution {
                    symbol: if symbol.name.is_empty() {
                        format!("<symbol #{}>", reloc.symbol)
                    } else {
                        symbol.name.clone()
                    },
                }
                .into());
            };
            relocs.push(resolved);
        }
    }

    Ok(RelImage {
        id: MODULE_ID,
        sections,
        prolog: entrypoint(PROLOG),
        epilog: entrypoint(EPILOG),
        unresolved: entrypoint(UNRESOLVED),
        relocs,
    })
}

/// Pack `elf_path` against the baseline at `baseline_path` into a
/// relocatable module at `rel_path`.
pub fn write(elf_path: &Path, baseline_path: &Path, rel_path: &Path) -> Result<()> {
    let module_data = std::fs::read(elf_path)
        .with_context(|| format!("failed to read {}", elf_path.display()))?;
    let module = Image::parse(&module_data)
        .with_context(|| format!("failed to parse {}", elf_path.display()))?;

    let baseline_data = std::fs::read(baseline_path).with_context(|| {
        format!(
            "failed to read baseline image {} (a published build must be present)",
            baseline_path.display()
        )
    })?;
    let baseline = Image::parse(&baseline_data)
        .with_context(|| format!("failed to parse {}", baseline_path.display()))?;

    let rel = pack(&module, &baseline)?;
    let bytes = rel.to_bytes()?;
    std::fs::write(rel_path, &bytes)
        .with_context(|| format!("failed to write {}", rel_path.display()))?;

    println!("  Packed: {} ({} bytes)", rel_path.display(), bytes.len());
    Ok(())
}
