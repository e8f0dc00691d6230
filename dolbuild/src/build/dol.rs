//! Boot image packing.
//!
//! Maps the patched linked image's loadable sections onto the boot image's
//! fixed segment layout: executable sections fill the text slots, initialized
//! data fills the data slots, NOBITS sections merge into the single bss
//! range. Debug and relocation metadata never reach the image; the ELF view
//! only exposes allocated sections.

use std::path::Path;

use anyhow::{Context, Result};
use rvl_image::dol::{DolImage, DolSegment};
use rvl_image::elf::{Image, SectionKind};

/// Convert a linked image into a boot image.
pub fn pack(image: &Image) -> Result<DolImage> {
    let mut dol = DolImage {
        entry: image.entry,
        ..DolImage::default()
    };

    let mut bss_start: Option<u32> = None;
    let mut bss_end = 0u32;
    for section in &image.sections {
        if section.size == 0 {
            continue;
        }
        match section.kind {
            SectionKind::Text => dol.text.push(DolSegment {
                addr: section.addr,
                data: section.data.clone(),
            }),
            SectionKind::Data => dol.data.push(DolSegment {
                addr: section.addr,
                data: section.data.clone(),
            }),
            SectionKind::Bss => {
                bss_start = Some(bss_start.map_or(section.addr, |s| s.min(section.addr)));
                bss_end = bss_end.max(section.addr + section.size);
            }
        }
    }
    if let Some(start) = bss_start {
        dol.bss_addr = start;
        dol.bss_size = bss_end - start;
    }

    Ok(dol)
}

/// Pack `elf_path` into a boot image at `dol_path`.
pub fn write(elf_path: &Path, dol_path: &Path) -> Result<()> {
    let data = std::fs::read(elf_path)
        .with_context(|| format!("failed to read {}", elf_path.display()))?;
    let image = Image::parse(&data)
        .with_context(|| format!("failed to parse {}", elf_path.display()))?;

    let dol = pack(&image)?;
    let bytes = dol.to_bytes()?;
    std::fs::write(dol_path, &bytes)
        .with_context(|| format!("failed to write {}", dol_path.display()))?;

    println!("  Packed: {} ({} bytes)", dol_path.display(), bytes.len());
    Ok(())
}
