//! Read-only view of a linked ELF image.
//!
//! Wraps the `object` crate and exposes just what the packers need: allocated
//! sections in file order, the symbol table, and per-section relocations.
//! Works for both fully linked executables and partially linked (`-r`)
//! objects; in the latter case section addresses are zero and symbol values
//! are section-relative.

use std::collections::BTreeMap;

use object::{Object, ObjectSection, ObjectSymbol, RelocationFlags, RelocationTarget};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Text,
    Data,
    Bss,
}

/// An allocated section of the image.
#[derive(Debug, Clone)]
pub struct Section {
    /// ELF section header index.
    pub index: usize,
    pub name: String,
    pub addr: u32,
    pub size: u32,
    pub align: u32,
    pub kind: SectionKind,
    /// File bytes; empty for `Bss`.
    pub data: Vec<u8>,
}

/// A symbol table entry.
#[derive(Debug, Clone)]
pub struct Symbol {
    /// May be empty for section symbols.
    pub name: String,
    /// ELF index of the defining section, if any.
    pub section: Option<usize>,
    /// Absolute address in a full link, section-relative in a partial link.
    pub value: u32,
    pub defined: bool,
}

/// A relocation read from the image, keyed by symbol table index.
#[derive(Debug, Clone)]
pub struct Reloc {
    /// Offset within the holding section.
    pub offset: u32,
    /// Raw ELF relocation type (`R_PPC_*`).
    pub kind: u8,
    /// Symbol table index of the target.
    pub symbol: usize,
    pub addend: i64,
}

/// Parsed image: allocated sections plus symbol and relocation tables.
#[derive(Debug, Default)]
pub struct Image {
    pub entry: u32,
    pub sections: Vec<Section>,
    /// Symbols keyed by their symbol table index.
    pub symbols: BTreeMap<usize, Symbol>,
    /// Relocations grouped by holding-section ELF index, in file order.
    pub relocations: Vec<(usize, Vec<Reloc>)>,
}

impl Image {
    /// Parse an ELF image from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Image> {
        let file = object::File::parse(data)?;

        let mut sections = Vec::new();
        for section in file.sections() {
            let object::SectionFlags::Elf { sh_flags } = section.flags() else {
                continue;
            };
            if sh_flags & u64::from(object::elf::SHF_ALLOC) == 0 {
                continue;
            }

            let kind = if section.kind() == object::SectionKind::UninitializedData {
                SectionKind::Bss
            } else if sh_flags & u64::from(object::elf::SHF_EXECINSTR) != 0 {
                SectionKind::Text
            } else {
                SectionKind::Data
            };
            let data = match kind {
                SectionKind::Bss => Vec::new(),
                _ => section.data()?.to_vec(),
            };

            sections.push(Section {
                index: section.index().0,
                name: section.name()?.to_string(),
                addr: section.address() as u32,
                size: section.size() as u32,
                align: (section.align() as u32).max(1),
                kind,
                data,
            });
        }

        let mut symbols = BTreeMap::new();
        for symbol in file.symbols() {
            symbols.insert(
                symbol.index().0,
                Symbol {
                    name: symbol.name().unwrap_or_default().to_string(),
                    section: symbol.section_index().map(|i| i.0),
                    value: symbol.address() as u32,
                    defined: !symbol.is_undefined(),
                },
            );
        }

        let mut relocations = Vec::new();
        for section in file.sections() {
            let mut relocs = Vec::new();
            for (offset, reloc) in section.relocations() {
                let RelocationTarget::Symbol(symbol) = reloc.target() else {
                    continue;
                };
                let kind = match reloc.flags() {
                    RelocationFlags::Elf { r_type } => r_type as u8,
                    _ => continue,
                };
                relocs.push(Reloc {
                    offset: offset as u32,
                    kind,
                    symbol: symbol.0,
                    addend: reloc.addend(),
                });
            }
            if !relocs.is_empty() {
                relocations.push((section.index().0, relocs));
            }
        }

        Ok(Image {
            entry: file.entry() as u32,
            sections,
            symbols,
            relocations,
        })
    }

    pub fn symbol(&self, index: usize) -> Option<&Symbol> {
        self.symbols.get(&index)
    }

    /// Look up a defined symbol by name. Section symbols (empty names) never
    /// match. Lowest symbol index wins for duplicate names.
    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        if name.is_empty() {
            return None;
        }
        self.symbols
            .values()
            .find(|s| s.defined && s.name == name)
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    const SHT_PROGBITS: u32 = 1;
    const SHT_SYMTAB: u32 = 2;
    const SHT_STRTAB: u32 = 3;
    const SHT_RELA: u32 = 4;
    const SHT_NOBITS: u32 = 8;

    struct TestSection {
        name: &'static str,
        sh_type: u32,
        flags: u32,
        addr: u32,
        data: Vec<u8>,
        /// For NOBITS, which carries no file data.
        size_override: Option<u32>,
        link: u32,
        info: u32,
        entsize: u32,
        align: u32,
    }

    impl TestSection {
        fn new(name: &'static str, sh_type: u32, flags: u32) -> Self {
            Self {
                name,
                sh_type,
                flags,
                addr: 0,
                data: Vec::new(),
                size_override: None,
                link: 0,
                info: 0,
                entsize: 0,
                align: 4,
            }
        }
    }

    fn put16(buf: &mut [u8], at: usize, value: u16) {
        buf[at..at + 2].copy_from_slice(&value.to_be_bytes());
    }

    fn put32_at(buf: &mut [u8], at: usize, value: u32) {
        buf[at..at + 4].copy_from_slice(&value.to_be_bytes());
    }

    fn push_shdr(
        out: &mut Vec<u8>,
        name: u32,
        sh_type: u32,
        flags: u32,
        addr: u32,
        offset: u32,
        size: u32,
        link: u32,
        info: u32,
        align: u32,
        entsize: u32,
    ) {
        let mut shdr = [0u8; 40];
        put32_at(&mut shdr, 0, name);
        put32_at(&mut shdr, 4, sh_type);
        put32_at(&mut shdr, 8, flags);
        put32_at(&mut shdr, 12, addr);
        put32_at(&mut shdr, 16, offset);
        put32_at(&mut shdr, 20, size);
        put32_at(&mut shdr, 24, link);
        put32_at(&mut shdr, 28, info);
        put32_at(&mut shdr, 32, align);
        put32_at(&mut shdr, 36, entsize);
        out.extend_from_slice(&shdr);
    }

    /// Assemble a 32-bit big-endian PowerPC ELF. Callers' sections land at
    /// indices 1.. in order; a null section and a trailing .shstrtab are
    /// added here.
    fn build_elf(e_type: u16, entry: u32, sections: &[TestSection]) -> Vec<u8> {
        let mut shstrtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for section in sections {
            name_offsets.push(shstrtab.len() as u32);
            shstrtab.extend(section.name.bytes());
            shstrtab.push(0);
        }
        let shstr_name = shstrtab.len() as u32;
        shstrtab.extend(b".shstrtab");
        shstrtab.push(0);

        let mut out = vec![0u8; 52];
        let mut offsets = Vec::new();
        for section in sections {
            while out.len() % section.align.max(1) as usize != 0 {
                out.push(0);
            }
            offsets.push(out.len() as u32);
            if section.sh_type != SHT_NOBITS {
                out.extend_from_slice(&section.data);
            }
        }
        while out.len() % 4 != 0 {
            out.push(0);
        }
        let shstr_offset = out.len() as u32;
        out.extend_from_slice(&shstrtab);
        while out.len() % 4 != 0 {
            out.push(0);
        }

        let shoff = out.len() as u32;
        let shnum = sections.len() as u16 + 2;
        push_shdr(&mut out, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0);
        for (i, section) in sections.iter().enumerate() {
            let size = section
                .size_override
                .unwrap_or(section.data.len() as u32);
            push_shdr(
                &mut out,
                name_offsets[i],
                section.sh_type,
                section.flags,
                section.addr,
                offsets[i],
                size,
                section.link,
                section.info,
                section.align,
                section.entsize,
            );
        }
        push_shdr(
            &mut out,
            shstr_name,
            SHT_STRTAB,
            0,
            0,
            shstr_offset,
            shstrtab.len() as u32,
            0,
            0,
            1,
            0,
        );

        out[0..4].copy_from_slice(&[0x7F, b'E', b'L', b'F']);
        out[4] = 1; // 32-bit
        out[5] = 2; // big-endian
        out[6] = 1; // version
        put16(&mut out, 0x10, e_type);
        put16(&mut out, 0x12, 20); // EM_PPC
        put32_at(&mut out, 0x14, 1);
        put32_at(&mut out, 0x18, entry);
        put32_at(&mut out, 0x20, shoff);
        put16(&mut out, 0x28, 52); // ehsize
        put16(&mut out, 0x2E, 40); // shentsize
        put16(&mut out, 0x30, shnum);
        put16(&mut out, 0x32, shnum - 1); // shstrndx
        out
    }

    fn symtab_entry(name: u32, value: u32, info: u8, shndx: u16) -> [u8; 16] {
        let mut entry = [0u8; 16];
        put32_at(&mut entry, 0, name);
        put32_at(&mut entry, 4, value);
        entry[12] = info;
        put16(&mut entry, 14, shndx);
        entry
    }

    fn rela_entry(offset: u32, symbol: u32, kind: u8, addend: i32) -> [u8; 12] {
        let mut entry = [0u8; 12];
        put32_at(&mut entry, 0, offset);
        put32_at(&mut entry, 4, (symbol << 8) | u32::from(kind));
        entry[8..12].copy_from_slice(&addend.to_be_bytes());
        entry
    }

    /// Linked executable: .text(1), .bss(2), .debug(3), .symtab(4), .strtab(5).
    fn linked_elf() -> Vec<u8> {
        let mut strtab = vec![0u8];
        strtab.extend(b"main\0OSReport\0");

        let mut symtab = Vec::new();
        symtab.extend_from_slice(&[0u8; 16]);
        symtab.extend_from_slice(&symtab_entry(1, 0x8000_4000, 0x12, 1)); // main
        symtab.extend_from_slice(&symtab_entry(6, 0, 0x10, 0)); // OSReport, undefined

        let mut text = TestSection::new(".text", SHT_PROGBITS, 0x6);
        text.addr = 0x8000_4000;
        text.data = vec![0x4E, 0x80, 0x00, 0x20];

        let mut bss = TestSection::new(".bss", SHT_NOBITS, 0x3);
        bss.addr = 0x8000_5000;
        bss.size_override = Some(0x10);
        bss.align = 8;

        let mut debug = TestSection::new(".debug", SHT_PROGBITS, 0);
        debug.data = vec![0xDE, 0xAD];

        let mut symtab_section = TestSection::new(".symtab", SHT_SYMTAB, 0);
        symtab_section.data = symtab;
        symtab_section.link = 5;
        symtab_section.info = 1;
        symtab_section.entsize = 16;

        let mut strtab_section = TestSection::new(".strtab", SHT_STRTAB, 0);
        strtab_section.data = strtab;
        strtab_section.align = 1;

        build_elf(
            2, // ET_EXEC
            0x8000_4000,
            &[text, bss, debug, symtab_section, strtab_section],
        )
    }

    #[test]
    fn test_parse_keeps_only_allocated_sections() {
        let image = Image::parse(&linked_elf()).unwrap();

        assert_eq!(image.entry, 0x8000_4000);
        assert_eq!(image.sections.len(), 2);

        let text = &image.sections[0];
        assert_eq!(text.name, ".text");
        assert_eq!(text.kind, SectionKind::Text);
        assert_eq!(text.addr, 0x8000_4000);
        assert_eq!(text.data, vec![0x4E, 0x80, 0x00, 0x20]);

        let bss = &image.sections[1];
        assert_eq!(bss.kind, SectionKind::Bss);
        assert_eq!(bss.size, 0x10);
        assert!(bss.data.is_empty());
    }

    #[test]
    fn test_parse_symbols() {
        let image = Image::parse(&linked_elf()).unwrap();

        let main = image.lookup("main").unwrap();
        assert_eq!(main.value, 0x8000_4000);
        assert_eq!(main.section, Some(1));

        // Undefined symbols are present but never resolved by lookup.
        assert!(image.lookup("OSReport").is_none());
        assert!(image.symbols.values().any(|s| s.name == "OSReport" && !s.defined));
    }

    /// Partially linked object: .text(1), .rela.text(2), .symtab(3), .strtab(4).
    fn relocatable_elf() -> Vec<u8> {
        let mut strtab = vec![0u8];
        strtab.extend(b"helper\0OSReport\0");

        let mut symtab = Vec::new();
        symtab.extend_from_slice(&[0u8; 16]);
        symtab.extend_from_slice(&symtab_entry(1, 0x20, 0x12, 1)); // helper
        symtab.extend_from_slice(&symtab_entry(8, 0, 0x10, 0)); // OSReport

        let mut rela = Vec::new();
        rela.extend_from_slice(&rela_entry(0x8, 1, 1, 4)); // ADDR32 helper+4
        rela.extend_from_slice(&rela_entry(0x10, 2, 10, 0)); // REL24 OSReport

        let mut text = TestSection::new(".text", SHT_PROGBITS, 0x6);
        text.data = vec![0x60; 0x40];

        let mut rela_section = TestSection::new(".rela.text", SHT_RELA, 0);
        rela_section.data = rela;
        rela_section.link = 3;
        rela_section.info = 1;
        rela_section.entsize = 12;

        let mut symtab_section = TestSection::new(".symtab", SHT_SYMTAB, 0);
        symtab_section.data = symtab;
        symtab_section.link = 4;
        symtab_section.info = 1;
        symtab_section.entsize = 16;

        let mut strtab_section = TestSection::new(".strtab", SHT_STRTAB, 0);
        strtab_section.data = strtab;
        strtab_section.align = 1;

        build_elf(1, 0, &[text, rela_section, symtab_section, strtab_section])
    }

    #[test]
    fn test_parse_relocations() {
        let image = Image::parse(&relocatable_elf()).unwrap();

        assert_eq!(image.relocations.len(), 1);
        let (holder, relocs) = &image.relocations[0];
        assert_eq!(*holder, 1);
        assert_eq!(relocs.len(), 2);

        assert_eq!(relocs[0].offset, 0x8);
        assert_eq!(relocs[0].kind, 1); // R_PPC_ADDR32
        assert_eq!(relocs[0].addend, 4);
        let target = image.symbol(relocs[0].symbol).unwrap();
        assert_eq!(target.name, "helper");
        assert_eq!(target.value, 0x20);

        assert_eq!(relocs[1].kind, 10); // R_PPC_REL24
        assert!(!image.symbol(relocs[1].symbol).unwrap().defined);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Image::parse(b"not an elf at all").is_err());
    }

    fn image_with_symbols(symbols: &[(usize, Symbol)]) -> Image {
        Image {
            symbols: symbols.iter().cloned().collect(),
            ..Image::default()
        }
    }

    fn sym(name: &str, section: Option<usize>, value: u32, defined: bool) -> Symbol {
        Symbol {
            name: name.to_string(),
            section,
            value,
            defined,
        }
    }

    #[test]
    fn test_lookup_ignores_undefined() {
        let image = image_with_symbols(&[
            (1, sym("OSReport", None, 0, false)),
            (2, sym("OSReport", Some(3), 0x8000_5000, true)),
        ]);
        let found = image.lookup("OSReport").unwrap();
        assert_eq!(found.value, 0x8000_5000);
        assert!(found.defined);
    }

    #[test]
    fn test_lookup_never_matches_section_symbols() {
        let image = image_with_symbols(&[(1, sym("", Some(2), 0, true))]);
        assert!(image.lookup("").is_none());
    }

    #[test]
    fn test_lookup_prefers_lowest_index() {
        let image = image_with_symbols(&[
            (5, sym("dup", Some(1), 0x100, true)),
            (9, sym("dup", Some(2), 0x200, true)),
        ]);
        assert_eq!(image.lookup("dup").unwrap().value, 0x100);
    }
}
