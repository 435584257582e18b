// ELF intake for EE executables.
//
// Uses goblin for the container format; everything downstream works from the
// owned Section/Symbol/Function tables, so the input buffer can be dropped
// after parsing.

use std::path::Path;

use goblin::elf::{header, section_header, sym, Elf};
use tracing::{info, warn};

use crate::error::RecompError;

#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub address: u32,
    pub size: u32,
    /// Empty for BSS.
    pub data: Vec<u8>,
    pub is_bss: bool,
    pub is_executable: bool,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub address: u32,
    pub name: String,
    pub is_function: bool,
}

#[derive(Debug, Clone)]
pub struct Relocation {
    pub address: u32,
    pub kind: u32,
    pub symbol: String,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub start: u32,
    pub end: u32,
    pub name: String,
    pub is_recompiled: bool,
    pub is_stub: bool,
}

pub struct ElfImage {
    pub entry: u32,
    pub sections: Vec<Section>,
    pub symbols: Vec<Symbol>,
    pub relocations: Vec<Relocation>,
}

impl ElfImage {
    pub fn open(path: &Path) -> Result<Self, RecompError> {
        let data = std::fs::read(path)
            .map_err(|e| RecompError::Load(format!("{}: {e}", path.display())))?;
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self, RecompError> {
        let elf = Elf::parse(data).map_err(|e| RecompError::Load(e.to_string()))?;

        if elf.header.e_machine != header::EM_MIPS {
            return Err(RecompError::Load(format!(
                "not a MIPS executable (e_machine={:#x})",
                elf.header.e_machine
            )));
        }
        if elf.header.e_type != header::ET_EXEC {
            return Err(RecompError::Load(format!(
                "not an executable image (e_type={:#x})",
                elf.header.e_type
            )));
        }

        let mut sections = Vec::new();
        for sh in &elf.section_headers {
            if sh.sh_flags & section_header::SHF_ALLOC as u64 == 0 || sh.sh_size == 0 {
                continue;
            }
            let name = elf
                .shdr_strtab
                .get_at(sh.sh_name)
                .unwrap_or_default()
                .to_string();
            let is_bss = sh.sh_type == section_header::SHT_NOBITS;
            let bytes = if is_bss {
                Vec::new()
            } else {
                let start = sh.sh_offset as usize;
                let end = start + sh.sh_size as usize;
                if end > data.len() {
                    return Err(RecompError::Load(format!(
                        "section {name} extends past end of file"
                    )));
                }
                data[start..end].to_vec()
            };
            sections.push(Section {
                name,
                address: sh.sh_addr as u32,
                size: sh.sh_size as u32,
                data: bytes,
                is_bss,
                is_executable: sh.sh_flags & section_header::SHF_EXECINSTR as u64 != 0,
            });
        }

        let mut symbols = Vec::new();
        for s in elf.syms.iter() {
            let Some(name) = elf.strtab.get_at(s.st_name) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            symbols.push(Symbol {
                address: s.st_value as u32,
                name: name.to_string(),
                is_function: s.st_type() == sym::STT_FUNC,
            });
        }

        let mut relocations = Vec::new();
        for (_, relocs) in &elf.shdr_relocs {
            for r in relocs.iter() {
                let symbol = elf
                    .syms
                    .get(r.r_sym)
                    .and_then(|s| elf.strtab.get_at(s.st_name))
                    .unwrap_or_default()
                    .to_string();
                relocations.push(Relocation {
                    address: r.r_offset as u32,
                    kind: r.r_type,
                    symbol,
                });
            }
        }

        info!(
            entry = format_args!("{:#x}", elf.entry),
            sections = sections.len(),
            symbols = symbols.len(),
            relocations = relocations.len(),
            "parsed executable"
        );

        Ok(ElfImage {
            entry: elf.entry as u32,
            sections,
            symbols,
            relocations,
        })
    }

    pub fn entry_point(&self) -> u32 {
        self.entry
    }

    pub fn is_valid(&self, addr: u32) -> bool {
        self.sections
            .iter()
            .any(|s| addr >= s.address && addr < s.address.wrapping_add(s.size))
    }

    /// Little-endian instruction fetch. BSS and unmapped addresses fail, as
    /// do unaligned ones.
    pub fn read_word(&self, addr: u32) -> Result<u32, RecompError> {
        if addr % 4 != 0 {
            return Err(RecompError::InvalidAddress(addr));
        }
        for s in &self.sections {
            if addr >= s.address && addr < s.address.wrapping_add(s.size) {
                if s.is_bss {
                    return Err(RecompError::InvalidAddress(addr));
                }
                let offset = (addr - s.address) as usize;
                if offset + 4 > s.data.len() {
                    return Err(RecompError::InvalidAddress(addr));
                }
                let mut word = [0u8; 4];
                word.copy_from_slice(&s.data[offset..offset + 4]);
                return Ok(u32::from_le_bytes(word));
            }
        }
        Err(RecompError::InvalidAddress(addr))
    }

    /// Derive the initial function list from function-symbol spans: sorted by
    /// start, each ends at the next function symbol or its section's end.
    pub fn extract_functions(&self) -> Vec<Function> {
        let mut starts: Vec<&Symbol> = self
            .symbols
            .iter()
            .filter(|s| {
                s.is_function
                    && self
                        .sections
                        .iter()
                        .any(|sec| sec.is_executable && s.address >= sec.address
                            && s.address < sec.address.wrapping_add(sec.size))
            })
            .collect();
        starts.sort_by_key(|s| s.address);
        starts.dedup_by_key(|s| s.address);

        let mut functions = Vec::with_capacity(starts.len());
        for (i, s) in starts.iter().enumerate() {
            let section_end = self
                .sections
                .iter()
                .find(|sec| {
                    sec.is_executable
                        && s.address >= sec.address
                        && s.address < sec.address.wrapping_add(sec.size)
                })
                .map(|sec| sec.address.wrapping_add(sec.size))
                .unwrap_or(s.address);
            let mut end = section_end;
            if let Some(next) = starts.get(i + 1) {
                if next.address < section_end {
                    end = next.address;
                }
            }
            if end <= s.address {
                continue;
            }
            functions.push(Function {
                start: s.address,
                end,
                name: s.name.clone(),
                is_recompiled: false,
                is_stub: false,
            });
        }
        functions
    }

    /// Merge an externally exported symbol map. Lines are `<address> <name>`
    /// or `<name> <address>`, `#` starts a comment. Names are overridden,
    /// ranges never are.
    pub fn load_symbol_map(&mut self, path: &Path) -> Result<(), RecompError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| RecompError::Load(format!("{}: {e}", path.display())))?;
        let mut merged = 0usize;
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split_whitespace();
            let (Some(a), Some(b)) = (parts.next(), parts.next()) else {
                continue;
            };
            let parsed = match crate::config::parse_numeric(a) {
                Some(addr) => Some((addr, b)),
                None => crate::config::parse_numeric(b).map(|addr| (addr, a)),
            };
            let Some((addr, name)) = parsed else {
                warn!(line, "ignoring unparsable symbol map line");
                continue;
            };
            match self.symbols.iter_mut().find(|s| s.address == addr) {
                Some(existing) => {
                    existing.name = name.to_string();
                    existing.is_function = true;
                }
                None => self.symbols.push(Symbol {
                    address: addr,
                    name: name.to_string(),
                    is_function: true,
                }),
            }
            merged += 1;
        }
        info!(merged, map = %path.display(), "merged external symbol map");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Hand-built image over a little code blob; enough surface for the
    /// decoder and analyzer tests without a real ELF on disk.
    pub(crate) fn fake_image(text_addr: u32, words: &[u32], symbols: Vec<Symbol>) -> ElfImage {
        let mut data = Vec::new();
        for w in words {
            data.extend_from_slice(&w.to_le_bytes());
        }
        ElfImage {
            entry: text_addr,
            sections: vec![Section {
                name: ".text".into(),
                address: text_addr,
                size: data.len() as u32,
                data,
                is_bss: false,
                is_executable: true,
            }],
            symbols,
            relocations: Vec::new(),
        }
    }

    #[test]
    fn rejects_non_elf() {
        assert!(ElfImage::parse(&[0u8; 64]).is_err());
    }

    #[test]
    fn read_word_checks_alignment_and_range() {
        let img = fake_image(0x1000, &[0x1111_1111, 0x2222_2222], vec![]);
        assert_eq!(img.read_word(0x1004).unwrap(), 0x2222_2222);
        assert!(img.read_word(0x1002).is_err());
        assert!(img.read_word(0x2000).is_err());
        assert!(img.is_valid(0x1007));
        assert!(!img.is_valid(0x1008));
    }

    #[test]
    fn functions_span_to_next_symbol_or_section_end() {
        let syms = vec![
            Symbol { address: 0x1000, name: "a".into(), is_function: true },
            Symbol { address: 0x1008, name: "b".into(), is_function: true },
            Symbol { address: 0x1004, name: "data".into(), is_function: false },
        ];
        let img = fake_image(0x1000, &[0, 0, 0, 0], syms);
        let funcs = img.extract_functions();
        assert_eq!(funcs.len(), 2);
        assert_eq!((funcs[0].start, funcs[0].end), (0x1000, 0x1008));
        assert_eq!((funcs[1].start, funcs[1].end), (0x1008, 0x1010));
    }

    #[test]
    fn symbol_map_overrides_names() {
        let mut img = fake_image(
            0x1000,
            &[0],
            vec![Symbol { address: 0x1000, name: "old".into(), is_function: true }],
        );
        let path = std::env::temp_dir().join("ps2recomp_map_test.txt");
        std::fs::write(&path, "# comment\n0x1000 renamed\n0x2000 extra\n").unwrap();
        img.load_symbol_map(&path).unwrap();
        assert_eq!(img.symbols[0].name, "renamed");
        assert!(img.symbols.iter().any(|s| s.address == 0x2000 && s.name == "extra"));
    }
}
