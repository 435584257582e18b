// Guest memory: flat RDRAM buffer plus scratchpad and GS VRAM.
//
// Generated code receives `&mut [u8]` over RDRAM and goes through the free
// functions below; every address is masked with RAM_MASK, which makes the
// KSEG mirrors and the uncached windows alias physical memory. All accesses
// are little-endian.

use goblin::elf::{header, program_header, Elf};
use thiserror::Error;
use tracing::info;

use crate::{GS_VRAM_SIZE, RAM_MASK, RAM_SIZE, SCRATCHPAD_SIZE};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid executable: {0}")]
    InvalidImage(String),
}

pub struct PS2Memory {
    rdram: Vec<u8>,
    scratchpad: Vec<u8>,
    gs_vram: Vec<u8>,
}

impl Default for PS2Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl PS2Memory {
    pub fn new() -> Self {
        PS2Memory {
            rdram: vec![0; RAM_SIZE],
            scratchpad: vec![0; SCRATCHPAD_SIZE],
            gs_vram: vec![0; GS_VRAM_SIZE],
        }
    }

    pub fn rdram(&self) -> &[u8] {
        &self.rdram
    }

    pub fn rdram_mut(&mut self) -> &mut [u8] {
        &mut self.rdram
    }

    pub fn scratchpad_mut(&mut self) -> &mut [u8] {
        &mut self.scratchpad
    }

    pub fn gs_vram_mut(&mut self) -> &mut [u8] {
        &mut self.gs_vram
    }

    /// Copy a loadable segment into RDRAM at its (masked) virtual address.
    pub fn load_segment(&mut self, vaddr: u32, bytes: &[u8]) {
        let base = (vaddr & RAM_MASK) as usize;
        self.rdram[base..base + bytes.len()].copy_from_slice(bytes);
    }

    /// Load the guest executable's PT_LOAD segments into RDRAM and return
    /// the entry point. Memory beyond a segment's file image is zeroed.
    pub fn load_elf(&mut self, data: &[u8]) -> Result<u32, LoadError> {
        let elf = Elf::parse(data).map_err(|e| LoadError::InvalidImage(e.to_string()))?;
        if elf.header.e_machine != header::EM_MIPS {
            return Err(LoadError::InvalidImage(format!(
                "not a MIPS executable (e_machine={:#x})",
                elf.header.e_machine
            )));
        }
        if elf.header.e_type != header::ET_EXEC {
            return Err(LoadError::InvalidImage(format!(
                "not an executable image (e_type={:#x})",
                elf.header.e_type
            )));
        }

        for ph in &elf.program_headers {
            if ph.p_type != program_header::PT_LOAD || ph.p_memsz == 0 {
                continue;
            }
            let start = ph.p_offset as usize;
            let end = start + ph.p_filesz as usize;
            if end > data.len() {
                return Err(LoadError::InvalidImage(format!(
                    "segment at {:#x} extends past end of file",
                    ph.p_vaddr
                )));
            }
            info!(
                vaddr = format_args!("{:#x}", ph.p_vaddr),
                memsz = format_args!("{:#x}", ph.p_memsz),
                "loading segment"
            );
            self.load_segment(ph.p_vaddr as u32, &data[start..end]);
            // BSS tail of the segment.
            let zero_base = ((ph.p_vaddr as u32).wrapping_add(ph.p_filesz as u32) & RAM_MASK) as usize;
            let zero_len = (ph.p_memsz - ph.p_filesz) as usize;
            if zero_len > 0 && zero_base + zero_len <= self.rdram.len() {
                self.rdram[zero_base..zero_base + zero_len].fill(0);
            }
        }

        Ok(elf.entry as u32)
    }
}

#[inline]
fn index(addr: u32) -> usize {
    (addr & RAM_MASK) as usize
}

#[inline]
pub fn read8(rdram: &[u8], addr: u32) -> u8 {
    rdram[index(addr)]
}

#[inline]
pub fn read16(rdram: &[u8], addr: u32) -> u16 {
    let i = index(addr);
    u16::from_le_bytes([rdram[i], rdram[i + 1]])
}

#[inline]
pub fn read32(rdram: &[u8], addr: u32) -> u32 {
    let i = index(addr);
    let mut b = [0u8; 4];
    b.copy_from_slice(&rdram[i..i + 4]);
    u32::from_le_bytes(b)
}

#[inline]
pub fn read64(rdram: &[u8], addr: u32) -> u64 {
    let i = index(addr);
    let mut b = [0u8; 8];
    b.copy_from_slice(&rdram[i..i + 8]);
    u64::from_le_bytes(b)
}

#[inline]
pub fn read128(rdram: &[u8], addr: u32) -> u128 {
    let i = index(addr);
    let mut b = [0u8; 16];
    b.copy_from_slice(&rdram[i..i + 16]);
    u128::from_le_bytes(b)
}

#[inline]
pub fn write8(rdram: &mut [u8], addr: u32, value: u8) {
    rdram[index(addr)] = value;
}

#[inline]
pub fn write16(rdram: &mut [u8], addr: u32, value: u16) {
    let i = index(addr);
    rdram[i..i + 2].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn write32(rdram: &mut [u8], addr: u32, value: u32) {
    let i = index(addr);
    rdram[i..i + 4].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn write64(rdram: &mut [u8], addr: u32, value: u64) {
    let i = index(addr);
    rdram[i..i + 8].copy_from_slice(&value.to_le_bytes());
}

#[inline]
pub fn write128(rdram: &mut [u8], addr: u32, value: u128) {
    let i = index(addr);
    rdram[i..i + 16].copy_from_slice(&value.to_le_bytes());
}

/// Read a NUL-terminated guest string, bounded to keep a missing terminator
/// from walking all of RDRAM.
pub fn read_cstring(rdram: &[u8], addr: u32, max: usize) -> String {
    let mut out = Vec::new();
    let mut a = addr;
    while out.len() < max {
        let b = read8(rdram, a);
        if b == 0 {
            break;
        }
        out.push(b);
        a = a.wrapping_add(1);
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_masked() {
        let mut ram = vec![0u8; RAM_SIZE];
        write32(&mut ram, 0x0010_0000, 0xDEAD_BEEF);
        assert_eq!(read32(&ram, 0x0010_0000), 0xDEAD_BEEF);
        // KSEG0 mirror of the same physical word.
        assert_eq!(read32(&ram, 0x8010_0000), 0xDEAD_BEEF);
        write128(&mut ram, 0x40, 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
        assert_eq!(read128(&ram, 0x40), 0x0011_2233_4455_6677_8899_AABB_CCDD_EEFF);
        assert_eq!(read64(&ram, 0x40), 0x8899_AABB_CCDD_EEFF);
    }

    #[test]
    fn little_endian_layout() {
        let mut ram = vec![0u8; 64];
        // Small buffer is fine as long as the masked address stays in range.
        write32(&mut ram, 0, 0x0102_0304);
        assert_eq!(ram[0], 0x04);
        assert_eq!(ram[3], 0x01);
        assert_eq!(read16(&ram, 0), 0x0304);
        assert_eq!(read8(&ram, 1), 0x03);
    }

    #[test]
    fn load_elf_rejects_garbage() {
        let mut mem = PS2Memory::new();
        assert!(mem.load_elf(&[0u8; 64]).is_err());
    }

    #[test]
    fn cstring_reads() {
        let mut ram = vec![0u8; 64];
        ram[8..13].copy_from_slice(b"hello");
        assert_eq!(read_cstring(&ram, 8, 32), "hello");
        assert_eq!(read_cstring(&ram, 8, 3), "hel");
    }
}
