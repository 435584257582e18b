// Guest-library stubs: host implementations of libc-shaped functions the
// recompiler was told to cut out of the guest. `todo` is the fallback for
// stubbed names nothing here implements; it logs and returns the sentinel -1.

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

use crate::context::{get_reg_u32, set_return_s32, set_return_u32, R5900Context};
use crate::memory::{read8, read_cstring, write8};
use crate::runtime::PS2Runtime;

/// Names with real implementations in this module.
pub const STUB_NAMES: &[&str] =
    &["printf", "puts", "malloc", "free", "memcpy", "memset", "strlen"];

pub fn is_stub_name(name: &str) -> bool {
    STUB_NAMES.contains(&name)
}

/// Fallback for stubbed functions with no implementation: log once per call
/// and hand back -1 in $v0.
pub fn todo(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    warn!(
        ra = format_args!("{:#x}", get_reg_u32(ctx, 31)),
        "unimplemented stub called"
    );
    set_return_s32(ctx, -1);
}

// Guest heap for the malloc/free pair: a bump allocator over the top 8 MiB
// of RDRAM, below the initial stack. Returned values are real guest
// addresses, so recompiled loads and stores through them just work.
const HEAP_BASE: u32 = 0x0180_0000;
const HEAP_END: u32 = 0x01F0_0000;

static HEAP_NEXT: AtomicU32 = AtomicU32::new(HEAP_BASE);

pub fn malloc(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let size = (get_reg_u32(ctx, 4) + 0xF) & !0xF;
    if size == 0 {
        set_return_u32(ctx, 0);
        return;
    }
    let addr = HEAP_NEXT.fetch_add(size, Ordering::Relaxed);
    if addr.saturating_add(size) > HEAP_END {
        warn!(size, "guest heap exhausted");
        set_return_u32(ctx, 0);
        return;
    }
    debug!(size, addr = format_args!("{:#x}", addr), "malloc");
    set_return_u32(ctx, addr);
}

pub fn free(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    // Bump allocator: release is a no-op.
    debug!(addr = format_args!("{:#x}", get_reg_u32(ctx, 4)), "free");
    set_return_u32(ctx, 0);
}

pub fn memcpy(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let dst = get_reg_u32(ctx, 4);
    let src = get_reg_u32(ctx, 5);
    let len = get_reg_u32(ctx, 6);
    for i in 0..len {
        let b = read8(rdram, src.wrapping_add(i));
        write8(rdram, dst.wrapping_add(i), b);
    }
    set_return_u32(ctx, dst);
}

pub fn memset(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let dst = get_reg_u32(ctx, 4);
    let value = get_reg_u32(ctx, 5) as u8;
    let len = get_reg_u32(ctx, 6);
    for i in 0..len {
        write8(rdram, dst.wrapping_add(i), value);
    }
    set_return_u32(ctx, dst);
}

pub fn strlen(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let mut addr = get_reg_u32(ctx, 4);
    let mut len = 0u32;
    while read8(rdram, addr) != 0 {
        len += 1;
        addr = addr.wrapping_add(1);
    }
    set_return_u32(ctx, len);
}

pub fn puts(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let s = read_cstring(rdram, get_reg_u32(ctx, 4), 4096);
    println!("{s}");
    set_return_u32(ctx, s.len() as u32 + 1);
}

pub fn printf(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let fmt = read_cstring(rdram, get_reg_u32(ctx, 4), 4096);
    let out = format_guest(rdram, ctx, &fmt);
    print!("{out}");
    set_return_u32(ctx, out.len() as u32);
}

/// Expand a guest printf format against the o32 argument registers
/// ($a1..$a3, then the stack). Covers the conversions PS2 titles lean on.
fn format_guest(rdram: &[u8], ctx: &R5900Context, fmt: &str) -> String {
    let mut out = String::new();
    let mut arg_index = 5usize; // $a1
    let mut next_arg = |out_of_regs_slot: &mut u32| -> u32 {
        if arg_index <= 7 {
            let v = get_reg_u32(ctx, arg_index);
            arg_index += 1;
            v
        } else {
            // Past the register args: o32 spills to sp+16 upward.
            let sp = get_reg_u32(ctx, 29);
            let v = crate::memory::read32(rdram, sp + 16 + *out_of_regs_slot * 4);
            *out_of_regs_slot += 1;
            v
        }
    };
    let mut spill = 0u32;

    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        // Skip flags/width; enough for diagnostic output.
        let mut spec = chars.next();
        while matches!(spec, Some(ch) if ch.is_ascii_digit() || ch == '-' || ch == '0' || ch == 'l')
        {
            spec = chars.next();
        }
        match spec {
            Some('d') | Some('i') => out.push_str(&(next_arg(&mut spill) as i32).to_string()),
            Some('u') => out.push_str(&next_arg(&mut spill).to_string()),
            Some('x') => out.push_str(&format!("{:x}", next_arg(&mut spill))),
            Some('X') => out.push_str(&format!("{:X}", next_arg(&mut spill))),
            Some('p') => out.push_str(&format!("{:#x}", next_arg(&mut spill))),
            Some('c') => out.push((next_arg(&mut spill) as u8) as char),
            Some('s') => out.push_str(&read_cstring(rdram, next_arg(&mut spill), 4096)),
            Some('f') => {
                let bits = next_arg(&mut spill);
                out.push_str(&f32::from_bits(bits).to_string());
            }
            Some('%') => out.push('%'),
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::gpr_u32;

    #[test]
    fn todo_returns_sentinel() {
        let mut ctx = R5900Context::new();
        let mut rt = PS2Runtime::new();
        let mut ram = vec![0u8; 16];
        todo(&mut ram, &mut ctx, &mut rt);
        assert_eq!(gpr_u32(&ctx, 2), 0xFFFF_FFFF);
    }

    #[test]
    fn bump_allocator_alignment() {
        let mut ctx = R5900Context::new();
        let mut rt = PS2Runtime::new();
        let mut ram = vec![0u8; 16];
        ctx.r[4] = 24;
        malloc(&mut ram, &mut ctx, &mut rt);
        let first = gpr_u32(&ctx, 2);
        assert_eq!(first & 0xF, 0);
        ctx.r[4] = 8;
        malloc(&mut ram, &mut ctx, &mut rt);
        let second = gpr_u32(&ctx, 2);
        assert!(second >= first + 32);
        assert_eq!(second & 0xF, 0);
    }

    #[test]
    fn guest_string_ops() {
        let mut ctx = R5900Context::new();
        let mut rt = PS2Runtime::new();
        let mut ram = vec![0u8; 256];
        ram[16..21].copy_from_slice(b"ps2\x00\x00");
        ctx.r[4] = 16;
        strlen(&mut ram, &mut ctx, &mut rt);
        assert_eq!(gpr_u32(&ctx, 2), 3);

        ctx.r[4] = 64;
        ctx.r[5] = 16;
        ctx.r[6] = 4;
        memcpy(&mut ram, &mut ctx, &mut rt);
        assert_eq!(&ram[64..68], b"ps2\x00");

        ctx.r[4] = 128;
        ctx.r[5] = 0xAB;
        ctx.r[6] = 4;
        memset(&mut ram, &mut ctx, &mut rt);
        assert_eq!(&ram[128..132], &[0xAB; 4]);
    }

    #[test]
    fn printf_formats_register_args() {
        let mut ctx = R5900Context::new();
        let mut ram = vec![0u8; 256];
        ram[0..14].copy_from_slice(b"v=%d x=%x s=%s");
        ram[32..35].copy_from_slice(b"ok\x00");
        ctx.r[5] = (-3i32 as u32) as u128;
        ctx.r[6] = 0xbeef;
        ctx.r[7] = 32;
        let fmt = read_cstring(&ram, 0, 64);
        let out = format_guest(&ram, &ctx, &fmt);
        assert_eq!(out, "v=-3 x=beef s=ok");
    }
}
