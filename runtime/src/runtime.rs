// Dispatch table and execution services shared by all generated functions.

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::context::R5900Context;
use crate::{CAUSE_INTEGER_OVERFLOW, EXCEPTION_VECTOR};

/// Signature shared by every generated function, stub and syscall entry.
pub type RecompiledFn = fn(&mut [u8], &mut R5900Context, &mut PS2Runtime);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    IntegerOverflow,
}

pub struct PS2Runtime {
    functions: HashMap<u32, RecompiledFn>,
    /// When false, trapping arithmetic degrades to its wrapping variants.
    pub check_overflow: bool,
    /// Count of exceptions delivered; tests and diagnostics read this.
    pub exceptions_signalled: u64,
}

impl Default for PS2Runtime {
    fn default() -> Self {
        Self::new()
    }
}

fn unknown_function(_rdram: &mut [u8], ctx: &mut R5900Context, _runtime: &mut PS2Runtime) {
    error!(pc = format_args!("{:#x}", ctx.pc), "call into unregistered guest address");
}

impl PS2Runtime {
    pub fn new() -> Self {
        PS2Runtime {
            functions: HashMap::new(),
            check_overflow: false,
            exceptions_signalled: 0,
        }
    }

    pub fn register_function(&mut self, address: u32, func: RecompiledFn) {
        self.functions.insert(address, func);
    }

    pub fn has_function(&self, address: u32) -> bool {
        self.functions.contains_key(&address)
    }

    /// Resolve a guest address to its generated function. Unknown addresses
    /// get a logging no-op so dispatch keeps making forward progress.
    pub fn lookup_function(&self, address: u32) -> RecompiledFn {
        match self.functions.get(&address) {
            Some(&f) => f,
            None => {
                warn!(address = format_args!("{:#x}", address), "function not registered");
                unknown_function
            }
        }
    }

    /// Dispatcher loop: route `ctx.pc` to registered functions until the
    /// guest returns to a zero return address or stops making progress.
    pub fn run(&mut self, rdram: &mut [u8], ctx: &mut R5900Context) {
        // Bare-machine ABI state the bootstrap does not cover: empty argv
        // and a stack at the top of RAM.
        ctx.r[4] = 0;
        ctx.r[5] = 0;
        if ctx.r[29] == 0 {
            ctx.r[29] = 0x0200_0000;
        }

        info!(entry = format_args!("{:#x}", ctx.pc), "starting guest execution");

        loop {
            let pc = ctx.pc;
            if pc == 0 {
                break;
            }
            let known = self.has_function(pc);
            let f = self.lookup_function(pc);
            f(rdram, ctx, self);
            if ctx.pc == pc {
                // The function returned without redirecting control; for an
                // unregistered address that means no forward progress.
                if !known {
                    warn!(
                        pc = format_args!("{:#x}", pc),
                        "no forward progress from unregistered address, halting"
                    );
                }
                break;
            }
        }

        info!(pc = format_args!("{:#x}", ctx.pc), "guest execution finished");
    }

    pub fn signal_exception(&mut self, ctx: &mut R5900Context, exception: Exception) {
        self.exceptions_signalled += 1;
        match exception {
            Exception::IntegerOverflow => {
                error!(pc = format_args!("{:#x}", ctx.pc), "integer overflow exception");
                ctx.cop0_epc = ctx.pc;
                ctx.cop0_cause |= CAUSE_INTEGER_OVERFLOW << 2;
                ctx.pc = EXCEPTION_VECTOR;
            }
        }
    }

    pub fn handle_syscall(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        info!(pc = format_args!("{:#x}", ctx.pc), "SYSCALL");
    }

    pub fn handle_break(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        info!(pc = format_args!("{:#x}", ctx.pc), "BREAK");
    }

    pub fn handle_trap(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        warn!(pc = format_args!("{:#x}", ctx.pc), "trap taken");
    }

    pub fn handle_tlbr(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        debug!(pc = format_args!("{:#x}", ctx.pc), "TLBR");
    }

    pub fn handle_tlbwi(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        debug!(pc = format_args!("{:#x}", ctx.pc), "TLBWI");
    }

    pub fn handle_tlbwr(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        debug!(pc = format_args!("{:#x}", ctx.pc), "TLBWR");
    }

    pub fn handle_tlbp(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context) {
        debug!(pc = format_args!("{:#x}", ctx.pc), "TLBP");
    }

    pub fn clear_ll_bit(&mut self, ctx: &mut R5900Context) {
        ctx.cop0_status &= !0x0000_0002;
    }

    /// Contract stub for VCALLMS: no microprogram interpreter is linked, so
    /// this resets VU status state to the "completed" shape and returns.
    pub fn execute_vu0_microprogram(&mut self, _rdram: &mut [u8], ctx: &mut R5900Context, address: u32) {
        debug!(
            address = format_args!("{:#x}", address),
            pc = format_args!("{:#x}", ctx.pc),
            "VU0 microprogram dispatch (stubbed)"
        );
        ctx.vu0_clip_flags = 0;
        ctx.vu0_clip_flags2 = 0;
        ctx.vu0_mac_flags = 0;
        ctx.vu0_status = 0;
        ctx.vu0_q = 1.0;
    }

    pub fn vu0_start_micro_program(&mut self, rdram: &mut [u8], ctx: &mut R5900Context, address: u32) {
        self.execute_vu0_microprogram(rdram, ctx, address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{gpr_u32, set_gpr_u32};

    fn nop_fn(_rdram: &mut [u8], _ctx: &mut R5900Context, _rt: &mut PS2Runtime) {}

    fn ret_fn(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
        set_gpr_u32(ctx, 2, 0x42);
        ctx.pc = 0;
    }

    #[test]
    fn register_then_lookup() {
        let mut rt = PS2Runtime::new();
        rt.register_function(0x100000, nop_fn);
        assert!(rt.has_function(0x100000));
        assert_eq!(rt.lookup_function(0x100000) as usize, nop_fn as usize);
        // Unknown address resolves to the logging default rather than failing.
        assert!(!rt.has_function(0x200000));
        let _ = rt.lookup_function(0x200000);
    }

    #[test]
    fn run_halts_on_zero_pc() {
        let mut rt = PS2Runtime::new();
        rt.register_function(0x100000, ret_fn);
        let mut ctx = R5900Context::new();
        ctx.pc = 0x100000;
        let mut ram = vec![0u8; 4096];
        rt.run(&mut ram, &mut ctx);
        assert_eq!(gpr_u32(&ctx, 2), 0x42);
        assert_eq!(ctx.pc, 0);
    }

    #[test]
    fn overflow_exception_updates_cop0() {
        let mut rt = PS2Runtime::new();
        let mut ctx = R5900Context::new();
        ctx.pc = 0x1234;
        rt.signal_exception(&mut ctx, Exception::IntegerOverflow);
        assert_eq!(ctx.cop0_epc, 0x1234);
        assert_eq!(ctx.cop0_cause & 0x7C, CAUSE_INTEGER_OVERFLOW << 2);
        assert_eq!(ctx.pc, crate::EXCEPTION_VECTOR);
        assert_eq!(rt.exceptions_signalled, 1);
    }

    #[test]
    fn ll_bit_clears_status_bit_one() {
        let mut rt = PS2Runtime::new();
        let mut ctx = R5900Context::new();
        ctx.cop0_status = 0xFFFF_FFFF;
        rt.clear_ll_bit(&mut ctx);
        assert_eq!(ctx.cop0_status, 0xFFFF_FFFD);
    }

    #[test]
    fn vu0_stub_resets_status() {
        let mut rt = PS2Runtime::new();
        let mut ctx = R5900Context::new();
        ctx.vu0_status = 0xBEEF;
        ctx.vu0_mac_flags = 7;
        ctx.vu0_q = 0.0;
        let mut ram = vec![0u8; 16];
        rt.execute_vu0_microprogram(&mut ram, &mut ctx, 0x100);
        assert_eq!(ctx.vu0_status, 0);
        assert_eq!(ctx.vu0_mac_flags, 0);
        assert_eq!(ctx.vu0_q, 1.0);
    }
}
