// R5900 CPU context: everything generated code reads or writes lives here.

/// EE core register file and coprocessor state.
///
/// General purpose registers are 128 bits wide; scalar code uses the low 32
/// or 64 bits through the accessors in [`crate::ops`]. Register 0 is kept at
/// zero by the setters, never by the reads.
#[derive(Clone)]
pub struct R5900Context {
    /// General purpose registers (128-bit).
    pub r: [u128; 32],

    pub pc: u32,
    /// Primary multiplier accumulator halves.
    pub hi: u32,
    pub lo: u32,
    /// Secondary accumulator halves used by the MULT1/DIV1 pipeline.
    pub hi1: u32,
    pub lo1: u32,
    /// Shift amount register (funnel shifts, MTSAB/MTSAH).
    pub sa: u32,

    // FPU (COP1), single precision. f[31] doubles as the MAC accumulator.
    pub f: [f32; 32],
    pub fcr31: u32,

    // VU0 macro-mode state (COP2).
    pub vu0_vf: [[f32; 4]; 32],
    pub vi: [u16; 16],
    pub vu0_q: f32,
    pub vu0_p: f32,
    pub vu0_i: f32,
    pub vu0_r: [f32; 4],
    pub vu0_acc: [f32; 4],
    pub vu0_status: u16,
    pub vu0_mac_flags: u32,
    pub vu0_clip_flags: u32,
    pub vu0_clip_flags2: u32,
    pub vu0_cmsar0: u32,
    pub vu0_cmsar1: u32,
    pub vu0_vpu_stat: u32,
    pub vu0_tpc: u32,
    pub vu0_fbrst: u32,
    pub vu0_itop: u32,
    pub vu0_xitop: u32,
    pub vu0_info: u32,
    pub vu0_pc: u32,

    // COP0 system control registers.
    pub cop0_index: u32,
    pub cop0_random: u32,
    pub cop0_entrylo0: u32,
    pub cop0_entrylo1: u32,
    pub cop0_context: u32,
    pub cop0_pagemask: u32,
    pub cop0_wired: u32,
    pub cop0_badvaddr: u32,
    pub cop0_count: u32,
    pub cop0_entryhi: u32,
    pub cop0_compare: u32,
    pub cop0_status: u32,
    pub cop0_cause: u32,
    pub cop0_epc: u32,
    pub cop0_prid: u32,
    pub cop0_config: u32,
    pub cop0_badpaddr: u32,
    pub cop0_debug: u32,
    pub cop0_perf: u32,
    pub cop0_taglo: u32,
    pub cop0_taghi: u32,
    pub cop0_errorepc: u32,
}

impl Default for R5900Context {
    fn default() -> Self {
        R5900Context {
            r: [0; 32],
            pc: 0,
            hi: 0,
            lo: 0,
            hi1: 0,
            lo1: 0,
            sa: 0,
            f: [0.0; 32],
            fcr31: 0,
            vu0_vf: [[0.0; 4]; 32],
            vi: [0; 16],
            // Q comes up as 1.0 after reset.
            vu0_q: 1.0,
            vu0_p: 0.0,
            vu0_i: 0.0,
            vu0_r: [0.0; 4],
            vu0_acc: [0.0; 4],
            vu0_status: 0,
            vu0_mac_flags: 0,
            vu0_clip_flags: 0,
            vu0_clip_flags2: 0,
            vu0_cmsar0: 0,
            vu0_cmsar1: 0,
            vu0_vpu_stat: 0,
            vu0_tpc: 0,
            vu0_fbrst: 0,
            vu0_itop: 0,
            vu0_xitop: 0,
            vu0_info: 0,
            vu0_pc: 0,
            cop0_index: 0,
            // RANDOM counts down from the top.
            cop0_random: 47,
            cop0_entrylo0: 0,
            cop0_entrylo1: 0,
            cop0_context: 0,
            cop0_pagemask: 0,
            cop0_wired: 0,
            cop0_badvaddr: 0,
            cop0_count: 0,
            cop0_entryhi: 0,
            cop0_compare: 0,
            // BEV set, kernel mode.
            cop0_status: 0x0040_0000,
            cop0_cause: 0,
            cop0_epc: 0,
            // R5900 CPU id.
            cop0_prid: 0x0000_2e20,
            cop0_config: 0,
            cop0_badpaddr: 0,
            cop0_debug: 0,
            cop0_perf: 0,
            cop0_taglo: 0,
            cop0_taghi: 0,
            cop0_errorepc: 0,
        }
    }
}

impl R5900Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register-state snapshot for diagnostics.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "--- R5900 context ---");
        let _ = writeln!(out, "pc:  {:#010x}", self.pc);
        let _ = writeln!(
            out,
            "hi:  {:#010x} lo:  {:#010x} hi1: {:#010x} lo1: {:#010x} sa: {:#x}",
            self.hi, self.lo, self.hi1, self.lo1, self.sa
        );
        for (i, r) in self.r.iter().enumerate() {
            let _ = writeln!(out, "r{i:<2}: {:#034x}", r);
        }
        let _ = writeln!(
            out,
            "status: {:#010x} cause: {:#010x} epc: {:#010x}",
            self.cop0_status, self.cop0_cause, self.cop0_epc
        );
        out
    }
}

/// Read the low 32 bits of a GPR; used by syscall/stub implementations to
/// fetch MIPS o32 argument registers ($a0 = 4, $a1 = 5, ...).
pub fn get_reg_u32(ctx: &R5900Context, reg: usize) -> u32 {
    if reg > 31 {
        return 0;
    }
    ctx.r[reg] as u32
}

/// Place a 32-bit return value in $v0.
pub fn set_return_u32(ctx: &mut R5900Context, value: u32) {
    ctx.r[2] = value as u128;
}

pub fn set_return_s32(ctx: &mut R5900Context, value: i32) {
    ctx.r[2] = value as u32 as u128;
}

/// 64-bit returns go in the $v0/$v1 pair.
pub fn set_return_u64(ctx: &mut R5900Context, value: u64) {
    ctx.r[2] = value as u32 as u128;
    ctx.r[3] = (value >> 32) as u128;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_state() {
        let ctx = R5900Context::new();
        assert_eq!(ctx.vu0_q, 1.0);
        assert_eq!(ctx.cop0_random, 47);
        assert_eq!(ctx.cop0_prid, 0x2e20);
        assert!(ctx.r.iter().all(|&r| r == 0));
    }

    #[test]
    fn dump_includes_pc_and_registers() {
        let mut ctx = R5900Context::new();
        ctx.pc = 0x0010_0000;
        ctx.r[31] = 0xDEAD_BEEF;
        let dump = ctx.dump();
        assert!(dump.contains("pc:  0x00100000"));
        assert!(dump.contains("r31"));
        assert!(dump.contains("deadbeef"));
    }

    #[test]
    fn return_registers() {
        let mut ctx = R5900Context::new();
        set_return_u64(&mut ctx, 0x1122_3344_5566_7788);
        assert_eq!(get_reg_u32(&ctx, 2), 0x5566_7788);
        assert_eq!(get_reg_u32(&ctx, 3), 0x1122_3344);
        set_return_s32(&mut ctx, -1);
        assert_eq!(get_reg_u32(&ctx, 2), 0xFFFF_FFFF);
    }
}
