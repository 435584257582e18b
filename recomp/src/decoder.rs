// R5900 instruction decoder.
//
// `decode` is a pure function of (address, word) and never fails: encodings
// the translator has no case for flow through and come out the other end as
// commented placeholders. The field constants follow the EE ISA tables;
// MMI sub-opcodes live in the sa field for the MMI0-3 groups.

/// Primary opcode field values.
pub mod op {
    pub const SPECIAL: u8 = 0x00;
    pub const REGIMM: u8 = 0x01;
    pub const J: u8 = 0x02;
    pub const JAL: u8 = 0x03;
    pub const BEQ: u8 = 0x04;
    pub const BNE: u8 = 0x05;
    pub const BLEZ: u8 = 0x06;
    pub const BGTZ: u8 = 0x07;
    pub const ADDI: u8 = 0x08;
    pub const ADDIU: u8 = 0x09;
    pub const SLTI: u8 = 0x0A;
    pub const SLTIU: u8 = 0x0B;
    pub const ANDI: u8 = 0x0C;
    pub const ORI: u8 = 0x0D;
    pub const XORI: u8 = 0x0E;
    pub const LUI: u8 = 0x0F;
    pub const COP0: u8 = 0x10;
    pub const COP1: u8 = 0x11;
    pub const COP2: u8 = 0x12;
    pub const BEQL: u8 = 0x14;
    pub const BNEL: u8 = 0x15;
    pub const BLEZL: u8 = 0x16;
    pub const BGTZL: u8 = 0x17;
    pub const DADDI: u8 = 0x18;
    pub const DADDIU: u8 = 0x19;
    pub const LDL: u8 = 0x1A;
    pub const LDR: u8 = 0x1B;
    pub const MMI: u8 = 0x1C;
    pub const LQ: u8 = 0x1E;
    pub const SQ: u8 = 0x1F;
    pub const LB: u8 = 0x20;
    pub const LH: u8 = 0x21;
    pub const LWL: u8 = 0x22;
    pub const LW: u8 = 0x23;
    pub const LBU: u8 = 0x24;
    pub const LHU: u8 = 0x25;
    pub const LWR: u8 = 0x26;
    pub const LWU: u8 = 0x27;
    pub const SB: u8 = 0x28;
    pub const SH: u8 = 0x29;
    pub const SWL: u8 = 0x2A;
    pub const SW: u8 = 0x2B;
    pub const SDL: u8 = 0x2C;
    pub const SDR: u8 = 0x2D;
    pub const SWR: u8 = 0x2E;
    pub const CACHE: u8 = 0x2F;
    pub const LWC1: u8 = 0x31;
    pub const PREF: u8 = 0x33;
    pub const LDC2: u8 = 0x36;
    pub const LD: u8 = 0x37;
    pub const SWC1: u8 = 0x39;
    pub const SDC2: u8 = 0x3E;
    pub const SD: u8 = 0x3F;
}

/// SPECIAL function field values.
pub mod special {
    pub const SLL: u16 = 0x00;
    pub const SRL: u16 = 0x02;
    pub const SRA: u16 = 0x03;
    pub const SLLV: u16 = 0x04;
    pub const SRLV: u16 = 0x06;
    pub const SRAV: u16 = 0x07;
    pub const JR: u16 = 0x08;
    pub const JALR: u16 = 0x09;
    pub const MOVZ: u16 = 0x0A;
    pub const MOVN: u16 = 0x0B;
    pub const SYSCALL: u16 = 0x0C;
    pub const BREAK: u16 = 0x0D;
    pub const SYNC: u16 = 0x0F;
    pub const MFHI: u16 = 0x10;
    pub const MTHI: u16 = 0x11;
    pub const MFLO: u16 = 0x12;
    pub const MTLO: u16 = 0x13;
    pub const DSLLV: u16 = 0x14;
    pub const DSRLV: u16 = 0x16;
    pub const DSRAV: u16 = 0x17;
    pub const MULT: u16 = 0x18;
    pub const MULTU: u16 = 0x19;
    pub const DIV: u16 = 0x1A;
    pub const DIVU: u16 = 0x1B;
    pub const ADD: u16 = 0x20;
    pub const ADDU: u16 = 0x21;
    pub const SUB: u16 = 0x22;
    pub const SUBU: u16 = 0x23;
    pub const AND: u16 = 0x24;
    pub const OR: u16 = 0x25;
    pub const XOR: u16 = 0x26;
    pub const NOR: u16 = 0x27;
    pub const MFSA: u16 = 0x28;
    pub const MTSA: u16 = 0x29;
    pub const SLT: u16 = 0x2A;
    pub const SLTU: u16 = 0x2B;
    pub const DADD: u16 = 0x2C;
    pub const DADDU: u16 = 0x2D;
    pub const DSUB: u16 = 0x2E;
    pub const DSUBU: u16 = 0x2F;
    pub const TGE: u16 = 0x30;
    pub const TGEU: u16 = 0x31;
    pub const TLT: u16 = 0x32;
    pub const TLTU: u16 = 0x33;
    pub const TEQ: u16 = 0x34;
    pub const TNE: u16 = 0x36;
    pub const DSLL: u16 = 0x38;
    pub const DSRL: u16 = 0x3A;
    pub const DSRA: u16 = 0x3B;
    pub const DSLL32: u16 = 0x3C;
    pub const DSRL32: u16 = 0x3E;
    pub const DSRA32: u16 = 0x3F;
}

/// REGIMM rt field values.
pub mod regimm {
    pub const BLTZ: u8 = 0x00;
    pub const BGEZ: u8 = 0x01;
    pub const BLTZL: u8 = 0x02;
    pub const BGEZL: u8 = 0x03;
    pub const TGEI: u8 = 0x08;
    pub const TGEIU: u8 = 0x09;
    pub const TLTI: u8 = 0x0A;
    pub const TLTIU: u8 = 0x0B;
    pub const TEQI: u8 = 0x0C;
    pub const TNEI: u8 = 0x0E;
    pub const BLTZAL: u8 = 0x10;
    pub const BGEZAL: u8 = 0x11;
    pub const BLTZALL: u8 = 0x12;
    pub const BGEZALL: u8 = 0x13;
    pub const MTSAB: u8 = 0x18;
    pub const MTSAH: u8 = 0x19;

    pub fn is_branch(rt: u8) -> bool {
        matches!(rt, BLTZ | BGEZ | BLTZL | BGEZL | BLTZAL | BGEZAL | BLTZALL | BGEZALL)
    }
}

/// COP0 rs (format) field values and register numbers.
pub mod cop0 {
    pub const MF: u8 = 0x00;
    pub const MT: u8 = 0x04;
    pub const BC: u8 = 0x08;
    pub const CO: u8 = 0x10;

    pub const REG_INDEX: u8 = 0;
    pub const REG_RANDOM: u8 = 1;
    pub const REG_ENTRYLO0: u8 = 2;
    pub const REG_ENTRYLO1: u8 = 3;
    pub const REG_CONTEXT: u8 = 4;
    pub const REG_PAGEMASK: u8 = 5;
    pub const REG_WIRED: u8 = 6;
    pub const REG_BADVADDR: u8 = 8;
    pub const REG_COUNT: u8 = 9;
    pub const REG_ENTRYHI: u8 = 10;
    pub const REG_COMPARE: u8 = 11;
    pub const REG_STATUS: u8 = 12;
    pub const REG_CAUSE: u8 = 13;
    pub const REG_EPC: u8 = 14;
    pub const REG_PRID: u8 = 15;
    pub const REG_CONFIG: u8 = 16;
    pub const REG_BADPADDR: u8 = 23;
    pub const REG_DEBUG: u8 = 24;
    pub const REG_PERF: u8 = 25;
    pub const REG_TAGLO: u8 = 28;
    pub const REG_TAGHI: u8 = 29;
    pub const REG_ERROREPC: u8 = 30;

    pub const CO_TLBR: u16 = 0x01;
    pub const CO_TLBWI: u16 = 0x02;
    pub const CO_TLBWR: u16 = 0x06;
    pub const CO_TLBP: u16 = 0x08;
    pub const CO_ERET: u16 = 0x18;
    pub const CO_EI: u16 = 0x38;
    pub const CO_DI: u16 = 0x39;
}

/// COP1 rs (format) field values, branch conditions, and .S functions.
pub mod cop1 {
    pub const MF: u8 = 0x00;
    pub const CF: u8 = 0x02;
    pub const MT: u8 = 0x04;
    pub const CT: u8 = 0x06;
    pub const BC: u8 = 0x08;
    pub const FMT_S: u8 = 0x10;
    pub const FMT_W: u8 = 0x14;

    pub const BC_BCF: u8 = 0x00;
    pub const BC_BCT: u8 = 0x01;
    pub const BC_BCFL: u8 = 0x02;
    pub const BC_BCTL: u8 = 0x03;

    pub const S_ADD: u16 = 0x00;
    pub const S_SUB: u16 = 0x01;
    pub const S_MUL: u16 = 0x02;
    pub const S_DIV: u16 = 0x03;
    pub const S_SQRT: u16 = 0x04;
    pub const S_ABS: u16 = 0x05;
    pub const S_MOV: u16 = 0x06;
    pub const S_NEG: u16 = 0x07;
    pub const S_ROUND_W: u16 = 0x0C;
    pub const S_TRUNC_W: u16 = 0x0D;
    pub const S_CEIL_W: u16 = 0x0E;
    pub const S_FLOOR_W: u16 = 0x0F;
    pub const S_RSQRT: u16 = 0x16;
    pub const S_ADDA: u16 = 0x18;
    pub const S_SUBA: u16 = 0x19;
    pub const S_MULA: u16 = 0x1A;
    pub const S_MADD: u16 = 0x1C;
    pub const S_MSUB: u16 = 0x1D;
    pub const S_MADDA: u16 = 0x1E;
    pub const S_MSUBA: u16 = 0x1F;
    pub const S_CVT_W: u16 = 0x24;
    pub const S_MAX: u16 = 0x28;
    pub const S_MIN: u16 = 0x29;
    pub const S_C_F: u16 = 0x30;
    pub const S_C_UN: u16 = 0x31;
    pub const S_C_EQ: u16 = 0x32;
    pub const S_C_UEQ: u16 = 0x33;
    pub const S_C_OLT: u16 = 0x34;
    pub const S_C_ULT: u16 = 0x35;
    pub const S_C_OLE: u16 = 0x36;
    pub const S_C_ULE: u16 = 0x37;
    pub const S_C_SF: u16 = 0x38;
    pub const S_C_NGLE: u16 = 0x39;
    pub const S_C_SEQ: u16 = 0x3A;
    pub const S_C_NGL: u16 = 0x3B;
    pub const S_C_LT: u16 = 0x3C;
    pub const S_C_NGE: u16 = 0x3D;
    pub const S_C_LE: u16 = 0x3E;
    pub const S_C_NGT: u16 = 0x3F;
    pub const W_CVT_S: u16 = 0x20;
}

/// COP2 rs (format) field values, VU0 macro function codes, and control
/// register numbers. Special2 functions (encodings whose low function bits
/// are 0x3C-0x3F) are widened with bits [10:6] and offset by S2_BASE so they
/// share one namespace with the Special1 table.
pub mod cop2 {
    pub const QMFC2: u8 = 0x01;
    pub const CFC2: u8 = 0x02;
    pub const QMTC2: u8 = 0x05;
    pub const CTC2: u8 = 0x06;
    pub const BC: u8 = 0x08;
    pub const CO: u8 = 0x10;

    pub const BC_BCF: u8 = 0x00;
    pub const BC_BCT: u8 = 0x01;
    pub const BC_BCFL: u8 = 0x02;
    pub const BC_BCTL: u8 = 0x03;

    // Special1.
    pub const VADDX: u16 = 0x00; // ..0x03 = x,y,z,w
    pub const VSUBX: u16 = 0x04;
    pub const VMADDX: u16 = 0x08;
    pub const VMSUBX: u16 = 0x0C;
    pub const VMAXX: u16 = 0x10;
    pub const VMINIX: u16 = 0x14;
    pub const VMULX: u16 = 0x18;
    pub const VMULQ: u16 = 0x1C;
    pub const VMAXI: u16 = 0x1D;
    pub const VMULI: u16 = 0x1E;
    pub const VMINII: u16 = 0x1F;
    pub const VADDQ: u16 = 0x20;
    pub const VADDI: u16 = 0x22;
    pub const VSUBQ: u16 = 0x24;
    pub const VSUBI: u16 = 0x26;
    pub const VADD: u16 = 0x28;
    pub const VMADD: u16 = 0x29;
    pub const VMUL: u16 = 0x2A;
    pub const VMAX: u16 = 0x2B;
    pub const VSUB: u16 = 0x2C;
    pub const VMSUB: u16 = 0x2D;
    pub const VOPMSUB: u16 = 0x2E;
    pub const VMINI: u16 = 0x2F;
    pub const VIADD: u16 = 0x30;
    pub const VISUB: u16 = 0x31;
    pub const VIADDI: u16 = 0x32;
    pub const VIAND: u16 = 0x34;
    pub const VIOR: u16 = 0x35;
    pub const VCALLMS: u16 = 0x38;
    pub const VCALLMSR: u16 = 0x39;

    // Special2, offset past the 6-bit Special1 space.
    pub const S2_BASE: u16 = 0x40;
    pub const VABS: u16 = S2_BASE + 0x1D;
    pub const VMOVE: u16 = S2_BASE + 0x30;
    pub const VMR32: u16 = S2_BASE + 0x31;
    pub const VDIV: u16 = S2_BASE + 0x38;
    pub const VSQRT: u16 = S2_BASE + 0x39;
    pub const VRSQRT: u16 = S2_BASE + 0x3A;
    pub const VWAITQ: u16 = S2_BASE + 0x3B;
    pub const VMTIR: u16 = S2_BASE + 0x3C;
    pub const VMFIR: u16 = S2_BASE + 0x3D;
    pub const VILWR: u16 = S2_BASE + 0x3E;
    pub const VISWR: u16 = S2_BASE + 0x3F;
    pub const VRNEXT: u16 = S2_BASE + 0x40;
    pub const VRGET: u16 = S2_BASE + 0x41;
    pub const VRINIT: u16 = S2_BASE + 0x42;
    pub const VRXOR: u16 = S2_BASE + 0x43;
    pub const VNOP: u16 = S2_BASE + 0x2F;

    // Control register numbers (CFC2/CTC2 rd >= 16).
    pub const CR_STATUS: u8 = 16;
    pub const CR_MAC: u8 = 17;
    pub const CR_CLIP: u8 = 18;
    pub const CR_CLIP2: u8 = 19;
    pub const CR_R: u8 = 20;
    pub const CR_I: u8 = 21;
    pub const CR_Q: u8 = 22;
    pub const CR_P: u8 = 23;
    pub const CR_ITOP: u8 = 24;
    pub const CR_XITOP: u8 = 25;
    pub const CR_TPC: u8 = 26;
    pub const CR_CMSAR0: u8 = 27;
    pub const CR_FBRST: u8 = 28;
    pub const CR_VPU_STAT: u8 = 29;
    pub const CR_INFO: u8 = 30;
    pub const CR_CMSAR1: u8 = 31;
}

/// MMI function field values; the MMI0-3 groups select a sub-op in sa.
pub mod mmi {
    pub const MADD: u16 = 0x00;
    pub const MADDU: u16 = 0x01;
    pub const PLZCW: u16 = 0x04;
    pub const MMI0: u16 = 0x08;
    pub const MMI2: u16 = 0x09;
    pub const MFHI1: u16 = 0x10;
    pub const MTHI1: u16 = 0x11;
    pub const MFLO1: u16 = 0x12;
    pub const MTLO1: u16 = 0x13;
    pub const MULT1: u16 = 0x18;
    pub const MULTU1: u16 = 0x19;
    pub const DIV1: u16 = 0x1A;
    pub const DIVU1: u16 = 0x1B;
    pub const MADD1: u16 = 0x20;
    pub const MADDU1: u16 = 0x21;
    pub const MSUB: u16 = 0x24;
    pub const MSUBU: u16 = 0x25;
    pub const MMI1: u16 = 0x28;
    pub const MMI3: u16 = 0x29;
    pub const MSUB1: u16 = 0x2C;
    pub const MSUBU1: u16 = 0x2D;
    pub const PMFHL: u16 = 0x30;
    pub const PMTHL: u16 = 0x31;
    pub const PSLLH: u16 = 0x34;
    pub const PSRLH: u16 = 0x36;
    pub const PSRAH: u16 = 0x37;
    pub const PSLLW: u16 = 0x3C;
    pub const PSRLW: u16 = 0x3E;
    pub const PSRAW: u16 = 0x3F;

    // MMI0 sub-ops (sa field).
    pub const PADDW: u8 = 0x00;
    pub const PSUBW: u8 = 0x01;
    pub const PCGTW: u8 = 0x02;
    pub const PMAXW: u8 = 0x03;
    pub const PADDH: u8 = 0x04;
    pub const PSUBH: u8 = 0x05;
    pub const PCGTH: u8 = 0x06;
    pub const PMAXH: u8 = 0x07;
    pub const PADDB: u8 = 0x08;
    pub const PSUBB: u8 = 0x09;
    pub const PCGTB: u8 = 0x0A;
    pub const PADDSW: u8 = 0x10;
    pub const PSUBSW: u8 = 0x11;
    pub const PEXTLW: u8 = 0x12;
    pub const PPACW: u8 = 0x13;
    pub const PADDSH: u8 = 0x14;
    pub const PSUBSH: u8 = 0x15;
    pub const PEXTLH: u8 = 0x16;
    pub const PPACH: u8 = 0x17;
    pub const PADDSB: u8 = 0x18;
    pub const PSUBSB: u8 = 0x19;
    pub const PEXTLB: u8 = 0x1A;
    pub const PPACB: u8 = 0x1B;
    pub const PEXT5: u8 = 0x1E;
    pub const PPAC5: u8 = 0x1F;

    // MMI1 sub-ops.
    pub const PABSW: u8 = 0x01;
    pub const PCEQW: u8 = 0x02;
    pub const PMINW: u8 = 0x03;
    pub const PADSBH: u8 = 0x04;
    pub const PABSH: u8 = 0x05;
    pub const PCEQH: u8 = 0x06;
    pub const PMINH: u8 = 0x07;
    pub const PCEQB: u8 = 0x0A;
    pub const PADDUW: u8 = 0x10;
    pub const PSUBUW: u8 = 0x11;
    pub const PEXTUW: u8 = 0x12;
    pub const PADDUH: u8 = 0x14;
    pub const PSUBUH: u8 = 0x15;
    pub const PEXTUH: u8 = 0x16;
    pub const PADDUB: u8 = 0x18;
    pub const PSUBUB: u8 = 0x19;
    pub const PEXTUB: u8 = 0x1A;
    pub const QFSRV: u8 = 0x1B;

    // MMI2 sub-ops.
    pub const PMADDW: u8 = 0x00;
    pub const PSLLVW: u8 = 0x02;
    pub const PSRLVW: u8 = 0x03;
    pub const PMSUBW: u8 = 0x04;
    pub const PMFHI: u8 = 0x08;
    pub const PMFLO: u8 = 0x09;
    pub const PINTH: u8 = 0x0A;
    pub const PMULTW: u8 = 0x0C;
    pub const PDIVW: u8 = 0x0D;
    pub const PCPYLD: u8 = 0x0E;
    pub const PMADDH: u8 = 0x10;
    pub const PHMADH: u8 = 0x11;
    pub const PAND: u8 = 0x12;
    pub const PXOR: u8 = 0x13;
    pub const PMSUBH: u8 = 0x14;
    pub const PHMSBH: u8 = 0x15;
    pub const PEXEH: u8 = 0x1A;
    pub const PREVH: u8 = 0x1B;
    pub const PMULTH: u8 = 0x1C;
    pub const PDIVBW: u8 = 0x1D;
    pub const PEXEW: u8 = 0x1E;
    pub const PROT3W: u8 = 0x1F;

    // MMI3 sub-ops.
    pub const PMADDUW: u8 = 0x00;
    pub const PSRAVW: u8 = 0x03;
    pub const PMTHI: u8 = 0x08;
    pub const PMTLO: u8 = 0x09;
    pub const PINTEH: u8 = 0x0A;
    pub const PMULTUW: u8 = 0x0C;
    pub const PDIVUW: u8 = 0x0D;
    pub const PCPYUD: u8 = 0x0E;
    pub const POR: u8 = 0x12;
    pub const PNOR: u8 = 0x13;
    pub const PEXCH: u8 = 0x1A;
    pub const PCPYH: u8 = 0x1B;
    pub const PEXCW: u8 = 0x1E;

    // PMFHL sa field.
    pub const PMFHL_LW: u8 = 0x00;
    pub const PMFHL_UW: u8 = 0x01;
    pub const PMFHL_SLW: u8 = 0x02;
    pub const PMFHL_LH: u8 = 0x03;
    pub const PMFHL_SH: u8 = 0x04;
}

/// COP2 sub-fields: destination mask (bit 3 = x .. bit 0 = w), broadcast
/// lane, and the FSF/FTF lane selectors of VDIV-class encodings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VectorInfo {
    pub dest_mask: u8,
    pub bc: u8,
    pub fsf: u8,
    pub ftf: u8,
}

#[derive(Debug, Clone)]
pub struct Instruction {
    pub address: u32,
    pub raw: u32,
    pub opcode: u8,
    pub rs: u8,
    pub rt: u8,
    pub rd: u8,
    pub sa: u8,
    /// Function field; COP2 Special2 encodings are widened past
    /// `cop2::S2_BASE`.
    pub function: u16,
    pub immediate: u16,
    pub simmediate: i16,
    /// 26-bit jump index for J/JAL.
    pub target: u32,
    pub is_branch: bool,
    pub has_delay_slot: bool,
    pub is_mmi: bool,
    pub vector_info: VectorInfo,
}

/// Decode one word. Total: unknown encodings still produce a record, with
/// classification flags cleared.
pub fn decode(address: u32, raw: u32) -> Instruction {
    let opcode = ((raw >> 26) & 0x3F) as u8;
    let rs = ((raw >> 21) & 0x1F) as u8;
    let rt = ((raw >> 16) & 0x1F) as u8;
    let mut rd = ((raw >> 11) & 0x1F) as u8;
    let sa = ((raw >> 6) & 0x1F) as u8;
    let mut function = (raw & 0x3F) as u16;
    let immediate = (raw & 0xFFFF) as u16;
    let simmediate = immediate as i16;
    let target = raw & 0x03FF_FFFF;

    let mut vector_info = VectorInfo::default();
    let mut rs_out = rs;

    if opcode == op::COP2 {
        vector_info.dest_mask = ((raw >> 21) & 0xF) as u8;
        vector_info.fsf = ((raw >> 21) & 0x3) as u8;
        vector_info.ftf = ((raw >> 23) & 0x3) as u8;
        vector_info.bc = (raw & 0x3) as u8;
        if rs >= cop2::CO {
            // Macro-mode arithmetic reads its operands from the ft/fs/fd
            // slots; expose fs and fd through the regular register fields
            // (rt already carries ft).
            rs_out = rd; // fs
            rd = sa; // fd (also the id/imm5 slot for the integer ops)
            if function & 0x3C == 0x3C {
                // Special2: widen with bits [10:6].
                function = cop2::S2_BASE + ((raw & 0x3) | ((raw >> 4) & 0x7C)) as u16;
            }
        }
    }

    let (is_branch, has_delay_slot) = classify(opcode, rs, rt, function);

    Instruction {
        address,
        raw,
        opcode,
        rs: rs_out,
        rt,
        rd,
        sa,
        function,
        immediate,
        simmediate,
        target,
        is_branch,
        has_delay_slot,
        is_mmi: opcode == op::MMI,
        vector_info,
    }
}

fn classify(opcode: u8, rs: u8, rt: u8, function: u16) -> (bool, bool) {
    let branch = match opcode {
        op::J | op::JAL => true,
        op::SPECIAL => matches!(function, special::JR | special::JALR),
        op::BEQ | op::BNE | op::BLEZ | op::BGTZ => true,
        op::BEQL | op::BNEL | op::BLEZL | op::BGTZL => true,
        op::REGIMM => regimm::is_branch(rt),
        op::COP1 => rs == cop1::BC,
        op::COP2 => rs == cop2::BC,
        _ => false,
    };
    (branch, branch)
}

impl Instruction {
    /// Likely variants nullify the delay slot on a not-taken branch.
    pub fn is_likely(&self) -> bool {
        match self.opcode {
            op::BEQL | op::BNEL | op::BLEZL | op::BGTZL => true,
            op::REGIMM => matches!(
                self.rt,
                regimm::BLTZL | regimm::BGEZL | regimm::BLTZALL | regimm::BGEZALL
            ),
            op::COP1 | op::COP2 if self.is_branch => {
                matches!(self.rt & 0x3, cop1::BC_BCFL | cop1::BC_BCTL)
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_preserves_raw_and_is_deterministic() {
        for &raw in &[0u32, 0x2402_0003, 0x0C04_0000, 0x7000_0000, 0xFFFF_FFFF] {
            let a = decode(0x1000, raw);
            let b = decode(0x1000, raw);
            assert_eq!(a.raw, raw);
            assert_eq!(a.raw, b.raw);
            assert_eq!(a.is_branch, b.is_branch);
        }
    }

    #[test]
    fn field_extraction() {
        // addiu $3, $2, -1
        let inst = decode(0, 0x2443_FFFF);
        assert_eq!(inst.opcode, op::ADDIU);
        assert_eq!(inst.rs, 2);
        assert_eq!(inst.rt, 3);
        assert_eq!(inst.simmediate, -1);
        assert_eq!(inst.immediate, 0xFFFF);
        assert!(!inst.is_branch);

        // jal 0x100100 => target index 0x40040
        let inst = decode(0x0010_0000, 0x0C04_0040);
        assert_eq!(inst.opcode, op::JAL);
        assert_eq!(inst.target, 0x0004_0040);
        assert!(inst.is_branch && inst.has_delay_slot);
    }

    #[test]
    fn branch_classification() {
        // beq $2, $0, +2
        let beq = decode(0, 0x1040_0002);
        assert!(beq.is_branch && beq.has_delay_slot && !beq.is_likely());
        // beql
        let beql = decode(0, 0x5040_0002);
        assert!(beql.is_branch && beql.is_likely());
        // jr $ra
        let jr = decode(0, 0x03E0_0008);
        assert!(jr.is_branch && jr.has_delay_slot);
        // bltzal $4
        let bltzal = decode(0, 0x0490_0001);
        assert_eq!(bltzal.opcode, op::REGIMM);
        assert_eq!(bltzal.rt, regimm::BLTZAL);
        assert!(bltzal.is_branch);
        // teqi $4, 0 is REGIMM but not a branch
        let teqi = decode(0, 0x048C_0000);
        assert!(!teqi.is_branch && !teqi.has_delay_slot);
        // bc1t
        let bc1t = decode(0, 0x4501_0001);
        assert!(bc1t.is_branch && !bc1t.is_likely());
        // bc1tl
        let bc1tl = decode(0, 0x4503_0001);
        assert!(bc1tl.is_branch && bc1tl.is_likely());
        // bc2fl
        let bc2fl = decode(0, 0x4902_0001);
        assert!(bc2fl.is_branch && bc2fl.is_likely());
        // syscall is not a branch
        let syscall = decode(0, 0x0000_000C);
        assert!(!syscall.is_branch);
    }

    #[test]
    fn mmi_flags_and_subop() {
        // paddw $1, $2, $3: MMI | rs=2 | rt=3 | rd=1 | sa=PADDW | MMI0
        let raw = (0x1Cu32 << 26) | (2 << 21) | (3 << 16) | (1 << 11) | ((mmi::PADDW as u32) << 6) | mmi::MMI0 as u32;
        let inst = decode(0, raw);
        assert!(inst.is_mmi);
        assert_eq!(inst.function, mmi::MMI0);
        assert_eq!(inst.sa, mmi::PADDW);
        assert!(!inst.has_delay_slot);
    }

    #[test]
    fn cop2_macro_field_remap() {
        // vadd.xyzw vf1, vf2, vf3: COP2|CO, dest=0xF, ft=3, fs=2, fd=1
        let raw = (0x12u32 << 26) | (1 << 25) | (0xF << 21) | (3 << 16) | (2 << 11) | (1 << 6) | cop2::VADD as u32;
        let inst = decode(0, raw);
        assert_eq!(inst.vector_info.dest_mask, 0xF);
        assert_eq!(inst.rt, 3); // ft
        assert_eq!(inst.rs, 2); // fs
        assert_eq!(inst.rd, 1); // fd
        assert!(!inst.is_branch, "VU transfers are not MIPS branches");

        // vdiv Q, vf4x, vf5y: Special2 widening
        let raw = (0x12u32 << 26) | (1 << 25) | (0x1 << 23) | (0x0 << 21) | (5 << 16) | (4 << 11) | 0x3BCu32;
        let inst = decode(0, raw);
        assert_eq!(inst.function, cop2::VDIV);
        assert_eq!(inst.vector_info.ftf, 1);
        assert_eq!(inst.vector_info.fsf, 0);
    }

    #[test]
    fn vcallms_has_no_delay_slot() {
        let raw = (0x12u32 << 26) | (1 << 25) | (0x100 << 6) | cop2::VCALLMS as u32;
        let inst = decode(0, raw);
        assert_eq!(inst.function, cop2::VCALLMS);
        assert!(!inst.has_delay_slot && !inst.is_branch);
    }
}
