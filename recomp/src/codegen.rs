// Code generation: one Rust function per guest function.
//
// Instructions translate to statements over the runtime operators; a branch
// and its delay slot are consumed as one unit. Functions with internal
// branch targets are wrapped in a per-function dispatch loop
//
//     let mut block: u32 = <start>;
//     loop { match block { 0x<label> => { ... } ... } }
//
// and a jump to an internal label becomes `block = <label>; continue;`. A
// branch target that lands on a delay-slot instruction aliases the arm of
// its branch, so the composed branch code is what the jump reaches.
// Straight-line functions are emitted flat.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt::Write;

use crate::analysis::{absolute_jump_target, collect_internal_targets, relative_branch_target};
use crate::decoder::{cop0, cop1, cop2, mmi, op, regimm, special, Instruction};
use crate::elf::{Function, Symbol};

#[derive(Debug, Clone, Default)]
pub struct BootstrapInfo {
    pub valid: bool,
    pub entry: u32,
    pub bss_start: u32,
    pub bss_end: u32,
    pub gp: u32,
    pub entry_name: String,
}

pub struct CodeGenerator {
    symbols: HashMap<u32, Symbol>,
    renames: HashMap<u32, String>,
    bootstrap: BootstrapInfo,
}

impl CodeGenerator {
    pub fn new(symbols: &[Symbol]) -> Self {
        let mut map = HashMap::new();
        for s in symbols {
            // Function symbols win the address on ties.
            map.entry(s.address)
                .and_modify(|existing: &mut Symbol| {
                    if s.is_function && !existing.is_function {
                        *existing = s.clone();
                    }
                })
                .or_insert_with(|| s.clone());
        }
        CodeGenerator {
            symbols: map,
            renames: HashMap::new(),
            bootstrap: BootstrapInfo::default(),
        }
    }

    pub fn set_renames(&mut self, renames: HashMap<u32, String>) {
        self.renames = renames;
    }

    pub fn set_bootstrap(&mut self, bootstrap: BootstrapInfo) {
        self.bootstrap = bootstrap;
    }

    /// Final identifier for a guest address, if it names a function we emit
    /// or a known function symbol.
    pub fn function_name(&self, address: u32) -> Option<String> {
        if let Some(name) = self.renames.get(&address) {
            return Some(name.clone());
        }
        self.symbols
            .get(&address)
            .filter(|s| s.is_function)
            .map(|s| crate::names::sanitize(&s.name))
            .filter(|n| !n.is_empty())
    }

    /// Shared prologue for every generated source file.
    pub fn file_prologue(multi_file: bool) -> String {
        let mut out = String::from(
            "//! Generated by ps2recomp. Do not edit.\n\
             #![allow(non_snake_case)]\n\n\
             #[allow(unused_imports)]\n\
             use ps2_runtime::memory::*;\n\
             #[allow(unused_imports)]\n\
             use ps2_runtime::ops::*;\n\
             #[allow(unused_imports)]\n\
             use ps2_runtime::{Exception, PS2Runtime, R5900Context};\n",
        );
        if multi_file {
            out.push_str("#[allow(unused_imports)]\nuse super::*;\n");
        }
        out.push('\n');
        out
    }

    // -----------------------------------------------------------------------
    // Function emission
    // -----------------------------------------------------------------------

    pub fn generate_function(&self, function: &Function, instructions: &[Instruction]) -> String {
        let name = self
            .function_name(function.start)
            .unwrap_or_else(|| format!("func_{:x}", function.start));

        // Guest functions carrying a kernel-call name delegate to the
        // runtime entry of that name regardless of their body.
        if ps2_runtime::syscalls::is_syscall_name(&function.name) {
            return format!(
                "// System call wrapper for {orig}\n\
                 pub fn {name}(rdram: &mut [u8], ctx: &mut R5900Context, runtime: &mut PS2Runtime) {{\n    \
                 ps2_runtime::syscalls::{orig}(rdram, ctx, runtime);\n}}\n",
                orig = function.name,
            );
        }

        let targets = collect_internal_targets(function, instructions);

        // Arm boundaries: internal targets plus the entry, with targets that
        // land on a delay slot folded back onto their branch.
        let first = instructions[0].address;
        let mut arm_starts: BTreeSet<u32> = targets.clone().into_iter().collect();
        arm_starts.insert(first);
        let mut alias: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
        let mut i = 0;
        while i < instructions.len() {
            let inst = &instructions[i];
            if inst.has_delay_slot && i + 1 < instructions.len() {
                let d = instructions[i + 1].address;
                if targets.contains(&d) {
                    arm_starts.remove(&d);
                    arm_starts.insert(inst.address);
                    alias.entry(inst.address).or_default().push(d);
                }
                i += 2;
                continue;
            }
            i += 1;
        }

        let multi = !targets.is_empty();
        let indent = if multi { "                " } else { "    " };

        let mut out = String::new();
        let _ = writeln!(out, "// Function: {}", function.name);
        let _ = writeln!(
            out,
            "// Address: {:#x} - {:#x}",
            function.start, function.end
        );
        let _ = writeln!(out, "#[allow(unreachable_code, unused_variables)]");
        let _ = writeln!(
            out,
            "pub fn {name}(rdram: &mut [u8], ctx: &mut R5900Context, runtime: &mut PS2Runtime) {{"
        );
        if multi {
            let _ = writeln!(out, "    let mut block: u32 = {first:#x};");
            let _ = writeln!(out, "    loop {{");
            let _ = writeln!(out, "        match block {{");
        }

        let mut i = 0;
        let mut open = true;
        let mut in_arm = false;
        while i < instructions.len() {
            let inst = &instructions[i];

            if multi && arm_starts.contains(&inst.address) {
                if in_arm {
                    if open {
                        let _ = writeln!(out, "{indent}block = {:#x};", inst.address);
                        let _ = writeln!(out, "{indent}continue;");
                    }
                    let _ = writeln!(out, "            }}");
                }
                let mut patterns = vec![format!("{:#x}", inst.address)];
                if let Some(extra) = alias.get(&inst.address) {
                    patterns.extend(extra.iter().map(|a| format!("{a:#x}")));
                }
                let _ = writeln!(out, "            {} => {{", patterns.join(" | "));
                in_arm = true;
                open = true;
            }

            let _ = writeln!(out, "{indent}// {:#x}: {:#010x}", inst.address, inst.raw);

            if inst.has_delay_slot && i + 1 < instructions.len() {
                let delay = &instructions[i + 1];
                self.emit_branch_with_delay(
                    &mut out, indent, inst, delay, &targets, multi, &mut open,
                );
                i += 2;
                continue;
            }

            let (text, diverges) = self.translate(inst);
            let _ = writeln!(out, "{indent}{text}");
            if diverges {
                open = false;
            }
            i += 1;
        }

        if multi {
            if open {
                let _ = writeln!(out, "{indent}return;");
            }
            let _ = writeln!(out, "            }}");
            let _ = writeln!(out, "            _ => unreachable!(),");
            let _ = writeln!(out, "        }}");
            let _ = writeln!(out, "    }}");
        }
        let _ = writeln!(out, "}}");
        out
    }

    /// A branch and its delay slot, composed per the MIPS rules: conditions
    /// read the context before the delay slot runs; likely variants execute
    /// the slot only on a taken branch.
    #[allow(clippy::too_many_arguments)]
    fn emit_branch_with_delay(
        &self,
        out: &mut String,
        indent: &str,
        branch: &Instruction,
        delay: &Instruction,
        targets: &HashSet<u32>,
        multi: bool,
        open: &mut bool,
    ) {
        let delay_code = if delay.raw != 0 {
            Some(self.translate(delay).0)
        } else {
            None
        };

        if branch.opcode == op::J || branch.opcode == op::JAL {
            if branch.opcode == op::JAL {
                let _ = writeln!(
                    out,
                    "{indent}set_gpr_u32(ctx, 31, {:#x});",
                    branch.address.wrapping_add(8)
                );
            }
            if let Some(code) = &delay_code {
                let _ = writeln!(out, "{indent}{code}");
            }
            let target = absolute_jump_target(branch.address, branch.target);
            if multi && targets.contains(&target) {
                let _ = writeln!(out, "{indent}block = {target:#x};");
                let _ = writeln!(out, "{indent}continue;");
                *open = false;
            } else if let Some(name) = self.function_name(target) {
                let _ = writeln!(out, "{indent}{name}(rdram, ctx, runtime);");
                if branch.opcode == op::J {
                    let _ = writeln!(out, "{indent}return;");
                    *open = false;
                }
            } else {
                let _ = writeln!(out, "{indent}ctx.pc = {target:#x};");
                let _ = writeln!(out, "{indent}return;");
                *open = false;
            }
            return;
        }

        if branch.opcode == op::SPECIAL
            && matches!(branch.function, special::JR | special::JALR)
        {
            if branch.function == special::JALR {
                let link = if branch.rd == 0 { 31 } else { branch.rd };
                let _ = writeln!(
                    out,
                    "{indent}set_gpr_u32(ctx, {link}, {:#x});",
                    branch.address.wrapping_add(8)
                );
            }
            if let Some(code) = &delay_code {
                let _ = writeln!(out, "{indent}{code}");
            }
            let _ = writeln!(out, "{indent}ctx.pc = gpr_u32(ctx, {});", branch.rs);
            let _ = writeln!(out, "{indent}return;");
            *open = false;
            return;
        }

        if let Some((cond, link)) = self.branch_condition(branch) {
            let target = relative_branch_target(branch);
            let action: Vec<String> = if multi && targets.contains(&target) {
                vec![format!("block = {target:#x};"), "continue;".to_string()]
            } else if let Some(name) = self.function_name(target) {
                vec![
                    format!("{name}(rdram, ctx, runtime);"),
                    "return;".to_string(),
                ]
            } else {
                vec![format!("ctx.pc = {target:#x};"), "return;".to_string()]
            };

            let _ = writeln!(out, "{indent}let cond = {cond};");
            if let Some(link) = link {
                let _ = writeln!(out, "{indent}{link}");
            }
            if branch.is_likely() {
                let _ = writeln!(out, "{indent}if cond {{");
                if let Some(code) = &delay_code {
                    let _ = writeln!(out, "{indent}    {code}");
                }
                for stmt in &action {
                    let _ = writeln!(out, "{indent}    {stmt}");
                }
                let _ = writeln!(out, "{indent}}}");
            } else {
                if let Some(code) = &delay_code {
                    let _ = writeln!(out, "{indent}{code}");
                }
                let _ = writeln!(out, "{indent}if cond {{");
                for stmt in &action {
                    let _ = writeln!(out, "{indent}    {stmt}");
                }
                let _ = writeln!(out, "{indent}}}");
            }
            return;
        }

        // Flagged with a delay slot but not a form we compose; emit both in
        // order.
        let (text, diverges) = self.translate(branch);
        let _ = writeln!(out, "{indent}{text}");
        if let Some(code) = &delay_code {
            let _ = writeln!(out, "{indent}{code}");
        }
        if diverges {
            *open = false;
        }
    }

    fn branch_condition(&self, inst: &Instruction) -> Option<(String, Option<String>)> {
        let rs = inst.rs;
        let rt = inst.rt;
        let link = format!(
            "set_gpr_u32(ctx, 31, {:#x});",
            inst.address.wrapping_add(8)
        );
        match inst.opcode {
            op::BEQ | op::BEQL => Some((
                format!("gpr_u32(ctx, {rs}) == gpr_u32(ctx, {rt})"),
                None,
            )),
            op::BNE | op::BNEL => Some((
                format!("gpr_u32(ctx, {rs}) != gpr_u32(ctx, {rt})"),
                None,
            )),
            op::BLEZ | op::BLEZL => Some((format!("gpr_s32(ctx, {rs}) <= 0"), None)),
            op::BGTZ | op::BGTZL => Some((format!("gpr_s32(ctx, {rs}) > 0"), None)),
            op::REGIMM => match rt {
                regimm::BLTZ | regimm::BLTZL => {
                    Some((format!("gpr_s32(ctx, {rs}) < 0"), None))
                }
                regimm::BGEZ | regimm::BGEZL => {
                    Some((format!("gpr_s32(ctx, {rs}) >= 0"), None))
                }
                regimm::BLTZAL | regimm::BLTZALL => {
                    Some((format!("gpr_s32(ctx, {rs}) < 0"), Some(link)))
                }
                regimm::BGEZAL | regimm::BGEZALL => {
                    Some((format!("gpr_s32(ctx, {rs}) >= 0"), Some(link)))
                }
                _ => None,
            },
            op::COP1 if inst.rs == cop1::BC => {
                let set = matches!(rt & 0x3, cop1::BC_BCT | cop1::BC_BCTL);
                Some((
                    if set {
                        "(ctx.fcr31 & 0x0080_0000) != 0".to_string()
                    } else {
                        "(ctx.fcr31 & 0x0080_0000) == 0".to_string()
                    },
                    None,
                ))
            }
            op::COP2 if inst.rs == cop2::BC => {
                let set = matches!(rt & 0x3, cop2::BC_BCT | cop2::BC_BCTL);
                Some((
                    if set {
                        "(ctx.vu0_status & 0x1) != 0".to_string()
                    } else {
                        "(ctx.vu0_status & 0x1) == 0".to_string()
                    },
                    None,
                ))
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // Per-instruction translation
    // -----------------------------------------------------------------------

    /// One instruction as a Rust statement. The bool reports whether the
    /// statement unconditionally leaves the function (ERET).
    pub fn translate(&self, inst: &Instruction) -> (String, bool) {
        if inst.is_mmi {
            return (self.translate_mmi(inst), false);
        }
        match inst.opcode {
            op::SPECIAL => (self.translate_special(inst), false),
            op::REGIMM => (self.translate_regimm(inst), false),
            op::COP0 => self.translate_cop0(inst),
            op::COP1 => (self.translate_cop1(inst), false),
            op::COP2 => (self.translate_cop2(inst), false),
            _ => (self.translate_normal(inst), false),
        }
    }

    fn translate_normal(&self, inst: &Instruction) -> String {
        let rs = inst.rs;
        let rt = inst.rt;
        let imm = inst.immediate;
        let simm = inst.simmediate;
        let addr = addr_expr(rs, simm);
        match inst.opcode {
            op::ADDI => {
                if rt == 0 {
                    return "// nop (addi to $zero)".to_string();
                }
                format!(
                    "if runtime.check_overflow {{ let (res, ov) = add32_ov(gpr_u32(ctx, {rs}), {simm}i32 as u32); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s32(ctx, {rt}, res as i32); }} }} else {{ set_gpr_s32(ctx, {rt}, gpr_u32(ctx, {rs}).wrapping_add({simm}i32 as u32) as i32); }}"
                )
            }
            op::ADDIU => {
                if rt == 0 {
                    return "// nop (addiu to $zero)".to_string();
                }
                format!(
                    "set_gpr_s32(ctx, {rt}, gpr_u32(ctx, {rs}).wrapping_add({simm}i32 as u32) as i32);"
                )
            }
            op::SLTI => format!(
                "set_gpr_u32(ctx, {rt}, (gpr_s32(ctx, {rs}) < {simm}) as u32);"
            ),
            op::SLTIU => format!(
                "set_gpr_u32(ctx, {rt}, (gpr_u32(ctx, {rs}) < {imm:#x}) as u32);"
            ),
            op::ANDI => format!("set_gpr_u32(ctx, {rt}, gpr_u32(ctx, {rs}) & {imm:#x});"),
            op::ORI => format!("set_gpr_u32(ctx, {rt}, gpr_u32(ctx, {rs}) | {imm:#x});"),
            op::XORI => format!("set_gpr_u32(ctx, {rt}, gpr_u32(ctx, {rs}) ^ {imm:#x});"),
            op::LUI => format!("set_gpr_u32(ctx, {rt}, {imm:#x}u32 << 16);"),
            op::DADDI => format!(
                "if runtime.check_overflow {{ let (res, ov) = add64_ov(gpr_u64(ctx, {rs}), {simm}i64 as u64); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s64(ctx, {rt}, res as i64); }} }} else {{ set_gpr_s64(ctx, {rt}, gpr_s64(ctx, {rs}).wrapping_add({simm})); }}"
            ),
            op::DADDIU => format!(
                "set_gpr_s64(ctx, {rt}, gpr_s64(ctx, {rs}).wrapping_add({simm}));"
            ),
            op::LB => format!(
                "set_gpr_s32(ctx, {rt}, read8(rdram, {addr}) as i8 as i32);"
            ),
            op::LH => format!(
                "set_gpr_s32(ctx, {rt}, read16(rdram, {addr}) as i16 as i32);"
            ),
            op::LW | op::LWU => format!("set_gpr_u32(ctx, {rt}, read32(rdram, {addr}));"),
            op::LBU => format!("set_gpr_u32(ctx, {rt}, read8(rdram, {addr}) as u32);"),
            op::LHU => format!("set_gpr_u32(ctx, {rt}, read16(rdram, {addr}) as u32);"),
            op::LD => format!("set_gpr_u64(ctx, {rt}, read64(rdram, {addr}));"),
            op::LQ => format!("set_gpr_vec(ctx, {rt}, read128(rdram, {addr}));"),
            op::SB => format!("write8(rdram, {addr}, gpr_u32(ctx, {rt}) as u8);"),
            op::SH => format!("write16(rdram, {addr}, gpr_u32(ctx, {rt}) as u16);"),
            op::SW => format!("write32(rdram, {addr}, gpr_u32(ctx, {rt}));"),
            op::SD => format!("write64(rdram, {addr}, gpr_u64(ctx, {rt}));"),
            op::SQ => format!("write128(rdram, {addr}, gpr_vec(ctx, {rt}));"),
            op::LWC1 => format!(
                "ctx.f[{rt}] = f32::from_bits(read32(rdram, {addr}));"
            ),
            op::SWC1 => format!("write32(rdram, {addr}, ctx.f[{rt}].to_bits());"),
            op::LDC2 => format!(
                "ctx.vu0_vf[{rt}] = vf_from_bits(read128(rdram, {addr}));"
            ),
            op::SDC2 => format!(
                "write128(rdram, {addr}, vf_to_bits(ctx.vu0_vf[{rt}]));"
            ),
            op::LWL => format!(
                "{{ let addr = {addr}; let shift = ((!addr) & 3) << 3; let mask = 0xFFFF_FFFFu32 >> shift; let word = read32(rdram, addr & !3); set_gpr_u32(ctx, {rt}, (gpr_u32(ctx, {rt}) & !mask) | ((word >> shift) & mask)); }}"
            ),
            op::LWR => format!(
                "{{ let addr = {addr}; let shift = (addr & 3) << 3; let mask = 0xFFFF_FFFFu32 << shift; let word = read32(rdram, addr & !3); set_gpr_u32(ctx, {rt}, (gpr_u32(ctx, {rt}) & !mask) | (word << shift)); }}"
            ),
            op::SWL => format!(
                "{{ let addr = {addr}; let shift = (addr & 3) << 3; let mask = 0xFFFF_FFFFu32 << shift; let aligned = addr & !3; let old = read32(rdram, aligned); write32(rdram, aligned, (old & !mask) | (gpr_u32(ctx, {rt}) & mask)); }}"
            ),
            op::SWR => format!(
                "{{ let addr = {addr}; let shift = ((!addr) & 3) << 3; let mask = 0xFFFF_FFFFu32 >> shift; let aligned = addr & !3; let old = read32(rdram, aligned); write32(rdram, aligned, (old & !mask) | (gpr_u32(ctx, {rt}) & mask)); }}"
            ),
            op::LDL => format!(
                "{{ let addr = {addr}; let shift = (addr & 7) << 3; let mask = 0xFFFF_FFFF_FFFF_FFFFu64 << shift; let dword = read64(rdram, addr & !7); set_gpr_u64(ctx, {rt}, (gpr_u64(ctx, {rt}) & !mask) | (dword & mask)); }}"
            ),
            op::LDR => format!(
                "{{ let addr = {addr}; let shift = ((!addr) & 7) << 3; let mask = 0xFFFF_FFFF_FFFF_FFFFu64 >> shift; let dword = read64(rdram, addr & !7); set_gpr_u64(ctx, {rt}, (gpr_u64(ctx, {rt}) & !mask) | (dword & mask)); }}"
            ),
            op::SDL => format!(
                "{{ let addr = {addr}; let shift = (addr & 7) << 3; let mask = 0xFFFF_FFFF_FFFF_FFFFu64 << shift; let aligned = addr & !7; let old = read64(rdram, aligned); write64(rdram, aligned, (old & !mask) | (gpr_u64(ctx, {rt}) & mask)); }}"
            ),
            op::SDR => format!(
                "{{ let addr = {addr}; let shift = ((!addr) & 7) << 3; let mask = 0xFFFF_FFFF_FFFF_FFFFu64 >> shift; let aligned = addr & !7; let old = read64(rdram, aligned); write64(rdram, aligned, (old & !mask) | (gpr_u64(ctx, {rt}) & mask)); }}"
            ),
            op::J => format!(
                "// j {:#x} (handled by branch composition)",
                absolute_jump_target(inst.address, inst.target)
            ),
            op::JAL => format!(
                "// jal {:#x} (handled by branch composition)",
                absolute_jump_target(inst.address, inst.target)
            ),
            op::BEQ | op::BNE | op::BLEZ | op::BGTZ | op::BEQL | op::BNEL | op::BLEZL
            | op::BGTZL => format!(
                "// branch at {:#x} (handled by branch composition)",
                inst.address
            ),
            op::CACHE => "// cache (ignored)".to_string(),
            op::PREF => "// pref (ignored)".to_string(),
            _ => format!("// unhandled opcode {:#04x}", inst.opcode),
        }
    }

    fn translate_special(&self, inst: &Instruction) -> String {
        let rs = inst.rs;
        let rt = inst.rt;
        let rd = inst.rd;
        let sa = inst.sa;
        match inst.function {
            special::SLL => {
                if rd == 0 {
                    return "// nop".to_string();
                }
                format!("set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rt}) << {sa});")
            }
            special::SRL => format!("set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rt}) >> {sa});"),
            special::SRA => format!("set_gpr_s32(ctx, {rd}, gpr_s32(ctx, {rt}) >> {sa});"),
            special::SLLV => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rt}) << (gpr_u32(ctx, {rs}) & 0x1F));"
            ),
            special::SRLV => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rt}) >> (gpr_u32(ctx, {rs}) & 0x1F));"
            ),
            special::SRAV => format!(
                "set_gpr_s32(ctx, {rd}, gpr_s32(ctx, {rt}) >> (gpr_u32(ctx, {rs}) & 0x1F));"
            ),
            special::JR => format!("// jr ${rs} (handled by branch composition)"),
            special::JALR => format!("// jalr ${rd}, ${rs} (handled by branch composition)"),
            special::SYSCALL => "runtime.handle_syscall(rdram, ctx);".to_string(),
            special::BREAK => "runtime.handle_break(rdram, ctx);".to_string(),
            special::SYNC => "// sync (no barrier needed in recompiled code)".to_string(),
            special::MFHI => format!("set_gpr_u32(ctx, {rd}, ctx.hi);"),
            special::MTHI => format!("ctx.hi = gpr_u32(ctx, {rs});"),
            special::MFLO => format!("set_gpr_u32(ctx, {rd}, ctx.lo);"),
            special::MTLO => format!("ctx.lo = gpr_u32(ctx, {rs});"),
            special::MFSA => format!("set_gpr_u32(ctx, {rd}, ctx.sa);"),
            special::MTSA => format!("ctx.sa = gpr_u32(ctx, {rs}) & 0x1F;"),
            special::MULT => format!(
                "{{ let result = (gpr_s32(ctx, {rs}) as i64) * (gpr_s32(ctx, {rt}) as i64); ctx.lo = result as u32; ctx.hi = (result >> 32) as u32; }}"
            ),
            special::MULTU => format!(
                "{{ let result = (gpr_u32(ctx, {rs}) as u64) * (gpr_u32(ctx, {rt}) as u64); ctx.lo = result as u32; ctx.hi = (result >> 32) as u32; }}"
            ),
            special::DIV => format!(
                "{{ let divisor = gpr_s32(ctx, {rt}); if divisor != 0 {{ ctx.lo = gpr_s32(ctx, {rs}).wrapping_div(divisor) as u32; ctx.hi = gpr_s32(ctx, {rs}).wrapping_rem(divisor) as u32; }} else {{ ctx.lo = if gpr_s32(ctx, {rs}) < 0 {{ 1 }} else {{ 0xFFFF_FFFF }}; ctx.hi = gpr_s32(ctx, {rs}) as u32; }} }}"
            ),
            special::DIVU => format!(
                "{{ let divisor = gpr_u32(ctx, {rt}); if divisor != 0 {{ ctx.lo = gpr_u32(ctx, {rs}) / divisor; ctx.hi = gpr_u32(ctx, {rs}) % divisor; }} else {{ ctx.lo = 0xFFFF_FFFF; ctx.hi = gpr_u32(ctx, {rs}); }} }}"
            ),
            special::ADD => format!(
                "if runtime.check_overflow {{ let (res, ov) = add32_ov(gpr_u32(ctx, {rs}), gpr_u32(ctx, {rt})); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s32(ctx, {rd}, res as i32); }} }} else {{ set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}).wrapping_add(gpr_u32(ctx, {rt}))); }}"
            ),
            special::ADDU => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}).wrapping_add(gpr_u32(ctx, {rt})));"
            ),
            special::SUB => format!(
                "if runtime.check_overflow {{ let (res, ov) = sub32_ov(gpr_u32(ctx, {rs}), gpr_u32(ctx, {rt})); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s32(ctx, {rd}, res as i32); }} }} else {{ set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}).wrapping_sub(gpr_u32(ctx, {rt}))); }}"
            ),
            special::SUBU => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}).wrapping_sub(gpr_u32(ctx, {rt})));"
            ),
            special::AND => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}) & gpr_u32(ctx, {rt}));"
            ),
            special::OR => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}) | gpr_u32(ctx, {rt}));"
            ),
            special::XOR => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}) ^ gpr_u32(ctx, {rt}));"
            ),
            special::NOR => format!(
                "set_gpr_u32(ctx, {rd}, !(gpr_u32(ctx, {rs}) | gpr_u32(ctx, {rt})));"
            ),
            special::SLT => format!(
                "set_gpr_u32(ctx, {rd}, (gpr_s32(ctx, {rs}) < gpr_s32(ctx, {rt})) as u32);"
            ),
            special::SLTU => format!(
                "set_gpr_u32(ctx, {rd}, (gpr_u32(ctx, {rs}) < gpr_u32(ctx, {rt})) as u32);"
            ),
            special::MOVZ => format!(
                "if gpr_u32(ctx, {rt}) == 0 {{ set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs})); }}"
            ),
            special::MOVN => format!(
                "if gpr_u32(ctx, {rt}) != 0 {{ set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs})); }}"
            ),
            special::DADD => format!(
                "if runtime.check_overflow {{ let (res, ov) = add64_ov(gpr_u64(ctx, {rs}), gpr_u64(ctx, {rt})); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s64(ctx, {rd}, res as i64); }} }} else {{ set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rs}).wrapping_add(gpr_u64(ctx, {rt}))); }}"
            ),
            special::DADDU => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rs}).wrapping_add(gpr_u64(ctx, {rt})));"
            ),
            special::DSUB => format!(
                "if runtime.check_overflow {{ let (res, ov) = sub64_ov(gpr_u64(ctx, {rs}), gpr_u64(ctx, {rt})); if ov {{ runtime.signal_exception(ctx, Exception::IntegerOverflow); }} else {{ set_gpr_s64(ctx, {rd}, res as i64); }} }} else {{ set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rs}).wrapping_sub(gpr_u64(ctx, {rt}))); }}"
            ),
            special::DSUBU => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rs}).wrapping_sub(gpr_u64(ctx, {rt})));"
            ),
            special::DSLL => format!("set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) << {sa});"),
            special::DSRL => format!("set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) >> {sa});"),
            special::DSRA => format!("set_gpr_s64(ctx, {rd}, gpr_s64(ctx, {rt}) >> {sa});"),
            special::DSLLV => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) << (gpr_u32(ctx, {rs}) & 0x3F));"
            ),
            special::DSRLV => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) >> (gpr_u32(ctx, {rs}) & 0x3F));"
            ),
            special::DSRAV => format!(
                "set_gpr_s64(ctx, {rd}, gpr_s64(ctx, {rt}) >> (gpr_u32(ctx, {rs}) & 0x3F));"
            ),
            special::DSLL32 => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) << {});",
                32 + sa as u32
            ),
            special::DSRL32 => format!(
                "set_gpr_u64(ctx, {rd}, gpr_u64(ctx, {rt}) >> {});",
                32 + sa as u32
            ),
            special::DSRA32 => format!(
                "set_gpr_s64(ctx, {rd}, gpr_s64(ctx, {rt}) >> {});",
                32 + sa as u32
            ),
            special::TGE => format!(
                "if gpr_s32(ctx, {rs}) >= gpr_s32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            special::TGEU => format!(
                "if gpr_u32(ctx, {rs}) >= gpr_u32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            special::TLT => format!(
                "if gpr_s32(ctx, {rs}) < gpr_s32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            special::TLTU => format!(
                "if gpr_u32(ctx, {rs}) < gpr_u32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            special::TEQ => format!(
                "if gpr_u32(ctx, {rs}) == gpr_u32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            special::TNE => format!(
                "if gpr_u32(ctx, {rs}) != gpr_u32(ctx, {rt}) {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            _ => format!("// unhandled special function {:#04x}", inst.function),
        }
    }

    fn translate_regimm(&self, inst: &Instruction) -> String {
        let rs = inst.rs;
        let simm = inst.simmediate;
        match inst.rt {
            rt if regimm::is_branch(rt) => format!(
                "// regimm branch to {:#x} (handled by branch composition)",
                relative_branch_target(inst)
            ),
            regimm::MTSAB => format!(
                "ctx.sa = (gpr_u32(ctx, {rs}).wrapping_add({simm}i32 as u32)) & 0xF;"
            ),
            regimm::MTSAH => format!(
                "ctx.sa = ((gpr_u32(ctx, {rs}).wrapping_add({simm}i32 as u32)) & 0x7) << 1;"
            ),
            regimm::TGEI => format!(
                "if gpr_s32(ctx, {rs}) >= {simm} {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            regimm::TGEIU => format!(
                "if gpr_u32(ctx, {rs}) >= {simm}i32 as u32 {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            regimm::TLTI => format!(
                "if gpr_s32(ctx, {rs}) < {simm} {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            regimm::TLTIU => format!(
                "if gpr_u32(ctx, {rs}) < {simm}i32 as u32 {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            regimm::TEQI => format!(
                "if gpr_s32(ctx, {rs}) == {simm} {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            regimm::TNEI => format!(
                "if gpr_s32(ctx, {rs}) != {simm} {{ runtime.handle_trap(rdram, ctx); }}"
            ),
            _ => format!("// unhandled regimm rt {:#04x}", inst.rt),
        }
    }

    fn translate_cop0(&self, inst: &Instruction) -> (String, bool) {
        let rt = inst.rt;
        let rd = inst.rd;
        match inst.rs {
            cop0::MF => {
                let text = match rd {
                    cop0::REG_INDEX => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_index);"),
                    cop0::REG_RANDOM => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_random);"),
                    cop0::REG_ENTRYLO0 => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_entrylo0);"),
                    cop0::REG_ENTRYLO1 => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_entrylo1);"),
                    cop0::REG_CONTEXT => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_context);"),
                    cop0::REG_PAGEMASK => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_pagemask);"),
                    cop0::REG_WIRED => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_wired);"),
                    cop0::REG_BADVADDR => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_badvaddr);"),
                    cop0::REG_COUNT => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_count);"),
                    cop0::REG_ENTRYHI => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_entryhi);"),
                    cop0::REG_COMPARE => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_compare);"),
                    cop0::REG_STATUS => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_status);"),
                    cop0::REG_CAUSE => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_cause);"),
                    cop0::REG_EPC => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_epc);"),
                    cop0::REG_PRID => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_prid);"),
                    cop0::REG_CONFIG => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_config);"),
                    cop0::REG_BADPADDR => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_badpaddr);"),
                    cop0::REG_DEBUG => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_debug);"),
                    cop0::REG_PERF => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_perf);"),
                    cop0::REG_TAGLO => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_taglo);"),
                    cop0::REG_TAGHI => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_taghi);"),
                    cop0::REG_ERROREPC => format!("set_gpr_u32(ctx, {rt}, ctx.cop0_errorepc);"),
                    _ => format!("set_gpr_u32(ctx, {rt}, 0); // unimplemented cop0 reg {rd}"),
                };
                (text, false)
            }
            cop0::MT => {
                let text = match rd {
                    cop0::REG_INDEX => format!("ctx.cop0_index = gpr_u32(ctx, {rt}) & 0x3F;"),
                    cop0::REG_RANDOM => "// mtc0 to RANDOM ignored (read-only)".to_string(),
                    cop0::REG_ENTRYLO0 => {
                        format!("ctx.cop0_entrylo0 = gpr_u32(ctx, {rt}) & 0x3FFF_FFFF;")
                    }
                    cop0::REG_ENTRYLO1 => {
                        format!("ctx.cop0_entrylo1 = gpr_u32(ctx, {rt}) & 0x3FFF_FFFF;")
                    }
                    cop0::REG_CONTEXT => format!(
                        "ctx.cop0_context = (ctx.cop0_context & 0xFF80_0000) | (gpr_u32(ctx, {rt}) & 0x007F_FFFF);"
                    ),
                    cop0::REG_PAGEMASK => {
                        format!("ctx.cop0_pagemask = gpr_u32(ctx, {rt}) & 0x01FF_E000;")
                    }
                    cop0::REG_WIRED => format!(
                        "{{ ctx.cop0_wired = gpr_u32(ctx, {rt}) & 0x3F; ctx.cop0_random = 47; }}"
                    ),
                    cop0::REG_BADVADDR => "// mtc0 to BADVADDR ignored (read-only)".to_string(),
                    cop0::REG_COUNT => format!("ctx.cop0_count = gpr_u32(ctx, {rt});"),
                    cop0::REG_ENTRYHI => {
                        format!("ctx.cop0_entryhi = gpr_u32(ctx, {rt}) & 0xC000_00FF;")
                    }
                    cop0::REG_COMPARE => format!(
                        "{{ ctx.cop0_compare = gpr_u32(ctx, {rt}); ctx.cop0_cause &= !0x8000; }}"
                    ),
                    cop0::REG_STATUS => {
                        format!("ctx.cop0_status = gpr_u32(ctx, {rt}) & 0xFF57_FFFF;")
                    }
                    cop0::REG_CAUSE => format!(
                        "ctx.cop0_cause = (ctx.cop0_cause & !0x0000_0300) | (gpr_u32(ctx, {rt}) & 0x0000_0300);"
                    ),
                    cop0::REG_EPC => format!("ctx.cop0_epc = gpr_u32(ctx, {rt});"),
                    cop0::REG_PRID => "// mtc0 to PRID ignored (read-only)".to_string(),
                    cop0::REG_CONFIG => format!(
                        "ctx.cop0_config = (ctx.cop0_config & !0x7) | (gpr_u32(ctx, {rt}) & 0x7);"
                    ),
                    cop0::REG_BADPADDR => "// mtc0 to BADPADDR ignored (read-only)".to_string(),
                    cop0::REG_DEBUG => format!("ctx.cop0_debug = gpr_u32(ctx, {rt});"),
                    cop0::REG_PERF => format!("ctx.cop0_perf = gpr_u32(ctx, {rt});"),
                    cop0::REG_TAGLO => format!("ctx.cop0_taglo = gpr_u32(ctx, {rt});"),
                    cop0::REG_TAGHI => format!("ctx.cop0_taghi = gpr_u32(ctx, {rt});"),
                    cop0::REG_ERROREPC => format!("ctx.cop0_errorepc = gpr_u32(ctx, {rt});"),
                    _ => format!("// unimplemented mtc0 to cop0 reg {rd}"),
                };
                (text, false)
            }
            cop0::BC => (format!("// bc0 condition {:#x} (handled by branch composition)", rt), false),
            rs if rs >= cop0::CO => match inst.function {
                cop0::CO_TLBR => ("runtime.handle_tlbr(rdram, ctx);".to_string(), false),
                cop0::CO_TLBWI => ("runtime.handle_tlbwi(rdram, ctx);".to_string(), false),
                cop0::CO_TLBWR => ("runtime.handle_tlbwr(rdram, ctx);".to_string(), false),
                cop0::CO_TLBP => ("runtime.handle_tlbp(rdram, ctx);".to_string(), false),
                cop0::CO_ERET => (
                    "{ if ctx.cop0_status & 0x4 != 0 { ctx.pc = ctx.cop0_errorepc; ctx.cop0_status &= !0x4; } else { ctx.pc = ctx.cop0_epc; ctx.cop0_status &= !0x2; } runtime.clear_ll_bit(ctx); } return;"
                        .to_string(),
                    true,
                ),
                cop0::CO_EI => ("ctx.cop0_status |= 0x1;".to_string(), false),
                cop0::CO_DI => ("ctx.cop0_status &= !0x1;".to_string(), false),
                _ => (
                    format!("// unhandled cop0 co function {:#04x}", inst.function),
                    false,
                ),
            },
            _ => (format!("// unhandled cop0 format {:#04x}", inst.rs), false),
        }
    }

    fn translate_cop1(&self, inst: &Instruction) -> String {
        let ft = inst.rt as usize;
        let fs = inst.rd as usize;
        let fd = inst.sa as usize;
        let rt = inst.rt;
        match inst.rs {
            cop1::MF => format!("set_gpr_u32(ctx, {rt}, ctx.f[{fs}].to_bits());"),
            cop1::MT => format!("ctx.f[{fs}] = f32::from_bits(gpr_u32(ctx, {rt}));"),
            cop1::CF => match fs {
                31 => format!("set_gpr_u32(ctx, {rt}, ctx.fcr31);"),
                0 => format!("set_gpr_u32(ctx, {rt}, 0); // FCR0 implementation register"),
                _ => format!("set_gpr_u32(ctx, {rt}, 0); // unimplemented FCR{fs}"),
            },
            cop1::CT => {
                if fs == 31 {
                    format!("ctx.fcr31 = gpr_u32(ctx, {rt}) & 0x0183_FFFF;")
                } else {
                    format!("// ctc1 to FCR{fs} ignored")
                }
            }
            cop1::BC => "// fpu branch (handled by branch composition)".to_string(),
            cop1::FMT_S => match inst.function {
                cop1::S_ADD => format!("ctx.f[{fd}] = ctx.f[{fs}] + ctx.f[{ft}];"),
                cop1::S_SUB => format!("ctx.f[{fd}] = ctx.f[{fs}] - ctx.f[{ft}];"),
                cop1::S_MUL => format!("ctx.f[{fd}] = ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_DIV => format!(
                    "if ctx.f[{ft}] == 0.0 {{ ctx.fcr31 |= 0x0010_0000; ctx.f[{fd}] = f32::INFINITY.copysign(ctx.f[{fs}] * 0.0); }} else {{ ctx.f[{fd}] = ctx.f[{fs}] / ctx.f[{ft}]; }}"
                ),
                cop1::S_SQRT => format!("ctx.f[{fd}] = ctx.f[{fs}].sqrt();"),
                cop1::S_ABS => format!("ctx.f[{fd}] = ctx.f[{fs}].abs();"),
                cop1::S_MOV => format!("ctx.f[{fd}] = ctx.f[{fs}];"),
                cop1::S_NEG => format!("ctx.f[{fd}] = -ctx.f[{fs}];"),
                cop1::S_RSQRT => format!("ctx.f[{fd}] = 1.0 / ctx.f[{fs}].sqrt();"),
                cop1::S_ROUND_W => format!(
                    "ctx.f[{fd}] = f32::from_bits((ctx.f[{fs}].round() as i32) as u32);"
                ),
                cop1::S_TRUNC_W | cop1::S_CVT_W => format!(
                    "ctx.f[{fd}] = f32::from_bits((ctx.f[{fs}] as i32) as u32);"
                ),
                cop1::S_CEIL_W => format!(
                    "ctx.f[{fd}] = f32::from_bits((ctx.f[{fs}].ceil() as i32) as u32);"
                ),
                cop1::S_FLOOR_W => format!(
                    "ctx.f[{fd}] = f32::from_bits((ctx.f[{fs}].floor() as i32) as u32);"
                ),
                cop1::S_ADDA => format!("ctx.f[31] = ctx.f[{fs}] + ctx.f[{ft}];"),
                cop1::S_SUBA => format!("ctx.f[31] = ctx.f[{fs}] - ctx.f[{ft}];"),
                cop1::S_MULA => format!("ctx.f[31] = ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_MADD => format!("ctx.f[{fd}] = ctx.f[31] + ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_MSUB => format!("ctx.f[{fd}] = ctx.f[31] - ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_MADDA => format!("ctx.f[31] += ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_MSUBA => format!("ctx.f[31] -= ctx.f[{fs}] * ctx.f[{ft}];"),
                cop1::S_MAX => format!("ctx.f[{fd}] = ctx.f[{fs}].max(ctx.f[{ft}]);"),
                cop1::S_MIN => format!("ctx.f[{fd}] = ctx.f[{fs}].min(ctx.f[{ft}]);"),
                cop1::S_C_F | cop1::S_C_SF => "ctx.fcr31 &= !0x0080_0000;".to_string(),
                cop1::S_C_UN | cop1::S_C_NGLE => self.fpu_compare("fpu_c_un", fs, ft),
                cop1::S_C_EQ | cop1::S_C_SEQ => self.fpu_compare("fpu_c_eq", fs, ft),
                cop1::S_C_UEQ | cop1::S_C_NGL => self.fpu_compare("fpu_c_ueq", fs, ft),
                cop1::S_C_OLT | cop1::S_C_LT => self.fpu_compare("fpu_c_olt", fs, ft),
                cop1::S_C_ULT | cop1::S_C_NGE => self.fpu_compare("fpu_c_ult", fs, ft),
                cop1::S_C_OLE | cop1::S_C_LE => self.fpu_compare("fpu_c_ole", fs, ft),
                cop1::S_C_ULE | cop1::S_C_NGT => self.fpu_compare("fpu_c_ule", fs, ft),
                _ => format!("// unhandled fpu.s function {:#04x}", inst.function),
            },
            cop1::FMT_W => match inst.function {
                cop1::W_CVT_S => format!(
                    "ctx.f[{fd}] = (ctx.f[{fs}].to_bits() as i32) as f32;"
                ),
                _ => format!("// unhandled fpu.w function {:#04x}", inst.function),
            },
            _ => format!("// unhandled fpu format {:#04x}", inst.rs),
        }
    }

    fn fpu_compare(&self, predicate: &str, fs: usize, ft: usize) -> String {
        format!(
            "ctx.fcr31 = if {predicate}(ctx.f[{fs}], ctx.f[{ft}]) {{ ctx.fcr31 | 0x0080_0000 }} else {{ ctx.fcr31 & !0x0080_0000 }};"
        )
    }

    fn translate_cop2(&self, inst: &Instruction) -> String {
        let rt = inst.rt;
        let rd = inst.rd;
        match inst.rs {
            cop2::QMFC2 => format!("set_gpr_vec(ctx, {rt}, vf_to_bits(ctx.vu0_vf[{rd}]));"),
            cop2::QMTC2 => format!("ctx.vu0_vf[{rd}] = vf_from_bits(gpr_vec(ctx, {rt}));"),
            cop2::CFC2 => {
                if rd < 16 {
                    return format!("set_gpr_u32(ctx, {rt}, ctx.vi[{rd}] as u32);");
                }
                match rd {
                    cop2::CR_STATUS => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_status as u32);"),
                    cop2::CR_MAC => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_mac_flags);"),
                    cop2::CR_CLIP => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_clip_flags);"),
                    cop2::CR_CLIP2 => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_clip_flags2);"),
                    cop2::CR_R => format!("set_gpr_vec(ctx, {rt}, vf_to_bits(ctx.vu0_r));"),
                    cop2::CR_I => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_i.to_bits());"),
                    cop2::CR_Q => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_q.to_bits());"),
                    cop2::CR_P => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_p.to_bits());"),
                    cop2::CR_ITOP => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_itop);"),
                    cop2::CR_XITOP => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_xitop);"),
                    cop2::CR_TPC => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_tpc);"),
                    cop2::CR_CMSAR0 => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_cmsar0);"),
                    cop2::CR_FBRST => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_fbrst);"),
                    cop2::CR_VPU_STAT => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_vpu_stat);"),
                    cop2::CR_INFO => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_info);"),
                    cop2::CR_CMSAR1 => format!("set_gpr_u32(ctx, {rt}, ctx.vu0_cmsar1);"),
                    _ => format!("// unimplemented cfc2 control reg {rd}"),
                }
            }
            cop2::CTC2 => {
                if rd < 16 {
                    return format!("ctx.vi[{rd}] = gpr_u32(ctx, {rt}) as u16;");
                }
                match rd {
                    cop2::CR_STATUS => {
                        format!("ctx.vu0_status = (gpr_u32(ctx, {rt}) & 0xFFFF) as u16;")
                    }
                    cop2::CR_MAC => format!("ctx.vu0_mac_flags = gpr_u32(ctx, {rt});"),
                    cop2::CR_CLIP => format!("ctx.vu0_clip_flags = gpr_u32(ctx, {rt});"),
                    cop2::CR_CLIP2 => format!("ctx.vu0_clip_flags2 = gpr_u32(ctx, {rt});"),
                    cop2::CR_R => format!("ctx.vu0_r = vf_from_bits(gpr_vec(ctx, {rt}));"),
                    cop2::CR_I => format!("ctx.vu0_i = f32::from_bits(gpr_u32(ctx, {rt}));"),
                    cop2::CR_Q => format!("ctx.vu0_q = f32::from_bits(gpr_u32(ctx, {rt}));"),
                    cop2::CR_P => format!("ctx.vu0_p = f32::from_bits(gpr_u32(ctx, {rt}));"),
                    cop2::CR_ITOP => format!("ctx.vu0_itop = gpr_u32(ctx, {rt}) & 0x3FF;"),
                    cop2::CR_XITOP => format!("ctx.vu0_xitop = gpr_u32(ctx, {rt}) & 0x3FF;"),
                    cop2::CR_TPC => format!("ctx.vu0_tpc = gpr_u32(ctx, {rt});"),
                    cop2::CR_CMSAR0 => format!("ctx.vu0_cmsar0 = gpr_u32(ctx, {rt});"),
                    cop2::CR_FBRST => format!("ctx.vu0_fbrst = gpr_u32(ctx, {rt});"),
                    // Hardware masks some VPU_STAT bits read-only; the write
                    // is kept unmasked pending a hardware-derived vector.
                    cop2::CR_VPU_STAT => format!("ctx.vu0_vpu_stat = gpr_u32(ctx, {rt});"),
                    cop2::CR_INFO => format!("ctx.vu0_info = gpr_u32(ctx, {rt});"),
                    cop2::CR_CMSAR1 => format!("ctx.vu0_cmsar1 = gpr_u32(ctx, {rt});"),
                    _ => format!("// unimplemented ctc2 control reg {rd}"),
                }
            }
            cop2::BC => format!("// bc2 condition {:#x} (handled by branch composition)", rt),
            rs if rs >= cop2::CO => self.translate_vu_macro(inst),
            _ => format!("// unhandled cop2 format {:#04x}", inst.rs),
        }
    }

    fn translate_vu_macro(&self, inst: &Instruction) -> String {
        // Operand slots after the decoder's macro-mode remap: rs = fs,
        // rt = ft, rd = fd (also the id/imm5 slot of the integer ops).
        let fs = inst.rs as usize;
        let ft = inst.rt as usize;
        let fd = inst.rd as usize;
        let mask = inst.vector_info.dest_mask;
        let bc = inst.vector_info.bc as usize;
        let fsf = inst.vector_info.fsf as usize;
        let ftf = inst.vector_info.ftf as usize;

        let blend = |expr: String, dest: usize| -> String {
            format!(
                "{{ let res = {expr}; ctx.vu0_vf[{dest}] = vblend(ctx.vu0_vf[{dest}], res, {mask:#x}); }}"
            )
        };
        let blend_acc = |expr: String, dest: usize| -> String {
            format!(
                "{{ let res = {expr}; ctx.vu0_vf[{dest}] = vblend(ctx.vu0_vf[{dest}], res, {mask:#x}); ctx.vu0_acc = res; }}"
            )
        };

        match inst.function {
            f if (cop2::VADDX..cop2::VADDX + 4).contains(&f) => blend(
                format!("vadd(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc}))"),
                fd,
            ),
            f if (cop2::VSUBX..cop2::VSUBX + 4).contains(&f) => blend(
                format!("vsub(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc}))"),
                fd,
            ),
            f if (cop2::VMADDX..cop2::VMADDX + 4).contains(&f) => blend_acc(
                format!(
                    "vadd(ctx.vu0_acc, vmul(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc})))"
                ),
                fd,
            ),
            f if (cop2::VMSUBX..cop2::VMSUBX + 4).contains(&f) => blend_acc(
                format!(
                    "vsub(ctx.vu0_acc, vmul(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc})))"
                ),
                fd,
            ),
            f if (cop2::VMAXX..cop2::VMAXX + 4).contains(&f) => blend(
                format!("vmax(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc}))"),
                fd,
            ),
            f if (cop2::VMINIX..cop2::VMINIX + 4).contains(&f) => blend(
                format!("vmin(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc}))"),
                fd,
            ),
            f if (cop2::VMULX..cop2::VMULX + 4).contains(&f) => blend(
                format!("vmul(ctx.vu0_vf[{fs}], vbroadcast(ctx.vu0_vf[{ft}], {bc}))"),
                fd,
            ),
            cop2::VMULQ => format!(
                "ctx.vu0_vf[{fd}] = vmul(ctx.vu0_vf[{fs}], splat(ctx.vu0_q));"
            ),
            cop2::VMAXI => format!(
                "ctx.vu0_vf[{fd}] = vmax(ctx.vu0_vf[{fs}], splat(ctx.vu0_i));"
            ),
            cop2::VMULI => format!(
                "ctx.vu0_vf[{fd}] = vmul(ctx.vu0_vf[{fs}], splat(ctx.vu0_i));"
            ),
            cop2::VMINII => format!(
                "ctx.vu0_vf[{fd}] = vmin(ctx.vu0_vf[{fs}], splat(ctx.vu0_i));"
            ),
            cop2::VADDQ => format!(
                "ctx.vu0_vf[{fd}] = vadd(ctx.vu0_vf[{fs}], splat(ctx.vu0_q));"
            ),
            cop2::VSUBQ => format!(
                "ctx.vu0_vf[{fd}] = vsub(ctx.vu0_vf[{fs}], splat(ctx.vu0_q));"
            ),
            cop2::VADDI => format!(
                "ctx.vu0_vf[{fd}] = vadd(ctx.vu0_vf[{fs}], splat(ctx.vu0_i));"
            ),
            cop2::VSUBI => format!(
                "ctx.vu0_vf[{fd}] = vsub(ctx.vu0_vf[{fs}], splat(ctx.vu0_i));"
            ),
            cop2::VADD => blend(format!("vadd(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}])"), fd),
            cop2::VSUB => blend(format!("vsub(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}])"), fd),
            cop2::VMUL => blend(format!("vmul(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}])"), fd),
            cop2::VMAX => blend(format!("vmax(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}])"), fd),
            cop2::VMINI => blend(format!("vmin(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}])"), fd),
            cop2::VMADD => blend_acc(
                format!("vadd(ctx.vu0_acc, vmul(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}]))"),
                fd,
            ),
            cop2::VMSUB => blend_acc(
                format!("vsub(ctx.vu0_acc, vmul(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}]))"),
                fd,
            ),
            cop2::VOPMSUB => blend_acc(
                format!("vsub(ctx.vu0_acc, vmul(ctx.vu0_vf[{fs}], ctx.vu0_vf[{ft}]))"),
                fd,
            ),
            cop2::VIADD => format!(
                "ctx.vi[{fd}] = ctx.vi[{fs}].wrapping_add(ctx.vi[{ft}]);"
            ),
            cop2::VISUB => format!(
                "ctx.vi[{fd}] = ctx.vi[{fs}].wrapping_sub(ctx.vi[{ft}]);"
            ),
            cop2::VIADDI => format!(
                "ctx.vi[{ft}] = ctx.vi[{fs}].wrapping_add({imm});",
                imm = inst.rd
            ),
            cop2::VIAND => format!("ctx.vi[{fd}] = ctx.vi[{fs}] & ctx.vi[{ft}];"),
            cop2::VIOR => format!("ctx.vi[{fd}] = ctx.vi[{fs}] | ctx.vi[{ft}];"),
            cop2::VCALLMS => {
                let target = ((inst.raw >> 6) & 0x1FF) << 3;
                format!(
                    "{{ ctx.vu0_tpc = {target:#x}; runtime.execute_vu0_microprogram(rdram, ctx, {target:#x}); }}"
                )
            }
            cop2::VCALLMSR => format!(
                "{{ let target = ((ctx.vi[{fs}] & 0x1FF) as u32) << 3; ctx.vu0_pc = target; runtime.vu0_start_micro_program(rdram, ctx, target); }}"
            ),
            cop2::VABS => format!("ctx.vu0_vf[{ft}] = vabs(ctx.vu0_vf[{fs}]);"),
            cop2::VNOP => "// vnop".to_string(),
            cop2::VMOVE => format!("ctx.vu0_vf[{ft}] = ctx.vu0_vf[{fs}];"),
            cop2::VMR32 => format!(
                "{{ let v = ctx.vu0_vf[{fs}]; ctx.vu0_vf[{ft}] = [v[1], v[2], v[3], v[0]]; }}"
            ),
            cop2::VDIV => format!(
                "{{ let fs = ctx.vu0_vf[{fs}][{fsf}]; let ft = ctx.vu0_vf[{ft}][{ftf}]; ctx.vu0_q = if ft != 0.0 {{ fs / ft }} else {{ 0.0 }}; }}"
            ),
            cop2::VSQRT => format!(
                "ctx.vu0_q = ctx.vu0_vf[{ft}][{ftf}].max(0.0).sqrt();"
            ),
            cop2::VRSQRT => format!(
                "{{ let ft = ctx.vu0_vf[{ft}][{ftf}]; ctx.vu0_q = if ft > 0.0 {{ 1.0 / ft.sqrt() }} else {{ 0.0 }}; }}"
            ),
            cop2::VWAITQ => "// vwaitq (Q is always current here)".to_string(),
            cop2::VMTIR => format!("ctx.vu0_i = ctx.vi[{ft}] as f32;"),
            cop2::VMFIR => blend(format!("splat(ctx.vi[{fs}] as f32)"), ft),
            cop2::VILWR => format!(
                "{{ let addr = ((ctx.vu0_vf[{fs}][{ftf}] + ctx.vu0_i) as u32) & 0x3FFC; ctx.vi[{ft}] = read32(rdram, addr) as u16; }}"
            ),
            cop2::VISWR => format!(
                "{{ let addr = ((ctx.vu0_vf[{fs}][{ftf}] + ctx.vu0_i) as u32) & 0x3FFC; write32(rdram, addr, ctx.vi[{ft}] as u32); }}"
            ),
            cop2::VRNEXT => "{ let r = [ctx.vu0_r[0].to_bits(), ctx.vu0_r[1].to_bits(), ctx.vu0_r[2].to_bits(), ctx.vu0_r[3].to_bits()]; let feedback = r[0] ^ (r[0] << 13) ^ (r[1] >> 19) ^ (r[2] << 7); ctx.vu0_r = [f32::from_bits(r[1]), f32::from_bits(r[2]), f32::from_bits(r[3]), f32::from_bits(feedback)]; }".to_string(),
            cop2::VRGET => blend("ctx.vu0_r".to_string(), ft),
            cop2::VRINIT => format!(
                "{{ let mut seed = ctx.vu0_vf[{fs}][0].to_bits(); if seed == 0 {{ seed = 1; }} let r1 = seed.wrapping_mul(0x41C6_4E6D).wrapping_add(0x3039); let r2 = r1.wrapping_mul(0x41C6_4E6D).wrapping_add(0x3039); let r3 = r2.wrapping_mul(0x41C6_4E6D).wrapping_add(0x3039); ctx.vu0_r = [f32::from_bits(seed), f32::from_bits(r1), f32::from_bits(r2), f32::from_bits(r3)]; }}"
            ),
            cop2::VRXOR => format!(
                "{{ let mut out = [0u32; 4]; for lane in 0..4 {{ let x = ctx.vu0_r[lane].to_bits() ^ ctx.vu0_vf[{fs}][lane].to_bits(); let m = x ^ (x << 7); out[lane] = m ^ (m >> 9); }} ctx.vu0_r = [f32::from_bits(out[0]), f32::from_bits(out[1]), f32::from_bits(out[2]), f32::from_bits(out[3])]; }}"
            ),
            _ => format!("// unhandled vu0 macro function {:#04x}", inst.function),
        }
    }

    fn translate_mmi(&self, inst: &Instruction) -> String {
        let rs = inst.rs;
        let rt = inst.rt;
        let rd = inst.rd;
        let sa = inst.sa;
        let vec2 = |helper: &str| -> String {
            format!(
                "set_gpr_vec(ctx, {rd}, {helper}(gpr_vec(ctx, {rs}), gpr_vec(ctx, {rt})));"
            )
        };
        let vec1 = |helper: &str| -> String {
            format!("set_gpr_vec(ctx, {rd}, {helper}(gpr_vec(ctx, {rs})));")
        };
        let shift_imm = |helper: &str| -> String {
            format!("set_gpr_vec(ctx, {rd}, {helper}(gpr_vec(ctx, {rt}), {sa}));")
        };
        match inst.function {
            mmi::MFHI1 => format!("set_gpr_u32(ctx, {rd}, ctx.hi1);"),
            mmi::MTHI1 => format!("ctx.hi1 = gpr_u32(ctx, {rs});"),
            mmi::MFLO1 => format!("set_gpr_u32(ctx, {rd}, ctx.lo1);"),
            mmi::MTLO1 => format!("ctx.lo1 = gpr_u32(ctx, {rs});"),
            mmi::MULT1 => format!(
                "{{ let result = (gpr_s32(ctx, {rs}) as i64) * (gpr_s32(ctx, {rt}) as i64); ctx.lo1 = result as u32; ctx.hi1 = (result >> 32) as u32; }}"
            ),
            mmi::MULTU1 => format!(
                "{{ let result = (gpr_u32(ctx, {rs}) as u64) * (gpr_u32(ctx, {rt}) as u64); ctx.lo1 = result as u32; ctx.hi1 = (result >> 32) as u32; }}"
            ),
            mmi::DIV1 => format!(
                "{{ let divisor = gpr_s32(ctx, {rt}); if divisor != 0 {{ ctx.lo1 = gpr_s32(ctx, {rs}).wrapping_div(divisor) as u32; ctx.hi1 = gpr_s32(ctx, {rs}).wrapping_rem(divisor) as u32; }} else {{ ctx.lo1 = if gpr_s32(ctx, {rs}) < 0 {{ 1 }} else {{ 0xFFFF_FFFF }}; ctx.hi1 = gpr_s32(ctx, {rs}) as u32; }} }}"
            ),
            mmi::DIVU1 => format!(
                "{{ let divisor = gpr_u32(ctx, {rt}); if divisor != 0 {{ ctx.lo1 = gpr_u32(ctx, {rs}) / divisor; ctx.hi1 = gpr_u32(ctx, {rs}) % divisor; }} else {{ ctx.lo1 = 0xFFFF_FFFF; ctx.hi1 = gpr_u32(ctx, {rs}); }} }}"
            ),
            mmi::MADD => self.accumulate("hi", "lo", "wrapping_add", true, rs, rt),
            mmi::MADDU => self.accumulate("hi", "lo", "wrapping_add", false, rs, rt),
            mmi::MSUB => self.accumulate("hi", "lo", "wrapping_sub", true, rs, rt),
            mmi::MSUBU => self.accumulate("hi", "lo", "wrapping_sub", false, rs, rt),
            mmi::MADD1 => self.accumulate("hi1", "lo1", "wrapping_add", true, rs, rt),
            mmi::MADDU1 => self.accumulate("hi1", "lo1", "wrapping_add", false, rs, rt),
            mmi::MSUB1 => self.accumulate("hi1", "lo1", "wrapping_sub", true, rs, rt),
            mmi::MSUBU1 => self.accumulate("hi1", "lo1", "wrapping_sub", false, rs, rt),
            mmi::PLZCW => format!(
                "set_gpr_u32(ctx, {rd}, gpr_u32(ctx, {rs}).leading_zeros());"
            ),
            mmi::PSLLH => shift_imm("psll_h"),
            mmi::PSRLH => shift_imm("psrl_h"),
            mmi::PSRAH => shift_imm("psra_h"),
            mmi::PSLLW => shift_imm("psll_w"),
            mmi::PSRLW => shift_imm("psrl_w"),
            mmi::PSRAW => shift_imm("psra_w"),
            mmi::MMI0 => match sa {
                mmi::PADDW => vec2("padd_w"),
                mmi::PSUBW => vec2("psub_w"),
                mmi::PCGTW => vec2("pcgt_w"),
                mmi::PMAXW => vec2("pmax_w"),
                mmi::PADDH => vec2("padd_h"),
                mmi::PSUBH => vec2("psub_h"),
                mmi::PCGTH => vec2("pcgt_h"),
                mmi::PMAXH => vec2("pmax_h"),
                mmi::PADDB => vec2("padd_b"),
                mmi::PSUBB => vec2("psub_b"),
                mmi::PCGTB => vec2("pcgt_b"),
                mmi::PADDSW => vec2("padds_w"),
                mmi::PSUBSW => vec2("psubs_w"),
                mmi::PEXTLW => vec2("pextl_w"),
                mmi::PPACW => vec2("ppac_w"),
                mmi::PADDSH => vec2("padds_h"),
                mmi::PSUBSH => vec2("psubs_h"),
                mmi::PEXTLH => vec2("pextl_h"),
                mmi::PPACH => vec2("ppac_h"),
                mmi::PADDSB => vec2("padds_b"),
                mmi::PSUBSB => vec2("psubs_b"),
                mmi::PEXTLB => vec2("pextl_b"),
                mmi::PPACB => vec2("ppac_b"),
                mmi::PEXT5 => format!("// unhandled PEXT5 sub-op {sa:#04x}"),
                mmi::PPAC5 => format!("// unhandled PPAC5 sub-op {sa:#04x}"),
                _ => format!("// unhandled mmi0 sub-op {sa:#04x}"),
            },
            mmi::MMI1 => match sa {
                mmi::PABSW => vec1("pabs_w"),
                mmi::PCEQW => vec2("pceq_w"),
                mmi::PMINW => vec2("pmin_w"),
                mmi::PADSBH => vec2("padsb_h"),
                mmi::PABSH => vec1("pabs_h"),
                mmi::PCEQH => vec2("pceq_h"),
                mmi::PMINH => vec2("pmin_h"),
                mmi::PCEQB => vec2("pceq_b"),
                mmi::PADDUW => vec2("padd_w"),
                mmi::PSUBUW => vec2("psub_w"),
                mmi::PEXTUW => vec2("pextu_w"),
                mmi::PADDUH => vec2("padd_h"),
                mmi::PSUBUH => vec2("psub_h"),
                mmi::PEXTUH => vec2("pextu_h"),
                mmi::PADDUB => vec2("paddu_b"),
                mmi::PSUBUB => vec2("psubu_b"),
                mmi::PEXTUB => vec2("pextu_b"),
                mmi::QFSRV => format!(
                    "set_gpr_vec(ctx, {rd}, qfsrv(gpr_vec(ctx, {rt}), gpr_vec(ctx, {rs}), ctx.sa));"
                ),
                _ => format!("// unhandled mmi1 sub-op {sa:#04x}"),
            },
            mmi::MMI2 => match sa {
                mmi::PMADDW => format!(
                    "{{ let a = u32x4(gpr_vec(ctx, {rs})); let b = u32x4(gpr_vec(ctx, {rt})); let mut acc = ((ctx.hi as u64) << 32) | ctx.lo as u64; for lane in 0..4 {{ acc = acc.wrapping_add((a[lane] as u64).wrapping_mul(b[lane] as u64)); }} ctx.lo = acc as u32; ctx.hi = (acc >> 32) as u32; set_gpr_u64(ctx, {rd}, acc); }}"
                ),
                mmi::PSLLVW => vec2("psllv_w"),
                mmi::PSRLVW => vec2("psrlv_w"),
                mmi::PMFHI => format!("set_gpr_u32(ctx, {rd}, ctx.hi);"),
                mmi::PMFLO => format!("set_gpr_u32(ctx, {rd}, ctx.lo);"),
                mmi::PINTH => vec2("pinth"),
                mmi::PDIVW => format!(
                    "{{ let rs0 = gpr_s32(ctx, {rs}); let rt0 = gpr_s32(ctx, {rt}); if rt0 != 0 {{ ctx.lo = rs0.wrapping_div(rt0) as u32; ctx.hi = rs0.wrapping_rem(rt0) as u32; }} else {{ ctx.lo = if rs0 < 0 {{ 1 }} else {{ 0xFFFF_FFFF }}; ctx.hi = rs0 as u32; }} set_gpr_u32(ctx, {rd}, ctx.lo); }}"
                ),
                mmi::PCPYLD => vec2("pcpyld"),
                mmi::PAND => format!(
                    "set_gpr_vec(ctx, {rd}, gpr_vec(ctx, {rs}) & gpr_vec(ctx, {rt}));"
                ),
                mmi::PXOR => format!(
                    "set_gpr_vec(ctx, {rd}, gpr_vec(ctx, {rs}) ^ gpr_vec(ctx, {rt}));"
                ),
                mmi::PMADDH => self.halfword_sum_of_products(rs, rt, rd, true),
                mmi::PHMADH => self.halfword_sum_of_products(rs, rt, rd, true),
                mmi::PMULTH => self.halfword_sum_of_products(rs, rt, rd, false),
                mmi::PEXEH => vec1("pexeh"),
                mmi::PREVH => vec1("prevh"),
                mmi::PDIVBW => format!(
                    "{{ let a = u32x4(gpr_vec(ctx, {rs})); let div = gpr_s32(ctx, {rt}); let mut q = [0u32; 4]; if div != 0 {{ for lane in 0..4 {{ q[lane] = (a[lane] as i32).wrapping_div(div) as u32; }} ctx.lo = q[0]; ctx.hi = (a[0] as i32).wrapping_rem(div) as u32; }} else {{ ctx.lo = if (a[0] as i32) < 0 {{ 1 }} else {{ 0xFFFF_FFFF }}; ctx.hi = a[0]; }} set_gpr_vec(ctx, {rd}, from_u32x4(q)); }}"
                ),
                mmi::PEXEW => vec1("pexew"),
                mmi::PROT3W => vec1("prot3w"),
                mmi::PMSUBW => format!("// unhandled PMSUBW sub-op {sa:#04x}"),
                mmi::PMULTW => format!("// unhandled PMULTW sub-op {sa:#04x}"),
                mmi::PMSUBH => format!("// unhandled PMSUBH sub-op {sa:#04x}"),
                mmi::PHMSBH => format!("// unhandled PHMSBH sub-op {sa:#04x}"),
                _ => format!("// unhandled mmi2 sub-op {sa:#04x}"),
            },
            mmi::MMI3 => match sa {
                mmi::PMADDUW => format!("// unhandled PMADDUW sub-op {sa:#04x}"),
                mmi::PSRAVW => vec2("psrav_w"),
                mmi::PMTHI => format!("ctx.hi = gpr_u32(ctx, {rs});"),
                mmi::PMTLO => format!("ctx.lo = gpr_u32(ctx, {rs});"),
                mmi::PINTEH => vec2("pinteh"),
                mmi::PMULTUW => format!(
                    "{{ let a = u32x4(gpr_vec(ctx, {rs})); let b = u32x4(gpr_vec(ctx, {rt})); let mut lanes = [0u32; 4]; for lane in 0..4 {{ lanes[lane] = (a[lane] as u64).wrapping_mul(b[lane] as u64) as u32; }} let prod0 = (a[0] as u64).wrapping_mul(b[0] as u64); ctx.lo = prod0 as u32; ctx.hi = (prod0 >> 32) as u32; set_gpr_vec(ctx, {rd}, from_u32x4(lanes)); }}"
                ),
                mmi::PDIVUW => format!(
                    "{{ let rs0 = gpr_u32(ctx, {rs}); let rt0 = gpr_u32(ctx, {rt}); if rt0 != 0 {{ ctx.lo = rs0 / rt0; ctx.hi = rs0 % rt0; }} else {{ ctx.lo = 0xFFFF_FFFF; ctx.hi = rs0; }} set_gpr_u32(ctx, {rd}, ctx.lo); }}"
                ),
                mmi::PCPYUD => vec2("pcpyud"),
                mmi::POR => format!(
                    "set_gpr_vec(ctx, {rd}, gpr_vec(ctx, {rs}) | gpr_vec(ctx, {rt}));"
                ),
                mmi::PNOR => vec2("pnor"),
                mmi::PEXCH => vec1("pexeh"),
                mmi::PCPYH => vec1("pcpyh"),
                mmi::PEXCW => vec1("pexew"),
                _ => format!("// unhandled mmi3 sub-op {sa:#04x}"),
            },
            mmi::PMFHL => match sa {
                mmi::PMFHL_LW => format!(
                    "set_gpr_vec(ctx, {rd}, pmfhl_lw(ctx.hi, ctx.lo, ctx.hi1, ctx.lo1));"
                ),
                mmi::PMFHL_UW => format!(
                    "set_gpr_vec(ctx, {rd}, pmfhl_uw(ctx.hi, ctx.lo, ctx.hi1, ctx.lo1));"
                ),
                mmi::PMFHL_SLW => format!(
                    "set_gpr_vec(ctx, {rd}, pmfhl_slw(ctx.hi, ctx.lo, ctx.hi1, ctx.lo1));"
                ),
                mmi::PMFHL_LH => format!(
                    "set_gpr_vec(ctx, {rd}, pmfhl_lh(ctx.hi, ctx.lo, ctx.hi1, ctx.lo1));"
                ),
                mmi::PMFHL_SH => format!(
                    "set_gpr_vec(ctx, {rd}, pmfhl_sh(ctx.hi, ctx.lo, ctx.hi1, ctx.lo1));"
                ),
                _ => format!("// unhandled pmfhl sub-op {sa:#04x}"),
            },
            mmi::PMTHL => match sa {
                mmi::PMFHL_LW => format!(
                    "{{ let v = u32x4(gpr_vec(ctx, {rs})); ctx.lo = v[0]; ctx.hi = v[1]; }}"
                ),
                _ => format!("// unhandled pmthl sub-op {sa:#04x}"),
            },
            _ => format!("// unhandled mmi function {:#04x}", inst.function),
        }
    }

    /// MADD/MSUB family: 64-bit accumulator in hi:lo (or hi1:lo1) combined
    /// with the 32x32 product.
    fn accumulate(&self, hi: &str, lo: &str, op: &str, signed: bool, rs: u8, rt: u8) -> String {
        if signed {
            format!(
                "{{ let acc = (((ctx.{hi} as u64) << 32) | ctx.{lo} as u64) as i64; let prod = (gpr_s32(ctx, {rs}) as i64) * (gpr_s32(ctx, {rt}) as i64); let result = acc.{op}(prod); ctx.{lo} = result as u32; ctx.{hi} = (result >> 32) as u32; }}"
            )
        } else {
            format!(
                "{{ let acc = ((ctx.{hi} as u64) << 32) | ctx.{lo} as u64; let prod = (gpr_u32(ctx, {rs}) as u64) * (gpr_u32(ctx, {rt}) as u64); let result = acc.{op}(prod); ctx.{lo} = result as u32; ctx.{hi} = (result >> 32) as u32; }}"
            )
        }
    }

    /// PMADDH/PHMADH/PMULTH: all eight halfword products summed, optionally
    /// on top of hi:lo, deposited back into hi:lo and rd.
    fn halfword_sum_of_products(&self, rs: u8, rt: u8, rd: u8, accumulate: bool) -> String {
        let base = if accumulate {
            "let acc = (((ctx.hi as u64) << 32) | ctx.lo as u64) as i64;"
        } else {
            "let acc = 0i64;"
        };
        format!(
            "{{ let a = u16x8(gpr_vec(ctx, {rs})); let b = u16x8(gpr_vec(ctx, {rt})); {base} let mut sum = 0i64; for lane in 0..8 {{ sum += (a[lane] as i16 as i64) * (b[lane] as i16 as i64); }} let result = acc.wrapping_add(sum); ctx.lo = result as u32; ctx.hi = (result >> 32) as u32; set_gpr_u64(ctx, {rd}, result as u64); }}"
        )
    }

    // -----------------------------------------------------------------------
    // Stubs, bootstrap, registration
    // -----------------------------------------------------------------------

    /// One-line shell for a stubbed guest function: recognized syscalls and
    /// stub names dispatch to the runtime entry of that name, everything
    /// else to the todo fallback.
    pub fn generate_stub_shell(&self, function: &Function) -> String {
        let name = self
            .function_name(function.start)
            .unwrap_or_else(|| format!("func_{:x}", function.start));
        let body = if ps2_runtime::syscalls::is_syscall_name(&function.name) {
            format!("ps2_runtime::syscalls::{}(rdram, ctx, runtime);", function.name)
        } else if ps2_runtime::stubs::is_stub_name(&function.name) {
            format!("ps2_runtime::stubs::{}(rdram, ctx, runtime);", function.name)
        } else {
            "ps2_runtime::stubs::todo(rdram, ctx, runtime);".to_string()
        };
        format!(
            "pub fn {name}(rdram: &mut [u8], ctx: &mut R5900Context, runtime: &mut PS2Runtime) {{ {body} }}\n"
        )
    }

    /// Entry trampoline: clear BSS with strided stores, seed gp and sp, and
    /// tail into the guest entry function.
    pub fn generate_bootstrap(&self) -> String {
        let info = &self.bootstrap;
        if !info.valid {
            return String::new();
        }
        let mut out = String::new();
        let _ = writeln!(out, "// Bootstrap for the ELF entry point");
        let _ = writeln!(
            out,
            "pub fn entry_{:x}(rdram: &mut [u8], ctx: &mut R5900Context, runtime: &mut PS2Runtime) {{",
            info.entry
        );
        let has_bss = info.bss_end > info.bss_start;
        if has_bss {
            let _ = writeln!(out, "    const BSS_START: u32 = {:#x};", info.bss_start);
            let _ = writeln!(out, "    const BSS_END: u32 = {:#x};", info.bss_end);
            let _ = writeln!(out, "    let mut addr = BSS_START;");
            let _ = writeln!(out, "    while BSS_END - addr >= 16 {{");
            let _ = writeln!(out, "        write128(rdram, addr, 0);");
            let _ = writeln!(out, "        addr += 16;");
            let _ = writeln!(out, "    }}");
            let _ = writeln!(out, "    while BSS_END - addr >= 4 {{");
            let _ = writeln!(out, "        write32(rdram, addr, 0);");
            let _ = writeln!(out, "        addr += 4;");
            let _ = writeln!(out, "    }}");
            let _ = writeln!(out, "    while addr < BSS_END {{");
            let _ = writeln!(out, "        write8(rdram, addr, 0);");
            let _ = writeln!(out, "        addr += 1;");
            let _ = writeln!(out, "    }}");
        }
        if info.gp != 0 {
            let _ = writeln!(out, "    set_gpr_u32(ctx, 28, {:#x});", info.gp);
        }
        if has_bss {
            let _ = writeln!(out, "    set_gpr_u32(ctx, 29, BSS_END);");
        }
        if info.entry_name.is_empty() {
            let _ = writeln!(out, "    ctx.pc = {:#x};", info.entry);
        } else {
            let _ = writeln!(out, "    {}(rdram, ctx, runtime);", info.entry_name);
        }
        let _ = writeln!(out, "}}");
        out
    }

    /// The dispatch-table population function for everything emitted.
    pub fn generate_registration(&self, functions: &[Function]) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "//! Generated by ps2recomp. Do not edit.");
        let _ = writeln!(out);
        let _ = writeln!(out, "use ps2_runtime::PS2Runtime;");
        let _ = writeln!(out, "#[allow(unused_imports)]");
        let _ = writeln!(out, "use super::*;");
        let _ = writeln!(out);
        let _ = writeln!(out, "pub fn register_all_functions(runtime: &mut PS2Runtime) {{");

        if self.bootstrap.valid {
            let _ = writeln!(out, "    // ELF entry bootstrap");
            let _ = writeln!(
                out,
                "    runtime.register_function({:#x}, entry_{:x});",
                self.bootstrap.entry, self.bootstrap.entry
            );
            let _ = writeln!(out);
        }

        let _ = writeln!(out, "    // Recompiled functions");
        for f in functions.iter().filter(|f| f.is_recompiled && !f.is_stub) {
            if let Some(name) = self.function_name(f.start) {
                let _ = writeln!(out, "    runtime.register_function({:#x}, {name});", f.start);
            }
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "    // Stub functions");
        for f in functions.iter().filter(|f| f.is_stub) {
            if let Some(name) = self.function_name(f.start) {
                let _ = writeln!(out, "    runtime.register_function({:#x}, {name});", f.start);
            }
        }

        let _ = writeln!(out, "}}");
        out
    }
}

/// Effective-address expression for a load/store.
fn addr_expr(rs: u8, simm: i16) -> String {
    if simm == 0 {
        format!("gpr_u32(ctx, {rs})")
    } else {
        format!("gpr_u32(ctx, {rs}).wrapping_add({simm}i32 as u32)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use pretty_assertions::assert_eq;

    // Tiny assembler for the encodings the tests need.
    fn i_type(opcode: u32, rs: u32, rt: u32, imm: u16) -> u32 {
        (opcode << 26) | (rs << 21) | (rt << 16) | imm as u32
    }
    fn addiu(rt: u32, rs: u32, imm: i16) -> u32 {
        i_type(0x09, rs, rt, imm as u16)
    }
    fn ori(rt: u32, rs: u32, imm: u16) -> u32 {
        i_type(0x0D, rs, rt, imm)
    }
    fn lui(rt: u32, imm: u16) -> u32 {
        i_type(0x0F, 0, rt, imm)
    }
    fn beq(rs: u32, rt: u32, off: i16) -> u32 {
        i_type(0x04, rs, rt, off as u16)
    }
    fn beql(rs: u32, rt: u32, off: i16) -> u32 {
        i_type(0x14, rs, rt, off as u16)
    }
    fn jr_ra() -> u32 {
        (31 << 21) | 0x08
    }
    fn jal(target: u32) -> u32 {
        (0x03 << 26) | (target >> 2)
    }
    fn add(rd: u32, rs: u32, rt: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | 0x20
    }
    fn addu(rd: u32, rs: u32, rt: u32) -> u32 {
        (rs << 21) | (rt << 16) | (rd << 11) | 0x21
    }
    fn nop() -> u32 {
        0
    }

    fn function_at(start: u32, len: u32) -> Function {
        Function {
            start,
            end: start + len,
            name: format!("f_{start:x}"),
            is_recompiled: true,
            is_stub: false,
        }
    }

    fn decode_all(start: u32, words: &[u32]) -> Vec<crate::decoder::Instruction> {
        words
            .iter()
            .enumerate()
            .map(|(i, &w)| decode(start + 4 * i as u32, w))
            .collect()
    }

    fn generator() -> CodeGenerator {
        CodeGenerator::new(&[])
    }

    #[test]
    fn straight_line_function_is_flat() {
        // S1 shape: lui/ori/addiu/jr/nop
        let words = [
            lui(2, 0x0001),
            ori(2, 2, 0x2345),
            addiu(3, 2, -1),
            jr_ra(),
            nop(),
        ];
        let f = function_at(0x0010_0000, 20);
        let text = generator().generate_function(&f, &decode_all(0x0010_0000, &words));
        assert!(!text.contains("let mut block"), "no dispatch loop expected:\n{text}");
        assert!(text.contains("set_gpr_u32(ctx, 2, 0x1u32 << 16);"));
        assert!(text.contains("set_gpr_u32(ctx, 2, gpr_u32(ctx, 2) | 0x2345);"));
        assert!(text.contains("set_gpr_s32(ctx, 3, gpr_u32(ctx, 2).wrapping_add(-1i32 as u32) as i32);"));
        assert!(text.contains("ctx.pc = gpr_u32(ctx, 31);"));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn internal_branch_gets_dispatch_arms() {
        // S2 shape: branch over one instruction to a jr.
        let words = [
            addiu(2, 0, 3),
            beq(2, 0, 2), // -> 0x...10
            addiu(2, 2, 1),
            addiu(2, 2, 10),
            jr_ra(),
            nop(),
        ];
        let f = function_at(0x0020_0000, 24);
        let text = generator().generate_function(&f, &decode_all(0x0020_0000, &words));
        assert!(text.contains("let mut block: u32 = 0x200000;"));
        assert!(text.contains("0x200010 => {"));
        assert!(text.contains("block = 0x200010;"));
        // Non-likely: the delay slot sits between the condition binding and
        // the if.
        let cond = text.find("let cond = gpr_u32(ctx, 2) == gpr_u32(ctx, 0);").unwrap();
        let delay = text.find("set_gpr_s32(ctx, 2, gpr_u32(ctx, 2).wrapping_add(1i32 as u32) as i32);").unwrap();
        let taken = text.find("if cond {").unwrap();
        assert!(cond < delay && delay < taken);
    }

    #[test]
    fn likely_branch_nests_delay_slot() {
        // S3 shape.
        let words = [
            addiu(2, 0, 0),
            beql(2, 0, 2),
            addiu(2, 2, 1),
            addiu(2, 2, 10),
            jr_ra(),
            nop(),
        ];
        let f = function_at(0x0030_0000, 24);
        let text = generator().generate_function(&f, &decode_all(0x0030_0000, &words));
        let taken = text.find("if cond {").unwrap();
        let delay = text
            .find("set_gpr_s32(ctx, 2, gpr_u32(ctx, 2).wrapping_add(1i32 as u32) as i32);")
            .unwrap();
        let end = text[taken..].find('}').unwrap() + taken;
        assert!(taken < delay && delay < end, "likely delay slot must be inside the if:\n{text}");
    }

    #[test]
    fn jal_links_and_falls_through() {
        // S4/property 14: JAL at 0x0010_FFFC with zero index.
        let words = [jal(0), nop(), jr_ra(), nop()];
        let f = function_at(0x0010_FFFC, 16);
        let text = generator().generate_function(&f, &decode_all(0x0010_FFFC, &words));
        assert!(text.contains("set_gpr_u32(ctx, 31, 0x110004);"));
        assert!(text.contains("ctx.pc = 0x0;"));
    }

    #[test]
    fn branch_to_known_function_calls_directly() {
        let mut gen = generator();
        let mut renames = HashMap::new();
        renames.insert(0x0040_0000u32, "callee".to_string());
        gen.set_renames(renames);
        // beq $0, $0 forward out of range lands at a known function start.
        let words = [beq(0, 0, 0x3FFF), nop(), jr_ra(), nop()];
        let f = function_at(0x003F_0000, 16);
        let text = gen.generate_function(&f, &decode_all(0x003F_0000, &words));
        assert!(text.contains("callee(rdram, ctx, runtime);"));
        assert!(text.contains("return;"));
    }

    #[test]
    fn unknown_branch_target_exits_via_pc() {
        let words = [beq(0, 0, 0x100), nop(), jr_ra(), nop()];
        let f = function_at(0x0050_0000, 16);
        let text = generator().generate_function(&f, &decode_all(0x0050_0000, &words));
        assert!(text.contains("ctx.pc = 0x500404;"));
    }

    #[test]
    fn delay_slot_branch_target_aliases_branch_arm() {
        // beq targets its own delay slot: the arm pattern carries both
        // addresses.
        let words = [beq(0, 0, 0), nop(), jr_ra(), nop()];
        let f = function_at(0x0060_0000, 16);
        let text = generator().generate_function(&f, &decode_all(0x0060_0000, &words));
        assert!(text.contains("0x600000 | 0x600004 => {"), "{text}");
    }

    #[test]
    fn non_trapping_arithmetic_never_signals() {
        let gen = generator();
        for word in [
            addu(6, 4, 5),
            (4 << 21) | (5 << 16) | (6 << 11) | 0x23, // subu
            (4 << 21) | (5 << 16) | (6 << 11) | 0x2D, // daddu
            (4 << 21) | (5 << 16) | (6 << 11) | 0x2F, // dsubu
            addiu(6, 4, 10),
        ] {
            let (text, _) = gen.translate(&decode(0, word));
            assert!(
                !text.contains("signal_exception"),
                "non-trapping form must not signal: {text}"
            );
        }
        // The trapping forms do, under the runtime flag.
        let (text, _) = gen.translate(&decode(0, add(6, 4, 5)));
        assert!(text.contains("if runtime.check_overflow"));
        assert!(text.contains("signal_exception(ctx, Exception::IntegerOverflow)"));
    }

    #[test]
    fn divide_translation_uses_mips_zero_fill() {
        let gen = generator();
        let div = (4 << 21) | (5 << 16) | 0x1A;
        let (text, _) = gen.translate(&decode(0, div));
        assert!(text.contains("ctx.lo = if gpr_s32(ctx, 4) < 0 { 1 } else { 0xFFFF_FFFF };"));
        assert!(text.contains("ctx.hi = gpr_s32(ctx, 4) as u32;"));
        let divu = (4 << 21) | (5 << 16) | 0x1B;
        let (text, _) = gen.translate(&decode(0, divu));
        assert!(text.contains("ctx.lo = 0xFFFF_FFFF;"));
    }

    #[test]
    fn eret_terminates_translation() {
        let eret = (0x10u32 << 26) | (0x10 << 21) | 0x18;
        let (text, diverges) = generator().translate(&decode(0, eret));
        assert!(diverges);
        assert!(text.contains("ctx.cop0_errorepc"));
        assert!(text.contains("clear_ll_bit"));
        assert!(text.ends_with("return;"));
    }

    #[test]
    fn stub_shells_route_by_name() {
        let gen = generator();
        let stub = |name: &str| Function {
            start: 0x1000,
            end: 0x1008,
            name: name.into(),
            is_recompiled: false,
            is_stub: true,
        };
        assert!(gen
            .generate_stub_shell(&stub("FlushCache"))
            .contains("ps2_runtime::syscalls::FlushCache(rdram, ctx, runtime);"));
        assert!(gen
            .generate_stub_shell(&stub("printf"))
            .contains("ps2_runtime::stubs::printf(rdram, ctx, runtime);"));
        assert!(gen
            .generate_stub_shell(&stub("SomethingElse"))
            .contains("ps2_runtime::stubs::todo(rdram, ctx, runtime);"));
    }

    #[test]
    fn bootstrap_clears_bss_and_seeds_pointers() {
        let mut gen = generator();
        gen.set_bootstrap(BootstrapInfo {
            valid: true,
            entry: 0x0010_0008,
            bss_start: 0x0030_0000,
            bss_end: 0x0030_1000,
            gp: 0x0040_0000,
            entry_name: "crt0".to_string(),
        });
        let text = gen.generate_bootstrap();
        assert!(text.contains("pub fn entry_100008"));
        assert!(text.contains("write128(rdram, addr, 0);"));
        assert!(text.contains("write32(rdram, addr, 0);"));
        assert!(text.contains("write8(rdram, addr, 0);"));
        assert!(text.contains("set_gpr_u32(ctx, 28, 0x400000);"));
        assert!(text.contains("set_gpr_u32(ctx, 29, BSS_END);"));
        assert!(text.contains("crt0(rdram, ctx, runtime);"));
    }

    #[test]
    fn registration_covers_bootstrap_and_functions() {
        let mut gen = generator();
        let mut renames = HashMap::new();
        renames.insert(0x0010_0000u32, "ps2_main".to_string());
        renames.insert(0x0010_0100u32, "helper".to_string());
        gen.set_renames(renames);
        gen.set_bootstrap(BootstrapInfo {
            valid: true,
            entry: 0x0010_0000,
            ..Default::default()
        });
        let functions = vec![
            Function {
                start: 0x0010_0000,
                end: 0x0010_0020,
                name: "main".into(),
                is_recompiled: true,
                is_stub: false,
            },
            Function {
                start: 0x0010_0100,
                end: 0x0010_0120,
                name: "helper".into(),
                is_recompiled: false,
                is_stub: true,
            },
        ];
        let text = gen.generate_registration(&functions);
        assert!(text.contains("runtime.register_function(0x100000, entry_100000);"));
        assert!(text.contains("runtime.register_function(0x100000, ps2_main);"));
        assert!(text.contains("runtime.register_function(0x100100, helper);"));
    }

    #[test]
    fn mmi_translations_use_packed_helpers() {
        let gen = generator();
        // paddw $1, $2, $3
        let paddw = (0x1Cu32 << 26) | (2 << 21) | (3 << 16) | (1 << 11) | 0x08;
        let (text, _) = gen.translate(&decode(0, paddw));
        assert_eq!(
            text,
            "set_gpr_vec(ctx, 1, padd_w(gpr_vec(ctx, 2), gpr_vec(ctx, 3)));"
        );
        // padsbh picks the mixed helper.
        let padsbh =
            (0x1Cu32 << 26) | (2 << 21) | (3 << 16) | (1 << 11) | ((0x04u32) << 6) | 0x28;
        let (text, _) = gen.translate(&decode(0, padsbh));
        assert_eq!(
            text,
            "set_gpr_vec(ctx, 1, padsb_h(gpr_vec(ctx, 2), gpr_vec(ctx, 3)));"
        );
        // qfsrv pulls the funnel shift with the SA register.
        let qfsrv =
            (0x1Cu32 << 26) | (2 << 21) | (3 << 16) | (1 << 11) | ((0x1Bu32) << 6) | 0x28;
        let (text, _) = gen.translate(&decode(0, qfsrv));
        assert_eq!(
            text,
            "set_gpr_vec(ctx, 1, qfsrv(gpr_vec(ctx, 3), gpr_vec(ctx, 2), ctx.sa));"
        );
    }

    #[test]
    fn vu_dest_mask_blends() {
        let gen = generator();
        // vadd.xy vf1, vf2, vf3 => mask 0b1100
        let raw = (0x12u32 << 26)
            | (1 << 25)
            | (0xC << 21)
            | (3 << 16)
            | (2 << 11)
            | (1 << 6)
            | 0x28;
        let (text, _) = gen.translate(&decode(0, raw));
        assert!(text.contains("vadd(ctx.vu0_vf[2], ctx.vu0_vf[3])"));
        assert!(text.contains("vblend(ctx.vu0_vf[1], res, 0xc)"));
    }

    #[test]
    fn unaligned_loads_use_ee_merge_formulas() {
        let gen = generator();
        // lwl $2, 1($3)
        let lwl = i_type(0x22, 3, 2, 1);
        let (text, _) = gen.translate(&decode(0, lwl));
        assert!(text.contains("let shift = ((!addr) & 3) << 3;"));
        assert!(text.contains("let mask = 0xFFFF_FFFFu32 >> shift;"));
        assert!(text.contains("(word >> shift) & mask"));
        // lwr $2, 1($3)
        let lwr = i_type(0x26, 3, 2, 1);
        let (text, _) = gen.translate(&decode(0, lwr));
        assert!(text.contains("let shift = (addr & 3) << 3;"));
        assert!(text.contains("let mask = 0xFFFF_FFFFu32 << shift;"));
        // sdr $2, 1($3)
        let sdr = i_type(0x2D, 3, 2, 1);
        let (text, _) = gen.translate(&decode(0, sdr));
        assert!(text.contains("let shift = ((!addr) & 7) << 3;"));
        assert!(text.contains("read64(rdram, aligned)"));
    }

    #[test]
    fn linking_branch_writes_return_address() {
        // bltzall $4, +1 at 0x100000: link goes in before the delay slot,
        // which nests under the condition for the likely form.
        let raw = i_type(0x01, 4, 0x12, 1);
        let words = [raw, addiu(2, 2, 1), jr_ra(), nop()];
        let f = function_at(0x0010_0000, 16);
        let text = generator().generate_function(&f, &decode_all(0x0010_0000, &words));
        let cond = text.find("let cond = gpr_s32(ctx, 4) < 0;").unwrap();
        let link = text.find("set_gpr_u32(ctx, 31, 0x100008);").unwrap();
        let taken = text.find("if cond {").unwrap();
        let delay = text
            .find("set_gpr_s32(ctx, 2, gpr_u32(ctx, 2).wrapping_add(1i32 as u32) as i32);")
            .unwrap();
        assert!(cond < link && link < taken && taken < delay);
    }

    #[test]
    fn syscall_named_function_gets_wrapper() {
        let gen = generator();
        let f = Function {
            start: 0x2000,
            end: 0x2010,
            name: "FlushCache".into(),
            is_recompiled: true,
            is_stub: false,
        };
        let words = [jr_ra(), nop()];
        let text = gen.generate_function(&f, &decode_all(0x2000, &words));
        assert!(text.contains("ps2_runtime::syscalls::FlushCache(rdram, ctx, runtime);"));
        assert!(!text.contains("ctx.pc"));
    }

    #[test]
    fn vcallms_masks_and_scales_immediate() {
        let gen = generator();
        let raw = (0x12u32 << 26) | (1 << 25) | (0x100 << 6) | 0x38;
        let (text, _) = gen.translate(&decode(0, raw));
        assert!(text.contains("execute_vu0_microprogram(rdram, ctx, 0x800)"));
    }
}
