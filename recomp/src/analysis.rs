// Function-level analysis: the linear decode pass, internal branch-target
// collection, and the post-pass that discovers callable entry points hiding
// inside already-decoded functions.

use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{error, info, warn};

use crate::config::parse_numeric;
use crate::decoder::{self, op, special, Instruction};
use crate::elf::{ElfImage, Function};

/// Map of decoded instruction lists, keyed by function start.
pub type DecodedFunctions = BTreeMap<u32, Vec<Instruction>>;

/// J/JAL target: the jump index replaces bits [27:2] of the address of the
/// delay slot.
pub fn absolute_jump_target(address: u32, target: u32) -> u32 {
    (address.wrapping_add(4) & 0xF000_0000) | (target << 2)
}

/// PC-relative conditional branch target.
pub fn relative_branch_target(inst: &Instruction) -> u32 {
    inst.address
        .wrapping_add(4)
        .wrapping_add(((inst.simmediate as i32) << 2) as u32)
}

/// Statically known control transfer target, if any. Register jumps have
/// none.
pub fn static_branch_target(inst: &Instruction) -> Option<u32> {
    if inst.opcode == op::J || inst.opcode == op::JAL {
        return Some(absolute_jump_target(inst.address, inst.target));
    }
    if inst.opcode == op::SPECIAL
        && matches!(inst.function, special::JR | special::JALR)
    {
        return None;
    }
    if inst.is_branch {
        return Some(relative_branch_target(inst));
    }
    None
}

/// Linearly decode `[start, end)`. Patches replace raw words before decode;
/// a patch value that fails to parse logs and keeps the original word. An
/// unreadable word truncates the function at the last decoded instruction;
/// a function with nothing decodable returns None and is skipped.
pub fn decode_function(
    elf: &ElfImage,
    function: &mut Function,
    patches: &HashMap<u32, String>,
) -> Option<Vec<Instruction>> {
    let mut instructions = Vec::with_capacity(((function.end - function.start) / 4) as usize);
    let mut truncated = false;

    let mut address = function.start;
    while address < function.end {
        let mut raw = match elf.read_word(address) {
            Ok(word) => word,
            Err(_) => {
                warn!(
                    address = format_args!("{:#x}", address),
                    function = %function.name,
                    "unreadable word, truncating decode"
                );
                truncated = true;
                break;
            }
        };

        if let Some(value) = patches.get(&address) {
            match parse_numeric(value) {
                Some(patched) => {
                    info!(
                        address = format_args!("{:#x}", address),
                        old = format_args!("{:#010x}", raw),
                        new = format_args!("{:#010x}", patched),
                        "applied instruction patch"
                    );
                    raw = patched;
                }
                None => {
                    warn!(
                        address = format_args!("{:#x}", address),
                        value = %value,
                        "invalid patch value, keeping original instruction"
                    );
                }
            }
        }

        instructions.push(decoder::decode(address, raw));
        address += 4;
    }

    if instructions.is_empty() {
        error!(function = %function.name, start = format_args!("{:#x}", function.start),
            "no decodable instructions");
        return None;
    }

    if truncated {
        function.end = instructions.last().map(|i| i.address + 4).unwrap_or(function.end);
    }

    Some(instructions)
}

/// Addresses inside `[start, end)` that some direct transfer in the same
/// function targets. Register jumps contribute nothing.
pub fn collect_internal_targets(
    function: &Function,
    instructions: &[Instruction],
) -> HashSet<u32> {
    let mut targets = HashSet::new();
    for inst in instructions {
        if let Some(target) = static_branch_target(inst) {
            if target >= function.start && target < function.end {
                targets.insert(target);
            }
        }
    }
    targets
}

/// Second sweep over every decoded function: a direct transfer landing
/// strictly inside another recompiled function, at an address nothing
/// claims as a start, becomes a callable aliasing entry whose instruction
/// list is the containing function's tail slice.
pub fn discover_entry_points(
    functions: &mut Vec<Function>,
    decoded: &mut DecodedFunctions,
    elf: &ElfImage,
) {
    let mut existing: HashSet<u32> = functions.iter().map(|f| f.start).collect();
    let mut new_entries = Vec::new();

    let containing = |functions: &[Function], target: u32| -> Option<usize> {
        functions
            .iter()
            .position(|f| target >= f.start && target < f.end)
    };

    for idx in 0..functions.len() {
        let function = &functions[idx];
        if !function.is_recompiled || function.is_stub {
            continue;
        }
        let Some(instructions) = decoded.get(&function.start).cloned() else {
            continue;
        };

        for inst in instructions {
            let Some(target) = static_branch_target(&inst) else {
                continue;
            };
            if target % 4 != 0 || !elf.is_valid(target) || existing.contains(&target) {
                continue;
            }
            let Some(owner) = containing(functions, target) else {
                continue;
            };
            let owner = &functions[owner];
            if owner.is_stub || !owner.is_recompiled {
                continue;
            }
            let Some(owner_instructions) = decoded.get(&owner.start) else {
                continue;
            };
            let Some(pos) = owner_instructions.iter().position(|c| c.address == target) else {
                continue;
            };

            let slice = owner_instructions[pos..].to_vec();
            let entry = Function {
                start: target,
                end: owner.end,
                name: format!("entry_{target:x}"),
                is_recompiled: true,
                is_stub: false,
            };
            decoded.insert(target, slice);
            existing.insert(target);
            new_entries.push(entry);
        }
    }

    if !new_entries.is_empty() {
        info!(count = new_entries.len(), "discovered additional entry points");
        functions.extend(new_entries);
        functions.sort_by_key(|f| f.start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::tests::fake_image;
    use crate::elf::Symbol;

    fn function(start: u32, end: u32, name: &str) -> Function {
        Function {
            start,
            end,
            name: name.into(),
            is_recompiled: false,
            is_stub: false,
        }
    }

    #[test]
    fn jump_target_arithmetic() {
        // Corner case: a jump near a 256 MiB boundary takes the region bits
        // from the delay slot's address.
        assert_eq!(absolute_jump_target(0x0010_FFFC, 0), 0x0000_0000);
        assert_eq!(absolute_jump_target(0x0010_0000, 0x40040), 0x0010_0100);
    }

    #[test]
    fn decode_walks_range_and_applies_patches() {
        let img = fake_image(0x1000, &[0x2402_0001, 0x2402_0002, 0x2402_0003], vec![]);
        let mut f = function(0x1000, 0x100C, "f");
        let mut patches = HashMap::new();
        patches.insert(0x1004u32, "0x00000000".to_string());
        patches.insert(0x1008u32, "bogus".to_string());
        let insts = decode_function(&img, &mut f, &patches).unwrap();
        assert_eq!(insts.len(), 3);
        assert_eq!(insts[1].raw, 0); // patched
        assert_eq!(insts[2].raw, 0x2402_0003); // bad patch fell back
    }

    #[test]
    fn decode_truncates_at_section_end() {
        let img = fake_image(0x1000, &[0x2402_0001, 0x2402_0002], vec![]);
        let mut f = function(0x1000, 0x1010, "f");
        let insts = decode_function(&img, &mut f, &HashMap::new()).unwrap();
        assert_eq!(insts.len(), 2);
        assert_eq!(f.end, 0x1008);
    }

    #[test]
    fn decode_empty_function_fails() {
        let img = fake_image(0x1000, &[0], vec![]);
        let mut f = function(0x2000, 0x2008, "f");
        assert!(decode_function(&img, &mut f, &HashMap::new()).is_none());
    }

    #[test]
    fn internal_targets_stay_in_range_and_aligned() {
        // beq $0,$0,+1 at 0x1000 -> 0x1008; j 0x2000 (outside)
        let words = [
            0x1000_0001u32,             // beq $0, $0, +1 => 0x1008
            0x0000_0000,                // nop
            (0x02 << 26) | (0x2000 >> 2), // j 0x2000
            0x0000_0000,
        ];
        let img = fake_image(0x1000, &words, vec![]);
        let mut f = function(0x1000, 0x1010, "f");
        let insts = decode_function(&img, &mut f, &HashMap::new()).unwrap();
        let targets = collect_internal_targets(&f, &insts);
        assert_eq!(targets, HashSet::from([0x1008]));
        for &t in &targets {
            assert!(t >= f.start && t < f.end && t % 4 == 0);
        }
    }

    #[test]
    fn register_jumps_produce_no_targets() {
        let words = [0x03E0_0008u32, 0x0000_0000]; // jr $ra; nop
        let img = fake_image(0x1000, &words, vec![]);
        let mut f = function(0x1000, 0x1008, "f");
        let insts = decode_function(&img, &mut f, &HashMap::new()).unwrap();
        assert!(collect_internal_targets(&f, &insts).is_empty());
    }

    #[test]
    fn entry_discovery_creates_tail_alias() {
        // Function a: [0x400, 0x418) with j 0x410 at 0x400; no symbol at
        // 0x410.
        let words = [
            (0x02u32 << 26) | (0x410 >> 2), // j 0x410
            0x0000_0000,                    // nop (delay)
            0x2402_0001,                    // addiu $2, $0, 1
            0x2402_0007,                    // 0x40c
            0x03E0_0008,                    // 0x410: jr $ra
            0x0000_0000,
        ];
        let img = fake_image(
            0x400,
            &words,
            vec![Symbol { address: 0x400, name: "a".into(), is_function: true }],
        );
        let mut functions = vec![function(0x400, 0x418, "a")];
        let mut decoded = DecodedFunctions::new();
        let insts = decode_function(&img, &mut functions[0], &HashMap::new()).unwrap();
        functions[0].is_recompiled = true;
        decoded.insert(0x400, insts);

        discover_entry_points(&mut functions, &mut decoded, &img);

        assert_eq!(functions.len(), 2);
        let entry = functions.iter().find(|f| f.start == 0x410).unwrap();
        assert_eq!(entry.name, "entry_410");
        assert_eq!(entry.end, 0x418);
        assert!(entry.is_recompiled);

        // Tail-slice law: the alias's list is the containing list from the
        // matching address onward.
        let full = &decoded[&0x400];
        let tail = &decoded[&0x410];
        let pos = full.iter().position(|i| i.address == 0x410).unwrap();
        assert_eq!(tail.len(), full.len() - pos);
        for (a, b) in tail.iter().zip(full[pos..].iter()) {
            assert_eq!(a.raw, b.raw);
            assert_eq!(a.address, b.address);
        }
    }
}
