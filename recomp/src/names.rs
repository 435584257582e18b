// Identifier arbitration: guest symbol names become legal Rust identifiers,
// with collisions resolved globally by suffixing the start address.

use std::collections::HashMap;

use crate::elf::Function;

/// Rust strict and reserved keywords; a sanitized name matching one gets a
/// `ps2_` prefix.
const KEYWORDS: &[&str] = &[
    "abstract", "as", "async", "await", "become", "box", "break", "const", "continue",
    "crate", "do", "dyn", "else", "enum", "extern", "false", "final", "fn", "for", "gen",
    "if", "impl", "in", "let", "loop", "macro", "match", "mod", "move", "mut", "override",
    "priv", "pub", "ref", "return", "self", "Self", "static", "struct", "super", "trait",
    "true", "try", "type", "typeof", "unsafe", "unsized", "use", "virtual", "where",
    "while", "yield",
];

/// Make `name` a legal identifier: every byte outside [A-Za-z0-9_] becomes
/// `_`, a non-alphabetic lead gets one prepended. `main` is taken by the
/// host program, keywords by the language; both are renamed out of the way.
pub fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 1);
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        return out;
    }
    let first = out.as_bytes()[0];
    if !(first.is_ascii_alphabetic() || first == b'_') {
        out.insert(0, '_');
    }
    if out == "main" {
        return "ps2_main".to_string();
    }
    if KEYWORDS.contains(&out.as_str()) {
        return format!("ps2_{out}");
    }
    out
}

/// Final identifier map over every function that will be emitted. Names that
/// collide after sanitization get `_0x<start>` appended on every occurrence.
pub fn build_renames(functions: &[Function]) -> HashMap<u32, String> {
    let base_name = |f: &Function| -> String {
        let sanitized = sanitize(&f.name);
        if sanitized.is_empty() {
            format!("func_{:x}", f.start)
        } else {
            sanitized
        }
    };

    let mut counts: HashMap<String, usize> = HashMap::new();
    for f in functions {
        if !f.is_recompiled && !f.is_stub {
            continue;
        }
        *counts.entry(base_name(f)).or_default() += 1;
    }

    let mut renames = HashMap::new();
    for f in functions {
        if !f.is_recompiled && !f.is_stub {
            continue;
        }
        let name = base_name(f);
        let unique = if counts[&name] > 1 {
            format!("{name}_0x{:x}", f.start)
        } else {
            name
        };
        renames.insert(f.start, unique);
    }
    renames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn func(start: u32, name: &str) -> Function {
        Function {
            start,
            end: start + 8,
            name: name.into(),
            is_recompiled: true,
            is_stub: false,
        }
    }

    #[test]
    fn sanitize_rewrites_illegal_bytes() {
        assert_eq!(sanitize("operator+"), "operator_");
        assert_eq!(sanitize("2start"), "_2start");
        assert_eq!(sanitize("a::b"), "a__b");
        assert_eq!(sanitize("main"), "ps2_main");
        assert_eq!(sanitize("loop"), "ps2_loop");
        assert_eq!(sanitize("already_fine"), "already_fine");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for name in ["operator+", "2start", "a::b", "main", "loop", "x", ""] {
            let once = sanitize(name);
            assert_eq!(sanitize(&once), once);
        }
    }

    #[test]
    fn collisions_get_address_suffix_everywhere() {
        let funcs = vec![func(0x100, "dup"), func(0x200, "dup"), func(0x300, "solo")];
        let renames = build_renames(&funcs);
        assert_eq!(renames[&0x100], "dup_0x100");
        assert_eq!(renames[&0x200], "dup_0x200");
        assert_eq!(renames[&0x300], "solo");
        let mut values: Vec<_> = renames.values().collect();
        values.sort();
        values.dedup();
        assert_eq!(values.len(), renames.len());
    }

    #[test]
    fn sanitized_collisions_also_dedup() {
        // Different raw names, same sanitized form.
        let funcs = vec![func(0x100, "a+b"), func(0x200, "a-b")];
        let renames = build_renames(&funcs);
        assert_eq!(renames[&0x100], "a_b_0x100");
        assert_eq!(renames[&0x200], "a_b_0x200");
    }
}
