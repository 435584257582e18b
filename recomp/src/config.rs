// Recompiler configuration, read from a TOML file:
//
//   [general]
//   input = "game.elf"
//   output = "out/"
//   ghidra_output = "functions.map"     # optional symbol map
//   single_file_output = false
//   stubs = ["printf", "malloc"]       # runtime supplies these
//   skip = ["SifLoadModule"]           # stubbed with the todo fallback
//
//   [[patches.instructions]]
//   address = "0x100ab4"               # int or "0x.." string
//   value = 0x00000000
//
// `stubs` and `skip` are also honored at the top level for older configs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RecompError;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub symbol_map_path: Option<PathBuf>,
    pub single_file_output: bool,
    pub stub_implementations: Vec<String>,
    pub skip_functions: Vec<String>,
    /// Instruction patches, keyed by guest address. Values stay as written in
    /// the config; they are parsed at decode time so a bad one can fall back
    /// to the original word.
    pub patches: HashMap<u32, String>,
}

#[derive(Deserialize)]
struct RawConfig {
    general: RawGeneral,
    stubs: Option<Vec<String>>,
    skip: Option<Vec<String>>,
    patches: Option<RawPatches>,
}

#[derive(Deserialize)]
struct RawGeneral {
    input: PathBuf,
    output: PathBuf,
    ghidra_output: Option<PathBuf>,
    #[serde(default)]
    single_file_output: bool,
    stubs: Option<Vec<String>>,
    skip: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RawPatches {
    #[serde(default)]
    instructions: Vec<RawPatch>,
}

#[derive(Deserialize)]
struct RawPatch {
    address: IntOrString,
    value: IntOrString,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IntOrString {
    Int(i64),
    Str(String),
}

impl IntOrString {
    fn as_text(&self) -> String {
        match self {
            IntOrString::Int(v) => format!("{:#x}", *v as u32),
            IntOrString::Str(s) => s.clone(),
        }
    }
}

/// Parse "0x.."-prefixed hex or plain decimal.
pub fn parse_numeric(text: &str) -> Option<u32> {
    let text = text.trim();
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse::<u32>().ok()
    }
}

pub fn load(path: &Path) -> Result<Config, RecompError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| RecompError::Config(format!("{}: {e}", path.display())))?;
    let raw: RawConfig =
        toml::from_str(&text).map_err(|e| RecompError::Config(format!("{}: {e}", path.display())))?;

    let mut config = Config {
        input_path: raw.general.input,
        output_path: raw.general.output,
        symbol_map_path: raw.general.ghidra_output,
        single_file_output: raw.general.single_file_output,
        stub_implementations: raw.general.stubs.or(raw.stubs).unwrap_or_default(),
        skip_functions: raw.general.skip.or(raw.skip).unwrap_or_default(),
        patches: HashMap::new(),
    };

    for patch in raw.patches.map(|p| p.instructions).unwrap_or_default() {
        let addr_text = patch.address.as_text();
        match parse_numeric(&addr_text) {
            Some(addr) => {
                config.patches.insert(addr, patch.value.as_text());
            }
            None => {
                tracing::warn!(address = %addr_text, "skipping patch with unparsable address");
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_config_parses() {
        let text = r#"
            [general]
            input = "game.elf"
            output = "out"
            ghidra_output = "funcs.map"
            single_file_output = true
            stubs = ["printf"]
            skip = ["SifLoadModule"]

            [[patches.instructions]]
            address = "0x100ab4"
            value = 0

            [[patches.instructions]]
            address = 1049276
            value = "0x03e00008"
        "#;
        let raw: RawConfig = toml::from_str(text).unwrap();
        assert!(raw.general.single_file_output);
        let dir = std::env::temp_dir().join("ps2recomp_config_test.toml");
        std::fs::write(&dir, text).unwrap();
        let config = load(&dir).unwrap();
        assert_eq!(config.stub_implementations, vec!["printf".to_string()]);
        assert_eq!(config.skip_functions, vec!["SifLoadModule".to_string()]);
        assert_eq!(config.patches.get(&0x100ab4).unwrap(), "0x0");
        assert_eq!(config.patches.get(&0x1002bc).unwrap(), "0x03e00008");
    }

    #[test]
    fn top_level_stub_lists_are_honored() {
        let text = r#"
            stubs = ["malloc"]
            skip = ["foo"]

            [general]
            input = "a.elf"
            output = "o"
        "#;
        let dir = std::env::temp_dir().join("ps2recomp_config_test2.toml");
        std::fs::write(&dir, text).unwrap();
        let config = load(&dir).unwrap();
        assert_eq!(config.stub_implementations, vec!["malloc".to_string()]);
        assert_eq!(config.skip_functions, vec!["foo".to_string()]);
        assert!(!config.single_file_output);
    }

    #[test]
    fn numeric_parsing() {
        assert_eq!(parse_numeric("0x10"), Some(16));
        assert_eq!(parse_numeric("42"), Some(42));
        assert_eq!(parse_numeric("zz"), None);
    }
}
