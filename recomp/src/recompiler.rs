// Driver: wires the loader, analyzer and generator together and emits the
// output tree.

use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use tracing::{info, warn};

use crate::analysis::{decode_function, discover_entry_points, DecodedFunctions};
use crate::codegen::{BootstrapInfo, CodeGenerator};
use crate::config::Config;
use crate::elf::{ElfImage, Function};
use crate::error::RecompError;
use crate::names;

pub struct Recompiler {
    config: Config,
    elf: ElfImage,
    functions: Vec<Function>,
    decoded: DecodedFunctions,
    generator: CodeGenerator,
    bootstrap: BootstrapInfo,
    stub_names: HashSet<String>,
    skip_names: HashSet<String>,
    skipped: usize,
}

impl Recompiler {
    pub fn new(config: Config) -> Result<Self, RecompError> {
        let mut elf = ElfImage::open(&config.input_path)?;
        if let Some(map) = &config.symbol_map_path {
            elf.load_symbol_map(map)?;
        }
        Self::from_image(config, elf)
    }

    /// Build the pipeline over an already-loaded image.
    pub fn from_image(config: Config, elf: ElfImage) -> Result<Self, RecompError> {
        let functions = elf.extract_functions();
        if functions.is_empty() {
            return Err(RecompError::Load("no functions found in executable".into()));
        }

        let bootstrap = bootstrap_info(&elf);
        let generator = CodeGenerator::new(&elf.symbols);
        let stub_names: HashSet<String> = config.stub_implementations.iter().cloned().collect();
        let skip_names: HashSet<String> = config.skip_functions.iter().cloned().collect();

        info!(
            functions = functions.len(),
            symbols = elf.symbols.len(),
            sections = elf.sections.len(),
            relocations = elf.relocations.len(),
            "extracted program structure"
        );

        Ok(Recompiler {
            config,
            elf,
            functions,
            decoded: DecodedFunctions::new(),
            generator,
            bootstrap,
            stub_names,
            skip_names,
            skipped: 0,
        })
    }

    /// Functions that failed to decode and were dropped from the output.
    pub fn skipped_count(&self) -> usize {
        self.skipped
    }

    fn is_stub_function(&self, name: &str) -> bool {
        self.stub_names.contains(name) || ps2_runtime::stubs::is_stub_name(name)
    }

    /// Decode every function, then run entry-point discovery over the
    /// results.
    pub fn recompile(&mut self) {
        info!(count = self.functions.len(), "recompiling functions");

        for i in 0..self.functions.len() {
            let name = self.functions[i].name.clone();
            if self.is_stub_function(&name) {
                self.functions[i].is_stub = true;
                continue;
            }
            if self.skip_names.contains(&name) {
                info!(function = %name, "skipping function (stubbed)");
                self.functions[i].is_stub = true;
                continue;
            }

            match decode_function(&self.elf, &mut self.functions[i], &self.config.patches) {
                Some(instructions) => {
                    let start = self.functions[i].start;
                    self.functions[i].is_recompiled = true;
                    self.decoded.insert(start, instructions);
                }
                None => {
                    self.skipped += 1;
                    warn!(function = %name, "skipping function due to decode failure");
                }
            }
        }

        discover_entry_points(&mut self.functions, &mut self.decoded, &self.elf);

        if self.skipped > 0 {
            warn!(
                "Recompile completed with {} function(s) skipped",
                self.skipped
            );
        } else {
            info!("recompilation completed");
        }
    }

    /// Emit the generated source tree.
    pub fn generate_output(&mut self) -> Result<(), RecompError> {
        let renames = names::build_renames(&self.functions);
        if self.bootstrap.valid {
            if let Some(name) = renames.get(&self.bootstrap.entry) {
                self.bootstrap.entry_name = name.clone();
            }
        }
        self.generator.set_renames(renames);
        self.generator.set_bootstrap(self.bootstrap.clone());

        fs::create_dir_all(&self.config.output_path).map_err(|e| RecompError::Emit {
            path: self.config.output_path.clone(),
            source: e,
        })?;

        if self.config.single_file_output {
            let mut combined = CodeGenerator::file_prologue(false);
            if self.bootstrap.valid {
                combined.push_str(&self.generator.generate_bootstrap());
                combined.push('\n');
            }
            for f in &self.functions {
                if f.is_stub {
                    combined.push_str(&self.generator.generate_stub_shell(f));
                    combined.push('\n');
                } else if f.is_recompiled {
                    let instructions = &self.decoded[&f.start];
                    combined.push_str(&self.generator.generate_function(f, instructions));
                    combined.push('\n');
                }
            }
            let path = self.write_file("ps2_recompiled_functions.rs", &combined)?;
            info!(path = %path.display(), "wrote combined output");
        } else {
            // Per-function files live under ps2_recompiled_functions/ so the
            // index file's module declarations resolve.
            let subdir = self.config.output_path.join("ps2_recompiled_functions");
            fs::create_dir_all(&subdir).map_err(|e| RecompError::Emit {
                path: subdir.clone(),
                source: e,
            })?;

            let mut modules = Vec::new();

            if self.bootstrap.valid {
                let mut text = CodeGenerator::file_prologue(true);
                text.push_str(&self.generator.generate_bootstrap());
                self.write_file("ps2_recompiled_functions/ps2_entry_bootstrap.rs", &text)?;
                modules.push("ps2_entry_bootstrap".to_string());
            }

            for f in &self.functions {
                if !f.is_recompiled && !f.is_stub {
                    continue;
                }
                let mut text = CodeGenerator::file_prologue(true);
                if f.is_stub {
                    text.push_str(&self.generator.generate_stub_shell(f));
                } else {
                    text.push_str(&self.generator.generate_function(f, &self.decoded[&f.start]));
                }
                let stem = self.output_file_stem(f);
                self.write_file(&format!("ps2_recompiled_functions/{stem}.rs"), &text)?;
                modules.push(stem);
            }

            // The declarations index: every generated function re-exported
            // from one module.
            modules.sort();
            modules.dedup();
            let mut index = String::from("//! Generated by ps2recomp. Do not edit.\n\n");
            for m in &modules {
                index.push_str(&format!("pub mod {m};\n"));
            }
            index.push('\n');
            for m in &modules {
                index.push_str(&format!("pub use {m}::*;\n"));
            }
            self.write_file("ps2_recompiled_functions.rs", &index)?;
            info!(
                functions = modules.len(),
                dir = %self.config.output_path.display(),
                "wrote individual function files"
            );
        }

        let registration = self.generator.generate_registration(&self.functions);
        let path = self.write_file("register_functions.rs", &registration)?;
        info!(path = %path.display(), "generated function registration file");

        self.write_stub_manifest()?;

        Ok(())
    }

    /// The stub manifest: names the runtime is expected to supply.
    fn write_stub_manifest(&self) -> Result<(), RecompError> {
        let mut stubs: Vec<String> = self
            .skip_names
            .iter()
            .chain(self.stub_names.iter())
            .map(|n| names::sanitize(n))
            .filter(|n| !n.is_empty())
            .collect();
        stubs.sort();
        stubs.dedup();

        let mut out = String::from(
            "//! Generated by ps2recomp. Do not edit.\n\n\
             /// Stubbed guest functions the runtime must supply, by name.\n\
             pub const REQUIRED_STUBS: &[&str] = &[\n",
        );
        for name in &stubs {
            out.push_str(&format!("    \"{name}\",\n"));
        }
        out.push_str("];\n");
        self.write_file("ps2_recompiled_stubs.rs", &out)?;
        Ok(())
    }

    fn output_file_stem(&self, function: &Function) -> String {
        let base = self
            .generator
            .function_name(function.start)
            .unwrap_or_else(|| format!("func_{:x}", function.start));
        let suffix = format!("_0x{:x}", function.start);
        if base.ends_with(&suffix) {
            base
        } else {
            format!("{base}{suffix}")
        }
    }

    fn write_file(&self, name: &str, content: &str) -> Result<PathBuf, RecompError> {
        let path = self.config.output_path.join(name);
        fs::write(&path, content).map_err(|e| RecompError::Emit {
            path: path.clone(),
            source: e,
        })?;
        Ok(path)
    }
}

fn bootstrap_info(elf: &ElfImage) -> BootstrapInfo {
    let entry = elf.entry_point();
    info!(entry = format_args!("{:#x}", entry), "ELF entry point");

    let mut bss_start = u32::MAX;
    let mut bss_end = 0u32;
    for sec in &elf.sections {
        if sec.is_bss && sec.size > 0 {
            bss_start = bss_start.min(sec.address);
            bss_end = bss_end.max(sec.address.wrapping_add(sec.size));
        }
    }

    let gp = elf
        .symbols
        .iter()
        .find(|s| s.name == "_gp")
        .map(|s| s.address)
        .unwrap_or(0);

    if bss_start != u32::MAX {
        info!(
            bss_start = format_args!("{:#x}", bss_start),
            bss_end = format_args!("{:#x}", bss_end),
            gp = format_args!("{:#x}", gp),
            "BSS range"
        );
    } else {
        info!(gp = format_args!("{:#x}", gp), "no BSS found");
    }

    let has_bss = bss_start != u32::MAX && bss_end > bss_start;
    BootstrapInfo {
        valid: entry != 0,
        entry,
        bss_start: if has_bss { bss_start } else { 0 },
        bss_end: if has_bss { bss_end } else { 0 },
        gp,
        entry_name: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elf::{Section, Symbol};

    fn image_with_bss() -> ElfImage {
        let mut img = crate::elf::tests::fake_image(
            0x0010_0000,
            &[0x03E0_0008, 0x0000_0000],
            vec![
                Symbol { address: 0x0010_0000, name: "crt0".into(), is_function: true },
                Symbol { address: 0x0030_0000, name: "_gp".into(), is_function: false },
            ],
        );
        img.sections.push(Section {
            name: ".bss".into(),
            address: 0x0020_0000,
            size: 0x1000,
            data: Vec::new(),
            is_bss: true,
            is_executable: false,
        });
        img
    }

    #[test]
    fn bootstrap_info_collects_entry_bss_and_gp() {
        let info = bootstrap_info(&image_with_bss());
        assert!(info.valid);
        assert_eq!(info.entry, 0x0010_0000);
        assert_eq!(info.bss_start, 0x0020_0000);
        assert_eq!(info.bss_end, 0x0020_1000);
        assert_eq!(info.gp, 0x0030_0000);
    }

    #[test]
    fn bootstrap_info_without_bss_zeroes_range() {
        let mut img = image_with_bss();
        img.sections.retain(|s| !s.is_bss);
        let info = bootstrap_info(&img);
        assert_eq!((info.bss_start, info.bss_end), (0, 0));
    }

    #[test]
    fn pipeline_emits_expected_files() {
        // Entry calls a helper; a third name is configured as a skip stub.
        let words = [
            0x0C04_0002u32, // 0x100000: jal 0x100008
            0x0000_0000,    // delay
            0x2402_0042,    // 0x100008: addiu $2, $0, 0x42 (helper)
            0x03E0_0008,    // jr $ra
            0x0000_0000,
            0x0000_0000, // 0x100014: body of the stubbed function
        ];
        let img = crate::elf::tests::fake_image(
            0x0010_0000,
            &words,
            vec![
                Symbol { address: 0x0010_0000, name: "crt0".into(), is_function: true },
                Symbol { address: 0x0010_0008, name: "helper".into(), is_function: true },
                Symbol { address: 0x0010_0014, name: "SifLoadModule".into(), is_function: true },
            ],
        );
        let out = std::env::temp_dir().join("ps2recomp_pipeline_test");
        let _ = fs::remove_dir_all(&out);
        let config = Config {
            output_path: out.clone(),
            skip_functions: vec!["SifLoadModule".into()],
            ..Default::default()
        };

        let mut recomp = Recompiler::from_image(config, img).unwrap();
        recomp.recompile();
        assert_eq!(recomp.skipped_count(), 0);
        recomp.generate_output().unwrap();

        let index = fs::read_to_string(out.join("ps2_recompiled_functions.rs")).unwrap();
        assert!(index.contains("pub mod crt0_0x100000;"));
        assert!(index.contains("pub mod helper_0x100008;"));
        assert!(index.contains("pub mod ps2_entry_bootstrap;"));

        let register = fs::read_to_string(out.join("register_functions.rs")).unwrap();
        assert!(register.contains("runtime.register_function(0x100000, entry_100000);"));
        assert!(register.contains("runtime.register_function(0x100008, helper);"));
        assert!(register.contains("runtime.register_function(0x100014, SifLoadModule);"));

        let gen_dir = out.join("ps2_recompiled_functions");
        let crt0 = fs::read_to_string(gen_dir.join("crt0_0x100000.rs")).unwrap();
        assert!(crt0.contains("helper(rdram, ctx, runtime);"));
        assert!(crt0.contains("set_gpr_u32(ctx, 31, 0x100008);"));

        let stub = fs::read_to_string(gen_dir.join("SifLoadModule_0x100014.rs")).unwrap();
        assert!(stub.contains("ps2_runtime::stubs::todo(rdram, ctx, runtime);"));
        assert!(gen_dir.join("ps2_entry_bootstrap.rs").exists());

        let manifest = fs::read_to_string(out.join("ps2_recompiled_stubs.rs")).unwrap();
        assert!(manifest.contains("\"SifLoadModule\""));
    }
}
