// ps2recomp: static recompiler for PS2 (EE/R5900) executables.
//
// The pipeline runs in phases:
//
// 1. **Config** (`config.rs`): TOML describing input/output paths, stubbed
//    functions, and instruction patches
// 2. **ELF intake** (`elf.rs`): sections, symbols, relocations, functions
// 3. **Decode** (`decoder.rs`): one typed record per 32-bit word
// 4. **Analysis** (`analysis.rs`): per-function instruction lists, internal
//    branch targets, entry-point discovery
// 5. **Code generation** (`codegen.rs` + `names.rs`): Rust source over the
//    ps2-runtime operators, one function per guest function, plus the
//    bootstrap trampoline and the registration table
//
// The emitted code targets the `ps2-runtime` crate: every function takes
// `(rdram, ctx, runtime)` and leaves either by calling another generated
// function directly or by setting `ctx.pc` and returning to the dispatcher.

pub mod analysis;
pub mod codegen;
pub mod config;
pub mod decoder;
pub mod elf;
pub mod error;
pub mod names;
pub mod recompiler;

pub use config::Config;
pub use decoder::{decode, Instruction};
pub use elf::{ElfImage, Function, Relocation, Section, Symbol};
pub use error::RecompError;
pub use recompiler::Recompiler;

use std::path::Path;

/// Run the whole pipeline for a config file. Returns the number of
/// functions skipped over decode failures.
pub fn recompile(config_path: &Path) -> Result<usize, RecompError> {
    let config = config::load(config_path)?;
    let mut recompiler = Recompiler::new(config)?;
    recompiler.recompile();
    recompiler.generate_output()?;
    Ok(recompiler.skipped_count())
}
