// ps2recomp - PS2 (EE/R5900) to Rust static recompiler
//
// Usage:
//   ps2recomp config.toml
//
// The config names the input ELF, the output directory, stubbed functions
// and instruction patches; see config.rs for the schema.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "ps2recomp")]
#[command(about = "PS2 (EE/R5900) to Rust static recompiler")]
#[command(version)]
struct Args {
    /// Recompiler configuration (TOML)
    config: PathBuf,

    /// Verbose output (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let skipped = ps2recomp::recompile(&args.config)
        .with_context(|| format!("recompilation failed for {}", args.config.display()))?;

    // Decode failures are non-fatal for the run but visible in the exit
    // status.
    if skipped > 0 {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
