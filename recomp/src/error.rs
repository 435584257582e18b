// Error kinds the recompiler distinguishes. Patch-value and name-collision
// problems recover locally and never surface here.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecompError {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to load executable: {0}")]
    Load(String),

    #[error("invalid address {0:#010x}")]
    InvalidAddress(u32),

    #[error("cannot write {path}: {source}")]
    Emit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
