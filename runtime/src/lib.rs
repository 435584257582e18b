// ps2-runtime: execution environment for statically recompiled PS2 code
//
// Generated functions all share the signature
//
//     fn(rdram: &mut [u8], ctx: &mut R5900Context, runtime: &mut PS2Runtime)
//
// and touch guest state only through the accessors in `ops` and the memory
// helpers in `memory`. Control returns to the dispatcher (`PS2Runtime::run`)
// whenever a function exits with `ctx.pc` pointing at the next guest address;
// direct calls between generated functions bypass the dispatcher entirely.
//
// # Memory model
//
// Guest RAM is a flat 32 MiB buffer. Every access is masked with `RAM_MASK`,
// which folds the mirrored KSEG ranges onto physical RDRAM. Scratchpad and GS
// VRAM are owned by `PS2Memory` but are not visible to generated code.

pub mod context;
pub mod memory;
pub mod ops;
pub mod runtime;
pub mod stubs;
pub mod syscalls;

pub use context::R5900Context;
pub use memory::{LoadError, PS2Memory};
pub use runtime::{Exception, PS2Runtime, RecompiledFn};

/// Main RAM: 32 MiB of RDRAM.
pub const RAM_SIZE: usize = 32 * 1024 * 1024;
/// Address mask folding KSEG mirrors onto physical RDRAM.
pub const RAM_MASK: u32 = RAM_SIZE as u32 - 1;

pub const SCRATCHPAD_BASE: u32 = 0x7000_0000;
pub const SCRATCHPAD_SIZE: usize = 16 * 1024;

pub const GS_VRAM_SIZE: usize = 4 * 1024 * 1024;

/// Default exception handler vector.
pub const EXCEPTION_VECTOR: u32 = 0x8000_0000;

/// MIPS cause code for an arithmetic overflow exception.
pub const CAUSE_INTEGER_OVERFLOW: u32 = 0x0C;
