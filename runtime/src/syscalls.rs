// Well-known EE kernel entry points, dispatched by name from generated stub
// shells. Implementations here are the host-side policy: enough thread,
// semaphore and file plumbing for recompiled titles to get through startup,
// with everything observable through the log.
//
// All entries share the generated-function signature so they can be
// registered in the dispatch table directly.

#![allow(non_snake_case)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Mutex, OnceLock};

use tracing::{debug, info, warn};

use crate::context::{get_reg_u32, set_return_s32, set_return_u32, R5900Context};
use crate::memory::read_cstring;
use crate::runtime::PS2Runtime;

/// Names the recompiler recognizes as BIOS/kernel calls. A guest function
/// carrying one of these names is stubbed to the entry of the same name.
pub const SYSCALL_NAMES: &[&str] = &[
    "FlushCache",
    "ResetEE",
    "CreateThread",
    "StartThread",
    "ExitThread",
    "GetThreadId",
    "SleepThread",
    "WakeupThread",
    "ChangeThreadPriority",
    "CreateSema",
    "DeleteSema",
    "SignalSema",
    "WaitSema",
    "PollSema",
    "SifInitRpc",
    "SifSetDChain",
    "GsSetCrt",
    "GsGetIMR",
    "GsPutIMR",
    "fioOpen",
    "fioClose",
    "fioRead",
    "fioWrite",
    "fioLseek",
];

pub fn is_syscall_name(name: &str) -> bool {
    SYSCALL_NAMES.contains(&name)
}

static NEXT_THREAD_ID: AtomicI32 = AtomicI32::new(2);
static NEXT_SEMA_ID: AtomicI32 = AtomicI32::new(1);

struct SemaState {
    counts: HashMap<i32, i32>,
}

fn semas() -> &'static Mutex<SemaState> {
    static SEMAS: OnceLock<Mutex<SemaState>> = OnceLock::new();
    SEMAS.get_or_init(|| Mutex::new(SemaState { counts: HashMap::new() }))
}

struct FileTable {
    files: HashMap<i32, File>,
    next_fd: i32,
}

fn files() -> &'static Mutex<FileTable> {
    static FILES: OnceLock<Mutex<FileTable>> = OnceLock::new();
    FILES.get_or_init(|| Mutex::new(FileTable { files: HashMap::new(), next_fd: 3 }))
}

pub fn FlushCache(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    debug!("FlushCache");
    set_return_u32(ctx, 0);
}

pub fn ResetEE(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    info!("ResetEE");
    set_return_u32(ctx, 0);
}

pub fn CreateThread(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let param_ptr = get_reg_u32(ctx, 4);
    let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
    info!(param = format_args!("{:#x}", param_ptr), id, "CreateThread");
    set_return_s32(ctx, id);
}

pub fn StartThread(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    info!(id, "StartThread (not scheduled; single guest thread)");
    set_return_s32(ctx, id);
}

pub fn ExitThread(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    info!("ExitThread");
    // Unwind to the dispatcher; pc 0 halts the run loop.
    ctx.pc = 0;
}

pub fn GetThreadId(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    set_return_s32(ctx, 1);
}

pub fn SleepThread(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    debug!("SleepThread");
    set_return_u32(ctx, 0);
}

pub fn WakeupThread(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    debug!(id, "WakeupThread");
    set_return_s32(ctx, id);
}

pub fn ChangeThreadPriority(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    let prio = get_reg_u32(ctx, 5) as i32;
    debug!(id, prio, "ChangeThreadPriority");
    set_return_s32(ctx, 0);
}

pub fn CreateSema(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = NEXT_SEMA_ID.fetch_add(1, Ordering::Relaxed);
    let mut state = semas().lock().unwrap();
    state.counts.insert(id, 0);
    debug!(id, "CreateSema");
    set_return_s32(ctx, id);
}

pub fn DeleteSema(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    let removed = semas().lock().unwrap().counts.remove(&id).is_some();
    debug!(id, removed, "DeleteSema");
    set_return_s32(ctx, if removed { id } else { -1 });
}

pub fn SignalSema(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    if let Some(count) = semas().lock().unwrap().counts.get_mut(&id) {
        *count += 1;
    }
    set_return_s32(ctx, id);
}

pub fn WaitSema(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    if let Some(count) = semas().lock().unwrap().counts.get_mut(&id) {
        // Single guest thread: never block, just consume.
        if *count > 0 {
            *count -= 1;
        }
    }
    set_return_s32(ctx, id);
}

pub fn PollSema(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let id = get_reg_u32(ctx, 4) as i32;
    let ok = semas()
        .lock()
        .unwrap()
        .counts
        .get_mut(&id)
        .map(|count| {
            if *count > 0 {
                *count -= 1;
                true
            } else {
                false
            }
        })
        .unwrap_or(false);
    set_return_s32(ctx, if ok { id } else { -1 });
}

pub fn SifInitRpc(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    debug!("SifInitRpc");
    set_return_u32(ctx, 0);
}

pub fn SifSetDChain(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    debug!("SifSetDChain");
    set_return_u32(ctx, 0);
}

pub fn GsSetCrt(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let interlace = get_reg_u32(ctx, 4);
    let mode = get_reg_u32(ctx, 5);
    let field = get_reg_u32(ctx, 6);
    info!(interlace, mode, field, "GsSetCrt");
    set_return_u32(ctx, 0);
}

pub fn GsGetIMR(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    set_return_u32(ctx, 0);
}

pub fn GsPutIMR(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let imr = get_reg_u32(ctx, 4);
    debug!(imr = format_args!("{:#x}", imr), "GsPutIMR");
    set_return_u32(ctx, 0);
}

pub fn fioOpen(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let path = read_cstring(rdram, get_reg_u32(ctx, 4), 256);
    let flags = get_reg_u32(ctx, 5);
    // Host-relative open; the PS2 device prefix (host0: etc.) is stripped.
    let host_path = path.split_once(':').map(|(_, p)| p).unwrap_or(&path);
    let write = flags & 0x0002 != 0;
    let result = std::fs::OpenOptions::new()
        .read(true)
        .write(write)
        .create(write && flags & 0x0200 != 0)
        .open(host_path);
    match result {
        Ok(file) => {
            let mut table = files().lock().unwrap();
            let fd = table.next_fd;
            table.next_fd += 1;
            table.files.insert(fd, file);
            info!(path, fd, "fioOpen");
            set_return_s32(ctx, fd);
        }
        Err(err) => {
            warn!(path, %err, "fioOpen failed");
            set_return_s32(ctx, -1);
        }
    }
}

pub fn fioClose(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let fd = get_reg_u32(ctx, 4) as i32;
    let removed = files().lock().unwrap().files.remove(&fd).is_some();
    debug!(fd, removed, "fioClose");
    set_return_s32(ctx, if removed { 0 } else { -1 });
}

pub fn fioRead(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let fd = get_reg_u32(ctx, 4) as i32;
    let buf = get_reg_u32(ctx, 5);
    let len = get_reg_u32(ctx, 6) as usize;
    let mut table = files().lock().unwrap();
    let Some(file) = table.files.get_mut(&fd) else {
        set_return_s32(ctx, -1);
        return;
    };
    let mut scratch = vec![0u8; len];
    match file.read(&mut scratch) {
        Ok(n) => {
            for (i, byte) in scratch[..n].iter().enumerate() {
                crate::memory::write8(rdram, buf.wrapping_add(i as u32), *byte);
            }
            set_return_s32(ctx, n as i32);
        }
        Err(_) => set_return_s32(ctx, -1),
    }
}

pub fn fioWrite(rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let fd = get_reg_u32(ctx, 4) as i32;
    let buf = get_reg_u32(ctx, 5);
    let len = get_reg_u32(ctx, 6) as usize;
    let mut scratch = Vec::with_capacity(len);
    for i in 0..len {
        scratch.push(crate::memory::read8(rdram, buf.wrapping_add(i as u32)));
    }
    if fd == 1 || fd == 2 {
        // Guest stdout/stderr pass through.
        print!("{}", String::from_utf8_lossy(&scratch));
        set_return_s32(ctx, len as i32);
        return;
    }
    let mut table = files().lock().unwrap();
    let Some(file) = table.files.get_mut(&fd) else {
        set_return_s32(ctx, -1);
        return;
    };
    match file.write(&scratch) {
        Ok(n) => set_return_s32(ctx, n as i32),
        Err(_) => set_return_s32(ctx, -1),
    }
}

pub fn fioLseek(_rdram: &mut [u8], ctx: &mut R5900Context, _rt: &mut PS2Runtime) {
    let fd = get_reg_u32(ctx, 4) as i32;
    let offset = get_reg_u32(ctx, 5) as i32;
    let whence = get_reg_u32(ctx, 6);
    let mut table = files().lock().unwrap();
    let Some(file) = table.files.get_mut(&fd) else {
        set_return_s32(ctx, -1);
        return;
    };
    let pos = match whence {
        0 => SeekFrom::Start(offset as u64),
        1 => SeekFrom::Current(offset as i64),
        _ => SeekFrom::End(offset as i64),
    };
    match file.seek(pos) {
        Ok(p) => set_return_s32(ctx, p as i32),
        Err(_) => set_return_s32(ctx, -1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::gpr_u32;

    #[test]
    fn name_table_matches_entries() {
        assert!(is_syscall_name("FlushCache"));
        assert!(is_syscall_name("fioLseek"));
        assert!(!is_syscall_name("printf"));
        assert!(!is_syscall_name("NotASyscall"));
    }

    #[test]
    fn sema_lifecycle() {
        let mut ctx = R5900Context::new();
        let mut rt = PS2Runtime::new();
        let mut ram = vec![0u8; 64];
        CreateSema(&mut ram, &mut ctx, &mut rt);
        let id = gpr_u32(&ctx, 2);
        assert!(id >= 1);
        ctx.r[4] = id as u128;
        SignalSema(&mut ram, &mut ctx, &mut rt);
        PollSema(&mut ram, &mut ctx, &mut rt);
        assert_eq!(gpr_u32(&ctx, 2), id);
        // Second poll finds the count drained.
        PollSema(&mut ram, &mut ctx, &mut rt);
        assert_eq!(gpr_u32(&ctx, 2), 0xFFFF_FFFF);
    }

    #[test]
    fn exit_thread_halts() {
        let mut ctx = R5900Context::new();
        ctx.pc = 0x100000;
        let mut rt = PS2Runtime::new();
        let mut ram = vec![0u8; 16];
        ExitThread(&mut ram, &mut ctx, &mut rt);
        assert_eq!(ctx.pc, 0);
    }
}
