//! Target backed by a shared library.
//!
//! The library exports a small C API, by default prefixed `xtem_rsp`:
//!
//! ```c
//! void* xtem_rsp_init();
//! int   xtem_rsp_s(void* r);
//! int   xtem_rsp_c(void* r);
//! int   xtem_rsp_g(void* r, char* data);                 // writes hex into data
//! int   xtem_rsp_m(void* r, char* data, int addr, int len);
//! int   xtem_rsp_cleanup(void* r);                       // optional
//! ```
//!
//! Register and memory callbacks write ASCII hex into a NUL-terminated buffer
//! pre-filled with `'0'`; the adapter decodes it into raw bytes.

use std::ffi::{c_char, c_int, c_void};
use std::path::Path;
use std::ptr::NonNull;

use libloading::os::unix::{Library, RTLD_NOW, Symbol};
use rspdiff_proto::hex;
use tracing::{debug, error, warn};

use crate::{Debuggee, TargetError};

/// Symbol prefix used when none is given.
pub const DEFAULT_SYMBOL_PREFIX: &str = "xtem_rsp";

type InitFn = unsafe extern "C" fn() -> *mut c_void;
type RunFn = unsafe extern "C" fn(*mut c_void) -> c_int;
type RegistersFn = unsafe extern "C" fn(*mut c_void, *mut c_char) -> c_int;
type MemoryFn = unsafe extern "C" fn(*mut c_void, *mut c_char, c_int, c_int) -> c_int;
type CleanupFn = unsafe extern "C" fn(*mut c_void) -> c_int;

#[derive(Clone, Copy)]
struct NativeApi {
    init: InitFn,
    step: RunFn,
    resume: RunFn,
    read_registers: RegistersFn,
    read_memory: MemoryFn,
    cleanup: Option<CleanupFn>,
}

impl NativeApi {
    unsafe fn load(lib: &Library, prefix: &str) -> Result<Self, TargetError> {
        unsafe {
            Ok(Self {
                init: load_symbol(lib, &format!("{prefix}_init"))?,
                step: load_symbol(lib, &format!("{prefix}_s"))?,
                resume: load_symbol(lib, &format!("{prefix}_c"))?,
                read_registers: load_symbol(lib, &format!("{prefix}_g"))?,
                read_memory: load_symbol(lib, &format!("{prefix}_m"))?,
                cleanup: load_symbol(lib, &format!("{prefix}_cleanup")).ok(),
            })
        }
    }
}

unsafe fn load_symbol<T: Copy>(lib: &Library, name: &str) -> Result<T, TargetError> {
    unsafe {
        let sym: Symbol<T> = lib.get(name.as_bytes()).map_err(|e| {
            debug!(symbol = name, "symbol not found in library");
            TargetError::SymbolNotFound(name.to_string(), e)
        })?;
        Ok(*sym)
    }
}

/// A debuggee living in a dynamically loaded library.
pub struct NativeDebuggee {
    api: NativeApi,
    handle: NonNull<c_void>,
    // Declared last so the library is unloaded after the handle is released.
    _lib: Library,
}

impl NativeDebuggee {
    /// Load `path`, bind the `<prefix>_*` symbols and initialize a handle.
    pub fn load(path: impl AsRef<Path>, prefix: &str) -> Result<Self, TargetError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TargetError::LibraryNotFound(path.display().to_string()));
        }

        debug!(path = %path.display(), prefix, "loading debuggee library");
        let lib = unsafe { Library::open(Some(path), RTLD_NOW)? };
        let api = unsafe { NativeApi::load(&lib, prefix)? };

        let raw = unsafe { (api.init)() };
        let handle = NonNull::new(raw).ok_or_else(|| {
            error!(path = %path.display(), "debuggee init returned null");
            TargetError::InitFailed(format!("{prefix}_init"))
        })?;
        debug!(handle = ?handle, "debuggee initialized");

        Ok(Self {
            api,
            handle,
            _lib: lib,
        })
    }
}

impl Debuggee for NativeDebuggee {
    fn step(&mut self) -> i32 {
        unsafe { (self.api.step)(self.handle.as_ptr()) }
    }

    fn resume(&mut self) -> i32 {
        unsafe { (self.api.resume)(self.handle.as_ptr()) }
    }

    fn read_registers(&mut self, buf: &mut [u8]) -> i32 {
        let (read, handle) = (self.api.read_registers, self.handle.as_ptr());
        fill_from_hex(buf, |data| unsafe { read(handle, data) })
    }

    fn read_memory(&mut self, addr: u64, buf: &mut [u8]) -> i32 {
        let Some((c_addr, c_len)) = memory_args(addr, buf.len()) else {
            warn!(addr = format!("{addr:#x}"), len = buf.len(), "memory read outside native range");
            buf.fill(0);
            return -1;
        };
        let (read, handle) = (self.api.read_memory, self.handle.as_ptr());
        fill_from_hex(buf, |data| unsafe { read(handle, data, c_addr, c_len) })
    }
}

/// Call `fill` with a `'0'`-filled, NUL-terminated buffer of `2 * buf.len()`
/// hex characters, then decode the result into `buf`.
///
/// Returns the callback's code, or -1 with `buf` zeroed when the callback
/// wrote something other than hex.
fn fill_from_hex(buf: &mut [u8], fill: impl FnOnce(*mut c_char) -> c_int) -> i32 {
    let hex_len = buf.len() * 2;
    let mut text = vec![b'0'; hex_len + 1];
    text[hex_len] = 0;

    let code = fill(text.as_mut_ptr().cast::<c_char>());

    match hex::decode(&text[..hex_len]) {
        Ok(bytes) => {
            buf.copy_from_slice(&bytes);
            code
        }
        Err(e) => {
            warn!(error = %e, "debuggee wrote invalid hex");
            buf.fill(0);
            -1
        }
    }
}

/// Address and length as C ints, if both fit.
fn memory_args(addr: u64, len: usize) -> Option<(c_int, c_int)> {
    Some((c_int::try_from(addr).ok()?, c_int::try_from(len).ok()?))
}

impl Drop for NativeDebuggee {
    fn drop(&mut self) {
        if let Some(cleanup) = self.api.cleanup {
            unsafe {
                cleanup(self.handle.as_ptr());
            }
        }
    }
}
