//! Host-side discovery entry points.
//!
//! Each function routes to [`Registry::global`] and is exported unmangled
//! under `<base name>_host`, the names [`HostApi`](crate::discovery::HostApi)
//! looks for. Failures write [`PluginHandle::INVALID`] or [`SymbolAddr::NULL`]
//! to the out-pointer and return the matching [`PluginResult`].

use std::ffi::{CStr, c_char};

use crate::discovery::{self, entry};
use crate::error::{PluginError, PluginResult};
use crate::loader::{PluginHandle, SymbolAddr};
use crate::logging;
use crate::registry::Registry;

/// # Safety
///
/// `path` and `name` must be null or NUL-terminated strings; `out` must be
/// null or valid for writes.
#[no_mangle]
pub unsafe extern "C" fn crucible_load_plugin_host(
    path: *const c_char,
    name: *const c_char,
    out: *mut PluginHandle,
) -> PluginResult {
    let result = unsafe { read_str(path, "path") }.and_then(|path| {
        let name = unsafe { read_str(name, "name") }?;
        Registry::global().load(path, name)
    });
    unsafe { write_out(out, result.as_ref().copied().unwrap_or(PluginHandle::INVALID)) };
    PluginResult::from(&result)
}

/// # Safety
///
/// Always safe to call; `unsafe` only for signature uniformity.
#[no_mangle]
pub unsafe extern "C" fn crucible_unload_plugin_host(handle: PluginHandle) -> PluginResult {
    PluginResult::from(&Registry::global().unload(handle))
}

/// # Safety
///
/// `symbol` must be null or a NUL-terminated string; `out` must be null or
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn crucible_get_plugin_symbol_host(
    handle: PluginHandle,
    symbol: *const c_char,
    out: *mut SymbolAddr,
) -> PluginResult {
    let result = unsafe { read_str(symbol, "symbol") }
        .and_then(|symbol| Registry::global().resolve_symbol(handle, symbol));
    unsafe { write_out(out, result.as_ref().copied().unwrap_or(SymbolAddr::NULL)) };
    PluginResult::from(&result)
}

/// # Safety
///
/// Always safe to call; `unsafe` only for signature uniformity.
#[no_mangle]
pub unsafe extern "C" fn crucible_free_plugin_symbol_host(
    handle: PluginHandle,
    addr: SymbolAddr,
) -> PluginResult {
    PluginResult::from(&Registry::global().release_symbol(handle, addr))
}

/// # Safety
///
/// `name` must be null or a NUL-terminated string; `out` must be null or
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn crucible_find_plugin_by_name_host(
    name: *const c_char,
    out: *mut PluginHandle,
) -> PluginResult {
    let result =
        unsafe { read_str(name, "name") }.and_then(|name| Registry::global().find_by_name(name));
    unsafe { write_out(out, result.as_ref().copied().unwrap_or(PluginHandle::INVALID)) };
    PluginResult::from(&result)
}

/// # Safety
///
/// `path` must be null or a NUL-terminated string; `out` must be null or
/// valid for writes.
#[no_mangle]
pub unsafe extern "C" fn crucible_find_plugin_by_path_host(
    path: *const c_char,
    out: *mut PluginHandle,
) -> PluginResult {
    let result =
        unsafe { read_str(path, "path") }.and_then(|path| Registry::global().find_by_path(path));
    unsafe { write_out(out, result.as_ref().copied().unwrap_or(PluginHandle::INVALID)) };
    PluginResult::from(&result)
}

/// # Safety
///
/// Always safe to call; `unsafe` only for signature uniformity.
#[no_mangle]
pub unsafe extern "C" fn crucible_set_log_flag_host(enabled: bool) {
    logging::set_log_flag(enabled);
}

/// Exported name and address of every entry point.
///
/// Taking the addresses here also keeps the linker from discarding the
/// exports from a host binary that never calls them itself.
pub fn host_exports() -> Vec<(String, SymbolAddr)> {
    let addrs = [
        crucible_load_plugin_host as *const () as usize,
        crucible_unload_plugin_host as *const () as usize,
        crucible_get_plugin_symbol_host as *const () as usize,
        crucible_free_plugin_symbol_host as *const () as usize,
        crucible_find_plugin_by_name_host as *const () as usize,
        crucible_find_plugin_by_path_host as *const () as usize,
        crucible_set_log_flag_host as *const () as usize,
    ];
    entry::ALL
        .iter()
        .zip(addrs)
        .map(|(base, addr)| (discovery::host_symbol_name(base), SymbolAddr::from_raw(addr)))
        .collect()
}

unsafe fn read_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str, PluginError> {
    if ptr.is_null() {
        return Err(PluginError::InvalidArgument(format!("{what} is null")));
    }
    // Safety: non-null and NUL-terminated per the caller's contract.
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| PluginError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

unsafe fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        // Safety: non-null and writable per the caller's contract.
        unsafe { out.write(value) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exports_match_discovery_names() {
        let names: Vec<String> = host_exports().into_iter().map(|(name, _)| name).collect();
        let expected: Vec<String> = entry::ALL
            .iter()
            .map(|b| discovery::host_symbol_name(b))
            .collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_null_arguments_are_rejected() {
        let mut handle = PluginHandle::from_raw(0xdead);
        let status = unsafe { crucible_find_plugin_by_name_host(std::ptr::null(), &mut handle) };
        assert_eq!(status, PluginResult::InvalidArgument);
        assert_eq!(handle, PluginHandle::INVALID);
    }

    #[test]
    fn test_unknown_name_writes_invalid_handle() {
        let mut handle = PluginHandle::from_raw(0xdead);
        let status = unsafe {
            crucible_find_plugin_by_name_host(
                b"ffi-unit-never-loaded\0".as_ptr().cast(),
                &mut handle,
            )
        };
        assert_eq!(status, PluginResult::NotFound);
        assert_eq!(handle, PluginHandle::INVALID);
    }
}
