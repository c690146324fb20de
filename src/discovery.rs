//! Host discovery for code running inside a plugin.
//!
//! A plugin has no static link to the registry. Instead the host exports each
//! registry operation under a well-known name with the [`HOST_SYMBOL_SUFFIX`]
//! marker, and the plugin looks those names up in the process-wide symbol
//! table. The suffix keeps the host's real implementation apart from any
//! same-named declaration a plugin carries for itself.
//!
//! Resolution is all-or-nothing: [`HostApi::bootstrap`] either returns a
//! complete capability struct or `ModuleInitFailed`, so a plugin can never hold
//! a partially usable API.
//!
//! ```rust,ignore
//! let host = unsafe { HostApi::bootstrap()? };
//! let greeter = host.find_by_name("greeter")?;
//! let addr = host.resolve_symbol(greeter, "greeter_func")?;
//! let greet: extern "C" fn(*const c_char) -> c_int = unsafe { addr.cast() };
//! greet(c"hi".as_ptr());
//! host.release_symbol(greeter, addr)?;
//! ```

use std::ffi::{CString, c_char};
use std::fmt;

use crate::error::{PluginError, PluginResult};
use crate::loader::{self, PluginHandle, SymbolAddr};

/// Marker appended to every host entry point name.
pub const HOST_SYMBOL_SUFFIX: &str = "_host";

/// Base names of the host entry points.
pub mod entry {
    pub const LOAD_PLUGIN: &str = "crucible_load_plugin";
    pub const UNLOAD_PLUGIN: &str = "crucible_unload_plugin";
    pub const GET_PLUGIN_SYMBOL: &str = "crucible_get_plugin_symbol";
    pub const FREE_PLUGIN_SYMBOL: &str = "crucible_free_plugin_symbol";
    pub const FIND_PLUGIN_BY_NAME: &str = "crucible_find_plugin_by_name";
    pub const FIND_PLUGIN_BY_PATH: &str = "crucible_find_plugin_by_path";
    pub const SET_LOG_FLAG: &str = "crucible_set_log_flag";

    /// Every entry point, in bootstrap order.
    pub const ALL: [&str; 7] = [
        LOAD_PLUGIN,
        UNLOAD_PLUGIN,
        GET_PLUGIN_SYMBOL,
        FREE_PLUGIN_SYMBOL,
        FIND_PLUGIN_BY_NAME,
        FIND_PLUGIN_BY_PATH,
        SET_LOG_FLAG,
    ];
}

/// Exported name of the entry point `base`.
pub fn host_symbol_name(base: &str) -> String {
    format!("{base}{HOST_SYMBOL_SUFFIX}")
}

pub type LoadPluginFn = unsafe extern "C" fn(
    path: *const c_char,
    name: *const c_char,
    out: *mut PluginHandle,
) -> PluginResult;
pub type UnloadPluginFn = unsafe extern "C" fn(handle: PluginHandle) -> PluginResult;
pub type GetPluginSymbolFn = unsafe extern "C" fn(
    handle: PluginHandle,
    symbol: *const c_char,
    out: *mut SymbolAddr,
) -> PluginResult;
pub type FreePluginSymbolFn =
    unsafe extern "C" fn(handle: PluginHandle, addr: SymbolAddr) -> PluginResult;
pub type FindPluginFn =
    unsafe extern "C" fn(key: *const c_char, out: *mut PluginHandle) -> PluginResult;
pub type SetLogFlagFn = unsafe extern "C" fn(enabled: bool);

/// The host's registry operations, resolved at runtime.
///
/// Obtain one with [`HostApi::bootstrap`] and hand it to whatever code needs
/// host services. The function pointers stay valid for as long as the host
/// process runs.
#[derive(Clone, Copy)]
pub struct HostApi {
    load_plugin: LoadPluginFn,
    unload_plugin: UnloadPluginFn,
    get_plugin_symbol: GetPluginSymbolFn,
    free_plugin_symbol: FreePluginSymbolFn,
    find_plugin_by_name: FindPluginFn,
    find_plugin_by_path: FindPluginFn,
    set_log_flag: SetLogFlagFn,
}

impl HostApi {
    /// Resolve every entry point from the process global symbol table.
    ///
    /// # Safety
    ///
    /// Each exported name must carry the signature declared in this module,
    /// which holds when the host links this crate with the `host` feature.
    pub unsafe fn bootstrap() -> Result<Self, PluginError> {
        // Safety: forwarded to the caller.
        unsafe { Self::bootstrap_with(|symbol| loader::global_symbol(symbol).ok()) }
    }

    /// Resolve every entry point through `resolve`, which maps an exported
    /// name to its address.
    ///
    /// # Safety
    ///
    /// Every address returned by `resolve` must be a function with the
    /// signature declared for that entry point.
    pub unsafe fn bootstrap_with<F>(mut resolve: F) -> Result<Self, PluginError>
    where
        F: FnMut(&str) -> Option<SymbolAddr>,
    {
        let mut lookup = |base: &str| {
            let symbol = host_symbol_name(base);
            match resolve(&symbol) {
                Some(addr) if !addr.is_null() => Ok(addr),
                _ => Err(PluginError::ModuleInitFailed { symbol }),
            }
        };

        let load_plugin = lookup(entry::LOAD_PLUGIN)?;
        let unload_plugin = lookup(entry::UNLOAD_PLUGIN)?;
        let get_plugin_symbol = lookup(entry::GET_PLUGIN_SYMBOL)?;
        let free_plugin_symbol = lookup(entry::FREE_PLUGIN_SYMBOL)?;
        let find_plugin_by_name = lookup(entry::FIND_PLUGIN_BY_NAME)?;
        let find_plugin_by_path = lookup(entry::FIND_PLUGIN_BY_PATH)?;
        let set_log_flag = lookup(entry::SET_LOG_FLAG)?;

        // Safety: signatures are guaranteed by the caller.
        unsafe {
            Ok(Self {
                load_plugin: load_plugin.cast(),
                unload_plugin: unload_plugin.cast(),
                get_plugin_symbol: get_plugin_symbol.cast(),
                free_plugin_symbol: free_plugin_symbol.cast(),
                find_plugin_by_name: find_plugin_by_name.cast(),
                find_plugin_by_path: find_plugin_by_path.cast(),
                set_log_flag: set_log_flag.cast(),
            })
        }
    }

    pub fn load(&self, path: &str, name: &str) -> Result<PluginHandle, PluginError> {
        let c_path = c_string(path)?;
        let c_name = c_string(name)?;
        let mut handle = PluginHandle::INVALID;
        // Safety: both strings outlive the call and `handle` is a valid out-pointer.
        let status = unsafe { (self.load_plugin)(c_path.as_ptr(), c_name.as_ptr(), &mut handle) };
        status.into_result(path)?;
        Ok(handle)
    }

    pub fn unload(&self, handle: PluginHandle) -> Result<(), PluginError> {
        // Safety: handles are plain values; the host validates them.
        unsafe { (self.unload_plugin)(handle) }.into_result("")
    }

    pub fn resolve_symbol(
        &self,
        handle: PluginHandle,
        symbol: &str,
    ) -> Result<SymbolAddr, PluginError> {
        let c_symbol = c_string(symbol)?;
        let mut addr = SymbolAddr::NULL;
        // Safety: `c_symbol` outlives the call and `addr` is a valid out-pointer.
        let status = unsafe { (self.get_plugin_symbol)(handle, c_symbol.as_ptr(), &mut addr) };
        status.into_result(symbol)?;
        Ok(addr)
    }

    pub fn release_symbol(
        &self,
        handle: PluginHandle,
        addr: SymbolAddr,
    ) -> Result<(), PluginError> {
        // Safety: both arguments are plain values.
        unsafe { (self.free_plugin_symbol)(handle, addr) }.into_result("")
    }

    pub fn find_by_name(&self, name: &str) -> Result<PluginHandle, PluginError> {
        find(self.find_plugin_by_name, name)
    }

    pub fn find_by_path(&self, path: &str) -> Result<PluginHandle, PluginError> {
        find(self.find_plugin_by_path, path)
    }

    pub fn set_log_flag(&self, enabled: bool) {
        // Safety: takes a plain value.
        unsafe { (self.set_log_flag)(enabled) }
    }
}

impl fmt::Debug for HostApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostApi")
            .field("load_plugin", &(self.load_plugin as *const ()))
            .finish_non_exhaustive()
    }
}

fn find(f: FindPluginFn, key: &str) -> Result<PluginHandle, PluginError> {
    let c_key = c_string(key)?;
    let mut handle = PluginHandle::INVALID;
    // Safety: `c_key` outlives the call and `handle` is a valid out-pointer.
    let status = unsafe { f(c_key.as_ptr(), &mut handle) };
    status.into_result(key)?;
    Ok(handle)
}

fn c_string(value: &str) -> Result<CString, PluginError> {
    CString::new(value)
        .map_err(|_| PluginError::InvalidArgument(format!("{value:?} contains a NUL byte")))
}
