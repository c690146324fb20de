//! `libloading`-backed loader for real shared libraries.

use std::collections::HashMap;
use std::ffi::c_void;
use std::path::Path;
use std::sync::Mutex;

use libloading::{Library, Symbol};
use tracing::{debug, warn};

use super::{NativeLoader, PluginHandle, SymbolAddr};
use crate::error::LoaderError;
use crate::sync::lock;

/// Loader that opens libraries through the operating system.
///
/// Every successful `open` keeps its [`Library`] value alive, filed under the
/// raw OS handle. The OS returns the same handle when one file is opened more
/// than once, so a handle may own several `Library` values; each `close`
/// drops exactly one of them.
#[derive(Default)]
pub struct DynamicLoader {
    libraries: Mutex<HashMap<PluginHandle, Vec<Library>>>,
}

impl DynamicLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of native references currently held for `handle`.
    pub fn open_count(&self, handle: PluginHandle) -> usize {
        lock(&self.libraries).get(&handle).map_or(0, Vec::len)
    }
}

impl NativeLoader for DynamicLoader {
    fn open(&self, path: &Path) -> Result<PluginHandle, LoaderError> {
        // Safety: running a library's initialisers is the caller's explicit
        // request; nothing else about the library is trusted.
        let library = unsafe { Library::new(path) }?;
        let (handle, library) = split_handle(library);
        debug!("Opened {} as {}", path.display(), handle);

        lock(&self.libraries).entry(handle).or_default().push(library);
        Ok(handle)
    }

    fn close(&self, handle: PluginHandle) -> Result<(), LoaderError> {
        let library = {
            let mut libraries = lock(&self.libraries);
            let opened = libraries
                .get_mut(&handle)
                .ok_or_else(|| LoaderError::new(format!("unknown library handle {handle}")))?;
            let library = opened.pop();
            if opened.is_empty() {
                libraries.remove(&handle);
            }
            library
        };

        match library {
            Some(library) => library.close().map_err(|err| {
                warn!("Native close of {} failed: {}", handle, err);
                LoaderError::from(err)
            }),
            None => Err(LoaderError::new(format!("unknown library handle {handle}"))),
        }
    }

    fn resolve(&self, handle: PluginHandle, name: &str) -> Result<SymbolAddr, LoaderError> {
        let libraries = lock(&self.libraries);
        let library = libraries
            .get(&handle)
            .and_then(|opened| opened.first())
            .ok_or_else(|| LoaderError::new(format!("unknown library handle {handle}")))?;

        // Safety: the symbol is read as an untyped address and never
        // dereferenced here.
        let symbol: Symbol<'_, *mut c_void> = unsafe { library.get(name.as_bytes()) }?;
        let addr = SymbolAddr::from_ptr(*symbol);
        if addr.is_null() {
            return Err(LoaderError::new(format!("{name} resolved to a null address")));
        }
        Ok(addr)
    }
}

/// Resolve `name` against every module already loaded into the process.
///
/// This is the lookup used by the discovery protocol: plugins find the host's
/// entry points here instead of linking against them.
#[cfg(unix)]
pub fn global_symbol(name: &str) -> Result<SymbolAddr, LoaderError> {
    let this = libloading::os::unix::Library::this();
    // Safety: as above, only the address is read.
    let symbol: libloading::os::unix::Symbol<*mut c_void> = unsafe { this.get(name.as_bytes()) }?;
    non_null(name, SymbolAddr::from_ptr(*symbol))
}

/// Resolve `name` against the host executable.
#[cfg(windows)]
pub fn global_symbol(name: &str) -> Result<SymbolAddr, LoaderError> {
    let this = libloading::os::windows::Library::this()?;
    // Safety: as above, only the address is read.
    let symbol: libloading::os::windows::Symbol<*mut c_void> =
        unsafe { this.get(name.as_bytes()) }?;
    non_null(name, SymbolAddr::from_ptr(*symbol))
}

fn non_null(name: &str, addr: SymbolAddr) -> Result<SymbolAddr, LoaderError> {
    if addr.is_null() {
        Err(LoaderError::new(format!("{name} resolved to a null address")))
    } else {
        Ok(addr)
    }
}

#[cfg(unix)]
fn split_handle(library: Library) -> (PluginHandle, Library) {
    let library: libloading::os::unix::Library = library.into();
    let raw = library.into_raw();
    // Safety: `raw` was produced by `into_raw` just above and is reclaimed once.
    let library = unsafe { libloading::os::unix::Library::from_raw(raw) };
    (PluginHandle::from_raw(raw as usize), library.into())
}

#[cfg(windows)]
fn split_handle(library: Library) -> (PluginHandle, Library) {
    let library: libloading::os::windows::Library = library.into();
    let raw = library.into_raw();
    // Safety: `raw` was produced by `into_raw` just above and is reclaimed once.
    let library = unsafe { libloading::os::windows::Library::from_raw(raw) };
    (PluginHandle::from_raw(raw as usize), library.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_library_fails() {
        let loader = DynamicLoader::new();
        let err = loader.open(Path::new("./definitely_not_here.so")).unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn test_close_unknown_handle_fails() {
        let loader = DynamicLoader::new();
        assert!(loader.close(PluginHandle::from_raw(0x10)).is_err());
        assert!(loader.resolve(PluginHandle::from_raw(0x10), "x").is_err());
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    #[test]
    fn test_same_file_shares_handle() {
        let loader = DynamicLoader::new();
        let first = loader.open(Path::new("libm.so.6")).unwrap();
        let second = loader.open(Path::new("libm.so.6")).unwrap();
        assert_eq!(first, second);
        assert_eq!(loader.open_count(first), 2);

        let a = loader.resolve(first, "cos").unwrap();
        let b = loader.resolve(first, "cos").unwrap();
        assert_eq!(a, b);

        loader.close(first).unwrap();
        loader.close(first).unwrap();
        assert_eq!(loader.open_count(first), 0);
    }
}
