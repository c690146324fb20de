//! Native loading primitives consumed by the registry.
//!
//! The registry never talks to the OS directly. It goes through a
//! [`NativeLoader`], which supplies exactly three operations: open a library
//! by path, close it, and resolve a symbol by name. Library handles and
//! symbol addresses come back as opaque tokens that are only ever compared
//! and hashed.

use std::ffi::c_void;
use std::fmt;
use std::mem;
use std::num::ParseIntError;
use std::path::Path;
use std::str::FromStr;

use crate::error::LoaderError;

pub mod dynamic;
pub mod memory;

pub use dynamic::{global_symbol, DynamicLoader};
pub use memory::InMemoryLoader;

/// Opaque identity of a loaded library, as handed out by the native loader.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginHandle(usize);

impl PluginHandle {
    /// Sentinel for "no library". Written to out-params on failure.
    pub const INVALID: Self = Self(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

/// Address of a resolved symbol.
///
/// The registry treats this purely as a key; only the caller that requested
/// the symbol knows its real type.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolAddr(usize);

impl SymbolAddr {
    pub const NULL: Self = Self(0);

    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub fn from_ptr(ptr: *const c_void) -> Self {
        Self(ptr as usize)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Reinterpret the address as a pointer-sized value such as an
    /// `extern "C" fn`.
    ///
    /// # Safety
    ///
    /// The address must really point at something of type `F`, and the
    /// owning library must stay loaded while the result is in use.
    ///
    /// # Panics
    ///
    /// Panics if `F` is not pointer sized.
    pub unsafe fn cast<F: Copy>(self) -> F {
        assert_eq!(
            mem::size_of::<F>(),
            mem::size_of::<usize>(),
            "symbol addresses can only be cast to pointer-sized types"
        );
        mem::transmute_copy(&self.0)
    }
}

/// The OS dynamic-loading contract.
///
/// Implementations must return the same [`SymbolAddr`] every time the same
/// symbol is resolved against the same handle.
pub trait NativeLoader: Send + Sync {
    /// Open the library at `path`.
    fn open(&self, path: &Path) -> Result<PluginHandle, LoaderError>;

    /// Release one native reference to `handle`.
    fn close(&self, handle: PluginHandle) -> Result<(), LoaderError>;

    /// Resolve `name` inside the library identified by `handle`.
    fn resolve(&self, handle: PluginHandle, name: &str) -> Result<SymbolAddr, LoaderError>;
}

fn fmt_hex(raw: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{raw:#x}")
}

fn parse_hex(s: &str) -> Result<usize, ParseIntError> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

impl fmt::Display for PluginHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(self.0, f)
    }
}

impl fmt::Display for SymbolAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_hex(self.0, f)
    }
}

impl FromStr for PluginHandle {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s).map(Self)
    }
}

impl FromStr for SymbolAddr {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_int;

    extern "C" fn forty_two() -> c_int {
        42
    }

    #[test]
    fn test_handle_display_and_parse() {
        let handle = PluginHandle::from_raw(0x7f00_1234);
        assert_eq!(handle.to_string(), "0x7f001234");
        assert_eq!("0x7f001234".parse::<PluginHandle>().unwrap(), handle);
        assert_eq!("4096".parse::<SymbolAddr>().unwrap(), SymbolAddr::from_raw(4096));
        assert!("0xzz".parse::<PluginHandle>().is_err());
    }

    #[test]
    fn test_invalid_sentinels() {
        assert!(!PluginHandle::INVALID.is_valid());
        assert!(SymbolAddr::NULL.is_null());
    }

    #[test]
    fn test_cast_to_function_pointer() {
        let addr = SymbolAddr::from_raw(forty_two as *const () as usize);
        let f: extern "C" fn() -> c_int = unsafe { addr.cast() };
        assert_eq!(f(), 42);
    }

    #[test]
    #[should_panic(expected = "pointer-sized")]
    fn test_cast_rejects_wrong_size() {
        let _: u8 = unsafe { SymbolAddr::from_raw(1).cast() };
    }
}
