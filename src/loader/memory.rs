//! In-process loader that serves libraries from a table instead of disk.
//!
//! Useful for driving the registry in tests and benchmarks, and for embedders
//! that link their "plugins" statically but still want reference tracking.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{NativeLoader, PluginHandle, SymbolAddr};
use crate::error::LoaderError;
use crate::sync::lock;

const HANDLE_STRIDE: usize = 0x1000;

struct MemoryLibrary {
    handle: PluginHandle,
    symbols: HashMap<String, SymbolAddr>,
}

#[derive(Default)]
struct MemoryState {
    by_path: HashMap<PathBuf, PluginHandle>,
    libraries: HashMap<PluginHandle, MemoryLibrary>,
    open_refs: HashMap<PluginHandle, usize>,
    opens: usize,
    closes: usize,
    fail_closes: bool,
}

/// A [`NativeLoader`] over an in-memory table of libraries.
///
/// Like a real loader, opening the same library twice yields the same handle
/// and bumps a per-handle open count.
#[derive(Default)]
pub struct InMemoryLoader {
    state: Mutex<MemoryState>,
}

impl InMemoryLoader {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a library at `path` exporting `symbols`.
    ///
    /// Symbol addresses may be real function pointers (cast with `as usize`)
    /// when the caller intends to invoke them.
    pub fn add_library<I, S>(&self, path: impl AsRef<Path>, symbols: I) -> PluginHandle
    where
        I: IntoIterator<Item = (S, SymbolAddr)>,
        S: Into<String>,
    {
        let mut state = lock(&self.state);
        let handle = PluginHandle::from_raw((state.libraries.len() + 1) * HANDLE_STRIDE);
        let symbols = symbols
            .into_iter()
            .map(|(name, addr)| (name.into(), addr))
            .collect();
        state
            .libraries
            .insert(handle, MemoryLibrary { handle, symbols });
        state.by_path.insert(path.as_ref().to_path_buf(), handle);
        handle
    }

    /// Make `alias` open the same library as `target`, like a symlink.
    pub fn add_alias(
        &self,
        alias: impl AsRef<Path>,
        target: impl AsRef<Path>,
    ) -> Option<PluginHandle> {
        let mut state = lock(&self.state);
        let handle = *state.by_path.get(target.as_ref())?;
        state.by_path.insert(alias.as_ref().to_path_buf(), handle);
        Some(handle)
    }

    /// Make every subsequent `close` report failure (after releasing the reference).
    pub fn fail_closes(&self, fail: bool) {
        lock(&self.state).fail_closes = fail;
    }

    /// Total successful opens so far.
    pub fn opens(&self) -> usize {
        lock(&self.state).opens
    }

    /// Total closes so far.
    pub fn closes(&self) -> usize {
        lock(&self.state).closes
    }

    /// Native references currently held on the library at `path`.
    pub fn open_count(&self, path: impl AsRef<Path>) -> usize {
        let state = lock(&self.state);
        state
            .by_path
            .get(path.as_ref())
            .and_then(|handle| state.open_refs.get(handle))
            .copied()
            .unwrap_or(0)
    }
}

impl NativeLoader for InMemoryLoader {
    fn open(&self, path: &Path) -> Result<PluginHandle, LoaderError> {
        let mut state = lock(&self.state);
        let handle = state
            .by_path
            .get(path)
            .and_then(|handle| state.libraries.get(handle))
            .map(|library| library.handle)
            .ok_or_else(|| {
                LoaderError::new(format!(
                    "{}: cannot open shared object file: No such file or directory",
                    path.display()
                ))
            })?;
        *state.open_refs.entry(handle).or_insert(0) += 1;
        state.opens += 1;
        Ok(handle)
    }

    fn close(&self, handle: PluginHandle) -> Result<(), LoaderError> {
        let mut state = lock(&self.state);
        let refs = state
            .open_refs
            .get_mut(&handle)
            .ok_or_else(|| LoaderError::new(format!("library {handle} is not open")))?;
        *refs -= 1;
        if *refs == 0 {
            state.open_refs.remove(&handle);
        }
        state.closes += 1;
        if state.fail_closes {
            return Err(LoaderError::new(format!("close of {handle} failed")));
        }
        Ok(())
    }

    fn resolve(&self, handle: PluginHandle, name: &str) -> Result<SymbolAddr, LoaderError> {
        let state = lock(&self.state);
        if !state.open_refs.contains_key(&handle) {
            return Err(LoaderError::new(format!("library {handle} is not open")));
        }
        state
            .libraries
            .get(&handle)
            .and_then(|library| library.symbols.get(name))
            .copied()
            .ok_or_else(|| LoaderError::new(format!("undefined symbol: {name}")))
    }
}
