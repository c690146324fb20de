//! A single native library and the references handed out from it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::loader::{NativeLoader, PluginHandle, SymbolAddr};
use crate::refs::SymbolRefs;
use crate::sync::lock;

/// Lifecycle of a [`Plugin`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    Unopened,
    Open,
    Closed,
}

impl fmt::Display for PluginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self {
            Self::Unopened => "unopened",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(state)
    }
}

struct PluginInner {
    state: PluginState,
    handle: PluginHandle,
    refs: SymbolRefs,
}

/// One shared library, identified by its path and a logical name.
///
/// All mutable state sits behind a single per-plugin lock, which is also held
/// across the native loader calls that change it.
pub struct Plugin {
    path: PathBuf,
    name: String,
    loader: Arc<dyn NativeLoader>,
    inner: Mutex<PluginInner>,
}

/// Point-in-time view of a plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInfo {
    pub name: String,
    pub path: PathBuf,
    pub handle: PluginHandle,
    pub state: PluginState,
    pub outstanding: usize,
}

impl Plugin {
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        loader: Arc<dyn NativeLoader>,
    ) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            loader,
            inner: Mutex::new(PluginInner {
                state: PluginState::Unopened,
                handle: PluginHandle::INVALID,
                refs: SymbolRefs::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn handle(&self) -> PluginHandle {
        self.lock().handle
    }

    pub fn state(&self) -> PluginState {
        self.lock().state
    }

    /// Total references currently held on this plugin's symbols.
    pub fn outstanding(&self) -> usize {
        self.lock().refs.outstanding()
    }

    pub fn info(&self) -> PluginInfo {
        let inner = self.lock();
        PluginInfo {
            name: self.name.clone(),
            path: self.path.clone(),
            handle: inner.handle,
            state: inner.state,
            outstanding: inner.refs.outstanding(),
        }
    }

    /// Open the library. Opening an already-open plugin is a no-op.
    ///
    /// A closed plugin cannot be reopened; load a fresh one instead.
    pub fn open(&self) -> Result<PluginHandle, PluginError> {
        let mut inner = self.lock();
        match inner.state {
            PluginState::Open => {
                debug!("Plugin {} is already loaded", self.name);
                return Ok(inner.handle);
            }
            PluginState::Closed => return Err(PluginError::NotOpen),
            PluginState::Unopened => {}
        }

        let handle = self.loader.open(&self.path).map_err(|err| {
            warn!("Failed to load plugin {}({}): {}", self.name, self.path.display(), err);
            PluginError::NativeOpenFailed {
                path: self.path.clone(),
                reason: err.to_string(),
            }
        })?;

        inner.handle = handle;
        inner.state = PluginState::Open;
        info!("Loaded plugin {} from {}", self.name, self.path.display());
        Ok(handle)
    }

    /// Close the library if no symbol references are outstanding.
    ///
    /// On `Busy` the plugin stays open and fully usable.
    pub fn close(&self) -> Result<(), PluginError> {
        let mut inner = self.lock();
        if inner.state != PluginState::Open {
            debug!("Plugin {} is not loaded", self.name);
            return Err(PluginError::NotOpen);
        }
        if inner.refs.is_busy() {
            warn!(
                "Plugin {} is busy ({} outstanding references)",
                self.name,
                inner.refs.outstanding()
            );
            return Err(PluginError::Busy);
        }

        inner.refs.clear();
        if let Err(err) = self.loader.close(inner.handle) {
            warn!("Native close of plugin {} reported: {}", self.name, err);
        }
        inner.handle = PluginHandle::INVALID;
        inner.state = PluginState::Closed;
        info!("Unloaded plugin {}", self.name);
        Ok(())
    }

    /// Resolve `symbol` and take one reference on the returned address.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<SymbolAddr, PluginError> {
        let mut inner = self.lock();
        if inner.state != PluginState::Open {
            debug!("Plugin {} is not loaded", self.name);
            return Err(PluginError::NotOpen);
        }

        let addr = self.loader.resolve(inner.handle, symbol).map_err(|err| {
            debug!("Failed to get symbol {} from plugin {}: {}", symbol, self.name, err);
            PluginError::SymbolNotFound {
                symbol: symbol.to_string(),
                reason: err.to_string(),
            }
        })?;

        let count = inner.refs.acquire(addr);
        debug!("Get symbol {} ({}) from plugin {}, refs={}", symbol, addr, self.name, count);
        Ok(addr)
    }

    /// Give back one reference previously taken by [`Plugin::resolve_symbol`].
    pub fn release_symbol(&self, addr: SymbolAddr) -> Result<(), PluginError> {
        let mut inner = self.lock();
        if inner.state != PluginState::Open {
            return Err(PluginError::NotOpen);
        }
        let remaining = inner.refs.release(addr)?;
        debug!("Free symbol {} of plugin {}, refs={}", addr, self.name, remaining);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, PluginInner> {
        lock(&self.inner)
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("state", &inner.state)
            .field("handle", &inner.handle)
            .field("outstanding", &inner.refs.outstanding())
            .finish()
    }
}
