//! The plugin registry: sole owner of every loaded [`Plugin`].
//!
//! Plugins are indexed by their native handle. Name and path are each unique
//! among live plugins, and that is checked before the native loader is ever
//! touched, so a duplicate request never opens a library.
//!
//! # Locking
//!
//! The registry lock guards the index only. It is always taken before a
//! plugin's own lock, never after. Symbol resolution and release hold the
//! registry lock just long enough to find the plugin, so traffic on one
//! plugin does not stall loads, unloads or lookups of another.
//!
//! # Process-wide instance
//!
//! [`Registry::global`] is created on first use and backed by the OS loader.
//! It is the instance reached through the discovery entry points. Statics are
//! never dropped, so the host calls [`Registry::shutdown`] before exiting.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::error::PluginError;
use crate::loader::{DynamicLoader, NativeLoader, PluginHandle, SymbolAddr};
use crate::plugin::{Plugin, PluginInfo};
use crate::sync::lock;

static GLOBAL: Lazy<Registry> = Lazy::new(|| Registry::new(Arc::new(DynamicLoader::new())));

/// Outcome of [`Registry::shutdown`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Plugins that were idle and got unloaded.
    pub unloaded: Vec<String>,
    /// Plugins left loaded because references were still outstanding.
    pub busy: Vec<String>,
}

pub struct Registry {
    loader: Arc<dyn NativeLoader>,
    plugins: Mutex<HashMap<PluginHandle, Arc<Plugin>>>,
}

impl Registry {
    pub fn new(loader: Arc<dyn NativeLoader>) -> Self {
        Self {
            loader,
            plugins: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Load the library at `path` under `name` and return its handle.
    pub fn load(&self, path: impl AsRef<Path>, name: &str) -> Result<PluginHandle, PluginError> {
        let path = path.as_ref();
        let mut plugins = lock(&self.plugins);

        if plugins
            .values()
            .any(|plugin| plugin.name() == name || plugin.path() == path)
        {
            warn!("Plugin {} ({}) is already loaded", name, path.display());
            return Err(PluginError::AlreadyExists);
        }

        let plugin = Plugin::new(path, name, Arc::clone(&self.loader));
        let handle = plugin.open()?;

        // Two path strings can name the same file; the OS then hands back an
        // existing handle. Give the extra native reference back.
        if plugins.contains_key(&handle) {
            warn!(
                "{} resolves to already loaded library {}; refusing {}",
                path.display(),
                handle,
                name
            );
            if let Err(err) = plugin.close() {
                warn!("Failed to release duplicate open of {}: {}", path.display(), err);
            }
            return Err(PluginError::AlreadyExists);
        }

        plugins.insert(handle, Arc::new(plugin));
        Ok(handle)
    }

    /// Unload the plugin behind `handle`, refusing while it is busy.
    pub fn unload(&self, handle: PluginHandle) -> Result<(), PluginError> {
        let mut plugins = lock(&self.plugins);
        let plugin = plugins.get(&handle).ok_or(PluginError::NotFound)?;
        plugin.close()?;
        plugins.remove(&handle);
        Ok(())
    }

    /// Resolve `symbol` in the plugin behind `handle`, taking a reference.
    pub fn resolve_symbol(
        &self,
        handle: PluginHandle,
        symbol: &str,
    ) -> Result<SymbolAddr, PluginError> {
        self.plugin(handle)?.resolve_symbol(symbol)
    }

    /// Release a reference taken by [`Registry::resolve_symbol`].
    pub fn release_symbol(
        &self,
        handle: PluginHandle,
        addr: SymbolAddr,
    ) -> Result<(), PluginError> {
        self.plugin(handle)?.release_symbol(addr)
    }

    pub fn find_by_name(&self, name: &str) -> Result<PluginHandle, PluginError> {
        lock(&self.plugins)
            .iter()
            .find(|(_, plugin)| plugin.name() == name)
            .map(|(handle, _)| *handle)
            .ok_or(PluginError::NotFound)
    }

    pub fn find_by_path(&self, path: impl AsRef<Path>) -> Result<PluginHandle, PluginError> {
        let path = path.as_ref();
        lock(&self.plugins)
            .iter()
            .find(|(_, plugin)| plugin.path() == path)
            .map(|(handle, _)| *handle)
            .ok_or(PluginError::NotFound)
    }

    /// Look up the plugin behind `handle`.
    pub fn plugin(&self, handle: PluginHandle) -> Result<Arc<Plugin>, PluginError> {
        lock(&self.plugins)
            .get(&handle)
            .cloned()
            .ok_or(PluginError::NotFound)
    }

    /// Snapshot of every live plugin, sorted by name.
    pub fn plugins(&self) -> Vec<PluginInfo> {
        let mut infos: Vec<PluginInfo> = lock(&self.plugins)
            .values()
            .map(|plugin| plugin.info())
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        lock(&self.plugins).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.plugins).is_empty()
    }

    /// Unload every idle plugin and report the ones still in use.
    ///
    /// Busy plugins are logged and left loaded; their outstanding symbol
    /// addresses stay valid.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut plugins = lock(&self.plugins);
        let mut report = ShutdownReport::default();

        plugins.retain(|_, plugin| match plugin.close() {
            Ok(()) => {
                report.unloaded.push(plugin.name().to_string());
                false
            }
            Err(PluginError::Busy) => {
                warn!(
                    "Plugin {} still has {} outstanding references at shutdown; leaving it loaded",
                    plugin.name(),
                    plugin.outstanding()
                );
                report.busy.push(plugin.name().to_string());
                true
            }
            Err(err) => {
                warn!("Dropping plugin {} at shutdown: {}", plugin.name(), err);
                false
            }
        });

        report.unloaded.sort();
        report.busy.sort();
        if !report.unloaded.is_empty() || !report.busy.is_empty() {
            info!(
                "Registry shutdown: {} unloaded, {} busy",
                report.unloaded.len(),
                report.busy.len()
            );
        }
        report
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("plugins", &self.plugins())
            .finish()
    }
}
