//! Crucible - a runtime plugin loader
//!
//! Loads shared libraries on demand, hands out type-erased symbol addresses,
//! counts the outstanding references per library, and refuses to unload a
//! library while any remain. Plugins reach the host's registry, and through it
//! each other, by resolving well-known entry points at runtime.
//!
//! # Modules
//!
//! - [`registry`]: The plugin registry and its process-wide instance
//! - [`plugin`]: A single loaded library and its lifecycle
//! - [`refs`]: Per-library symbol reference counts
//! - [`loader`]: Native loading primitives (OS and in-memory)
//! - [`discovery`]: Runtime lookup of the host API from inside a plugin
//! - [`ffi`]: The host's exported entry points (requires the `host` feature)
//! - [`error`]: Error types and C ABI status codes
//! - [`config`]: Configuration management and serialization
//! - [`logging`]: Subscriber setup and the runtime log flag
//! - [`shell`]: Interactive command shell

pub mod config;
pub mod discovery;
pub mod error;
#[cfg(feature = "host")]
pub mod ffi;
pub mod loader;
pub mod logging;
pub mod plugin;
pub mod refs;
pub mod registry;
pub mod shell;

mod sync;

pub use discovery::HostApi;
pub use error::{LoaderError, PluginError, PluginResult};
pub use loader::{NativeLoader, PluginHandle, SymbolAddr};
pub use registry::Registry;
