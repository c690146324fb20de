//! Error types for the plugin registry and the discovery boundary.
//!
//! [`PluginError`] is what Rust callers see. [`PluginResult`] is the stable
//! status code that crosses the C ABI between the host and its plugins; the two
//! convert into each other without losing the error kind.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a [`NativeLoader`](crate::loader::NativeLoader).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct LoaderError(pub String);

impl LoaderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl From<libloading::Error> for LoaderError {
    fn from(err: libloading::Error) -> Self {
        Self(err.to_string())
    }
}

/// Errors produced by registry, plugin and discovery operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    /// The native loader could not open the library.
    #[error("failed to open plugin library {}: {reason}", path.display())]
    NativeOpenFailed { path: PathBuf, reason: String },

    /// A live plugin already uses this name or path.
    #[error("a plugin with this name or path is already loaded")]
    AlreadyExists,

    /// No live plugin matches the handle, name or path.
    #[error("plugin not found")]
    NotFound,

    /// The plugin is not in the open state.
    #[error("plugin is not open")]
    NotOpen,

    /// The plugin still has outstanding symbol references.
    #[error("plugin has outstanding symbol references")]
    Busy,

    /// Symbol resolution failed at the native loader.
    #[error("symbol {symbol} not found: {reason}")]
    SymbolNotFound { symbol: String, reason: String },

    /// Release of an address that has no outstanding reference.
    #[error("symbol address is not held by this plugin")]
    SymbolUnknown,

    /// A discovery-protocol entry point could not be resolved.
    #[error("module init failed: host entry point {symbol} is not available")]
    ModuleInitFailed { symbol: String },

    /// A null or non-UTF-8 argument reached the C boundary.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Status code returned by every discovery-protocol entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginResult {
    Ok = 0,
    DlopenErr = 1,
    NotLoad = 2,
    Busy = 3,
    SymNotFound = 4,
    NotFound = 5,
    Exists = 6,
    ModuleInitError = 7,
    SymUnknown = 8,
    InvalidArgument = 9,
}

impl PluginResult {
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }

    /// Turn a status received over the C ABI back into a `Result`.
    ///
    /// Context that does not fit in a status code (paths, symbol names, loader
    /// messages) is filled from `context` or left empty.
    pub fn into_result(self, context: &str) -> Result<(), PluginError> {
        match self {
            Self::Ok => Ok(()),
            Self::DlopenErr => Err(PluginError::NativeOpenFailed {
                path: PathBuf::from(context),
                reason: String::from("reported by host"),
            }),
            Self::NotLoad => Err(PluginError::NotOpen),
            Self::Busy => Err(PluginError::Busy),
            Self::SymNotFound => Err(PluginError::SymbolNotFound {
                symbol: context.to_string(),
                reason: String::from("reported by host"),
            }),
            Self::NotFound => Err(PluginError::NotFound),
            Self::Exists => Err(PluginError::AlreadyExists),
            Self::ModuleInitError => Err(PluginError::ModuleInitFailed {
                symbol: context.to_string(),
            }),
            Self::SymUnknown => Err(PluginError::SymbolUnknown),
            Self::InvalidArgument => Err(PluginError::InvalidArgument(context.to_string())),
        }
    }
}

impl From<&PluginError> for PluginResult {
    fn from(err: &PluginError) -> Self {
        match err {
            PluginError::NativeOpenFailed { .. } => Self::DlopenErr,
            PluginError::AlreadyExists => Self::Exists,
            PluginError::NotFound => Self::NotFound,
            PluginError::NotOpen => Self::NotLoad,
            PluginError::Busy => Self::Busy,
            PluginError::SymbolNotFound { .. } => Self::SymNotFound,
            PluginError::SymbolUnknown => Self::SymUnknown,
            PluginError::ModuleInitFailed { .. } => Self::ModuleInitError,
            PluginError::InvalidArgument(_) => Self::InvalidArgument,
        }
    }
}

impl<T> From<&Result<T, PluginError>> for PluginResult {
    fn from(result: &Result<T, PluginError>) -> Self {
        match result {
            Ok(_) => Self::Ok,
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_keep_error_kind() {
        let errors = [
            PluginError::AlreadyExists,
            PluginError::NotFound,
            PluginError::NotOpen,
            PluginError::Busy,
            PluginError::SymbolUnknown,
        ];
        for err in errors {
            let code = PluginResult::from(&err);
            assert_eq!(code.into_result(""), Err(err));
        }
    }

    #[test]
    fn test_resolve_and_release_failures_are_distinct() {
        let resolve = PluginError::SymbolNotFound {
            symbol: "f".into(),
            reason: "missing".into(),
        };
        assert_ne!(PluginResult::from(&resolve), PluginResult::from(&PluginError::SymbolUnknown));
    }

    #[test]
    fn test_symbol_context_survives_round_trip() {
        let err = PluginResult::ModuleInitError
            .into_result("crucible_load_plugin_host")
            .unwrap_err();
        assert_eq!(
            err,
            PluginError::ModuleInitFailed {
                symbol: "crucible_load_plugin_host".into()
            }
        );
    }
}
