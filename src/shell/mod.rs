//! Interactive shell over a [`Registry`].
//!
//! Each input line parses into a [`Command`]; [`Shell::execute`] runs it and
//! returns the text to print. Plugins can be named by handle (`0x…`) or by
//! their logical name wherever a target is expected.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;

use anyhow::{Context, Result};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ShellConfig;
use crate::error::PluginError;
use crate::loader::{PluginHandle, SymbolAddr};
use crate::logging;
use crate::registry::Registry;

/// Signature assumed by the `call` command.
pub type EntryFn = unsafe extern "C" fn(*const c_char) -> c_int;

const HELP: &str = "\
Commands:
  load <path> <name>               Load a shared library under a name
  unload <plugin>                  Unload a plugin (fails while symbols are held)
  resolve <plugin> <symbol>        Resolve a symbol and hold a reference
  release <plugin> <addr>          Release a held symbol reference
  call <plugin> <symbol> [arg]     Resolve, call as fn(*const c_char) -> c_int, release
  find-name <name>                 Look up a plugin handle by name
  find-path <path>                 Look up a plugin handle by path
  list                             Show loaded plugins
  log on|off                       Toggle registry logging
  help                             Show this help
  quit                             Exit
<plugin> is a handle (0x...) or a plugin name.";

/// A plugin reference typed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Handle(PluginHandle),
    Name(String),
}

impl Target {
    fn parse(word: &str) -> Result<Self, ParseError> {
        if word.starts_with("0x") || word.starts_with("0X") {
            word.parse()
                .map(Self::Handle)
                .map_err(|_| ParseError::BadNumber(word.to_string()))
        } else {
            Ok(Self::Name(word.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Load { path: PathBuf, name: String },
    Unload(Target),
    Resolve { target: Target, symbol: String },
    Release { target: Target, addr: SymbolAddr },
    Call { target: Target, symbol: String, arg: Option<String> },
    FindName(String),
    FindPath(PathBuf),
    List,
    Log(bool),
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("'{0}' is not a valid handle or address")]
    BadNumber(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, ParseError> {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Ok(Self::Empty);
        };

        match (verb, args) {
            ("load", [path, name]) => Ok(Self::Load {
                path: PathBuf::from(path),
                name: (*name).to_string(),
            }),
            ("load", _) => Err(ParseError::Usage("load <path> <name>")),
            ("unload", [target]) => Ok(Self::Unload(Target::parse(target)?)),
            ("unload", _) => Err(ParseError::Usage("unload <plugin>")),
            ("resolve", [target, symbol]) => Ok(Self::Resolve {
                target: Target::parse(target)?,
                symbol: (*symbol).to_string(),
            }),
            ("resolve", _) => Err(ParseError::Usage("resolve <plugin> <symbol>")),
            ("release", [target, addr]) => Ok(Self::Release {
                target: Target::parse(target)?,
                addr: addr.parse().map_err(|_| ParseError::BadNumber((*addr).to_string()))?,
            }),
            ("release", _) => Err(ParseError::Usage("release <plugin> <addr>")),
            ("call", [target, symbol, rest @ ..]) => Ok(Self::Call {
                target: Target::parse(target)?,
                symbol: (*symbol).to_string(),
                arg: (!rest.is_empty()).then(|| rest.join(" ")),
            }),
            ("call", _) => Err(ParseError::Usage("call <plugin> <symbol> [arg]")),
            ("find-name", [name]) => Ok(Self::FindName((*name).to_string())),
            ("find-name", _) => Err(ParseError::Usage("find-name <name>")),
            ("find-path", [path]) => Ok(Self::FindPath(PathBuf::from(path))),
            ("find-path", _) => Err(ParseError::Usage("find-path <path>")),
            ("list", []) => Ok(Self::List),
            ("log", ["on"]) => Ok(Self::Log(true)),
            ("log", ["off"]) => Ok(Self::Log(false)),
            ("log", _) => Err(ParseError::Usage("log on|off")),
            ("help", _) => Ok(Self::Help),
            ("quit" | "exit", _) => Ok(Self::Quit),
            (other, _) => Err(ParseError::Unknown(other.to_string())),
        }
    }
}

/// REPL bound to one registry.
pub struct Shell<'a> {
    registry: &'a Registry,
    config: ShellConfig,
}

impl<'a> Shell<'a> {
    pub fn new(registry: &'a Registry, config: ShellConfig) -> Self {
        Self { registry, config }
    }

    /// Run one command and return its output.
    pub fn execute(&self, command: &Command) -> Result<String, PluginError> {
        match command {
            Command::Load { path, name } => {
                let handle = self.registry.load(path, name)?;
                Ok(format!("loaded {name} as {handle}"))
            }
            Command::Unload(target) => {
                let handle = self.handle(target)?;
                self.registry.unload(handle)?;
                Ok(format!("unloaded {handle}"))
            }
            Command::Resolve { target, symbol } => {
                let handle = self.handle(target)?;
                let addr = self.registry.resolve_symbol(handle, symbol)?;
                Ok(format!("{symbol} = {addr}"))
            }
            Command::Release { target, addr } => {
                let handle = self.handle(target)?;
                self.registry.release_symbol(handle, *addr)?;
                Ok(format!("released {addr}"))
            }
            Command::Call { target, symbol, arg } => self.call(target, symbol, arg.as_deref()),
            Command::FindName(name) => Ok(self.registry.find_by_name(name)?.to_string()),
            Command::FindPath(path) => Ok(self.registry.find_by_path(path)?.to_string()),
            Command::List => Ok(self.list()),
            Command::Log(enabled) => {
                logging::set_log_flag(*enabled);
                Ok(format!("logging {}", if *enabled { "on" } else { "off" }))
            }
            Command::Help => Ok(HELP.to_string()),
            Command::Quit | Command::Empty => Ok(String::new()),
        }
    }

    /// Read-eval-print until `quit` or end of input.
    pub fn run(&self) -> Result<()> {
        let config = rustyline::Config::builder()
            .max_history_size(self.config.history_size)
            .context("Invalid history size")?
            .auto_add_history(false)
            .build();
        let mut editor: Editor<(), DefaultHistory> =
            Editor::with_config(config).context("Failed to initialize line editor")?;

        if let Some(history) = &self.config.history_file {
            if let Err(err) = editor.load_history(history) {
                debug!("No shell history loaded from {}: {}", history.display(), err);
            }
        }

        loop {
            let line = match editor.readline(&self.config.prompt) {
                Ok(line) => line,
                Err(ReadlineError::Interrupted) => continue,
                Err(ReadlineError::Eof) => break,
                Err(err) => return Err(err).context("Failed to read input"),
            };
            if !line.trim().is_empty() {
                if let Err(err) = editor.add_history_entry(line.as_str()) {
                    debug!("Failed to record shell history entry: {}", err);
                }
            }

            match Command::parse(&line) {
                Ok(Command::Quit) => break,
                Ok(command) => match self.execute(&command) {
                    Ok(output) if output.is_empty() => {}
                    Ok(output) => println!("{output}"),
                    Err(err) => println!("error: {err}"),
                },
                Err(err) => println!("{err}"),
            }
        }

        if let Some(history) = &self.config.history_file {
            if let Err(err) = editor.save_history(history) {
                warn!("Failed to save shell history to {}: {}", history.display(), err);
            }
        }
        Ok(())
    }

    fn handle(&self, target: &Target) -> Result<PluginHandle, PluginError> {
        match target {
            Target::Handle(handle) => Ok(*handle),
            Target::Name(name) => self.registry.find_by_name(name),
        }
    }

    fn call(
        &self,
        target: &Target,
        symbol: &str,
        arg: Option<&str>,
    ) -> Result<String, PluginError> {
        let arg = CString::new(arg.unwrap_or_default())
            .map_err(|_| PluginError::InvalidArgument("argument contains a NUL byte".into()))?;
        let handle = self.handle(target)?;
        let addr = self.registry.resolve_symbol(handle, symbol)?;

        // Safety: `call` is documented to require this signature, and the
        // reference held on `addr` keeps the library loaded during the call.
        let ret = unsafe {
            let entry: EntryFn = addr.cast();
            entry(arg.as_ptr())
        };

        self.registry.release_symbol(handle, addr)?;
        Ok(format!("{symbol} returned {ret}"))
    }

    fn list(&self) -> String {
        let plugins = self.registry.plugins();
        if plugins.is_empty() {
            return "no plugins loaded".to_string();
        }
        plugins
            .iter()
            .map(|p| {
                format!(
                    "{:<16} {:<18} {:<8} refs={:<4} {}",
                    p.name,
                    p.handle.to_string(),
                    p.state.to_string(),
                    p.outstanding,
                    p.path.display()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::InMemoryLoader;
    use std::sync::Arc;

    unsafe extern "C" fn plugin1_func(_param: *const c_char) -> c_int {
        50
    }

    fn shell_registry() -> Registry {
        let loader = Arc::new(InMemoryLoader::new());
        loader.add_library(
            "./libplugin1.so",
            [("plugin1_func", SymbolAddr::from_raw(plugin1_func as *const () as usize))],
        );
        Registry::new(loader)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            Command::parse("load ./libplugin1.so plugin1"),
            Ok(Command::Load {
                path: PathBuf::from("./libplugin1.so"),
                name: "plugin1".into()
            })
        );
        assert_eq!(
            Command::parse("unload 0x1000"),
            Ok(Command::Unload(Target::Handle(PluginHandle::from_raw(0x1000))))
        );
        assert_eq!(
            Command::parse("release plugin1 0x20"),
            Ok(Command::Release {
                target: Target::Name("plugin1".into()),
                addr: SymbolAddr::from_raw(0x20)
            })
        );
        assert_eq!(
            Command::parse("call plugin1 plugin1_func hello world"),
            Ok(Command::Call {
                target: Target::Name("plugin1".into()),
                symbol: "plugin1_func".into(),
                arg: Some("hello world".into())
            })
        );
        assert_eq!(Command::parse("   "), Ok(Command::Empty));
        assert_eq!(Command::parse("log off"), Ok(Command::Log(false)));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Command::parse("load only-path"), Err(ParseError::Usage("load <path> <name>")));
        assert_eq!(Command::parse("frobnicate"), Err(ParseError::Unknown("frobnicate".into())));
        assert_eq!(
            Command::parse("release plugin1 nothex"),
            Err(ParseError::BadNumber("nothex".into()))
        );
        assert_eq!(Command::parse("unload 0xzz"), Err(ParseError::BadNumber("0xzz".into())));
    }

    #[test]
    fn test_execute_session() {
        let registry = shell_registry();
        let shell = Shell::new(&registry, ShellConfig::default());
        let run = |line: &str| shell.execute(&Command::parse(line).unwrap());

        assert!(run("load ./libplugin1.so plugin1").unwrap().starts_with("loaded plugin1"));
        assert_eq!(run("call plugin1 plugin1_func hello").unwrap(), "plugin1_func returned 50");

        let resolved = run("resolve plugin1 plugin1_func").unwrap();
        let addr = resolved.rsplit(' ').next().unwrap().to_string();
        assert_eq!(run("unload plugin1"), Err(PluginError::Busy));
        let listing = run("list").unwrap();
        assert!(listing.contains("refs=1"));
        assert!(listing.contains(" open "));

        run(&format!("release plugin1 {addr}")).unwrap();
        run("unload plugin1").unwrap();
        assert_eq!(run("find-name plugin1"), Err(PluginError::NotFound));
        assert_eq!(run("list").unwrap(), "no plugins loaded");
    }
}
