use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

use crucible::config::{Config, PluginEntry};
use crucible::logging;
use crucible::registry::Registry;
use crucible::shell::Shell;

/// Crucible - load native plugins at runtime and track their symbol references
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Load a plugin at startup, as NAME=PATH (repeatable)
    #[arg(short, long = "load", value_name = "NAME=PATH", value_parser = parse_plugin_entry)]
    load: Vec<PluginEntry>,

    /// Load plugins and exit without starting the shell
    #[arg(long)]
    no_shell: bool,
}

fn parse_plugin_entry(arg: &str) -> Result<PluginEntry, String> {
    let (name, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PATH, got '{arg}'"))?;
    if name.is_empty() || path.is_empty() {
        return Err(format!("expected NAME=PATH, got '{arg}'"));
    }
    Ok(PluginEntry {
        name: name.to_string(),
        path: PathBuf::from(path),
    })
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = if let Some(config_path) = &args.config {
        Config::load_from_file(config_path)?
    } else {
        Config::load_default()?
    };

    let level = if args.debug {
        "debug"
    } else {
        config.logging.level.as_str()
    };
    logging::init(level).context("Failed to initialize logging")?;
    logging::set_log_flag(config.logging.enabled || args.debug);

    #[cfg(feature = "host")]
    for (symbol, addr) in crucible::ffi::host_exports() {
        debug!("Exporting {} at {}", symbol, addr);
    }

    let registry = Registry::global();
    for entry in config.plugins.iter().chain(&args.load) {
        match registry.load(&entry.path, &entry.name) {
            Ok(handle) => info!("Autoloaded {} as {}", entry.name, handle),
            Err(err) => error!(
                "Failed to autoload {} ({}): {}",
                entry.name,
                entry.path.display(),
                err
            ),
        }
    }

    let result = if args.no_shell {
        Ok(())
    } else {
        Shell::new(registry, config.shell.clone()).run()
    };

    let report = registry.shutdown();
    if !report.busy.is_empty() {
        warn!("Exiting with busy plugins still loaded: {}", report.busy.join(", "));
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plugin_entry() {
        let entry = parse_plugin_entry("plugin1=./libplugin1.so").unwrap();
        assert_eq!(entry.name, "plugin1");
        assert_eq!(entry.path, PathBuf::from("./libplugin1.so"));
        assert!(parse_plugin_entry("plugin1").is_err());
        assert!(parse_plugin_entry("=x.so").is_err());
    }
}
