#[cfg(test)]
mod config_tests {
    use crucible::config::{Config, PluginEntry};
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_config_save_and_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.logging.enabled = false;
        config.shell.history_file = Some(dir.path().join("history"));
        config.plugins.push(PluginEntry {
            name: "plugin1".into(),
            path: PathBuf::from("./libplugin1.so"),
        });

        config.save_to_file(&config_path).unwrap();
        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_partial_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "shell:\n  prompt: \"> \"\n").unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(loaded.shell.prompt, "> ");
        assert_eq!(loaded.shell.history_size, 1000);
        assert!(loaded.logging.enabled);
    }

    #[test]
    fn test_config_load_missing_file_fails() {
        let dir = tempdir().unwrap();
        assert!(Config::load_from_file(dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn test_config_load_malformed_file_fails() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "plugins: [name: {").unwrap();
        assert!(Config::load_from_file(&config_path).is_err());
    }
}

#[cfg(test)]
mod shell_tests {
    use crucible::config::ShellConfig;
    use crucible::loader::{InMemoryLoader, SymbolAddr};
    use crucible::shell::{Command, Shell};
    use crucible::Registry;
    use std::sync::Arc;

    #[test]
    fn test_shell_reports_errors_without_panicking() {
        let loader = Arc::new(InMemoryLoader::new());
        loader.add_library("libA.so", [("a_func", SymbolAddr::from_raw(0xa0))]);
        let registry = Registry::new(loader);
        let shell = Shell::new(&registry, ShellConfig::default());

        let missing = Command::parse("load ./ghost.so ghost").unwrap();
        assert!(shell.execute(&missing).is_err());

        let load = Command::parse("load libA.so A").unwrap();
        assert!(shell.execute(&load).is_ok());

        let unknown = Command::parse("release A 0x1234").unwrap();
        assert!(shell.execute(&unknown).is_err());

        let list = Command::parse("list").unwrap();
        assert!(shell.execute(&list).unwrap().contains("A"));
    }
}
