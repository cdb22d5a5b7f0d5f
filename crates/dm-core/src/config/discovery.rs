//! Configuration and data-root resolution
//!
//! Loading a config file and finding the data root are kept deliberately
//! simple: one environment variable for the root, one TOML file under it for
//! the rest. Layered CLI/env/repo-local merging is explicitly out of scope
//! (see the spec's non-goals around config file loading); only the file
//! *format* is load-bearing here.

use super::types::Config;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// TOML parsing error
    #[error("TOML parsing error in {path}: {source}")]
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// The data root environment variable is unset or empty
    #[error("data root environment variable {var} is not set")]
    RootNotSet { var: &'static str },

    /// The data root directory does not exist
    #[error("data root {path} does not exist")]
    RootMissing { path: PathBuf },
}

/// Name of the environment variable naming the data root.
pub const DATA_ROOT_ENV: &str = "DMRELAY_ROOT";

/// Resolve the data root directory.
///
/// Fatal if unset or pointing at a nonexistent directory, per the external
/// interface contract: a missing root is a startup error, unlike a missing
/// relay secret (which only disables the relay path).
pub fn resolve_data_root() -> Result<PathBuf, ConfigError> {
    let raw = std::env::var(DATA_ROOT_ENV).map_err(|_| ConfigError::RootNotSet {
        var: DATA_ROOT_ENV,
    })?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::RootNotSet {
            var: DATA_ROOT_ENV,
        });
    }
    let path = PathBuf::from(trimmed);
    if !path.is_dir() {
        return Err(ConfigError::RootMissing { path });
    }
    Ok(path)
}

/// Load the deployment config file from `root/config.toml`.
pub fn load_config(root: &Path) -> Result<Config, ConfigError> {
    load_config_file(&root.join("config.toml"))
}

/// Load and parse a config file at an explicit path.
pub fn load_config_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn root_not_set_is_error() {
        let original = std::env::var(DATA_ROOT_ENV).ok();
        unsafe { std::env::remove_var(DATA_ROOT_ENV) };

        let result = resolve_data_root();
        assert!(matches!(result, Err(ConfigError::RootNotSet { .. })));

        unsafe {
            if let Some(v) = original {
                std::env::set_var(DATA_ROOT_ENV, v);
            }
        }
    }

    #[test]
    #[serial]
    fn root_missing_directory_is_error() {
        let original = std::env::var(DATA_ROOT_ENV).ok();
        unsafe { std::env::set_var(DATA_ROOT_ENV, "/nonexistent/dmrelay/root") };

        let result = resolve_data_root();
        assert!(matches!(result, Err(ConfigError::RootMissing { .. })));

        unsafe {
            match original {
                Some(v) => std::env::set_var(DATA_ROOT_ENV, v),
                None => std::env::remove_var(DATA_ROOT_ENV),
            }
        }
    }

    #[test]
    #[serial]
    fn root_resolves_to_existing_directory() {
        let dir = TempDir::new().unwrap();
        let original = std::env::var(DATA_ROOT_ENV).ok();
        unsafe { std::env::set_var(DATA_ROOT_ENV, dir.path()) };

        let resolved = resolve_data_root().unwrap();
        assert_eq!(resolved, dir.path());

        unsafe {
            match original {
                Some(v) => std::env::set_var(DATA_ROOT_ENV, v),
                None => std::env::remove_var(DATA_ROOT_ENV),
            }
        }
    }

    #[test]
    fn load_config_parses_toml() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            r#"
                handle = "alice"

                [relay]
                url = "ws://localhost:8787"
                secret = "s3cr3t"
            "#,
        )
        .unwrap();

        let config = load_config(dir.path()).unwrap();
        assert_eq!(config.handle, "alice");
        assert!(config.relay_enabled());
    }

    #[test]
    fn load_config_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let result = load_config(dir.path());
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_config_malformed_toml_is_parse_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("config.toml"), "not valid [[[").unwrap();
        let result = load_config(dir.path());
        assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
    }
}
