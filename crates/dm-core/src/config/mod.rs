//! Deployment configuration
//!
//! A dmrelay deployment is configured by two things: a data root directory
//! named by an environment variable, and a TOML config file under that root
//! giving the user's handle, workspace, relay connection, and agent
//! whitelist. There is no layered CLI/repo-local/global merge — the loading
//! mechanism is intentionally minimal; only the file format matters.

mod discovery;
mod types;

pub use discovery::{load_config, load_config_file, resolve_data_root, ConfigError, DATA_ROOT_ENV};
pub use types::{Config, RelayConfig};
