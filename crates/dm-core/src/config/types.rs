//! Configuration types for a dmrelay deployment

use serde::{Deserialize, Serialize};

/// A per-deployment configuration file.
///
/// Provides the identity and network surface a client needs: the user's
/// stable handle, the default workspace under the data root, and how (or
/// whether) to reach the relay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// The user's stable handle (no leading `@`).
    pub handle: String,
    /// Default workspace directory name under the data root.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// Relay connection settings. Absent or missing `secret` disables the
    /// relay path; the client still reads and writes its local inbox.
    #[serde(default)]
    pub relay: RelayConfig,
    /// Handles allowed to reach this user's `-claude` address. Empty means
    /// unrestricted.
    #[serde(default)]
    pub claude_whitelist: Vec<String>,
}

fn default_workspace() -> String {
    "default".to_string()
}

/// Relay connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// WebSocket URL of the relay, e.g. `ws://localhost:8787`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Shared secret presented on `auth`. Missing disables the relay path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

impl Config {
    /// True if the config carries enough to attempt a relay connection.
    pub fn relay_enabled(&self) -> bool {
        self.relay.url.is_some() && self.relay.secret.is_some()
    }
}
