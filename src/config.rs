//! Container manager configuration.

use crate::constants::DATABOX_DNS_IP_ENV;
use serde::{Deserialize, Serialize};

/// Reads the node's DNS IP from the environment, empty when unset.
///
/// This is the address services on the system network use as their DNS
/// server; per-component services get the daemon's address on their own
/// network instead.
pub fn dns_ip_from_env() -> String {
    std::env::var(DATABOX_DNS_IP_ENV).unwrap_or_default()
}

/// Options handed to the container manager at startup.
///
/// Image fields are fully-qualified references for the platform's own
/// components; registry/version/arch feed image resolution for installed
/// apps and drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerOptions {
    /// Platform version; default image tag.
    pub version: String,
    /// Registry prepended to unqualified image names.
    pub default_registry: String,
    /// Registry host used when pulling through the runtime.
    pub default_registry_host: String,
    /// Node architecture suffix (empty for amd64 builds).
    #[serde(default)]
    pub arch: String,
    /// Image for the core UI app.
    pub core_ui_image: String,
    /// Image for the app-store driver.
    pub app_server_image: String,
    /// Image for dependent stores.
    pub default_store_image: String,
    /// Image for the export service.
    pub export_service_image: String,
    /// URL of the default app store, injected into drivers.
    pub default_app_store: String,
    /// Node hostname.
    #[serde(default)]
    pub hostname: String,
    /// Internal IPs of this node.
    #[serde(default)]
    pub internal_ips: Vec<String>,
    /// Externally-routable IP of this node.
    #[serde(default)]
    pub external_ip: String,
    /// Drop all persisted SLAs at startup.
    #[serde(default)]
    pub clear_slas: bool,
    /// Fixed admin password instead of the stored/generated one.
    #[serde(default)]
    pub override_password: String,
    /// Emit debug-level logs.
    #[serde(default)]
    pub enable_debug_logging: bool,
}

impl ManagerOptions {
    /// Image-name arch suffix: `"-{arch}"`, or empty when no arch is set.
    pub fn arch_suffix(&self) -> String {
        if self.arch.is_empty() {
            String::new()
        } else {
            format!("-{}", self.arch)
        }
    }
}
