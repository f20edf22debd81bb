//! Network controller.
//!
//! Every managed component gets its own overlay network, and the
//! core-network daemon sits on all of them: it is both the L3 firewall
//! between components and the DNS resolver their containers use, so name
//! resolution of peer stores always flows through policy enforcement.
//!
//! This module owns the two halves of that arrangement:
//!
//! - **Topology** via the runtime: create/reuse the per-component network,
//!   attach the daemon to it, and read the daemon's address on it back out
//!   as the component's DNS server.
//! - **Policy plumbing** via the daemon's HTTP control API: connect and
//!   disconnect peer endpoints, announce IP changes on restart, and
//!   register privileged components. Requests authenticate with the
//!   container manager's arbiter token in an `x-api-key` header; any
//!   non-2xx status is surfaced to the caller and never retried.

use crate::constants::{
    CORE_NETWORK_NAME, CORE_NETWORK_URL, DAEMON_REQUEST_TIMEOUT, DATABOX_NETWORK_LABEL_VALUE,
    DATABOX_TYPE_LABEL, NETWORK_ATTACH_SETTLE_DELAY, NETWORK_SUFFIX, SYSTEM_NETWORK_NAME,
};
use crate::error::{Error, Result};
use crate::runtime::ContainerRuntime;
use crate::sla::ComponentType;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Descriptors
// =============================================================================

/// A component's overlay network, as used when launching its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Per-component network name, `"{name}-network"`.
    pub network_name: String,
    /// Core-network daemon's IPv4 on this network; the component's DNS
    /// server.
    pub dns_ip: String,
}

/// A component's endpoint on its network, captured before teardown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Per-component network name.
    pub network_name: String,
    /// Component's IPv4 on that network, as reported by the runtime.
    pub ipv4: String,
}

// =============================================================================
// Wire Bodies
// =============================================================================

#[derive(Serialize)]
struct ConnectRequest<'a> {
    name: &'a str,
    peers: &'a [String],
}

#[derive(Serialize)]
struct DisconnectRequest<'a> {
    name: &'a str,
    ip: &'a str,
}

#[derive(Serialize)]
struct RestartRequest<'a> {
    name: &'a str,
    old_ip: &'a str,
    new_ip: &'a str,
}

#[derive(Serialize)]
struct PrivilegedRequest<'a> {
    src_ip: &'a str,
}

// =============================================================================
// Network Controller
// =============================================================================

/// Provisions per-component overlay networks and drives the core-network
/// daemon's control API.
pub struct NetworkController {
    runtime: Arc<dyn ContainerRuntime>,
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NetworkController {
    /// Creates a controller talking to the daemon at its well-known
    /// address.
    ///
    /// `api_key` is the container manager's base64 arbiter token. The
    /// daemon serves TLS under the platform root CA; pass it so the
    /// client can verify.
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        api_key: String,
        root_ca: Option<reqwest::Certificate>,
    ) -> Result<Self> {
        let mut builder = reqwest::Client::builder().timeout(DAEMON_REQUEST_TIMEOUT);
        if let Some(ca) = root_ca {
            builder = builder.add_root_certificate(ca);
        }
        let http = builder
            .build()
            .map_err(|e| Error::NetworkFailure(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            runtime,
            http,
            base_url: CORE_NETWORK_URL.to_string(),
            api_key,
        })
    }

    /// Overrides the daemon base URL. Used by tests pointing at a local
    /// recorder.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    // =========================================================================
    // Topology
    // =========================================================================

    /// Ensures the component's overlay network exists with the daemon
    /// attached, and returns it together with the daemon's address on it.
    ///
    /// Idempotent: an existing `"{name}-network"` is reused as-is. A fresh
    /// network is created overlay+attachable, `internal` for everything
    /// but drivers (drivers need egress for their external whitelist).
    pub async fn pre_config(
        &self,
        name: &str,
        component_type: ComponentType,
    ) -> Result<NetworkConfig> {
        let network_name = format!("{}{}", name, NETWORK_SUFFIX);
        let internal = component_type != ComponentType::Driver;

        let existing = self.runtime.networks_by_name(&network_name).await?;

        let network = if let Some(found) = existing.first() {
            debug!("using existing network {}", network_name);
            self.runtime.inspect_network(&found.id).await?
        } else {
            let mut labels = HashMap::new();
            labels.insert(
                DATABOX_TYPE_LABEL.to_string(),
                DATABOX_NETWORK_LABEL_VALUE.to_string(),
            );
            let network_id = self
                .runtime
                .create_network(&network_name, internal, labels)
                .await?;

            let daemon = self
                .runtime
                .containers_by_name(CORE_NETWORK_NAME)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    Error::NetworkFailure(format!(
                        "core-network container '{}' not found",
                        CORE_NETWORK_NAME
                    ))
                })?;

            self.runtime.connect_network(&network_id, &daemon.id).await?;

            // Give the runtime time to assign the daemon an address
            // before reading the topology back.
            tokio::time::sleep(NETWORK_ATTACH_SETTLE_DELAY).await;
            self.runtime.inspect_network(&network_id).await?
        };

        let dns_ip = network
            .endpoints
            .iter()
            .find(|e| e.container_name == CORE_NETWORK_NAME)
            .map(|e| strip_cidr(&e.ipv4).to_string())
            .unwrap_or_default();

        debug!("pre_config {} dns {}", network_name, dns_ip);

        Ok(NetworkConfig { network_name, dns_ip })
    }

    /// Locates a service's endpoint on its per-component network.
    ///
    /// Scans `"{name}-network"` for an endpoint whose short container
    /// name (up to the first `.`) matches the service name.
    pub async fn network_of_service(&self, service_name: &str) -> Result<EndpointConfig> {
        let network_name = format!("{}{}", service_name, NETWORK_SUFFIX);

        let networks = self.runtime.networks_by_name(&network_name).await?;
        if networks.is_empty() {
            return Err(Error::NetworkFailure(format!(
                "can't find network {}",
                network_name
            )));
        }

        let mut config = EndpointConfig {
            network_name: network_name.clone(),
            ipv4: String::new(),
        };

        for net in &networks {
            let info = self.runtime.inspect_network(&net.id).await?;
            for endpoint in &info.endpoints {
                if short_service_name(&endpoint.container_name) == service_name {
                    config.ipv4 = endpoint.ipv4.clone();
                    break;
                }
            }
        }

        Ok(config)
    }

    // =========================================================================
    // Daemon Control API
    // =========================================================================

    /// Connects a component to its peers.
    pub async fn connect_endpoints(&self, name: &str, peers: &[String]) -> Result<()> {
        self.post("/connect", &ConnectRequest { name, peers }).await
    }

    /// Disconnects a component's endpoint.
    pub async fn disconnect_endpoints(&self, name: &str, endpoint: &EndpointConfig) -> Result<()> {
        self.post(
            "/disconnect",
            &DisconnectRequest {
                name,
                ip: &endpoint.ipv4,
            },
        )
        .await
    }

    /// Post-uninstall teardown: disconnects peer endpoints. The network
    /// itself is left in place for reuse on reinstall.
    pub async fn post_uninstall(&self, name: &str, endpoint: &EndpointConfig) -> Result<()> {
        self.disconnect_endpoints(name, endpoint).await
    }

    /// Announces a service's IP change so firewall rules are rewritten.
    pub async fn service_restart(&self, name: &str, old_ip: &str, new_ip: &str) -> Result<()> {
        self.post("/restart", &RestartRequest { name, old_ip, new_ip })
            .await
    }

    /// Registers the container manager itself as privileged.
    pub async fn register_privileged(&self) -> Result<()> {
        self.register_privileged_by_name(crate::constants::CONTAINER_MANAGER_NAME)
            .await
    }

    /// Registers the named component as privileged, by its IP on the
    /// system network.
    pub async fn register_privileged_by_name(&self, name: &str) -> Result<()> {
        let src_ip = self.ip_on_system_network(name).await?;
        self.post("/privileged", &PrivilegedRequest { src_ip: &src_ip })
            .await
    }

    async fn ip_on_system_network(&self, name: &str) -> Result<String> {
        let containers = self.runtime.containers_by_name(name).await?;
        let container = containers.first().ok_or_else(|| {
            Error::NetworkFailure(format!("no container '{}' found for core-network", name))
        })?;

        container
            .networks
            .get(SYSTEM_NETWORK_NAME)
            .map(|ip| strip_cidr(ip).to_string())
            .ok_or_else(|| {
                Error::NetworkFailure(format!("'{}' not on {}", name, SYSTEM_NETWORK_NAME))
            })
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("POST {} failed: {}", url, e);
                Error::NetworkFailure(format!("POST {} failed: {}", url, e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!("POST {} returned {}: {}", url, status, text);
            return Err(Error::NetworkFailure(format!(
                "POST {} returned status {}",
                url, status
            )));
        }

        Ok(())
    }
}

/// Drops a CIDR suffix from an address: `"10.0.0.5/24"` → `"10.0.0.5"`.
fn strip_cidr(address: &str) -> &str {
    address.split('/').next().unwrap_or(address)
}

/// Container name up to the first `.`; task containers are named
/// `"{service}.{slot}.{task-id}"`.
fn short_service_name(container_name: &str) -> &str {
    container_name.split('.').next().unwrap_or(container_name)
}
