//! Arbiter registrar.
//!
//! The arbiter is the policy engine gating every inter-component call.
//! The registrar keeps it in sync with the lifecycle engine: each
//! component's token is registered when its secrets are minted, and the
//! route-scoped permissions implied by an SLA are granted at install.
//!
//! Grants are additive. There is no revocation call: uninstalling a
//! component deletes its token, and the grants die with it.
//!
//! The RPC wire format is out of scope; [`ArbiterRpc`] abstracts it.

use crate::constants::{CONTAINER_MANAGER_NAME, EXPORT_SERVICE_NAME};
use crate::error::{Error, Result};
use crate::network::NetworkController;
use crate::sla::{ComponentType, Sla};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Permissions
// =============================================================================

/// HTTP method a grant covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// A route at a target component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Component the route lives on.
    pub target: String,
    /// Path, possibly with a trailing `/*` wildcard.
    pub path: String,
    /// Method the grant covers.
    pub method: Method,
}

/// A route-scoped permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Component being granted access.
    pub subject: String,
    /// Route being granted.
    pub route: Route,
    /// Optional restriction, e.g. an export destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caveat: Option<String>,
}

// =============================================================================
// Arbiter RPC Seam
// =============================================================================

/// Arbiter wire operations the registrar needs.
#[async_trait]
pub trait ArbiterRpc: Send + Sync {
    /// Registers (or re-registers) a component's token. Idempotent
    /// upsert.
    async fn register_component(
        &self,
        name: &str,
        token: &str,
        component_type: ComponentType,
    ) -> Result<()>;

    /// Grants a permission.
    async fn grant_permission(&self, permission: &Permission) -> Result<()>;
}

// =============================================================================
// Registrar
// =============================================================================

/// Derives and applies arbiter state from SLAs.
pub struct ArbiterRegistrar {
    rpc: Arc<dyn ArbiterRpc>,
    network: Arc<NetworkController>,
}

impl ArbiterRegistrar {
    pub fn new(rpc: Arc<dyn ArbiterRpc>, network: Arc<NetworkController>) -> Self {
        Self { rpc, network }
    }

    /// Registers a component's token with the arbiter.
    pub async fn register(
        &self,
        name: &str,
        token: &str,
        component_type: ComponentType,
    ) -> Result<()> {
        self.rpc
            .register_component(name, token, component_type)
            .await
            .map_err(|e| Error::PolicyGrantFailed {
                name: name.to_string(),
                operation: "register".to_string(),
                reason: e.to_string(),
            })
    }

    /// Applies every grant an SLA implies.
    ///
    /// Individual grant failures are logged and do not abort the rest:
    /// grants are additive and re-applied in full on reinstall, so a
    /// partial application is recovered by re-invoking install.
    pub async fn apply_sla(&self, sla: &Sla) -> Result<()> {
        let subject = sla.name.as_str();

        // Export destinations, gated per-URL by caveat.
        for whitelist in &sla.export_whitelists {
            let caveat = format!(r#"{{"destination":"{}"}}"#, whitelist.url);
            debug!("export grant for {} to {}", subject, whitelist.url);
            self.grant(
                subject,
                EXPORT_SERVICE_NAME,
                "/export",
                Method::Post,
                Some(caveat.clone()),
            )
            .await;
            self.grant(
                subject,
                EXPORT_SERVICE_NAME,
                "/lp/export",
                Method::Post,
                Some(caveat),
            )
            .await;
        }

        // Driver egress is a network-plane concern: hand the whitelisted
        // hosts to the core-network daemon rather than the arbiter.
        if sla.component_type == ComponentType::Driver && !sla.external_whitelist.is_empty() {
            for whitelist in &sla.external_whitelist {
                let mut hosts = Vec::new();
                for raw in &whitelist.urls {
                    match url::Url::parse(raw) {
                        Ok(parsed) => {
                            if let Some(host) = parsed.host_str() {
                                hosts.push(host.to_string());
                            }
                        }
                        Err(e) => warn!("bad external whitelist url '{}': {}", raw, e),
                    }
                }
                debug!("external whitelist for {}: {}", subject, hosts.join(", "));
                if let Err(e) = self.network.connect_endpoints(subject, &hosts).await {
                    warn!("external whitelist connect for {} failed: {}", subject, e);
                }
            }
        }

        // Datasource access for apps.
        if sla.component_type == ComponentType::App {
            for ds in &sla.datasources {
                let href = match url::Url::parse(&ds.hypercat.href) {
                    Ok(href) => href,
                    Err(e) => {
                        warn!("bad datasource href '{}': {}", ds.hypercat.href, e);
                        continue;
                    }
                };
                let host = href.host_str().unwrap_or_default().to_string();
                let path = href.path().to_string();
                let wildcard = format!("{}/*", path);

                if ds.is_actuator() {
                    self.grant(subject, &host, &path, Method::Post, None).await;
                    self.grant(subject, &host, &wildcard, Method::Post, None).await;
                    self.grant(subject, &host, &path, Method::Get, None).await;
                    self.grant(subject, &host, &wildcard, Method::Get, None).await;
                } else if ds.is_function() {
                    let request = format!("/notification/request/{}/*", ds.name);
                    let response = format!("/notification/response/{}/*", ds.name);
                    self.grant(subject, &host, &request, Method::Post, None).await;
                    self.grant(subject, &host, &response, Method::Get, None).await;
                } else {
                    self.grant(subject, &host, &path, Method::Get, None).await;
                    self.grant(subject, &host, &wildcard, Method::Get, None).await;
                }
            }
        }

        // Dependent store access, for the component and for our own
        // catalogue reads.
        if let Some(store_name) = sla.store_name() {
            self.grant(CONTAINER_MANAGER_NAME, &store_name, "/cat", Method::Get, None)
                .await;
            self.grant(subject, &store_name, "/*", Method::Post, None).await;
            self.grant(subject, &store_name, "/*", Method::Delete, None).await;
            self.grant(subject, &store_name, "/*", Method::Get, None).await;
        }

        Ok(())
    }

    async fn grant(
        &self,
        subject: &str,
        target: &str,
        path: &str,
        method: Method,
        caveat: Option<String>,
    ) {
        let permission = Permission {
            subject: subject.to_string(),
            route: Route {
                target: target.to_string(),
                path: path.to_string(),
                method,
            },
            caveat,
        };

        if let Err(e) = self.rpc.grant_permission(&permission).await {
            warn!(
                "grant {} {} {} for {} failed: {}",
                method, permission.route.target, permission.route.path, subject, e
            );
        }
    }
}
