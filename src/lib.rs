//! # container-manager
//!
//! **SLA-Driven Component Lifecycle Engine for a Personal-Data Platform**
//!
//! This crate is the control plane of a single-node personal-data
//! platform: it consumes a declarative Service-Level Agreement (SLA) per
//! app or driver and drives, transactionally, the installation, restart,
//! uninstallation, and crash-recovery of each component together with its
//! sidecar store, per-component overlay network, issued credentials, and
//! arbiter permissions.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        container-manager                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────────┐    │
//! │  │                  ContainerManager (lifecycle)               │    │
//! │  │   install(sla) → uninstall(name) → restart(name)            │    │
//! │  │          reload() · crash detector · list()                 │    │
//! │  └──────┬───────────┬──────────────┬──────────────┬────────────┘    │
//! │         │           │              │              │                 │
//! │  ┌──────┴─────┐ ┌───┴────────┐ ┌───┴──────────┐ ┌─┴──────────┐      │
//! │  │ Network    │ │ Secret     │ │ Arbiter      │ │ CmStore    │      │
//! │  │ Controller │ │ Issuer     │ │ Registrar    │ │ (persist)  │      │
//! │  └──────┬─────┘ └───┬────────┘ └───┬──────────┘ └─┬──────────┘      │
//! ├─────────┼───────────┼──────────────┼──────────────┼─────────────────┤
//! │         ▼           ▼              ▼              ▼                 │
//! │  core-network    container      arbiter       management            │
//! │  daemon (HTTP)   runtime        (RPC seam)    store (KV seam)       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Isolation Model
//!
//! Each component lives on its own overlay network with the core-network
//! daemon attached; the daemon's address on that network is the
//! component's DNS server, so resolving a peer store always crosses the
//! policy boundary. Apps' networks are internal; drivers' are not, since
//! drivers may hold an external whitelist. The arbiter gates every
//! inter-component call with route-scoped grants derived from the SLA.
//!
//! # Partial Failure
//!
//! Every runtime object is keyed by a deterministic function of the SLA
//! name (service = name, network = `{name}-network`, store =
//! `{name}-{class}`, secrets = `{NAME}.pem`/`{NAME}_KEY`). Install
//! performs no cleanup on mid-sequence failure: re-invoking it reuses
//! what exists, rotates secrets, and resumes. Uninstall is the explicit
//! unwind.
//!
//! # External Seams
//!
//! The container runtime ([`ContainerRuntime`]), the arbiter wire
//! protocol ([`ArbiterRpc`]), the management store's KV protocol
//! ([`KeyValueStore`]), and the inbound API surfaces
//! ([`bootstrap::ApiSurface`]) are trait seams. Production wires real
//! clients in; tests wire in-memory fakes.
//!
//! # Example
//!
//! ```rust,ignore
//! use container_manager::{Bootstrap, ContainerManager, Sla};
//!
//! #[tokio::main]
//! async fn main() -> container_manager::Result<()> {
//!     let manager = build_manager()?; // wire runtime, daemon, arbiter
//!     let bootstrap = Bootstrap::new(manager.clone(), connector, surfaces, token);
//!     let password = bootstrap.start().await?;
//!
//!     // Inbound API
//!     let sla = Sla::from_json(body)?;
//!     manager.install(sla, true).await?;
//!     Ok(())
//! }
//! ```

// =============================================================================
// Modules
// =============================================================================

pub mod arbiter;
pub mod bootstrap;
pub mod config;
pub mod constants;
pub mod error;
pub mod image;
pub mod manager;
pub mod network;
pub mod runtime;
pub mod secrets;
pub mod sla;
pub mod store;

// =============================================================================
// Facade Re-exports
// =============================================================================

pub use arbiter::{ArbiterRegistrar, ArbiterRpc, Method, Permission, Route};
pub use bootstrap::{ApiSurface, Bootstrap, StoreConnector};
pub use config::{dns_ip_from_env, ManagerOptions};
pub use error::{Error, Result};
pub use image::resolve_image;
pub use manager::ContainerManager;
pub use network::{EndpointConfig, NetworkConfig, NetworkController};
pub use runtime::{
    ContainerInfo, ContainerRuntime, EventKind, NetworkEndpoint, NetworkInfo, RuntimeEvent,
    SecretInfo, SecretReference, ServiceInfo, ServiceSpec, VolumeMount,
};
pub use secrets::{CertAuthority, SecretIssuer};
pub use sla::{ComponentType, Datasource, Sla};
pub use store::{CmStore, KeyValueStore};
