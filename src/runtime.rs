//! Container runtime interface.
//!
//! This trait defines everything the lifecycle engine demands from the
//! node's container runtime:
//! - service create/remove and lookup
//! - container lookup and force-removal
//! - image presence checks and pulls
//! - secret create/remove/list
//! - overlay network create/inspect/connect
//! - an ordered event stream for crash detection
//!
//! The engine never talks to a concrete runtime API directly; everything
//! flows through this seam so the orchestration logic can be exercised
//! against an in-memory runtime in tests.
//!
//! # Ordering Contract
//!
//! [`ContainerRuntime::events`] must yield events in the order the runtime
//! observed them. Crash detection relies on `kill`/`remove` events arriving
//! before the `die` events they explain.

use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Service Specification
// =============================================================================

/// A named volume mounted into a service's containers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeMount {
    /// Volume name.
    pub source: String,
    /// Mount point inside the container.
    pub target: String,
}

/// A runtime secret mounted into a service's containers as a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    /// Runtime id of the secret.
    pub secret_id: String,
    /// Runtime name of the secret.
    pub secret_name: String,
    /// Filename the secret is mounted under.
    pub target_file: String,
}

/// Declarative description of a service to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    /// Service name; the runtime enforces uniqueness.
    pub name: String,
    /// Fully-qualified image reference.
    pub image: String,
    /// Environment in `KEY=VALUE` form.
    #[serde(default)]
    pub env: Vec<String>,
    /// Labels on the service and its containers.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Networks the service's containers attach to.
    #[serde(default)]
    pub networks: Vec<String>,
    /// DNS servers for the service's containers.
    #[serde(default)]
    pub dns: Vec<String>,
    /// Secrets mounted into the service's containers.
    #[serde(default)]
    pub secrets: Vec<SecretReference>,
    /// Volumes mounted into the service's containers.
    #[serde(default)]
    pub mounts: Vec<VolumeMount>,
}

impl ServiceSpec {
    /// Creates a spec with just a name and image; everything else empty.
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            env: Vec::new(),
            labels: HashMap::new(),
            networks: Vec::new(),
            dns: Vec::new(),
            secrets: Vec::new(),
            mounts: Vec::new(),
        }
    }
}

// =============================================================================
// Inspection Types
// =============================================================================

/// A service as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    /// Runtime id.
    pub id: String,
    /// Service name.
    pub name: String,
    /// Labels on the service.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Secrets attached to the service's container spec.
    #[serde(default)]
    pub secrets: Vec<SecretReference>,
}

/// A container as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerInfo {
    /// Runtime id.
    pub id: String,
    /// Container name.
    pub name: String,
    /// Labels on the container.
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Attached networks: network name to the container's IPv4 on it.
    #[serde(default)]
    pub networks: HashMap<String, String>,
}

/// A runtime secret's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    /// Runtime id.
    pub id: String,
    /// Secret name.
    pub name: String,
}

/// A network endpoint: one container attached to a network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEndpoint {
    /// Attached container's name.
    pub container_name: String,
    /// Container's IPv4 address on this network (possibly CIDR-suffixed).
    pub ipv4: String,
}

/// A network as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkInfo {
    /// Runtime id.
    pub id: String,
    /// Network name.
    pub name: String,
    /// Containers attached to this network.
    #[serde(default)]
    pub endpoints: Vec<NetworkEndpoint>,
}

// =============================================================================
// Events
// =============================================================================

/// Object class an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Service,
    Container,
    /// Event classes the engine does not interpret.
    Other,
}

/// One entry from the runtime's ordered event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeEvent {
    /// Object class the event refers to.
    pub kind: EventKind,
    /// Action, e.g. `die`, `kill`, `remove`.
    pub action: String,
    /// Runtime id of the actor object.
    pub actor_id: String,
    /// Actor attributes (labels, container name, signal).
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl RuntimeEvent {
    /// Looks up an actor attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Node container runtime as seen by the lifecycle engine.
///
/// Implementations wrap a concrete runtime API (a swarm-capable engine in
/// production, an in-memory fake in tests). All object lookups are by the
/// deterministic names the engine derives from SLA names; the runtime's
/// own name-uniqueness guarantees serialise concurrent creations.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    // =========================================================================
    // Services
    // =========================================================================

    /// Creates a service; returns its runtime id.
    async fn create_service(&self, spec: ServiceSpec) -> Result<String>;

    /// Removes a service by id.
    async fn remove_service(&self, id: &str) -> Result<()>;

    /// Lists services, optionally filtered by exact name.
    async fn list_services(&self, name: Option<&str>) -> Result<Vec<ServiceInfo>>;

    // =========================================================================
    // Containers
    // =========================================================================

    /// Lists containers carrying the given label.
    async fn containers_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerInfo>>;

    /// Lists containers whose name matches the given filter.
    async fn containers_by_name(&self, name: &str) -> Result<Vec<ContainerInfo>>;

    /// Removes a container, killing it first when `force` is set.
    async fn remove_container(&self, id: &str, force: bool) -> Result<()>;

    // =========================================================================
    // Images
    // =========================================================================

    /// True when the image is present locally.
    async fn image_exists(&self, reference: &str) -> Result<bool>;

    /// Pulls an image from its registry.
    async fn pull_image(&self, reference: &str, registry_host: &str) -> Result<()>;

    // =========================================================================
    // Secrets
    // =========================================================================

    /// Creates a secret; returns its runtime id.
    async fn create_secret(&self, name: &str, data: &[u8]) -> Result<String>;

    /// Removes a secret by id.
    async fn remove_secret(&self, id: &str) -> Result<()>;

    /// Lists secrets, optionally filtered by exact name.
    async fn list_secrets(&self, name: Option<&str>) -> Result<Vec<SecretInfo>>;

    // =========================================================================
    // Networks
    // =========================================================================

    /// Creates an attachable overlay network; returns its runtime id.
    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        labels: HashMap<String, String>,
    ) -> Result<String>;

    /// Lists networks whose name matches the given filter.
    async fn networks_by_name(&self, name: &str) -> Result<Vec<NetworkInfo>>;

    /// Inspects a network by id, including attached endpoints.
    async fn inspect_network(&self, id: &str) -> Result<NetworkInfo>;

    /// Attaches a container to a network.
    async fn connect_network(&self, network_id: &str, container_id: &str) -> Result<()>;

    // =========================================================================
    // Events
    // =========================================================================

    /// Subscribes to the runtime's ordered event stream.
    async fn events(&self) -> Result<BoxStream<'static, RuntimeEvent>>;
}
