//! Constants for the container manager.
//!
//! All fixed names, labels, env keys, endpoints, and timeouts are defined
//! here to ensure consistency and prevent magic values throughout the
//! codebase.

use std::time::Duration;

// =============================================================================
// Component Names
// =============================================================================

/// Service name the container manager registers itself under.
pub const CONTAINER_MANAGER_NAME: &str = "container-manager";

/// Service name of the policy arbiter.
pub const ARBITER_NAME: &str = "arbiter";

/// Service name of the shared export egress sidecar.
pub const EXPORT_SERVICE_NAME: &str = "export-service";

/// Container name of the core-network daemon.
pub const CORE_NETWORK_NAME: &str = "databox-network";

/// Service name of the app-store driver.
pub const APP_STORE_NAME: &str = "app-store";

/// Service name of the core UI app.
pub const CORE_UI_NAME: &str = "core-ui";

/// Store class appended to a component name for its dependent store.
pub const CORE_STORE_SUFFIX: &str = "core-store";

// =============================================================================
// Networks
// =============================================================================

/// Suffix appended to a component name to form its overlay network name.
pub const NETWORK_SUFFIX: &str = "-network";

/// Name of the shared system network that hosts privileged components.
pub const SYSTEM_NETWORK_NAME: &str = "databox-system-net";

/// Base URL of the core-network daemon's control API.
pub const CORE_NETWORK_URL: &str = "https://databox-network:8080";

// =============================================================================
// Labels
// =============================================================================

/// Label carried by every managed service and container.
pub const DATABOX_TYPE_LABEL: &str = "databox.type";

/// Label value marking per-component overlay networks.
pub const DATABOX_NETWORK_LABEL_VALUE: &str = "databox-network";

// =============================================================================
// Event Actor Attributes
// =============================================================================
//
// Attribute keys as they appear on the runtime's event stream.

/// Service name attribute on container events.
pub const EVENT_ATTR_SERVICE_NAME: &str = "com.docker.swarm.service.name";

/// Service id attribute on container events.
pub const EVENT_ATTR_SERVICE_ID: &str = "com.docker.swarm.service.id";

/// Container name attribute.
pub const EVENT_ATTR_CONTAINER_NAME: &str = "name";

/// Signal attribute on `kill` events.
pub const EVENT_ATTR_SIGNAL: &str = "signal";

// =============================================================================
// Environment Keys
// =============================================================================

/// DNS IP handed to the container manager at startup.
pub const DATABOX_DNS_IP_ENV: &str = "DATABOX_DNS_IP";

/// Arbiter ZMQ endpoint injected into every component.
pub const ARBITER_ENDPOINT_ENV: &str = "DATABOX_ARBITER_ENDPOINT";

/// Fixed arbiter endpoint value.
pub const ARBITER_ENDPOINT: &str = "tcp://arbiter:4444";

/// Component's own name, injected into every component.
pub const LOCAL_NAME_ENV: &str = "DATABOX_LOCAL_NAME";

/// Platform version, injected into every component.
pub const VERSION_ENV: &str = "DATABOX_VERSION";

/// Store request endpoint for components with a dependent store.
pub const ZMQ_ENDPOINT_ENV: &str = "DATABOX_ZMQ_ENDPOINT";

/// Store dealer endpoint for components with a dependent store.
pub const ZMQ_DEALER_ENDPOINT_ENV: &str = "DATABOX_ZMQ_DEALER_ENDPOINT";

/// App-store URL injected into drivers.
pub const STORE_URL_ENV: &str = "DATABOX_STORE_URL";

/// Prefix for per-datasource env vars injected into apps.
pub const DATASOURCE_ENV_PREFIX: &str = "DATASOURCE_";

// =============================================================================
// Secrets
// =============================================================================

/// Shared root CA secret name.
pub const ROOT_CA_SECRET: &str = "DATABOX_ROOT_CA";

/// Shared public transport key secret name.
pub const ZMQ_PUBLIC_KEY_SECRET: &str = "ZMQ_PUBLIC_KEY";

/// Private transport key secret name, mounted into stores only.
pub const ZMQ_SECRET_KEY_SECRET: &str = "ZMQ_SECRET_KEY";

/// In-container filename of the per-component certificate.
pub const CERT_TARGET_FILE: &str = "DATABOX.pem";

/// In-container filename of the per-component arbiter token.
pub const TOKEN_TARGET_FILE: &str = "ARBITER_TOKEN";

/// Byte length of raw arbiter tokens and generated admin passwords.
pub const TOKEN_BYTES: usize = 24;

// =============================================================================
// Store Keys
// =============================================================================

/// Key holding the admin password.
pub const PASSWORD_KEY: &str = "password";

/// Key prefix for persisted SLAs; the component name is appended.
pub const SLA_KEY_PREFIX: &str = "sla/";

// =============================================================================
// Store Endpoints
// =============================================================================

/// ZMQ request port exposed by every store.
pub const STORE_PORT: u16 = 5555;

/// ZMQ dealer port exposed by every store.
pub const STORE_DEALER_PORT: u16 = 5556;

/// In-container mount point of a store's database volume.
pub const STORE_DATABASE_MOUNT: &str = "/database";

// =============================================================================
// Timeouts
// =============================================================================

/// Per-request timeout for core-network daemon calls.
pub const DAEMON_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for a service's container to appear.
pub const WAIT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Settling delay after a waited-for container first appears.
pub const WAIT_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Delay after attaching the core-network daemon to a fresh network,
/// giving the runtime time to assign addresses before inspection.
pub const NETWORK_ATTACH_SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Default wait for a dependent store or system service to come up.
pub const SERVICE_WAIT_SECS: u64 = 10;

/// Wait for a replacement container during restart.
pub const RESTART_WAIT_SECS: u64 = 20;

// =============================================================================
// Validation
// =============================================================================

/// Maximum component name length (DNS label limit).
pub const MAX_COMPONENT_NAME_LEN: usize = 63;
