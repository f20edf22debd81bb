//! Error types for the container manager.

/// Result type alias for container manager operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing component lifecycles.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// No installed component with this name.
    #[error("component not installed: {0}")]
    NotInstalled(String),

    /// No running container for this service.
    #[error("service not running: {0}")]
    NotRunning(String),

    /// A component with this name is already installed.
    #[error("component already installed: {0}")]
    AlreadyInstalled(String),

    /// Service creation in the runtime failed.
    #[error("failed to launch '{name}': {reason}")]
    LaunchFailed { name: String, reason: String },

    /// Waited too long for a container to appear.
    #[error("service '{name}' has not started after {timeout_secs} seconds")]
    Timeout { name: String, timeout_secs: u64 },

    // =========================================================================
    // Image Errors
    // =========================================================================
    /// Image is absent locally and could not be pulled.
    #[error("image unavailable for '{name}': {image}")]
    ImageUnavailable { name: String, image: String },

    // =========================================================================
    // SLA Errors
    // =========================================================================
    /// The SLA document is malformed or names an unsupported component type.
    #[error("invalid SLA '{name}': {reason}")]
    InvalidSla { name: String, reason: String },

    // =========================================================================
    // Subsystem Errors
    // =========================================================================
    /// The arbiter rejected a registration or grant.
    #[error("arbiter refused {operation} for '{name}': {reason}")]
    PolicyGrantFailed {
        name: String,
        operation: String,
        reason: String,
    },

    /// A core-network daemon call or network-plane operation failed.
    #[error("network operation failed: {0}")]
    NetworkFailure(String),

    /// A management-store read or write failed.
    #[error("persistence operation failed: {0}")]
    PersistenceFailure(String),

    /// The container runtime returned an error outside the lifecycle paths.
    #[error("runtime error: {0}")]
    Runtime(String),

    /// Secret creation or removal failed.
    #[error("secret operation failed for '{name}': {reason}")]
    SecretFailed { name: String, reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
