//! SLA specification types.
//!
//! An SLA (Service-Level Agreement) is the immutable declarative document
//! that describes one installable component: its name, role, image, the
//! datasources it consumes, and the external destinations it may reach.
//! Parsed SLAs are the only input to the lifecycle engine; everything the
//! engine provisions (service, network, store, secrets, grants) is derived
//! deterministically from the fields here.

use crate::constants::MAX_COMPONENT_NAME_LEN;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

// =============================================================================
// Metadata Rels
// =============================================================================

/// Hypercat rel marking a datasource as an actuator.
pub const REL_IS_ACTUATOR: &str = "urn:X-databox:rels:isActuator";

/// Hypercat rel marking a datasource as a function.
pub const REL_IS_FUNC: &str = "urn:X-databox:rels:isFunc";

// =============================================================================
// Component Type
// =============================================================================

/// Role of a managed component.
///
/// Apps consume datasources, drivers expose them through a store, stores
/// are per-component key-value services, and system components are the
/// platform's own sidecars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// Datasource consumer.
    App,
    /// Datasource producer with an optional dependent store.
    Driver,
    /// Per-component key-value service.
    Store,
    /// Platform sidecar (export service, core network).
    System,
}

impl std::fmt::Display for ComponentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::App => write!(f, "app"),
            Self::Driver => write!(f, "driver"),
            Self::Store => write!(f, "store"),
            Self::System => write!(f, "system"),
        }
    }
}

// =============================================================================
// Hypercat Catalogue Items
// =============================================================================

/// A single rel/val metadata pair on a hypercat item.
///
/// Values are either strings or booleans in practice; kept as raw JSON so
/// the item round-trips verbatim into `DATASOURCE_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelValPair {
    pub rel: String,
    pub val: serde_json::Value,
}

/// Hypercat catalogue entry describing where a datasource lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypercatItem {
    /// Metadata rel/val pairs (datasource id, actuator/function flags).
    #[serde(rename = "item-metadata", default)]
    pub item_metadata: Vec<RelValPair>,
    /// URL whose host is the owning store and whose path is the
    /// datasource path.
    pub href: String,
}

impl HypercatItem {
    /// True if any metadata pair sets `rel` to boolean true.
    fn has_bool_rel(&self, rel: &str) -> bool {
        self.item_metadata
            .iter()
            .any(|p| p.rel == rel && p.val == serde_json::Value::Bool(true))
    }
}

// =============================================================================
// Datasources
// =============================================================================

/// A datasource an app requests access to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Datasource {
    /// Identifier the app uses to look up its `DATASOURCE_*` env var.
    #[serde(rename = "clientid")]
    pub client_id: String,
    /// Human-readable datasource name; also keys function notification
    /// paths.
    pub name: String,
    /// Datasource type URN.
    #[serde(rename = "type", default)]
    pub datasource_type: String,
    /// Whether the app refuses to run without this datasource.
    #[serde(default)]
    pub required: bool,
    /// Catalogue entry with the href and classification metadata.
    pub hypercat: HypercatItem,
}

impl Datasource {
    /// True for datasources that accept writes.
    pub fn is_actuator(&self) -> bool {
        self.hypercat.has_bool_rel(REL_IS_ACTUATOR)
    }

    /// True for request/response function datasources.
    pub fn is_function(&self) -> bool {
        self.hypercat.has_bool_rel(REL_IS_FUNC)
    }
}

// =============================================================================
// Whitelists
// =============================================================================

/// External hosts a driver may contact directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalWhitelist {
    pub urls: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// An external destination a component may export to via the export
/// service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportWhitelist {
    pub url: String,
    #[serde(default)]
    pub description: String,
}

// =============================================================================
// SLA
// =============================================================================

/// Declarative install manifest for one component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sla {
    /// Unique component identifier (DNS-label-safe).
    pub name: String,
    /// Component role; only apps and drivers are installable.
    #[serde(rename = "databox-type")]
    pub component_type: ComponentType,
    /// Image name; resolved against registry/tag/arch defaults when not
    /// fully qualified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Registry override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    /// Image tag override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Store class; when present a dependent store named
    /// `"{name}-{store}"` is provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store: Option<String>,
    /// Datasources this app consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub datasources: Vec<Datasource>,
    /// External hosts this driver may contact.
    #[serde(rename = "external-whitelist", default, skip_serializing_if = "Vec::is_empty")]
    pub external_whitelist: Vec<ExternalWhitelist>,
    /// Destinations this component may export to.
    #[serde(rename = "export-whitelist", default, skip_serializing_if = "Vec::is_empty")]
    pub export_whitelists: Vec<ExportWhitelist>,
}

impl Sla {
    /// Parses an SLA from JSON bytes.
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let sla: Sla = serde_json::from_slice(json)?;
        sla.validate()?;
        Ok(sla)
    }

    /// Validates the component name and role.
    ///
    /// # Errors
    ///
    /// - Name empty, too long, or not a DNS label
    /// - Component type is not installable (`store`/`system` components
    ///   are provisioned by the engine, never installed from an SLA)
    pub fn validate(&self) -> Result<()> {
        validate_component_name(&self.name)?;

        match self.component_type {
            ComponentType::App | ComponentType::Driver => Ok(()),
            other => Err(Error::InvalidSla {
                name: self.name.clone(),
                reason: format!("component type '{}' is not installable", other),
            }),
        }
    }

    /// Name of the dependent store, when the SLA requires one.
    pub fn store_name(&self) -> Option<String> {
        self.store
            .as_ref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("{}-{}", self.name, s))
    }
}

/// Validates a component name (RFC 1123 DNS label).
pub fn validate_component_name(name: &str) -> Result<()> {
    let invalid = |reason: String| Error::InvalidSla {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("name cannot be empty".to_string()));
    }

    if name.len() > MAX_COMPONENT_NAME_LEN {
        return Err(invalid(format!(
            "name exceeds maximum length of {}",
            MAX_COMPONENT_NAME_LEN
        )));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "name must contain only lowercase alphanumeric characters or '-'".to_string(),
        ));
    }

    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("name cannot start or end with '-'".to_string()));
    }

    Ok(())
}
