//! Bootstrap.
//!
//! Brings the platform up in its strict startup order: privileged
//! registration with the core-network daemon, the export service, the
//! management store, the admin password, the platform's own app-store
//! driver and core UI, the replay of persisted SLAs, and finally the
//! crash detector.
//!
//! The inbound API surfaces — the CM's ZMQ API and the HTTP/HTTPS admin
//! servers — are external collaborators. What the core owes them is a
//! handle to the lifecycle engine and the admin password; they plug in
//! through [`ApiSurface`]. The management store's wire client plugs in
//! through [`StoreConnector`] the same way.

use crate::constants::{
    APP_STORE_NAME, ARBITER_NAME, CONTAINER_MANAGER_NAME, CORE_STORE_SUFFIX, CORE_UI_NAME,
    SERVICE_WAIT_SECS, STORE_PORT,
};
use crate::error::Result;
use crate::manager::ContainerManager;
use crate::secrets::generate_token;
use crate::sla::{
    ComponentType, Datasource, ExternalWhitelist, HypercatItem, RelValPair, Sla, REL_IS_ACTUATOR,
    REL_IS_FUNC,
};
use crate::store::{CmStore, KeyValueStore};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

// =============================================================================
// Collaborator Seams
// =============================================================================

/// Connects a key-value client to a launched store endpoint.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Arc<dyn KeyValueStore>>;
}

/// An inbound API surface: the CM ZMQ API, the redirect server, the HTTPS
/// admin server. Each receives the lifecycle engine and the admin
/// password and runs for the process lifetime.
pub trait ApiSurface: Send + Sync {
    fn name(&self) -> &str;
    fn spawn(&self, manager: Arc<ContainerManager>, password: &str);
}

// =============================================================================
// Logging
// =============================================================================

/// Installs the global tracing subscriber.
pub fn init_logging(debug: bool) {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

// =============================================================================
// Bootstrap
// =============================================================================

/// Drives platform startup.
pub struct Bootstrap {
    manager: Arc<ContainerManager>,
    connector: Arc<dyn StoreConnector>,
    surfaces: Vec<Arc<dyn ApiSurface>>,
    /// The container manager's own base64 arbiter token.
    cm_token: String,
}

impl Bootstrap {
    pub fn new(
        manager: Arc<ContainerManager>,
        connector: Arc<dyn StoreConnector>,
        surfaces: Vec<Arc<dyn ApiSurface>>,
        cm_token: String,
    ) -> Self {
        Self {
            manager,
            connector,
            surfaces,
            cm_token,
        }
    }

    /// Runs the startup sequence and returns the admin password.
    ///
    /// A failure to launch the export service or the management store is
    /// fatal. Failures to reach the daemon or register with the arbiter
    /// are logged so the operator can diagnose, and startup continues.
    pub async fn start(&self) -> Result<String> {
        init_logging(self.manager.options().enable_debug_logging);

        if let Err(e) = self.manager.network().register_privileged().await {
            warn!("privileged registration failed: {}", e);
        }

        if let Err(e) = self
            .manager
            .wait_for_service(ARBITER_NAME, SERVICE_WAIT_SECS)
            .await
        {
            warn!("arbiter not reachable: {}", e);
        }

        self.manager.launch_export_service().await?;

        if let Err(e) = self
            .manager
            .arbiter()
            .register(CONTAINER_MANAGER_NAME, &self.cm_token, ComponentType::App)
            .await
        {
            warn!("failed to register the container manager with the arbiter: {}", e);
        }

        let store_endpoint = self.manager.launch_management_store().await?;
        let kv = self.connector.connect(&store_endpoint).await?;
        let store = Arc::new(CmStore::new(kv));
        self.manager.attach_store(Arc::clone(&store));

        if self.manager.options().clear_slas {
            info!("clearing SLA database to remove saved apps and drivers");
            store.clear_all().await?;
        }

        let password = self.resolve_password(&store).await?;

        for surface in &self.surfaces {
            info!("starting {}", surface.name());
            surface.spawn(Arc::clone(&self.manager), &password);
        }

        self.launch_platform_components();

        info!("restarting saved apps and drivers");
        self.manager.reload().await?;

        tokio::spawn(Arc::clone(&self.manager).run_crash_detector());

        info!("container manager ready and waiting");
        Ok(password)
    }

    /// Loads the stored admin password, or generates and persists a new
    /// one. The override option short-circuits both.
    async fn resolve_password(&self, store: &CmStore) -> Result<String> {
        let override_password = &self.manager.options().override_password;
        if !override_password.is_empty() {
            warn!("password override in use");
            return Ok(override_password.clone());
        }

        if let Some(password) = store.load_password().await? {
            return Ok(password);
        }

        info!("no stored password, generating one");
        let password = generate_token();
        store.save_password(&password).await?;
        Ok(password)
    }

    /// Launches the app-store driver and the core UI in the background;
    /// both are ordinary components installed from constant SLAs and are
    /// not persisted.
    fn launch_platform_components(&self) {
        for sla in [
            app_store_sla(&self.manager.options().app_server_image),
            core_ui_sla(&self.manager.options().core_ui_image),
        ] {
            let manager = Arc::clone(&self.manager);
            tokio::spawn(async move {
                let name = sla.name.clone();
                if let Err(e) = manager.install(sla, false).await {
                    warn!("failed to launch {}: {}", name, e);
                    return;
                }
                if let Err(e) = manager.wait_for_service(&name, SERVICE_WAIT_SECS).await {
                    warn!("{} did not come up: {}", name, e);
                }
            });
        }
    }
}

// =============================================================================
// Platform Component SLAs
// =============================================================================

fn store_href(store_name: &str, path: &str) -> String {
    format!("tcp://{}:{}{}", store_name, STORE_PORT, path)
}

/// The app-store driver: hosts manifests in its own store and needs
/// github egress to fetch them.
fn app_store_sla(image: &str) -> Sla {
    Sla {
        name: APP_STORE_NAME.to_string(),
        component_type: ComponentType::Driver,
        image: Some(image.to_string()),
        registry: None,
        tag: None,
        store: Some(CORE_STORE_SUFFIX.to_string()),
        datasources: vec![],
        external_whitelist: vec![ExternalWhitelist {
            urls: vec![
                "https://github.com".to_string(),
                "https://www.github.com".to_string(),
            ],
            description: "Needed to access the manifests stored on github".to_string(),
        }],
        export_whitelists: vec![],
    }
}

/// The core UI app: drives the CM API through the management store and
/// reads manifests from the app-store's store.
fn core_ui_sla(image: &str) -> Sla {
    let cm_store = format!("{}-{}", CONTAINER_MANAGER_NAME, CORE_STORE_SUFFIX);
    let manifest_store = format!("{}-{}", APP_STORE_NAME, CORE_STORE_SUFFIX);

    let datasource = |client_id: &str, name: &str, ds_type: &str, href: String, flags: &[&str]| {
        let mut item_metadata = vec![RelValPair {
            rel: "urn:X-databox:rels:hasDatasourceid".to_string(),
            val: serde_json::Value::String(name.to_string()),
        }];
        for rel in flags {
            item_metadata.push(RelValPair {
                rel: rel.to_string(),
                val: serde_json::Value::Bool(true),
            });
        }
        Datasource {
            client_id: client_id.to_string(),
            name: name.to_string(),
            datasource_type: ds_type.to_string(),
            required: true,
            hypercat: HypercatItem {
                item_metadata,
                href,
            },
        }
    };

    Sla {
        name: CORE_UI_NAME.to_string(),
        component_type: ComponentType::App,
        image: Some(image.to_string()),
        registry: None,
        tag: None,
        store: None,
        datasources: vec![
            datasource(
                "CM_API_ServiceStatus",
                "ServiceStatus",
                "databox:func:ServiceStatus",
                store_href(&cm_store, "/"),
                &[REL_IS_FUNC],
            ),
            datasource(
                "CM_API_ListAllDatasources",
                "ListAllDatasources",
                "databox:func:ListAllDatasources",
                store_href(&cm_store, "/"),
                &[REL_IS_FUNC],
            ),
            datasource(
                "CM_API",
                "api",
                "databox:container-manager:api",
                store_href(&cm_store, "/kv/api"),
                &[REL_IS_ACTUATOR],
            ),
            datasource(
                "CM_DATA",
                "data",
                "databox:container-manager:data",
                store_href(&cm_store, "/kv/data"),
                &[],
            ),
            datasource(
                "APPS",
                "apps",
                "databox:manifests:app",
                store_href(&manifest_store, "/kv/apps"),
                &[],
            ),
            datasource(
                "DRIVERS",
                "drivers",
                "databox:manifests:driver",
                store_href(&manifest_store, "/kv/drivers"),
                &[],
            ),
            datasource(
                "ALL",
                "all",
                "databox:manifests:all",
                store_href(&manifest_store, "/kv/all"),
                &[],
            ),
        ],
        external_whitelist: vec![],
        export_whitelists: vec![],
    }
}
