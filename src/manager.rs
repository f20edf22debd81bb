//! Lifecycle engine.
//!
//! The container manager drives the end-to-end life of every app and
//! driver on the node from its SLA: provision the overlay network, mint
//! secrets, register tokens and grants with the arbiter, launch the
//! dependent store, create the service, persist the SLA, and unwind all
//! of it on uninstall.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      ContainerManager                        │
//! │   install · uninstall · restart · reload · crash detector    │
//! ├──────────────┬──────────────┬──────────────┬─────────────────┤
//! │ Network      │ Secret       │ Arbiter      │ CmStore         │
//! │ Controller   │ Issuer       │ Registrar    │ (persistence)   │
//! ├──────────────┴──────────────┴──────────────┴─────────────────┤
//! │                   ContainerRuntime trait                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Partial Failure
//!
//! Install performs no cleanup on mid-sequence failure. Every runtime
//! object is keyed by a deterministic function of the SLA name (service =
//! name, network = `{name}-network`, store = `{name}-{class}`), so every
//! sub-step is idempotent and re-invoking install resumes where the
//! previous attempt stopped. Uninstall is the explicit unwind.
//!
//! # Concurrency
//!
//! Mutations are serialised per component name; installs of distinct
//! components run concurrently, which `reload` exploits by launching all
//! drivers in parallel, then all apps.

use crate::arbiter::ArbiterRegistrar;
use crate::config::ManagerOptions;
use crate::constants::{
    ARBITER_ENDPOINT, ARBITER_ENDPOINT_ENV, ARBITER_NAME, CORE_STORE_SUFFIX, DATABOX_TYPE_LABEL,
    DATASOURCE_ENV_PREFIX, EVENT_ATTR_CONTAINER_NAME, EVENT_ATTR_SERVICE_ID,
    EVENT_ATTR_SERVICE_NAME, EVENT_ATTR_SIGNAL, EXPORT_SERVICE_NAME, LOCAL_NAME_ENV,
    RESTART_WAIT_SECS, SERVICE_WAIT_SECS, STORE_DATABASE_MOUNT, STORE_DEALER_PORT, STORE_PORT,
    STORE_URL_ENV, VERSION_ENV, WAIT_POLL_INTERVAL, WAIT_SETTLE_DELAY, ZMQ_DEALER_ENDPOINT_ENV,
    ZMQ_ENDPOINT_ENV,
};
use crate::error::{Error, Result};
use crate::image::{ensure_image, resolve_image};
use crate::network::{NetworkConfig, NetworkController};
use crate::runtime::{ContainerInfo, ContainerRuntime, EventKind, ServiceSpec, VolumeMount};
use crate::secrets::SecretIssuer;
use crate::sla::{ComponentType, Sla};
use crate::store::CmStore;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

// =============================================================================
// Container Manager
// =============================================================================

/// The component-lifecycle engine.
///
/// Holds the authoritative in-memory view of installed components and
/// composes the runtime, network controller, secret issuer, arbiter
/// registrar, and persistence into the transactional lifecycle
/// operations.
pub struct ContainerManager {
    runtime: Arc<dyn ContainerRuntime>,
    network: Arc<NetworkController>,
    secrets: Arc<SecretIssuer>,
    arbiter: Arc<ArbiterRegistrar>,
    options: ManagerOptions,
    /// DNS IP for services launched on the system network.
    system_dns_ip: String,
    /// Persistence, attached once the management store is up.
    store: RwLock<Option<Arc<CmStore>>>,
    /// Names of installed components.
    installed: Mutex<HashSet<String>>,
    /// Per-component mutation locks.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ContainerManager {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        network: Arc<NetworkController>,
        secrets: Arc<SecretIssuer>,
        arbiter: Arc<ArbiterRegistrar>,
        options: ManagerOptions,
        system_dns_ip: String,
    ) -> Self {
        Self {
            runtime,
            network,
            secrets,
            arbiter,
            options,
            system_dns_ip,
            store: RwLock::new(None),
            installed: Mutex::new(HashSet::new()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches the persistence layer once the management store is
    /// responsive. Installs with `persist` fail until this is called.
    pub fn attach_store(&self, store: Arc<CmStore>) {
        *self.store.write().unwrap() = Some(store);
    }

    /// The attached persistence layer, if any.
    pub fn store(&self) -> Option<Arc<CmStore>> {
        self.store.read().unwrap().clone()
    }

    /// Startup options.
    pub fn options(&self) -> &ManagerOptions {
        &self.options
    }

    /// The network controller (shared with the arbiter registrar and
    /// bootstrap).
    pub fn network(&self) -> &Arc<NetworkController> {
        &self.network
    }

    /// The arbiter registrar.
    pub fn arbiter(&self) -> &Arc<ArbiterRegistrar> {
        &self.arbiter
    }

    // =========================================================================
    // Inbound API
    // =========================================================================

    /// Names of installed components, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.installed.lock().unwrap().iter().cloned().collect();
        names.sort();
        names
    }

    /// True when a component of this name is installed.
    pub fn is_installed(&self, name: &str) -> bool {
        self.installed.lock().unwrap().contains(name)
    }

    // =========================================================================
    // Install
    // =========================================================================

    /// Installs a component from its SLA.
    ///
    /// Runs the full provisioning sequence in order, each step a durable
    /// fence: network pre-config, image resolution, secret minting,
    /// endpoint connection, dependent-store launch, arbiter grants,
    /// service creation, and (with `persist`) SLA persistence. No cleanup
    /// happens on failure; re-invoking install resumes idempotently.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSla`] for a malformed document
    /// - [`Error::AlreadyInstalled`] when the name is already installed
    /// - [`Error::ImageUnavailable`] when the image cannot be obtained
    /// - [`Error::LaunchFailed`] when the runtime refuses the service
    /// - Subsystem errors from the network, arbiter, or store
    pub async fn install(&self, sla: Sla, persist: bool) -> Result<()> {
        sla.validate()?;

        let local_name = sla.name.clone();
        let lock = self.name_lock(&local_name);
        let _guard = lock.lock().await;

        // Checked under the per-name lock: a concurrent install of the
        // same name must see AlreadyInstalled, not rerun the sequence.
        if self.is_installed(&local_name) {
            return Err(Error::AlreadyInstalled(local_name));
        }

        let store_name = sla.store_name();

        info!("installing {}", local_name);

        // Network first: the service spec needs the DNS address.
        let net_config = self
            .network
            .pre_config(&local_name, sla.component_type)
            .await?;

        // Image must be present before anything irreversible happens.
        let image = resolve_image(&sla, &self.options);
        ensure_image(
            self.runtime.as_ref(),
            &local_name,
            &image,
            &self.options.default_registry_host,
        )
        .await?;

        // Type-specific service spec and the peer networks it needs.
        let (mut spec, required_networks) = match sla.component_type {
            ComponentType::App => self.app_config(&sla, &local_name, &image, &net_config),
            ComponentType::Driver => self.driver_config(&sla, &local_name, &image, &net_config),
            _ => {
                return Err(Error::InvalidSla {
                    name: local_name,
                    reason: "only apps and drivers are installable".to_string(),
                })
            }
        };

        // Fresh secrets; also registers the new token with the arbiter.
        spec.secrets = self.secrets.mint(&local_name, sla.component_type).await?;

        if let Some(store_name) = &store_name {
            spec.env.push(format!(
                "{}=tcp://{}:{}",
                ZMQ_ENDPOINT_ENV, store_name, STORE_PORT
            ));
            spec.env.push(format!(
                "{}=tcp://{}:{}",
                ZMQ_DEALER_ENDPOINT_ENV, store_name, STORE_DEALER_PORT
            ));
        }

        debug!(
            "networks to connect for {}: {}",
            local_name,
            required_networks.join(",")
        );
        self.network
            .connect_endpoints(&local_name, &required_networks)
            .await?;

        // The dependent store goes up after the networks are configured
        // and before the component that will talk to it.
        if let Some(store_name) = &store_name {
            self.launch_store(store_name, &net_config).await?;
            self.wait_for_service(store_name, SERVICE_WAIT_SECS).await?;
        }

        self.arbiter.apply_sla(&sla).await?;

        self.create_or_reuse_service(spec).await?;

        if persist {
            let store = self.store().ok_or_else(|| {
                Error::PersistenceFailure("management store not attached".to_string())
            })?;
            store.save_sla(&sla).await?;
        }

        self.installed.lock().unwrap().insert(local_name.clone());

        info!("successfully installed {}", local_name);
        Ok(())
    }

    /// Creates a service, reusing an existing one of the same name.
    ///
    /// The runtime's name uniqueness makes creation the natural fence:
    /// a rerun against a partial installation finds the service already
    /// present and leaves it alone.
    async fn create_or_reuse_service(&self, spec: ServiceSpec) -> Result<()> {
        let existing = self.runtime.list_services(Some(&spec.name)).await?;
        if !existing.is_empty() {
            debug!("service {} already exists, reusing", spec.name);
            return Ok(());
        }

        let name = spec.name.clone();
        self.runtime
            .create_service(spec)
            .await
            .map(|_| ())
            .map_err(|e| Error::LaunchFailed {
                name,
                reason: e.to_string(),
            })
    }

    // =========================================================================
    // Uninstall
    // =========================================================================

    /// Uninstalls a component: removes its service, its minted secrets,
    /// its daemon endpoints, and its persisted SLA.
    ///
    /// The per-component overlay network is left in place so a reinstall
    /// reuses it.
    ///
    /// # Errors
    ///
    /// [`Error::NotInstalled`] when no service of this name exists.
    pub async fn uninstall(&self, name: &str) -> Result<()> {
        let lock = self.name_lock(name);
        let _guard = lock.lock().await;

        let services = self.runtime.list_services(Some(name)).await?;
        let service = services
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotInstalled(name.to_string()))?;

        info!("uninstalling {}", name);

        // Capture the endpoint before teardown; the daemon needs the IP
        // to drop its rules.
        let endpoint = match self.network.network_of_service(name).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                warn!("could not resolve network of {}: {}", name, e);
                Default::default()
            }
        };

        self.runtime
            .remove_service(&service.id)
            .await
            .map_err(|e| Error::Runtime(format!("cannot remove {}: {}", name, e)))?;

        // Shared secrets are still referenced by other services; the
        // runtime refuses those removals and only the per-component
        // cert and token actually go.
        for secret in &service.secrets {
            debug!("removing secret {}", secret.secret_name);
            if let Err(e) = self.runtime.remove_secret(&secret.secret_id).await {
                debug!("secret {} not removed: {}", secret.secret_name, e);
            }
        }

        if let Err(e) = self.network.post_uninstall(name, &endpoint).await {
            warn!("post-uninstall disconnect for {} failed: {}", name, e);
        }

        if let Some(store) = self.store() {
            store.delete_sla(name).await?;
        }

        self.installed.lock().unwrap().remove(name);

        Ok(())
    }

    // =========================================================================
    // Restart
    // =========================================================================

    /// Restarts a component's container and tells the core-network daemon
    /// about the IP change so firewall rules follow.
    ///
    /// The runtime itself re-creates the task once the container is
    /// force-removed; our contribution is the before/after address pair.
    ///
    /// # Errors
    ///
    /// - [`Error::NotRunning`] when no container exists for the service
    /// - [`Error::Timeout`] when the replacement does not appear
    pub async fn restart(&self, name: &str) -> Result<()> {
        let containers = self
            .runtime
            .containers_by_label(EVENT_ATTR_SERVICE_NAME, name)
            .await?;
        let container = containers
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotRunning(name.to_string()))?;

        let old_ip = self.component_network_ip(&container, name);

        self.runtime
            .remove_container(&container.id, true)
            .await
            .map_err(|e| Error::Runtime(format!("cannot remove {}: {}", name, e)))?;

        let replacement = match self.wait_for_service(name, RESTART_WAIT_SECS).await {
            Ok(container) => container,
            Err(e) => {
                warn!("failed to restart {}: {}", name, e);
                return Err(e);
            }
        };

        let new_ip = self.component_network_ip(&replacement, name);
        debug!("restart {}: {} -> {}", name, old_ip, new_ip);

        self.network.service_restart(name, &old_ip, &new_ip).await
    }

    /// A container's IP on its per-component network.
    ///
    /// The network is matched by the service's base name (a trailing
    /// `"-core-store"` stripped), so a store's container resolves to the
    /// owning component's network.
    fn component_network_ip(&self, container: &ContainerInfo, service_name: &str) -> String {
        let base = service_name.replacen(&format!("-{}", CORE_STORE_SUFFIX), "", 1);
        for (net_name, ip) in &container.networks {
            if net_name.contains(&base) {
                debug!("ip for {} on {} is {}", service_name, net_name, ip);
                return ip.clone();
            }
        }
        String::new()
    }

    // =========================================================================
    // Reload
    // =========================================================================

    /// Replays every persisted SLA: all drivers in parallel, then all
    /// apps in parallel.
    ///
    /// Driver-before-app ordering is a hard invariant — apps connect to
    /// driver stores at startup. Individual install failures are logged
    /// and do not stop the rest of the replay.
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let store = self.store().ok_or_else(|| {
            Error::PersistenceFailure("management store not attached".to_string())
        })?;

        let slas = store.get_all_slas().await?;
        debug!("reload: {} persisted SLAs", slas.len());

        let (drivers, apps): (Vec<Sla>, Vec<Sla>) = slas
            .into_iter()
            .partition(|sla| sla.component_type == ComponentType::Driver);

        self.reload_phase(drivers).await;
        self.reload_phase(apps).await;

        Ok(())
    }

    async fn reload_phase(self: &Arc<Self>, slas: Vec<Sla>) {
        let mut tasks = JoinSet::new();
        for sla in slas {
            let manager = Arc::clone(self);
            tasks.spawn(async move {
                let name = sla.name.clone();
                if let Err(e) = manager.install(sla, false).await {
                    warn!("reload of {} failed: {}", name, e);
                }
            });
        }
        while tasks.join_next().await.is_some() {}
    }

    // =========================================================================
    // Waiting
    // =========================================================================

    /// Waits for a service's container to appear, polling every second.
    ///
    /// Returns the first matching container after a short settling delay.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] after `timeout_secs` polls without a match.
    pub async fn wait_for_service(
        &self,
        name: &str,
        timeout_secs: u64,
    ) -> Result<ContainerInfo> {
        debug!("waiting for {}", name);

        let mut polls = 0u64;
        loop {
            let containers = self
                .runtime
                .containers_by_label(EVENT_ATTR_SERVICE_NAME, name)
                .await?;

            if let Some(container) = containers.into_iter().next() {
                // Give the container a moment to finish coming up.
                tokio::time::sleep(WAIT_SETTLE_DELAY).await;
                return Ok(container);
            }

            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
            polls += 1;
            if polls > timeout_secs {
                return Err(Error::Timeout {
                    name: name.to_string(),
                    timeout_secs,
                });
            }
        }
    }

    // =========================================================================
    // Crash Detection
    // =========================================================================

    /// Watches the runtime event stream and restarts components that die
    /// unexpectedly, for the lifetime of the process.
    ///
    /// Expected deaths are suppressed by earlier events on the same
    /// target: a `kill` with signal 9 marks a deliberate restart, a
    /// service `remove` marks an uninstall. Suppression entries are
    /// consumed by the first matching `die`. Containers without a
    /// `databox.type` label are not ours and are ignored.
    pub async fn run_crash_detector(self: Arc<Self>) {
        let mut events = match self.runtime.events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("crash detector could not subscribe to events: {}", e);
                return;
            }
        };

        let mut suppress_restart: HashSet<String> = HashSet::new();
        let mut suppress_uninstall: HashSet<String> = HashSet::new();

        while let Some(event) = events.next().await {
            match (event.kind, event.action.as_str()) {
                (EventKind::Service, "remove") => {
                    debug!("uninstall detected: {}", event.actor_id);
                    suppress_uninstall.insert(event.actor_id.clone());
                }
                (EventKind::Container, "kill") => {
                    if event.attribute(EVENT_ATTR_SIGNAL) == Some("9") {
                        if let Some(name) = event.attribute(EVENT_ATTR_CONTAINER_NAME) {
                            debug!("restart detected: {}", name);
                            suppress_restart.insert(name.to_string());
                        }
                    }
                }
                (EventKind::Container, "die") => {
                    let service_name = event
                        .attribute(EVENT_ATTR_SERVICE_NAME)
                        .unwrap_or_default()
                        .to_string();
                    let container_name =
                        event.attribute(EVENT_ATTR_CONTAINER_NAME).unwrap_or_default();
                    let service_id = event.attribute(EVENT_ATTR_SERVICE_ID).unwrap_or_default();

                    if suppress_restart.remove(container_name) {
                        debug!("not restarting {}, restart expected", service_name);
                    } else if suppress_uninstall.remove(service_id) {
                        debug!("not restarting {}, uninstall expected", service_name);
                    } else if event.attribute(DATABOX_TYPE_LABEL).is_none() {
                        debug!("ignoring death of unmanaged container {}", container_name);
                    } else {
                        warn!("crash detected for {}, restarting", service_name);
                        if let Err(e) = self.restart(&service_name).await {
                            warn!("crash restart of {} failed: {}", service_name, e);
                        }
                    }
                }
                _ => {}
            }
        }

        debug!("runtime event stream closed");
    }

    // =========================================================================
    // Service Specs
    // =========================================================================

    /// Spec shared by every managed service: type label, per-component
    /// network, daemon DNS, platform env.
    fn base_service_spec(
        &self,
        name: &str,
        image: &str,
        component_type: ComponentType,
        net_config: &NetworkConfig,
    ) -> ServiceSpec {
        let mut spec = ServiceSpec::new(name, image);
        spec.labels
            .insert(DATABOX_TYPE_LABEL.to_string(), component_type.to_string());
        spec.networks.push(net_config.network_name.clone());
        if !net_config.dns_ip.is_empty() {
            spec.dns.push(net_config.dns_ip.clone());
        }
        spec.env = vec![
            format!("{}={}", ARBITER_ENDPOINT_ENV, ARBITER_ENDPOINT),
            format!("{}={}", LOCAL_NAME_ENV, name),
            format!("{}={}", VERSION_ENV, self.options.version),
        ];
        spec
    }

    /// Driver spec: base plus the app-store URL. Drivers only need the
    /// arbiter network.
    fn driver_config(
        &self,
        _sla: &Sla,
        name: &str,
        image: &str,
        net_config: &NetworkConfig,
    ) -> (ServiceSpec, Vec<String>) {
        let mut spec = self.base_service_spec(name, image, ComponentType::Driver, net_config);
        spec.env.push(format!(
            "{}={}",
            STORE_URL_ENV, self.options.default_app_store
        ));

        (spec, vec![ARBITER_NAME.to_string()])
    }

    /// App spec: base plus one `DATASOURCE_{CLIENTID}` env var per
    /// datasource carrying its serialized catalogue entry. Apps need the
    /// arbiter, the export service, and the store behind every
    /// datasource href.
    fn app_config(
        &self,
        sla: &Sla,
        name: &str,
        image: &str,
        net_config: &NetworkConfig,
    ) -> (ServiceSpec, Vec<String>) {
        let mut spec = self.base_service_spec(name, image, ComponentType::App, net_config);

        let mut required: HashSet<String> = HashSet::new();
        required.insert(ARBITER_NAME.to_string());
        required.insert(EXPORT_SERVICE_NAME.to_string());

        for ds in &sla.datasources {
            if let Ok(hypercat) = serde_json::to_string(&ds.hypercat) {
                spec.env.push(format!(
                    "{}{}={}",
                    DATASOURCE_ENV_PREFIX, ds.client_id, hypercat
                ));
            }
            if let Ok(href) = url::Url::parse(&ds.hypercat.href) {
                if let Some(host) = href.host_str() {
                    required.insert(host.to_string());
                }
            }
        }

        let mut networks: Vec<String> = required.into_iter().collect();
        networks.sort();

        (spec, networks)
    }

    // =========================================================================
    // Dependent Stores
    // =========================================================================

    /// Launches a dependent store, reusing an existing service of the
    /// same name.
    ///
    /// The store gets store-type secrets (including the private transport
    /// key), a named volume mounted at its database path, and the same
    /// network and DNS as its owning component.
    pub async fn launch_store(
        &self,
        store_name: &str,
        net_config: &NetworkConfig,
    ) -> Result<()> {
        let existing = self.runtime.list_services(Some(store_name)).await?;
        if !existing.is_empty() {
            debug!("store {} already exists, reusing", store_name);
            return Ok(());
        }

        let image = self.options.default_store_image.clone();
        ensure_image(
            self.runtime.as_ref(),
            store_name,
            &image,
            &self.options.default_registry_host,
        )
        .await?;

        let mut spec =
            self.base_service_spec(store_name, &image, ComponentType::Store, net_config);
        spec.secrets = self.secrets.mint(store_name, ComponentType::Store).await?;
        spec.mounts.push(VolumeMount {
            source: store_name.to_string(),
            target: STORE_DATABASE_MOUNT.to_string(),
        });

        let name = spec.name.clone();
        self.runtime
            .create_service(spec)
            .await
            .map(|_| ())
            .map_err(|e| Error::LaunchFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(())
    }

    /// Network config for services on the shared system network.
    pub fn system_net_config(&self) -> NetworkConfig {
        NetworkConfig {
            network_name: crate::constants::SYSTEM_NETWORK_NAME.to_string(),
            dns_ip: self.system_dns_ip.clone(),
        }
    }

    // =========================================================================
    // System Services
    // =========================================================================

    /// Launches the shared export service on the system network.
    ///
    /// The export service holds store-type secrets (it terminates
    /// transport encryption for export traffic) and a `system` label so
    /// crash detection and the UI treat it as the platform's own.
    pub async fn launch_export_service(&self) -> Result<()> {
        let existing = self
            .runtime
            .list_services(Some(EXPORT_SERVICE_NAME))
            .await?;
        if !existing.is_empty() {
            debug!("export service already exists, reusing");
            return Ok(());
        }

        let image = self.options.export_service_image.clone();
        ensure_image(
            self.runtime.as_ref(),
            EXPORT_SERVICE_NAME,
            &image,
            &self.options.default_registry_host,
        )
        .await?;

        let mut spec = ServiceSpec::new(EXPORT_SERVICE_NAME, &image);
        spec.labels.insert(
            DATABOX_TYPE_LABEL.to_string(),
            ComponentType::System.to_string(),
        );
        spec.networks
            .push(crate::constants::SYSTEM_NETWORK_NAME.to_string());
        spec.env
            .push(format!("{}={}", ARBITER_ENDPOINT_ENV, ARBITER_ENDPOINT));
        spec.secrets = self
            .secrets
            .mint(EXPORT_SERVICE_NAME, ComponentType::Store)
            .await?;

        self.runtime
            .create_service(spec)
            .await
            .map(|_| ())
            .map_err(|e| Error::LaunchFailed {
                name: EXPORT_SERVICE_NAME.to_string(),
                reason: e.to_string(),
            })
    }

    /// Launches the container manager's own store on the system network
    /// and returns its ZMQ endpoint.
    ///
    /// Persistence connects to this endpoint once the store responds.
    pub async fn launch_management_store(&self) -> Result<String> {
        let sla = Sla {
            name: crate::constants::CONTAINER_MANAGER_NAME.to_string(),
            component_type: ComponentType::Driver,
            image: None,
            registry: None,
            tag: None,
            store: Some(CORE_STORE_SUFFIX.to_string()),
            datasources: vec![],
            external_whitelist: vec![],
            export_whitelists: vec![],
        };
        let store_name = format!(
            "{}-{}",
            crate::constants::CONTAINER_MANAGER_NAME,
            CORE_STORE_SUFFIX
        );

        self.launch_store(&store_name, &self.system_net_config())
            .await?;
        self.arbiter.apply_sla(&sla).await?;
        self.wait_for_service(&store_name, SERVICE_WAIT_SECS).await?;

        Ok(format!("tcp://{}:{}", store_name, STORE_PORT))
    }

    // =========================================================================
    // Locking
    // =========================================================================

    /// The mutation lock for a component name, created on first use.
    fn name_lock(&self, name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        Arc::clone(
            locks
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}
