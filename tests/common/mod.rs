//! Shared in-memory fakes for the container manager's external seams:
//! the container runtime, the arbiter RPC, the management store's KV
//! surface, and the core-network daemon's HTTP control API.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use container_manager::arbiter::{ArbiterRegistrar, ArbiterRpc, Permission};
use container_manager::config::ManagerOptions;
use container_manager::error::{Error, Result};
use container_manager::manager::ContainerManager;
use container_manager::network::NetworkController;
use container_manager::runtime::{
    ContainerInfo, ContainerRuntime, NetworkEndpoint, NetworkInfo, RuntimeEvent, SecretInfo,
    ServiceInfo, ServiceSpec,
};
use container_manager::secrets::{CertAuthority, SecretIssuer};
use container_manager::sla::ComponentType;
use container_manager::store::{CmStore, KeyValueStore};
use futures::stream::BoxStream;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// Mock Runtime
// =============================================================================

struct ServiceRecord {
    info: ServiceInfo,
    spec: ServiceSpec,
}

struct NetworkRecord {
    info: NetworkInfo,
    internal: bool,
    labels: HashMap<String, String>,
}

#[derive(Default)]
struct RuntimeState {
    services: Vec<ServiceRecord>,
    containers: Vec<ContainerInfo>,
    networks: Vec<NetworkRecord>,
    secrets: Vec<SecretInfo>,
    secret_data: HashMap<String, Vec<u8>>,
    images: HashSet<String>,
    pullable: HashSet<String>,
    fail_service_create: HashSet<String>,
    create_order: Vec<String>,
    next_id: u64,
    next_ip: u64,
}

impl RuntimeState {
    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }

    fn fresh_ip(&mut self) -> String {
        self.next_ip += 1;
        format!("10.0.{}.{}", self.next_ip / 250, self.next_ip % 250)
    }
}

/// In-memory swarm-like runtime.
///
/// Creating a service materialises one task container labelled with the
/// service name; force-removing a container of a live service respawns a
/// replacement with fresh addresses, which is what the restart path
/// relies on.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<RuntimeState>,
    event_tx: Mutex<Option<mpsc::UnboundedSender<RuntimeEvent>>>,
}

impl MockRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Seeds the core-network daemon container on the system network.
    pub fn seed_core_network_container(&self) {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id("cont");
        let ip = state.fresh_ip();
        state.containers.push(ContainerInfo {
            id,
            name: "databox-network".to_string(),
            labels: HashMap::new(),
            networks: HashMap::from([("databox-system-net".to_string(), ip)]),
        });
    }

    /// Seeds a standalone container on the system network; returns its
    /// address there.
    pub fn seed_system_container(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id("cont");
        let ip = state.fresh_ip();
        state.containers.push(ContainerInfo {
            id,
            name: name.to_string(),
            labels: HashMap::new(),
            networks: HashMap::from([("databox-system-net".to_string(), ip.clone())]),
        });
        ip
    }

    /// Seeds a per-component overlay network with the daemon already
    /// attached; returns the daemon's address on it.
    pub fn seed_component_network(&self, component: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id("net");
        let dns_ip = state.fresh_ip();
        state.networks.push(NetworkRecord {
            info: NetworkInfo {
                id,
                name: format!("{}-network", component),
                endpoints: vec![NetworkEndpoint {
                    container_name: "databox-network".to_string(),
                    ipv4: dns_ip.clone(),
                }],
            },
            internal: true,
            labels: HashMap::new(),
        });
        dns_ip
    }

    pub fn add_image(&self, reference: &str) {
        self.state.lock().unwrap().images.insert(reference.to_string());
    }

    /// Marks an image as available from its registry but not yet local.
    pub fn add_pullable(&self, reference: &str) {
        self.state
            .lock()
            .unwrap()
            .pullable
            .insert(reference.to_string());
    }

    /// Makes the next `create_service` for this name fail.
    pub fn fail_service_create(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_service_create
            .insert(name.to_string());
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .services
            .iter()
            .map(|s| s.info.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn service_spec(&self, name: &str) -> Option<ServiceSpec> {
        self.state
            .lock()
            .unwrap()
            .services
            .iter()
            .find(|s| s.info.name == name)
            .map(|s| s.spec.clone())
    }

    /// Names of services in creation order.
    pub fn creation_order(&self) -> Vec<String> {
        self.state.lock().unwrap().create_order.clone()
    }

    pub fn secret_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .secrets
            .iter()
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn secret_data(&self, name: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        let secret = state.secrets.iter().find(|s| s.name == name)?;
        state.secret_data.get(&secret.id).cloned()
    }

    pub fn network_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .networks
            .iter()
            .map(|n| n.info.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn network_internal(&self, name: &str) -> Option<bool> {
        self.state
            .lock()
            .unwrap()
            .networks
            .iter()
            .find(|n| n.info.name == name)
            .map(|n| n.internal)
    }

    pub fn container_for_service(&self, name: &str) -> Option<ContainerInfo> {
        self.state
            .lock()
            .unwrap()
            .containers
            .iter()
            .find(|c| c.labels.get("com.docker.swarm.service.name").map(String::as_str) == Some(name))
            .cloned()
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Pushes an event to the subscribed crash detector.
    pub fn push_event(&self, event: RuntimeEvent) {
        if let Some(tx) = self.event_tx.lock().unwrap().as_ref() {
            let _ = tx.send(event);
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn spawn_container(state: &mut RuntimeState, spec: &ServiceSpec) {
        let id = state.fresh_id("cont");
        let mut labels = spec.labels.clone();
        labels.insert(
            "com.docker.swarm.service.name".to_string(),
            spec.name.clone(),
        );

        let mut networks = HashMap::new();
        for net_name in &spec.networks {
            let ip = state.fresh_ip();
            networks.insert(net_name.clone(), ip.clone());
            if let Some(net) = state.networks.iter_mut().find(|n| &n.info.name == net_name) {
                net.info.endpoints.push(NetworkEndpoint {
                    container_name: format!("{}.1.{}", spec.name, id),
                    ipv4: ip,
                });
            }
        }

        state.containers.push(ContainerInfo {
            id: id.clone(),
            name: format!("{}.1.{}", spec.name, id),
            labels,
            networks,
        });
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn create_service(&self, spec: ServiceSpec) -> Result<String> {
        let mut state = self.state.lock().unwrap();

        if state.fail_service_create.remove(&spec.name) {
            return Err(Error::Runtime(format!("injected failure for {}", spec.name)));
        }
        if state.services.iter().any(|s| s.info.name == spec.name) {
            return Err(Error::Runtime(format!("name conflict: {}", spec.name)));
        }

        let id = state.fresh_id("svc");
        state.create_order.push(spec.name.clone());
        Self::spawn_container(&mut state, &spec);
        state.services.push(ServiceRecord {
            info: ServiceInfo {
                id: id.clone(),
                name: spec.name.clone(),
                labels: spec.labels.clone(),
                secrets: spec.secrets.clone(),
            },
            spec,
        });
        Ok(id)
    }

    async fn remove_service(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.services.iter().position(|s| s.info.id == id) else {
            return Err(Error::Runtime(format!("no such service: {}", id)));
        };
        let record = state.services.remove(pos);
        state.containers.retain(|c| {
            c.labels.get("com.docker.swarm.service.name") != Some(&record.info.name)
        });
        Ok(())
    }

    async fn list_services(&self, name: Option<&str>) -> Result<Vec<ServiceInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .services
            .iter()
            .filter(|s| name.is_none_or(|n| s.info.name == n))
            .map(|s| s.info.clone())
            .collect())
    }

    async fn containers_by_label(&self, key: &str, value: &str) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.labels.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect())
    }

    async fn containers_by_name(&self, name: &str) -> Result<Vec<ContainerInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .containers
            .iter()
            .filter(|c| c.name.contains(name))
            .cloned()
            .collect())
    }

    async fn remove_container(&self, id: &str, _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let Some(pos) = state.containers.iter().position(|c| c.id == id) else {
            return Err(Error::Runtime(format!("no such container: {}", id)));
        };
        let removed = state.containers.remove(pos);

        // A live service's task is respawned with fresh addresses.
        let service_name = removed
            .labels
            .get("com.docker.swarm.service.name")
            .cloned();
        if let Some(service_name) = service_name {
            let spec = state
                .services
                .iter()
                .find(|s| s.info.name == service_name)
                .map(|s| s.spec.clone());
            if let Some(spec) = spec {
                Self::spawn_container(&mut state, &spec);
            }
        }
        Ok(())
    }

    async fn image_exists(&self, reference: &str) -> Result<bool> {
        Ok(self.state.lock().unwrap().images.contains(reference))
    }

    async fn pull_image(&self, reference: &str, _registry_host: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.pullable.contains(reference) {
            state.images.insert(reference.to_string());
            Ok(())
        } else {
            Err(Error::Runtime(format!("pull failed: {}", reference)))
        }
    }

    async fn create_secret(&self, name: &str, data: &[u8]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.secrets.iter().any(|s| s.name == name) {
            return Err(Error::Runtime(format!("secret name conflict: {}", name)));
        }
        let id = state.fresh_id("sec");
        state.secrets.push(SecretInfo {
            id: id.clone(),
            name: name.to_string(),
        });
        state.secret_data.insert(id.clone(), data.to_vec());
        Ok(id)
    }

    async fn remove_secret(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.secrets.iter().any(|s| s.id == id) {
            return Err(Error::Runtime(format!("no such secret: {}", id)));
        }
        state.secrets.retain(|s| s.id != id);
        state.secret_data.remove(id);
        Ok(())
    }

    async fn list_secrets(&self, name: Option<&str>) -> Result<Vec<SecretInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .secrets
            .iter()
            .filter(|s| name.is_none_or(|n| s.name == n))
            .cloned()
            .collect())
    }

    async fn create_network(
        &self,
        name: &str,
        internal: bool,
        labels: HashMap<String, String>,
    ) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let id = state.fresh_id("net");
        state.networks.push(NetworkRecord {
            info: NetworkInfo {
                id: id.clone(),
                name: name.to_string(),
                endpoints: vec![],
            },
            internal,
            labels,
        });
        Ok(id)
    }

    async fn networks_by_name(&self, name: &str) -> Result<Vec<NetworkInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .networks
            .iter()
            .filter(|n| n.info.name.contains(name))
            .map(|n| n.info.clone())
            .collect())
    }

    async fn inspect_network(&self, id: &str) -> Result<NetworkInfo> {
        let state = self.state.lock().unwrap();
        state
            .networks
            .iter()
            .find(|n| n.info.id == id)
            .map(|n| n.info.clone())
            .ok_or_else(|| Error::Runtime(format!("no such network: {}", id)))
    }

    async fn connect_network(&self, network_id: &str, container_id: &str) -> Result<()> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        let ip = state.fresh_ip();
        let net_name = state
            .networks
            .iter()
            .find(|n| n.info.id == network_id)
            .map(|n| n.info.name.clone())
            .ok_or_else(|| Error::Runtime(format!("no such network: {}", network_id)))?;
        let container_name = state
            .containers
            .iter()
            .find(|c| c.id == container_id)
            .map(|c| c.name.clone())
            .ok_or_else(|| Error::Runtime(format!("no such container: {}", container_id)))?;

        if let Some(container) = state.containers.iter_mut().find(|c| c.id == container_id) {
            container.networks.insert(net_name, ip.clone());
        }
        if let Some(network) = state.networks.iter_mut().find(|n| n.info.id == network_id) {
            network.info.endpoints.push(NetworkEndpoint {
                container_name,
                ipv4: ip,
            });
        }
        Ok(())
    }

    async fn events(&self) -> Result<BoxStream<'static, RuntimeEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.event_tx.lock().unwrap() = Some(tx);
        Ok(Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|event| (event, rx))
        })))
    }
}

// =============================================================================
// Mock Arbiter
// =============================================================================

#[derive(Default)]
pub struct MockArbiter {
    registered: Mutex<HashMap<String, (String, ComponentType)>>,
    grants: Mutex<Vec<Permission>>,
    fail_register: Mutex<bool>,
}

impl MockArbiter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_register(&self, fail: bool) {
        *self.fail_register.lock().unwrap() = fail;
    }

    /// The latest registered token for a component.
    pub fn token_for(&self, name: &str) -> Option<String> {
        self.registered
            .lock()
            .unwrap()
            .get(name)
            .map(|(token, _)| token.clone())
    }

    pub fn registered_type(&self, name: &str) -> Option<ComponentType> {
        self.registered
            .lock()
            .unwrap()
            .get(name)
            .map(|(_, component_type)| *component_type)
    }

    pub fn grants(&self) -> Vec<Permission> {
        self.grants.lock().unwrap().clone()
    }

    /// Grants whose subject is the given component.
    pub fn grants_for(&self, subject: &str) -> Vec<Permission> {
        self.grants
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.subject == subject)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ArbiterRpc for MockArbiter {
    async fn register_component(
        &self,
        name: &str,
        token: &str,
        component_type: ComponentType,
    ) -> Result<()> {
        if *self.fail_register.lock().unwrap() {
            return Err(Error::Runtime("arbiter unreachable".to_string()));
        }
        self.registered
            .lock()
            .unwrap()
            .insert(name.to_string(), (token.to_string(), component_type));
        Ok(())
    }

    async fn grant_permission(&self, permission: &Permission) -> Result<()> {
        self.grants.lock().unwrap().push(permission.clone());
        Ok(())
    }
}

// =============================================================================
// In-Memory Key-Value Store
// =============================================================================

#[derive(Default)]
pub struct MemoryKv {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryKv {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.data.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KeyValueStore for MemoryKv {
    async fn put(&self, key: &str, value: &[u8]) -> Result<()> {
        self.data
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.lock().unwrap().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.data.lock().unwrap().remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .data
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Core-Network Daemon Recorder
// =============================================================================

/// One request received by the daemon recorder.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub api_key: String,
    pub body: serde_json::Value,
}

type RecorderState = (Arc<Mutex<Vec<RecordedRequest>>>, Arc<Mutex<bool>>);

/// A local stand-in for the core-network daemon's control API: records
/// every POST and answers 200, or 500 when failure is enabled.
pub struct DaemonRecorder {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    fail: Arc<Mutex<bool>>,
}

impl DaemonRecorder {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .cloned()
            .collect()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

async fn record(
    State((requests, fail)): State<RecorderState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    let api_key = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    requests.lock().unwrap().push(RecordedRequest {
        path: format!("/{}", path),
        api_key,
        body,
    });
    if *fail.lock().unwrap() {
        StatusCode::INTERNAL_SERVER_ERROR
    } else {
        StatusCode::OK
    }
}

/// Spawns the recorder on an ephemeral local port.
pub async fn spawn_daemon_recorder() -> DaemonRecorder {
    let requests = Arc::new(Mutex::new(Vec::new()));
    let fail = Arc::new(Mutex::new(false));
    let state: RecorderState = (Arc::clone(&requests), Arc::clone(&fail));

    let app = Router::new()
        .route("/*path", post(record))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind recorder");
    let addr = listener.local_addr().expect("recorder addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    DaemonRecorder {
        base_url: format!("http://{}", addr),
        requests,
        fail,
    }
}

// =============================================================================
// Test Harness
// =============================================================================

pub const TEST_API_KEY: &str = "dGVzdC1jbS10b2tlbg==";

pub fn test_options() -> ManagerOptions {
    ManagerOptions {
        version: "0.5.0".to_string(),
        default_registry: "databoxsystems".to_string(),
        default_registry_host: "docker.io".to_string(),
        arch: String::new(),
        core_ui_image: "databoxsystems/core-ui:0.5.0".to_string(),
        app_server_image: "databoxsystems/driver-app-store:0.5.0".to_string(),
        default_store_image: "databoxsystems/core-store:0.5.0".to_string(),
        export_service_image: "databoxsystems/export-service:0.5.0".to_string(),
        default_app_store: "https://store.databox.com".to_string(),
        hostname: "databox-test".to_string(),
        internal_ips: vec!["10.0.0.1".to_string()],
        external_ip: String::new(),
        clear_slas: false,
        override_password: String::new(),
        enable_debug_logging: false,
    }
}

/// A fully wired container manager over in-memory fakes.
pub struct Harness {
    pub manager: Arc<ContainerManager>,
    pub runtime: Arc<MockRuntime>,
    pub arbiter: Arc<MockArbiter>,
    pub kv: Arc<MemoryKv>,
    pub daemon: DaemonRecorder,
    pub network: Arc<NetworkController>,
    pub issuer: Arc<SecretIssuer>,
    pub registrar: Arc<ArbiterRegistrar>,
}

impl Harness {
    pub async fn new() -> Self {
        let runtime = MockRuntime::new();
        runtime.seed_core_network_container();
        runtime.add_image(&test_options().default_store_image);
        runtime.add_image(&test_options().export_service_image);

        let daemon = spawn_daemon_recorder().await;

        let arbiter = MockArbiter::new();
        let network = Arc::new(
            NetworkController::new(
                Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
                TEST_API_KEY.to_string(),
                None,
            )
            .expect("network controller")
            .with_base_url(daemon.base_url.clone()),
        );

        let registrar = Arc::new(ArbiterRegistrar::new(
            Arc::clone(&arbiter) as Arc<dyn ArbiterRpc>,
            Arc::clone(&network),
        ));

        let issuer = Arc::new(SecretIssuer::new(
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&arbiter) as Arc<dyn ArbiterRpc>,
            CertAuthority::generate().expect("test CA"),
            "root-ca-id".to_string(),
            "zmq-pub-id".to_string(),
            "zmq-priv-id".to_string(),
        ));

        let manager = Arc::new(ContainerManager::new(
            Arc::clone(&runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&network),
            Arc::clone(&issuer),
            Arc::clone(&registrar),
            test_options(),
            "10.0.0.2".to_string(),
        ));

        let kv = MemoryKv::new();
        manager.attach_store(Arc::new(CmStore::new(
            Arc::clone(&kv) as Arc<dyn KeyValueStore>
        )));

        Self {
            manager,
            runtime,
            arbiter,
            kv,
            daemon,
            network,
            issuer,
            registrar,
        }
    }

    /// A second manager over the same runtime, arbiter, and persisted
    /// state, as after a container manager restart. Its in-memory
    /// installed set starts empty.
    pub fn restarted_manager(&self) -> Arc<ContainerManager> {
        let manager = Arc::new(ContainerManager::new(
            Arc::clone(&self.runtime) as Arc<dyn ContainerRuntime>,
            Arc::clone(&self.network),
            Arc::clone(&self.issuer),
            Arc::clone(&self.registrar),
            test_options(),
            "10.0.0.2".to_string(),
        ));
        manager.attach_store(Arc::new(CmStore::new(
            Arc::clone(&self.kv) as Arc<dyn KeyValueStore>
        )));
        manager
    }

    /// Seeds the image an SLA with this name would resolve to.
    pub fn seed_default_image(&self, name: &str) {
        self.runtime
            .add_image(&format!("databoxsystems/{}:0.5.0", name));
    }
}
