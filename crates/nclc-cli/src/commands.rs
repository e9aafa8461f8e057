use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use nclc_api::{AppState, NclcCloudProvider};
use nclc_cache::OfferingCache;
use nclc_catalog::{ErrorClassifier, InstanceTypeCatalog, StaticSkuSource};
use nclc_domain::{CapacityType, InstanceType, NodeClass, Offering, ResourceList};
use nclc_drift::{DriftDetector, DriftOptions, StaticNicLookup};
use nclc_driver::{DualBackendRouter, LocalVmApiClient, VmBackend};
use nclc_pipeline::{
    InMemoryEventRecorder, InMemoryMetrics, InMemoryNodeClaimStore, InMemoryNodeClassResolver,
    ProvisioningPipeline, TracingEventRecorder,
};

// ── Serve ─────────────────────────────────────────────────────────────────────

/// Assemble every component (C1-C10) behind a `CloudProvider` and serve it.
///
/// No real cloud SDK client is wired here (`spec.md` §1, "cloud SDK clients"
/// deliberately out of scope) — the VM backend runs against
/// [`LocalVmApiClient`], an offline stand-in that performs no network I/O,
/// and the Machine backend slot is administratively disabled. Swapping in a
/// real Azure Resource Manager client means implementing `VmApiClient`
/// against the real API and constructing `VmBackend` with it instead.
pub async fn serve(config: Option<PathBuf>, bind: String, port: u16) -> Result<()> {
    let options = match config {
        Some(path) => nclc_config::load_options(&path).context("failed to load options")?,
        None => nclc_config::load_options_from_env().context("failed to load options from environment")?,
    };

    let cache = Arc::new(OfferingCache::new());
    let source = Arc::new(StaticSkuSource(demo_instance_types()));
    let catalog = Arc::new(InstanceTypeCatalog::new(source, cache.clone()));
    catalog.refresh().await.context("initial catalog refresh failed")?;
    catalog.clone().spawn_refresh_loop(nclc_catalog::DEFAULT_REFRESH_INTERVAL);

    let vm_client = Arc::new(LocalVmApiClient::new());
    let vm_backend = Arc::new(VmBackend::new(
        vm_client,
        cache.clone(),
        options.node_resource_group.clone(),
        options.cluster_name.clone(),
    ));
    let router = Arc::new(
        DualBackendRouter::new(vm_backend.clone(), vm_backend.clone())
            .with_machine_backend_disabled(true),
    );

    let nic_lookup = Arc::new(StaticNicLookup(options.subnet_id.clone()));
    let drift_detector = Arc::new(DriftDetector::new(
        nic_lookup,
        DriftOptions {
            kubelet_identity_client_id: options.kubelet_identity_client_id.clone(),
            cluster_default_subnet_id: options.subnet_id.clone(),
        },
    ));

    let resolver: Arc<dyn nclc_pipeline::NodeClassResolver> = Arc::new(InMemoryNodeClassResolver::new());
    let store = Arc::new(InMemoryNodeClaimStore::new());
    let classifier = Arc::new(ErrorClassifier::new(cache.clone()));
    let pipeline = Arc::new(ProvisioningPipeline::new(
        resolver.clone(),
        catalog.clone(),
        vm_backend,
        store,
        Arc::new(TracingEventRecorder),
        Arc::new(InMemoryMetrics::new()),
        classifier,
    ));

    let provider: Arc<dyn nclc_api::CloudProvider> =
        Arc::new(NclcCloudProvider::new(pipeline, router, drift_detector, resolver, catalog.clone(), "azure-aks-nclc"));

    let auth_token = resolve_server_token();
    println!("Using token: {auth_token}");

    let state = AppState { provider, catalog, offering_cache: cache, auth_token: Arc::new(auth_token) };
    let app = nclc_api::build_app(state);

    let addr = format!("{bind}:{port}");
    println!("nclc listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// A small fixed SKU catalog for the offline stand-in — enough to exercise
/// requirement filtering and offering selection without a real cloud
/// enumeration API.
fn demo_instance_types() -> Vec<InstanceType> {
    let type_of = |name: &str, family: &str, vcpus: u32| InstanceType {
        name: name.to_string(),
        family: family.to_string(),
        vcpus,
        requirement_values: BTreeMap::from([("kubernetes.io/arch".to_string(), vec!["amd64".to_string()])]),
        offerings: vec![
            Offering { sku: name.to_string(), zone: "1".into(), capacity_type: CapacityType::OnDemand, price: 0.1 * vcpus as f64, available: true },
            Offering { sku: name.to_string(), zone: "2".into(), capacity_type: CapacityType::Spot, price: 0.03 * vcpus as f64, available: true },
        ],
        capacity: ResourceList::new(vcpus as i64 * 1000, vcpus as i64 * 4 * 1024 * 1024 * 1024, 0),
        allocatable: ResourceList::new(vcpus as i64 * 1000 - 100, vcpus as i64 * 4 * 1024 * 1024 * 1024 - (256 * 1024 * 1024), 0),
        ephemeral_disk_max_gb: Some(vcpus * 20),
    };

    vec![type_of("Standard_D2s_v3", "Dsv3", 2), type_of("Standard_D4s_v3", "Dsv3", 4), type_of("Standard_D8s_v3", "Dsv3", 8)]
}

fn resolve_server_token() -> String {
    if let Ok(t) = std::env::var("NCLC_SERVER_TOKEN") {
        return t;
    }
    let token = generate_token();
    println!("NCLC_SERVER_TOKEN not set, generated an ephemeral one for this run");
    token
}

fn generate_token() -> String {
    let a = uuid::Uuid::new_v4().to_string().replace('-', "");
    let b = uuid::Uuid::new_v4().to_string().replace('-', "");
    format!("{a}{b}")
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(remote: Option<String>, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let client = authed_client(&token);

    let ready = client.get(format!("{}/readyz", url.trim_end_matches('/'))).send().await.with_context(|| format!("failed to reach server at {url}"))?;
    println!("readyz: {}", ready.status());

    let name: serde_json::Value = client.get(format!("{}/name", url.trim_end_matches('/'))).send().await?.json().await?;
    println!("provider: {}", name.get("name").and_then(|v| v.as_str()).unwrap_or("unknown"));

    let cache_status: serde_json::Value = client.get(format!("{}/admin/cache/status", url.trim_end_matches('/'))).send().await?.json().await?;
    println!("unavailable cache entries: {}", cache_status.get("unavailable_entries").and_then(|v| v.as_u64()).unwrap_or(0));

    Ok(())
}

// ── Instance types ────────────────────────────────────────────────────────────

pub async fn instance_types_list(node_class_path: PathBuf, remote: Option<String>, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    let node_class = read_node_class(&node_class_path)?;

    let types: serde_json::Value = authed_client(&token)
        .post(format!("{}/instance-types", url.trim_end_matches('/')))
        .json(&node_class)
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?
        .json()
        .await?;

    println!("{}", serde_json::to_string_pretty(&types)?);
    Ok(())
}

fn read_node_class(path: &Path) -> Result<NodeClass> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content).with_context(|| format!("failed to parse {} as JSON NodeClass", path.display()))
    } else {
        serde_yaml::from_str(&content).with_context(|| format!("failed to parse {} as YAML NodeClass", path.display()))
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

pub async fn cache_flush(remote: Option<String>, token: Option<String>) -> Result<()> {
    let token = resolve_token(token)?;
    let url = server_url(remote);
    authed_client(&token)
        .post(format!("{}/admin/cache/flush", url.trim_end_matches('/')))
        .send()
        .await
        .with_context(|| format!("failed to reach server at {url}"))?;
    println!("flushed unavailable-offerings cache");
    Ok(())
}

// ── Shared helpers ────────────────────────────────────────────────────────────

fn server_url(remote: Option<String>) -> String {
    remote.unwrap_or_else(|| "http://localhost:8080".into())
}

fn authed_client(token: &str) -> reqwest::Client {
    let mut headers = reqwest::header::HeaderMap::new();
    let bearer = format!("Bearer {token}");
    headers.insert(reqwest::header::AUTHORIZATION, reqwest::header::HeaderValue::from_str(&bearer).expect("token contains invalid header characters"));
    reqwest::Client::builder().default_headers(headers).build().expect("failed to build HTTP client")
}

/// Priority: explicit value (`--token` / `NCLC_TOKEN`) → `~/.nclc/token` file.
fn resolve_token(explicit: Option<String>) -> Result<String> {
    if let Some(t) = explicit {
        return Ok(t);
    }
    let path = default_token_path();
    std::fs::read_to_string(&path).map(|s| s.trim().to_string()).with_context(|| {
        format!("no token provided and could not read token file at {}. Use --token, NCLC_TOKEN, or NCLC_SERVER_TOKEN on the server", path.display())
    })
}

fn default_token_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".into());
    PathBuf::from(home).join(".nclc").join("token")
}
