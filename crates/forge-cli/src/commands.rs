use std::sync::Arc;

use anyhow::{bail, Context, Result};
use forge_conductor::{ConductorConfig, ConductorService};
use forge_domain::PowerState;
use forge_driver::DriverRegistry;
use forge_rpc::{ConductorClient, ConductorDispatcher, InProcessBus};
use forge_store::{InMemoryStore, InventoryStore, PostgresStore};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::output;

// ── serve ────────────────────────────────────────────────────────────────────

pub async fn serve(
    hostname: Option<String>,
    database_url: Option<String>,
    bind: String,
    port: u16,
    auth_token: String,
    max_time_interval: u64,
    heartbeat_interval: u64,
    api_url: Option<String>,
) -> Result<()> {
    let hostname = hostname
        .or_else(|| std::env::var("HOSTNAME").ok())
        .unwrap_or_else(|| "localhost".to_string());

    let store: Arc<dyn InventoryStore> = match &database_url {
        Some(url) => Arc::new(
            PostgresStore::connect(url)
                .await
                .context("connecting to postgres")?,
        ),
        None => {
            warn!("no database url configured; state lives in memory and dies with the process");
            Arc::new(InMemoryStore::new())
        }
    };
    let registry = Arc::new(DriverRegistry::with_defaults());

    let mut config = ConductorConfig::new(hostname);
    config.max_time_interval = max_time_interval;
    config.heartbeat_interval = heartbeat_interval;
    config.api_url = api_url.clone();

    let mut service = ConductorService::new(config, store.clone(), registry);
    service.start().await?;

    let manager = Arc::new(service.manager());
    let dispatcher = Arc::new(ConductorDispatcher::new(manager));
    let conductor = Arc::new(ConductorClient::new(Arc::new(InProcessBus::new(dispatcher))));

    let api_base = api_url.unwrap_or_else(|| format!("http://{bind}:{port}"));
    let app = forge_api::build_app(store, conductor, Arc::new(auth_token), api_base);

    let listener = tokio::net::TcpListener::bind((bind.as_str(), port))
        .await
        .with_context(|| format!("binding {bind}:{port}"))?;
    info!(%bind, port, "forge API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.stop().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}

// ── HTTP client helpers ──────────────────────────────────────────────────────

fn authorized(
    builder: reqwest::RequestBuilder,
    token: &Option<String>,
) -> reqwest::RequestBuilder {
    match token {
        Some(t) => builder.bearer_auth(t),
        None => builder,
    }
}

async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        let body = response.text().await.unwrap_or_default();
        bail!("request failed: {status}: {body}");
    }
}

async fn api_get(endpoint: &str, token: &Option<String>, path: &str) -> Result<Value> {
    let client = reqwest::Client::new();
    let response = authorized(client.get(format!("{endpoint}{path}")), token)
        .send()
        .await?;
    Ok(expect_success(response).await?.json().await?)
}

async fn api_put(endpoint: &str, token: &Option<String>, path: &str, body: Value) -> Result<()> {
    let client = reqwest::Client::new();
    let response = authorized(client.put(format!("{endpoint}{path}")), token)
        .json(&body)
        .send()
        .await?;
    expect_success(response).await?;
    Ok(())
}

// ── node commands ────────────────────────────────────────────────────────────

pub async fn node_list(endpoint: String, token: Option<String>) -> Result<()> {
    let doc = api_get(&endpoint, &token, "/v1/nodes").await?;
    output::print_node_table(doc["nodes"].as_array().map(|a| a.as_slice()).unwrap_or(&[]));
    Ok(())
}

pub async fn node_show(endpoint: String, token: Option<String>, uuid: Uuid) -> Result<()> {
    let doc = api_get(&endpoint, &token, &format!("/v1/nodes/{uuid}")).await?;
    output::print_json(&doc);
    Ok(())
}

pub async fn node_power(
    endpoint: String,
    token: Option<String>,
    uuid: Uuid,
    target: String,
) -> Result<()> {
    let target: PowerState = target.parse()?;
    api_put(
        &endpoint,
        &token,
        &format!("/v1/nodes/{uuid}/states/power"),
        json!({ "target": target }),
    )
    .await?;
    println!("power state change to {target} requested for {uuid}");
    Ok(())
}

pub async fn node_deploy(endpoint: String, token: Option<String>, uuid: Uuid) -> Result<()> {
    api_put(
        &endpoint,
        &token,
        &format!("/v1/nodes/{uuid}/states/provision"),
        json!({ "target": "active" }),
    )
    .await?;
    println!("deploy requested for {uuid}");
    Ok(())
}

pub async fn node_teardown(endpoint: String, token: Option<String>, uuid: Uuid) -> Result<()> {
    api_put(
        &endpoint,
        &token,
        &format!("/v1/nodes/{uuid}/states/provision"),
        json!({ "target": "deleted" }),
    )
    .await?;
    println!("tear-down requested for {uuid}");
    Ok(())
}

// ── chassis commands ─────────────────────────────────────────────────────────

pub async fn chassis_list(endpoint: String, token: Option<String>) -> Result<()> {
    let doc = api_get(&endpoint, &token, "/v1/chassis").await?;
    output::print_chassis_table(
        doc["chassis"]
            .as_array()
            .map(|a| a.as_slice())
            .unwrap_or(&[]),
    );
    Ok(())
}
