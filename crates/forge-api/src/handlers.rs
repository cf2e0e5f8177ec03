use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use forge_domain::{Chassis, ListParams, Node, NodePatch, PowerState, SortDir, SortKey};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;
use crate::patch::{self, PatchOp};
use crate::state::AppState;

impl From<patch::PatchError> for ApiError {
    fn from(e: patch::PatchError) -> Self {
        ApiError::bad_request(e.to_string())
    }
}

// ── Health ───────────────────────────────────────────────────────────────────

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.list_chassis(&ListParams::default()).await?;
    Ok(StatusCode::OK)
}

// ── Collections ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u64>,
    pub marker: Option<Uuid>,
    #[serde(default)]
    pub sort_key: SortKey,
    #[serde(default)]
    pub sort_dir: SortDir,
}

impl ListQuery {
    fn params(&self) -> ListParams {
        ListParams {
            limit: self.limit,
            marker: self.marker,
            sort_key: self.sort_key,
            sort_dir: self.sort_dir,
        }
    }
}

// Collection document with a `next` link when the page came back full.
fn collection<T: serde::Serialize>(
    kind: &str,
    items: &[T],
    base: &str,
    path: &str,
    query: &ListQuery,
) -> Result<Value, ApiError> {
    let items = serde_json::to_value(items).map_err(|e| ApiError::internal(e.to_string()))?;
    let next = match (query.limit, items.as_array().and_then(|a| a.last())) {
        (Some(limit), Some(last)) if items.as_array().map(|a| a.len() as u64) == Some(limit) => {
            let marker = last["uuid"].as_str().unwrap_or_default().to_string();
            Some(format!("{base}{path}?limit={limit}&marker={marker}"))
        }
        _ => None,
    };
    let mut doc = serde_json::Map::new();
    doc.insert(kind.to_string(), items);
    doc.insert("next".to_string(), json!(next));
    Ok(Value::Object(doc))
}

// ── Chassis ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateChassisBody {
    pub description: Option<String>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

pub async fn list_chassis(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let chassis = state.store.list_chassis(&query.params()).await?;
    Ok(Json(collection(
        "chassis",
        &chassis,
        &state.api_base,
        "/v1/chassis",
        &query,
    )?))
}

pub async fn create_chassis(
    State(state): State<AppState>,
    Json(body): Json<CreateChassisBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut chassis = Chassis::new(body.description);
    chassis.extra = body.extra;
    let saved = state.store.create_chassis(&chassis).await?;
    Ok((StatusCode::CREATED, Json(json!(saved))))
}

pub async fn get_chassis(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let chassis = state.store.get_chassis_by_uuid(&uuid).await?;
    Ok(Json(json!(chassis)))
}

pub async fn patch_chassis(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(ops): Json<Vec<PatchOp>>,
) -> Result<Json<Value>, ApiError> {
    const READ_ONLY: &[&str] = &["/uuid", "/created_at", "/updated_at"];
    for op in &ops {
        if READ_ONLY.iter().any(|p| op.path() == *p) {
            return Err(ApiError::bad_request(format!(
                "field {} is read-only",
                op.path()
            )));
        }
    }

    let chassis = state.store.get_chassis_by_uuid(&uuid).await?;
    let mut doc = serde_json::to_value(&chassis).map_err(|e| ApiError::internal(e.to_string()))?;
    patch::apply(&mut doc, &ops)?;
    let patched: Chassis =
        serde_json::from_value(doc).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let saved = state.store.update_chassis(&patched).await?;
    Ok(Json(json!(saved)))
}

pub async fn delete_chassis(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.destroy_chassis(&uuid).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_chassis_nodes(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    // 404 on an unknown chassis rather than an empty listing
    state.store.get_chassis_by_uuid(&uuid).await?;
    let nodes = state.store.list_nodes_by_chassis(&uuid).await?;
    Ok(Json(json!({ "nodes": nodes })))
}

// ── Nodes ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateNodeBody {
    pub driver: String,
    pub chassis_uuid: Option<Uuid>,
    #[serde(default)]
    pub driver_info: HashMap<String, Value>,
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

pub async fn list_nodes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let nodes = state.store.list_nodes(&query.params()).await?;
    Ok(Json(collection(
        "nodes",
        &nodes,
        &state.api_base,
        "/v1/nodes",
        &query,
    )?))
}

pub async fn create_node(
    State(state): State<AppState>,
    Json(body): Json<CreateNodeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let mut node = Node::new(body.driver);
    node.chassis_uuid = body.chassis_uuid;
    node.driver_info = body.driver_info;
    node.extra = body.extra;
    let saved = state.store.create_node(&node).await?;
    Ok((StatusCode::CREATED, Json(json!(saved))))
}

pub async fn get_node(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let node = state.store.get_node_by_uuid(&uuid).await?;
    Ok(Json(json!(node)))
}

// Fields a PATCH may not touch: lock state, state-machine positions and
// store-owned metadata. power_state is deliberately NOT here: it flows
// through to the conductor, which refuses it, so the refusal comes from one
// place.
const NODE_READ_ONLY: &[&str] = &[
    "id",
    "uuid",
    "reservation",
    "last_error",
    "provision_state",
    "target_provision_state",
    "target_power_state",
    "created_at",
    "updated_at",
];

// Translate a JSON-Patch into the conductor's NodePatch: apply the ops to the
// node document, then record which patchable fields actually changed.
fn node_patch_from_ops(node: &Node, ops: &[PatchOp]) -> Result<NodePatch, ApiError> {
    let original = serde_json::to_value(node).map_err(|e| ApiError::internal(e.to_string()))?;
    let mut doc = original.clone();
    patch::apply(&mut doc, ops)?;

    for field in NODE_READ_ONLY {
        if doc.get(*field) != original.get(*field) {
            return Err(ApiError::bad_request(format!("field /{field} is read-only")));
        }
    }

    let mut node_patch = NodePatch::new(node.uuid);
    let changed = |field: &str| doc.get(field) != original.get(field);

    if changed("driver") {
        node_patch.driver = Some(
            serde_json::from_value(doc["driver"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    if changed("driver_info") {
        node_patch.driver_info = Some(
            serde_json::from_value(doc["driver_info"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    if changed("instance_uuid") {
        node_patch.instance_uuid = Some(
            serde_json::from_value(doc["instance_uuid"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    if changed("chassis_uuid") {
        node_patch.chassis_uuid = Some(
            serde_json::from_value(doc["chassis_uuid"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    if changed("extra") {
        node_patch.extra = Some(
            serde_json::from_value(doc["extra"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    if changed("power_state") {
        node_patch.power_state = Some(
            serde_json::from_value(doc["power_state"].clone())
                .map_err(|e| ApiError::bad_request(e.to_string()))?,
        );
    }
    Ok(node_patch)
}

pub async fn patch_node(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(ops): Json<Vec<PatchOp>>,
) -> Result<Json<Value>, ApiError> {
    let node = state.store.get_node_by_uuid(&uuid).await?;
    let node_patch = node_patch_from_ops(&node, &ops)?;
    let saved = state.conductor.update_node(&node_patch).await?;
    Ok(Json(json!(saved)))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let node = state.store.get_node_by_uuid(&uuid).await?;
    state.store.destroy_node(node.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Node state endpoints ─────────────────────────────────────────────────────

pub async fn get_node_power(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let power_state = state.conductor.get_node_power_state(uuid).await?;
    Ok(Json(json!({ "power_state": power_state })))
}

#[derive(Debug, Deserialize)]
pub struct PowerTargetBody {
    pub target: PowerState,
}

pub async fn put_node_power(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(body): Json<PowerTargetBody>,
) -> Result<StatusCode, ApiError> {
    // make sure the node exists before accepting the cast
    state.store.get_node_by_uuid(&uuid).await?;
    debug!(node = %uuid, target = %body.target, "power state change requested");
    state
        .conductor
        .change_node_power_state(uuid, body.target)
        .await?;
    Ok(StatusCode::ACCEPTED)
}

#[derive(Debug, Deserialize)]
pub struct ProvisionTargetBody {
    pub target: String,
}

pub async fn put_node_provision(
    State(state): State<AppState>,
    Path(uuid): Path<Uuid>,
    Json(body): Json<ProvisionTargetBody>,
) -> Result<StatusCode, ApiError> {
    state.store.get_node_by_uuid(&uuid).await?;
    debug!(node = %uuid, target = %body.target, "provision state change requested");
    match body.target.as_str() {
        "active" => state.conductor.do_node_deploy(uuid).await?,
        "deleted" => state.conductor.do_node_tear_down(uuid).await?,
        other => {
            return Err(ApiError::bad_request(format!(
                "invalid provision target: {other} (expected 'active' or 'deleted')"
            )))
        }
    }
    Ok(StatusCode::ACCEPTED)
}

pub async fn vendor_passthru(
    State(state): State<AppState>,
    Path((uuid, method)): Path<(Uuid, String)>,
    Json(info): Json<HashMap<String, Value>>,
) -> Result<Json<Value>, ApiError> {
    let payload = state
        .conductor
        .vendor_passthru(uuid, &method, &info)
        .await?;
    Ok(Json(payload))
}
