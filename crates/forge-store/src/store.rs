use async_trait::async_trait;
use forge_domain::{Chassis, Conductor, ListParams, Node, Port};
use uuid::Uuid;

use crate::error::StoreError;

/// Typed operations over the node, chassis, conductor and port tables.
///
/// `reserve_node` / `release_node` are the correctness-critical pair: they
/// implement the fleet-wide per-node advisory lock as a conditional update on
/// the node row. Everything else is plain CRUD.
///
/// `update_node` writes every mutable node field *except* `reservation`;
/// only the reservation primitives touch that column.
#[async_trait]
pub trait InventoryStore: Send + Sync + 'static {
    // ── Nodes ────────────────────────────────────────────────────────────────

    /// Insert a node; the store assigns `id` and returns the saved row.
    async fn create_node(&self, node: &Node) -> Result<Node, StoreError>;
    async fn get_node(&self, id: i64) -> Result<Node, StoreError>;
    async fn get_node_by_uuid(&self, uuid: &Uuid) -> Result<Node, StoreError>;
    async fn list_nodes(&self, params: &ListParams) -> Result<Vec<Node>, StoreError>;
    async fn list_nodes_by_chassis(&self, chassis_uuid: &Uuid) -> Result<Vec<Node>, StoreError>;
    async fn update_node(&self, node: &Node) -> Result<Node, StoreError>;
    async fn destroy_node(&self, id: i64) -> Result<(), StoreError>;

    /// Atomically set `reservation = holder` iff it is currently null.
    /// Returns the updated row, or `NodeLocked` with the current holder.
    async fn reserve_node(&self, node_id: i64, holder: &str) -> Result<Node, StoreError>;

    /// Clear `reservation` where it currently equals `holder`. A mismatch is
    /// a programming error and surfaces as `Internal`, not `NodeLocked`.
    async fn release_node(&self, node_id: i64, holder: &str) -> Result<(), StoreError>;

    // ── Chassis ──────────────────────────────────────────────────────────────

    async fn create_chassis(&self, chassis: &Chassis) -> Result<Chassis, StoreError>;
    async fn get_chassis_by_uuid(&self, uuid: &Uuid) -> Result<Chassis, StoreError>;
    async fn list_chassis(&self, params: &ListParams) -> Result<Vec<Chassis>, StoreError>;
    async fn update_chassis(&self, chassis: &Chassis) -> Result<Chassis, StoreError>;

    /// Refuses with `ChassisNotEmpty` while any node references the chassis.
    async fn destroy_chassis(&self, uuid: &Uuid) -> Result<(), StoreError>;

    // ── Conductors ───────────────────────────────────────────────────────────

    async fn register_conductor(
        &self,
        hostname: &str,
        drivers: &[String],
    ) -> Result<Conductor, StoreError>;
    async fn get_conductor(&self, hostname: &str) -> Result<Conductor, StoreError>;
    async fn unregister_conductor(&self, hostname: &str) -> Result<(), StoreError>;

    /// Refresh the conductor's heartbeat (`updated_at = now`).
    async fn touch_conductor(&self, hostname: &str) -> Result<(), StoreError>;

    // ── Ports ────────────────────────────────────────────────────────────────

    async fn create_port(&self, port: &Port) -> Result<Port, StoreError>;
    async fn get_port_by_address(&self, address: &str) -> Result<Port, StoreError>;
    async fn list_ports(&self, node_id: i64) -> Result<Vec<Port>, StoreError>;
    async fn destroy_port(&self, uuid: &Uuid) -> Result<(), StoreError>;
}
