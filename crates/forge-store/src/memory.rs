use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use forge_domain::{Chassis, Conductor, ListParams, Node, Port, SortDir, SortKey};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::InventoryStore;

#[derive(Debug, Default)]
struct Inner {
    nodes: HashMap<i64, Node>,
    chassis: HashMap<Uuid, Chassis>,
    conductors: HashMap<String, Conductor>,
    ports: HashMap<Uuid, Port>,
    next_node_id: i64,
}

/// In-memory implementation of [`InventoryStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process
/// development deployments; the reservation primitives are atomic under the
/// single write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// Apply marker + limit to an already-sorted listing. The marker must identify
// a row in the listing; results resume strictly after it.
fn page<T>(
    mut items: Vec<T>,
    params: &ListParams,
    uuid_of: impl Fn(&T) -> Uuid,
) -> Result<Vec<T>, StoreError> {
    if let Some(marker) = params.marker {
        match items.iter().position(|t| uuid_of(t) == marker) {
            Some(pos) => {
                items.drain(..=pos);
            }
            None => {
                return Err(StoreError::InvalidParameter(format!(
                    "marker {marker} not found"
                )))
            }
        }
    }
    if let Some(limit) = params.limit {
        items.truncate(limit as usize);
    }
    Ok(items)
}

fn directed(ord: std::cmp::Ordering, dir: SortDir) -> std::cmp::Ordering {
    match dir {
        SortDir::Asc => ord,
        SortDir::Desc => ord.reverse(),
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    // ── Nodes ────────────────────────────────────────────────────────────────

    async fn create_node(&self, node: &Node) -> Result<Node, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.nodes.values().any(|n| n.uuid == node.uuid) {
            return Err(StoreError::InvalidParameter(format!(
                "node {} already exists",
                node.uuid
            )));
        }
        guard.next_node_id += 1;
        let mut stored = node.clone();
        stored.id = guard.next_node_id;
        guard.nodes.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_node(&self, id: i64) -> Result<Node, StoreError> {
        let guard = self.inner.read().await;
        guard
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound(id.to_string()))
    }

    async fn get_node_by_uuid(&self, uuid: &Uuid) -> Result<Node, StoreError> {
        let guard = self.inner.read().await;
        guard
            .nodes
            .values()
            .find(|n| n.uuid == *uuid)
            .cloned()
            .ok_or_else(|| StoreError::NodeNotFound(uuid.to_string()))
    }

    async fn list_nodes(&self, params: &ListParams) -> Result<Vec<Node>, StoreError> {
        let guard = self.inner.read().await;
        let mut nodes: Vec<Node> = guard.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| {
            let ord = match params.sort_key {
                SortKey::Id => a.id.cmp(&b.id),
                SortKey::Uuid => a.uuid.cmp(&b.uuid),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            directed(ord.then(a.id.cmp(&b.id)), params.sort_dir)
        });
        page(nodes, params, |n| n.uuid)
    }

    async fn list_nodes_by_chassis(&self, chassis_uuid: &Uuid) -> Result<Vec<Node>, StoreError> {
        let guard = self.inner.read().await;
        let mut nodes: Vec<Node> = guard
            .nodes
            .values()
            .filter(|n| n.chassis_uuid == Some(*chassis_uuid))
            .cloned()
            .collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn update_node(&self, node: &Node) -> Result<Node, StoreError> {
        let mut guard = self.inner.write().await;
        let existing = guard
            .nodes
            .get_mut(&node.id)
            .ok_or_else(|| StoreError::NodeNotFound(node.id.to_string()))?;
        let mut stored = node.clone();
        // reservation and create metadata are owned by the store
        stored.reservation = existing.reservation.clone();
        stored.created_at = existing.created_at;
        stored.updated_at = Some(Utc::now());
        *existing = stored.clone();
        Ok(stored)
    }

    async fn destroy_node(&self, id: i64) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .nodes
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NodeNotFound(id.to_string()))?;
        guard.ports.retain(|_, p| p.node_id != id);
        Ok(())
    }

    async fn reserve_node(&self, node_id: i64, holder: &str) -> Result<Node, StoreError> {
        let mut guard = self.inner.write().await;
        let node = guard
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StoreError::NodeNotFound(node_id.to_string()))?;
        match &node.reservation {
            Some(current) => Err(StoreError::NodeLocked {
                node: node.uuid.to_string(),
                holder: current.clone(),
            }),
            None => {
                node.reservation = Some(holder.to_string());
                Ok(node.clone())
            }
        }
    }

    async fn release_node(&self, node_id: i64, holder: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let node = guard
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| StoreError::NodeNotFound(node_id.to_string()))?;
        if node.reservation.as_deref() == Some(holder) {
            node.reservation = None;
            Ok(())
        } else {
            Err(StoreError::Internal(format!(
                "programming error: release of node {} by {} but reservation is {:?}",
                node.uuid, holder, node.reservation
            )))
        }
    }

    // ── Chassis ──────────────────────────────────────────────────────────────

    async fn create_chassis(&self, chassis: &Chassis) -> Result<Chassis, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.chassis.contains_key(&chassis.uuid) {
            return Err(StoreError::InvalidParameter(format!(
                "chassis {} already exists",
                chassis.uuid
            )));
        }
        guard.chassis.insert(chassis.uuid, chassis.clone());
        Ok(chassis.clone())
    }

    async fn get_chassis_by_uuid(&self, uuid: &Uuid) -> Result<Chassis, StoreError> {
        let guard = self.inner.read().await;
        guard
            .chassis
            .get(uuid)
            .cloned()
            .ok_or_else(|| StoreError::ChassisNotFound(uuid.to_string()))
    }

    async fn list_chassis(&self, params: &ListParams) -> Result<Vec<Chassis>, StoreError> {
        let guard = self.inner.read().await;
        let mut chassis: Vec<Chassis> = guard.chassis.values().cloned().collect();
        chassis.sort_by(|a, b| {
            let ord = match params.sort_key {
                // chassis has no integer id; uuid is the stable fallback
                SortKey::Id | SortKey::Uuid => a.uuid.cmp(&b.uuid),
                SortKey::CreatedAt => a.created_at.cmp(&b.created_at),
                SortKey::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            };
            directed(ord.then(a.uuid.cmp(&b.uuid)), params.sort_dir)
        });
        page(chassis, params, |c| c.uuid)
    }

    async fn update_chassis(&self, chassis: &Chassis) -> Result<Chassis, StoreError> {
        let mut guard = self.inner.write().await;
        let existing = guard
            .chassis
            .get_mut(&chassis.uuid)
            .ok_or_else(|| StoreError::ChassisNotFound(chassis.uuid.to_string()))?;
        let mut stored = chassis.clone();
        stored.created_at = existing.created_at;
        stored.updated_at = Some(Utc::now());
        *existing = stored.clone();
        Ok(stored)
    }

    async fn destroy_chassis(&self, uuid: &Uuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if !guard.chassis.contains_key(uuid) {
            return Err(StoreError::ChassisNotFound(uuid.to_string()));
        }
        if guard.nodes.values().any(|n| n.chassis_uuid == Some(*uuid)) {
            return Err(StoreError::ChassisNotEmpty(uuid.to_string()));
        }
        guard.chassis.remove(uuid);
        Ok(())
    }

    // ── Conductors ───────────────────────────────────────────────────────────

    async fn register_conductor(
        &self,
        hostname: &str,
        drivers: &[String],
    ) -> Result<Conductor, StoreError> {
        let mut guard = self.inner.write().await;
        if guard.conductors.contains_key(hostname) {
            return Err(StoreError::ConductorAlreadyRegistered(hostname.to_string()));
        }
        let conductor = Conductor {
            hostname: hostname.to_string(),
            drivers: drivers.to_vec(),
            updated_at: Utc::now(),
        };
        guard
            .conductors
            .insert(hostname.to_string(), conductor.clone());
        Ok(conductor)
    }

    async fn get_conductor(&self, hostname: &str) -> Result<Conductor, StoreError> {
        let guard = self.inner.read().await;
        guard
            .conductors
            .get(hostname)
            .cloned()
            .ok_or_else(|| StoreError::ConductorNotFound(hostname.to_string()))
    }

    async fn unregister_conductor(&self, hostname: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .conductors
            .remove(hostname)
            .map(|_| ())
            .ok_or_else(|| StoreError::ConductorNotFound(hostname.to_string()))
    }

    async fn touch_conductor(&self, hostname: &str) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let conductor = guard
            .conductors
            .get_mut(hostname)
            .ok_or_else(|| StoreError::ConductorNotFound(hostname.to_string()))?;
        conductor.updated_at = Utc::now();
        Ok(())
    }

    // ── Ports ────────────────────────────────────────────────────────────────

    async fn create_port(&self, port: &Port) -> Result<Port, StoreError> {
        forge_domain::Port::validate_address(&port.address)
            .map_err(|e| StoreError::InvalidParameter(e.to_string()))?;
        let mut guard = self.inner.write().await;
        if !guard.nodes.contains_key(&port.node_id) {
            return Err(StoreError::NodeNotFound(port.node_id.to_string()));
        }
        if guard.ports.values().any(|p| p.address == port.address) {
            return Err(StoreError::InvalidParameter(format!(
                "port address {} already registered",
                port.address
            )));
        }
        guard.ports.insert(port.uuid, port.clone());
        Ok(port.clone())
    }

    async fn get_port_by_address(&self, address: &str) -> Result<Port, StoreError> {
        let guard = self.inner.read().await;
        guard
            .ports
            .values()
            .find(|p| p.address == address)
            .cloned()
            .ok_or_else(|| StoreError::PortNotFound(address.to_string()))
    }

    async fn list_ports(&self, node_id: i64) -> Result<Vec<Port>, StoreError> {
        let guard = self.inner.read().await;
        let mut ports: Vec<Port> = guard
            .ports
            .values()
            .filter(|p| p.node_id == node_id)
            .cloned()
            .collect();
        ports.sort_by_key(|p| p.uuid);
        Ok(ports)
    }

    async fn destroy_port(&self, uuid: &Uuid) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .ports
            .remove(uuid)
            .map(|_| ())
            .ok_or_else(|| StoreError::PortNotFound(uuid.to_string()))
    }
}
