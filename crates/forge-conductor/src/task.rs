use std::sync::Arc;

use forge_domain::Node;
use forge_driver::{DriverBundle, DriverRegistry};
use forge_store::InventoryStore;
use tracing::warn;
use uuid::Uuid;

use crate::error::ConductorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Reader; takes no reservation and tolerates racing state changes.
    Shared,
    /// Writer; holds the fleet-wide per-node reservation for the task's
    /// lifetime.
    Exclusive,
}

/// One node plus the driver bundle resolved for it.
pub struct TaskResource {
    pub node: Node,
    pub driver: Arc<DriverBundle>,
}

/// A scoped bundle of (nodes, drivers, lock) that a handler runs inside.
///
/// Exclusive tasks own the nodes' reservations from acquisition until
/// `release()`. Handlers call `release()` on every return path; `Drop` is the
/// unwind net, pushing an async release of anything still held onto the
/// running runtime so a panic cannot leak a reservation.
pub struct Task {
    resources: Vec<TaskResource>,
    mode: LockMode,
    host: String,
    store: Arc<dyn InventoryStore>,
    reserved: Vec<i64>,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("resource_count", &self.resources.len())
            .field("mode", &self.mode)
            .field("host", &self.host)
            .field("reserved", &self.reserved)
            .finish()
    }
}

/// Load nodes, resolve their drivers and take the requested locks.
///
/// Multi-node acquisitions lock in ascending `node.id` order so cooperating
/// conductors cannot deadlock each other; a failure part-way releases every
/// reservation already taken before the error surfaces.
///
/// `driver_name` overrides each node's own driver, for updates that change
/// the driver so the *new* driver is the one validated.
pub async fn acquire(
    store: Arc<dyn InventoryStore>,
    registry: &DriverRegistry,
    host: &str,
    node_uuids: &[Uuid],
    mode: LockMode,
    driver_name: Option<&str>,
) -> Result<Task, ConductorError> {
    let mut resources = Vec::with_capacity(node_uuids.len());
    for uuid in node_uuids {
        let node = store.get_node_by_uuid(uuid).await?;
        let driver = registry.get(driver_name.unwrap_or(&node.driver))?;
        resources.push(TaskResource { node, driver });
    }
    resources.sort_by_key(|r| r.node.id);

    let mut task = Task {
        resources,
        mode,
        host: host.to_string(),
        store,
        reserved: Vec::new(),
    };

    if mode == LockMode::Exclusive {
        for i in 0..task.resources.len() {
            let id = task.resources[i].node.id;
            let attempt = task.store.reserve_node(id, host).await;
            match attempt {
                Ok(node) => {
                    task.resources[i].node = node;
                    task.reserved.push(id);
                }
                Err(e) => {
                    task.release_reserved().await;
                    return Err(e.into());
                }
            }
        }
    }
    Ok(task)
}

impl Task {
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn resources(&self) -> &[TaskResource] {
        &self.resources
    }

    /// The single node of a one-node task (the common case).
    pub fn node(&self) -> &Node {
        &self.resources[0].node
    }

    pub fn driver(&self) -> &Arc<DriverBundle> {
        &self.resources[0].driver
    }

    /// Release every reservation this task holds. Called on all exit paths;
    /// release failures are logged, not propagated, so they cannot mask the
    /// handler's own result.
    pub async fn release(mut self) {
        self.release_reserved().await;
    }

    async fn release_reserved(&mut self) {
        for id in std::mem::take(&mut self.reserved) {
            if let Err(e) = self.store.release_node(id, &self.host).await {
                warn!(node_id = id, host = %self.host, error = %e, "failed to release node reservation");
            }
        }
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        if self.reserved.is_empty() {
            return;
        }
        let store = self.store.clone();
        let host = self.host.clone();
        let ids = std::mem::take(&mut self.reserved);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(?ids, host = %host, "task dropped while holding reservations; releasing asynchronously");
                handle.spawn(async move {
                    for id in ids {
                        if let Err(e) = store.release_node(id, &host).await {
                            warn!(node_id = id, host = %host, error = %e, "failed to release leaked reservation");
                        }
                    }
                });
            }
            Err(_) => {
                warn!(?ids, host = %host, "task dropped outside a runtime; reservations leaked");
            }
        }
    }
}
