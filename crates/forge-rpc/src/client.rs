use std::collections::HashMap;
use std::sync::Arc;

use forge_domain::{Node, NodePatch, PowerState};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::error::RpcError;
use crate::wire::{RpcRequest, MANAGER_TOPIC};

/// Client side of the conductor RPC API.
pub struct ConductorClient {
    bus: Arc<dyn MessageBus>,
    topic: String,
}

impl ConductorClient {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        ConductorClient {
            bus,
            topic: MANAGER_TOPIC.to_string(),
        }
    }

    pub fn with_topic(bus: Arc<dyn MessageBus>, topic: impl Into<String>) -> Self {
        ConductorClient {
            bus,
            topic: topic.into(),
        }
    }

    /// Ask a conductor for the node's live power state.
    pub async fn get_node_power_state(&self, node_id: Uuid) -> Result<PowerState, RpcError> {
        let reply = self
            .bus
            .call(
                &self.topic,
                RpcRequest::new("get_node_power_state", json!({ "node_id": node_id })),
            )
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Synchronously have a conductor apply pending node changes and return
    /// the saved record. Power state cannot be changed this way; use
    /// [`change_node_power_state`](Self::change_node_power_state).
    pub async fn update_node(&self, patch: &NodePatch) -> Result<Node, RpcError> {
        let reply = self
            .bus
            .call(
                &self.topic,
                RpcRequest::new("update_node", json!({ "node": patch })),
            )
            .await?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Asynchronously change the power state of a node.
    pub async fn change_node_power_state(
        &self,
        node_id: Uuid,
        new_state: PowerState,
    ) -> Result<(), RpcError> {
        self.bus
            .cast(
                &self.topic,
                RpcRequest::new(
                    "change_node_power_state",
                    json!({ "node_id": node_id, "new_state": new_state }),
                ),
            )
            .await
    }

    /// Pass vendor-specific info to the node's driver: validate as a call,
    /// then fire the action as a cast, returning the validate payload.
    ///
    /// Between the two messages another conductor may acquire the node or
    /// change its state, so a successful validate does not guarantee the
    /// action still applies when it runs.
    pub async fn vendor_passthru(
        &self,
        node_id: Uuid,
        driver_method: &str,
        info: &HashMap<String, Value>,
    ) -> Result<Value, RpcError> {
        let args = json!({
            "node_id": node_id,
            "driver_method": driver_method,
            "info": info,
        });
        let driver_data = self
            .bus
            .call(
                &self.topic,
                RpcRequest::new("validate_vendor_action", args.clone()),
            )
            .await?;
        self.bus
            .cast(&self.topic, RpcRequest::new("do_vendor_action", args))
            .await?;
        Ok(driver_data)
    }

    /// Signal a conductor to begin deployment. The node must be in the
    /// appropriate undeployed state.
    pub async fn do_node_deploy(&self, node_id: Uuid) -> Result<(), RpcError> {
        self.bus
            .cast(
                &self.topic,
                RpcRequest::new("do_node_deploy", json!({ "node_id": node_id })),
            )
            .await
    }

    /// Signal a conductor to tear down an existing deployment.
    pub async fn do_node_tear_down(&self, node_id: Uuid) -> Result<(), RpcError> {
        self.bus
            .cast(
                &self.topic,
                RpcRequest::new("do_node_tear_down", json!({ "node_id": node_id })),
            )
            .await
    }
}
