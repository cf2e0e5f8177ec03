use std::collections::HashMap;
use std::sync::Arc;

use forge_domain::{Node, NodePatch, PowerState, ProvisionState};
use forge_driver::{DriverError, DriverRegistry};
use forge_store::InventoryStore;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ConductorError;
use crate::task::{acquire, LockMode, Task};

/// Implements every state-changing operation on nodes.
///
/// One instance lives in each conductor process; all mutating work runs
/// inside an exclusive [`Task`], so any conductor in the fleet can operate on
/// any node without a central coordinator. Driver failures during a state
/// transition are never swallowed: `last_error` is recorded, any in-progress
/// target is cleared, and the original error propagates to the caller.
pub struct ConductorManager {
    host: String,
    store: Arc<dyn InventoryStore>,
    registry: Arc<DriverRegistry>,
}

impl ConductorManager {
    pub fn new(
        host: impl Into<String>,
        store: Arc<dyn InventoryStore>,
        registry: Arc<DriverRegistry>,
    ) -> Self {
        ConductorManager {
            host: host.into(),
            store,
            registry,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    async fn acquire_one(
        &self,
        node_uuid: &Uuid,
        mode: LockMode,
        driver_name: Option<&str>,
    ) -> Result<Task, ConductorError> {
        acquire(
            self.store.clone(),
            &self.registry,
            &self.host,
            std::slice::from_ref(node_uuid),
            mode,
            driver_name,
        )
        .await
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// Live-probe the node's power state. Never persists.
    pub async fn get_node_power_state(
        &self,
        node_uuid: &Uuid,
    ) -> Result<PowerState, ConductorError> {
        debug!(node = %node_uuid, "get_node_power_state");
        let task = self.acquire_one(node_uuid, LockMode::Shared, None).await?;
        let result = task.driver().power.get_power_state(task.node()).await;
        task.release().await;
        Ok(result?)
    }

    // ── update_node ──────────────────────────────────────────────────────────

    /// The hub for PUT/PATCH requests: applies pending field changes after
    /// checking they are safe to perform.
    ///
    /// A patch that changes the driver is validated against the *new* driver.
    /// Associating a workload requires the live power state to be off;
    /// disassociating is allowed from any power state.
    pub async fn update_node(&self, patch: &NodePatch) -> Result<Node, ConductorError> {
        debug!(node = %patch.uuid, "update_node");
        if patch.power_state.is_some() {
            return Err(ConductorError::InvalidUpdate(
                "update_node can not change node power state".to_string(),
            ));
        }

        let task = self
            .acquire_one(&patch.uuid, LockMode::Exclusive, patch.driver.as_deref())
            .await?;
        let result = self.update_work(&task, patch).await;
        task.release().await;
        result
    }

    async fn update_work(&self, task: &Task, patch: &NodePatch) -> Result<Node, ConductorError> {
        let mut node = task.node().clone();

        if patch.associates_instance() {
            task.driver().power.validate(&node).await?;
            let observed = task.driver().power.get_power_state(&node).await?;
            if observed != PowerState::PowerOff {
                return Err(ConductorError::NodeInWrongPowerState {
                    node: node.uuid.to_string(),
                    pstate: observed,
                });
            }
        }

        patch.apply(&mut node);
        Ok(self.store.update_node(&node).await?)
    }

    // ── change_node_power_state ──────────────────────────────────────────────

    /// Drive the node to `new_state` (POWER_ON or POWER_OFF).
    ///
    /// Dispatched as a cast, but synchronous within the conductor: the
    /// exclusive lock is held until the power action completes and
    /// `target_power_state` is cleared again.
    pub async fn change_node_power_state(
        &self,
        node_uuid: &Uuid,
        new_state: PowerState,
    ) -> Result<(), ConductorError> {
        debug!(node = %node_uuid, target = %new_state, "change_node_power_state");
        let task = self
            .acquire_one(node_uuid, LockMode::Exclusive, None)
            .await?;
        let result = self.power_work(&task, new_state).await;
        task.release().await;
        result
    }

    async fn power_work(&self, task: &Task, new_state: PowerState) -> Result<(), ConductorError> {
        let driver = task.driver();
        let mut node = task.node().clone();

        let probed: Result<PowerState, ConductorError> = async {
            if !new_state.is_valid_target() {
                return Err(DriverError::InvalidParameterValue(format!(
                    "invalid target power state: {new_state}"
                ))
                .into());
            }
            driver.power.validate(&node).await?;
            Ok(driver.power.get_power_state(&node).await?)
        }
        .await;

        let current = match probed {
            Ok(state) => state,
            Err(e) => {
                node.last_error = Some(format!(
                    "Failed to change power state to {new_state}. Error: {e}"
                ));
                self.store.update_node(&node).await?;
                return Err(e);
            }
        };

        if current == new_state {
            // Neither we nor the hardware erred: the node is already where
            // the caller wants it (e.g. a delayed retry of an earlier
            // request). Clear stale errors and any stale target and stop.
            node.last_error = None;
            node.target_power_state = PowerState::NoState;
            self.store.update_node(&node).await?;
            warn!(node = %node.uuid, state = %current,
                "not changing power state: current state = requested state");
            return Ok(());
        }

        // Expose work-in-progress to other processes and clients before
        // touching the hardware.
        node.target_power_state = new_state;
        node.last_error = None;
        node = self.store.update_node(&node).await?;

        let action = driver.power.set_power_state(&node, new_state).await;
        let outcome = match action {
            Ok(()) => {
                node.power_state = new_state;
                Ok(())
            }
            Err(e) => {
                node.last_error = Some(format!(
                    "Failed to change power state to {new_state}. Error: {e}"
                ));
                Err(ConductorError::from(e))
            }
        };

        // Always clear the target, whatever the action did.
        node.target_power_state = PowerState::NoState;
        let persisted = self.store.update_node(&node).await;
        match (outcome, persisted) {
            (Err(e), _) => Err(e),
            (Ok(()), Err(e)) => Err(e.into()),
            (Ok(()), Ok(_)) => Ok(()),
        }
    }

    // ── deploy / tear down ───────────────────────────────────────────────────

    /// Begin deployment. The node must not have been provisioned yet.
    pub async fn do_node_deploy(&self, node_uuid: &Uuid) -> Result<(), ConductorError> {
        debug!(node = %node_uuid, "do_node_deploy");
        let task = self
            .acquire_one(node_uuid, LockMode::Exclusive, None)
            .await?;
        let result = self.deploy_work(&task).await;
        task.release().await;
        result
    }

    async fn deploy_work(&self, task: &Task) -> Result<(), ConductorError> {
        let driver = task.driver();
        let mut node = task.node().clone();

        if node.provision_state != ProvisionState::NoState {
            return Err(ConductorError::InstanceDeployFailure(format!(
                "do_node_deploy called for {} but provision state is already {}",
                node.uuid, node.provision_state
            )));
        }

        if let Err(e) = driver.deploy.validate(&node).await {
            node.last_error = Some(format!("Failed to validate deploy info. Error: {e}"));
            self.store.update_node(&node).await?;
            return Err(e.into());
        }
        node.provision_state = ProvisionState::Deploying;
        node.target_provision_state = ProvisionState::DeployDone;
        node.last_error = None;
        node = self.store.update_node(&node).await?;

        match driver.deploy.deploy(&node).await {
            Ok(new_state) => {
                if new_state == ProvisionState::DeployDone {
                    node.provision_state = ProvisionState::Active;
                    node.target_provision_state = ProvisionState::NoState;
                } else {
                    // the driver is finishing the transition via callback;
                    // the stored (state, target) pair is the recovery hint
                    node.provision_state = new_state;
                }
                self.store.update_node(&node).await?;
                Ok(())
            }
            Err(e) => {
                node.last_error = Some(format!("Failed to deploy. Error: {e}"));
                node.provision_state = ProvisionState::Error;
                node.target_provision_state = ProvisionState::NoState;
                if let Err(pe) = self.store.update_node(&node).await {
                    warn!(node = %node.uuid, error = %pe, "failed to persist deploy failure");
                }
                Err(e.into())
            }
        }
    }

    /// Tear down an existing deployment. Allowed from ACTIVE, DEPLOYFAIL and
    /// ERROR.
    pub async fn do_node_tear_down(&self, node_uuid: &Uuid) -> Result<(), ConductorError> {
        debug!(node = %node_uuid, "do_node_tear_down");
        let task = self
            .acquire_one(node_uuid, LockMode::Exclusive, None)
            .await?;
        let result = self.tear_down_work(&task).await;
        task.release().await;
        result
    }

    async fn tear_down_work(&self, task: &Task) -> Result<(), ConductorError> {
        let driver = task.driver();
        let mut node = task.node().clone();

        if !matches!(
            node.provision_state,
            ProvisionState::Active | ProvisionState::DeployFail | ProvisionState::Error
        ) {
            return Err(ConductorError::InstanceDeployFailure(format!(
                "do_node_tear_down not allowed for {} in state {}",
                node.uuid, node.provision_state
            )));
        }

        if let Err(e) = driver.deploy.validate(&node).await {
            node.last_error = Some(format!("Failed to validate info for teardown. Error: {e}"));
            self.store.update_node(&node).await?;
            return Err(e.into());
        }
        node.provision_state = ProvisionState::Deleting;
        node.target_provision_state = ProvisionState::Deleted;
        node.last_error = None;
        node = self.store.update_node(&node).await?;

        match driver.deploy.tear_down(&node).await {
            Ok(new_state) => {
                if new_state == ProvisionState::Deleted {
                    node.provision_state = ProvisionState::NoState;
                    node.target_provision_state = ProvisionState::NoState;
                } else {
                    node.provision_state = new_state;
                }
                self.store.update_node(&node).await?;
                Ok(())
            }
            Err(e) => {
                node.last_error = Some(format!("Failed to tear down. Error: {e}"));
                node.provision_state = ProvisionState::Error;
                node.target_provision_state = ProvisionState::NoState;
                if let Err(pe) = self.store.update_node(&node).await {
                    warn!(node = %node.uuid, error = %pe, "failed to persist tear-down failure");
                }
                Err(e.into())
            }
        }
    }

    // ── vendor passthru ──────────────────────────────────────────────────────
    //
    // Two-phase by contract: validate runs as a call, the action as a cast.
    // Between the two, another conductor may change the node so that a
    // validated action no longer applies; the split is preserved so the
    // action can run asynchronously.

    /// Validate driver-specific info, or fetch driver-defined status data.
    pub async fn validate_vendor_action(
        &self,
        node_uuid: &Uuid,
        method: &str,
        info: &HashMap<String, Value>,
    ) -> Result<Value, ConductorError> {
        debug!(node = %node_uuid, method, "validate_vendor_action");
        let task = self.acquire_one(node_uuid, LockMode::Shared, None).await?;
        let result = match task.driver().vendor_for(task.node()) {
            Ok(vendor) => vendor
                .validate(task.node(), method, info)
                .await
                .map_err(ConductorError::from),
            Err(e) => Err(e.into()),
        };
        task.release().await;
        result
    }

    /// Run a driver-defined action.
    pub async fn do_vendor_action(
        &self,
        node_uuid: &Uuid,
        method: &str,
        info: &HashMap<String, Value>,
    ) -> Result<(), ConductorError> {
        debug!(node = %node_uuid, method, "do_vendor_action");
        let task = self.acquire_one(node_uuid, LockMode::Shared, None).await?;
        let result = match task.driver().vendor_for(task.node()) {
            Ok(vendor) => vendor
                .vendor_passthru(task.node(), method, info)
                .await
                .map_err(ConductorError::from),
            Err(e) => Err(e.into()),
        };
        task.release().await;
        result
    }
}
