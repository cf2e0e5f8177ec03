use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use forge_domain::{Node, PowerState, ProvisionState};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::driver::{
    ConsoleInterface, DeployInterface, DriverBundle, PowerInterface, VendorInterface,
};
use crate::error::DriverError;

/// Stand-in power control: state lives in a process-local map, keyed by node
/// uuid, and every node starts powered off.
#[derive(Debug, Default)]
pub struct FakePower {
    states: Mutex<HashMap<Uuid, PowerState>>,
}

#[async_trait]
impl PowerInterface for FakePower {
    async fn validate(&self, _node: &Node) -> Result<(), DriverError> {
        Ok(())
    }

    async fn get_power_state(&self, node: &Node) -> Result<PowerState, DriverError> {
        let states = self.states.lock().await;
        Ok(states
            .get(&node.uuid)
            .copied()
            .unwrap_or(PowerState::PowerOff))
    }

    async fn set_power_state(&self, node: &Node, target: PowerState) -> Result<(), DriverError> {
        debug!(node = %node.uuid, %target, "FakePower: set_power_state");
        let mut states = self.states.lock().await;
        states.insert(node.uuid, target);
        Ok(())
    }
}

/// Stand-in deployment: completes instantly.
#[derive(Debug, Default)]
pub struct FakeDeploy;

#[async_trait]
impl DeployInterface for FakeDeploy {
    async fn validate(&self, _node: &Node) -> Result<(), DriverError> {
        Ok(())
    }

    async fn deploy(&self, node: &Node) -> Result<ProvisionState, DriverError> {
        debug!(node = %node.uuid, "FakeDeploy: deploy");
        Ok(ProvisionState::DeployDone)
    }

    async fn tear_down(&self, node: &Node) -> Result<ProvisionState, DriverError> {
        debug!(node = %node.uuid, "FakeDeploy: tear_down");
        Ok(ProvisionState::Deleted)
    }
}

/// Vendor extension exposing a single `first_method` no-op, mainly so the
/// passthru plumbing has something real to call.
#[derive(Debug, Default)]
pub struct FakeVendor;

impl FakeVendor {
    fn check_method(method: &str) -> Result<(), DriverError> {
        if method == "first_method" {
            Ok(())
        } else {
            Err(DriverError::InvalidParameterValue(format!(
                "unknown vendor method: {method}"
            )))
        }
    }
}

#[async_trait]
impl VendorInterface for FakeVendor {
    async fn validate(
        &self,
        node: &Node,
        method: &str,
        _info: &HashMap<String, Value>,
    ) -> Result<Value, DriverError> {
        Self::check_method(method)?;
        Ok(json!({ "node": node.uuid, "method": method }))
    }

    async fn vendor_passthru(
        &self,
        node: &Node,
        method: &str,
        _info: &HashMap<String, Value>,
    ) -> Result<(), DriverError> {
        Self::check_method(method)?;
        debug!(node = %node.uuid, method, "FakeVendor: vendor_passthru");
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeConsole;

#[async_trait]
impl ConsoleInterface for FakeConsole {
    async fn validate(&self, _node: &Node) -> Result<(), DriverError> {
        Ok(())
    }

    async fn start_console(&self, node: &Node) -> Result<(), DriverError> {
        debug!(node = %node.uuid, "FakeConsole: start_console");
        Ok(())
    }

    async fn stop_console(&self, node: &Node) -> Result<(), DriverError> {
        debug!(node = %node.uuid, "FakeConsole: stop_console");
        Ok(())
    }
}

/// The always-available `fake` bundle. Used by development deployments and
/// anywhere a test needs a full capability set without hardware.
pub fn fake_driver() -> DriverBundle {
    DriverBundle::new(
        "fake",
        Arc::new(FakePower::default()),
        Arc::new(FakeDeploy::default()),
    )
    .with_vendor(Arc::new(FakeVendor))
    .with_console(Arc::new(FakeConsole))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_power_round_trip() {
        let bundle = fake_driver();
        let node = Node::new("fake");

        assert_eq!(
            bundle.power.get_power_state(&node).await.unwrap(),
            PowerState::PowerOff
        );
        bundle
            .power
            .set_power_state(&node, PowerState::PowerOn)
            .await
            .unwrap();
        assert_eq!(
            bundle.power.get_power_state(&node).await.unwrap(),
            PowerState::PowerOn
        );
    }

    #[tokio::test]
    async fn vendor_rejects_unknown_method() {
        let bundle = fake_driver();
        let node = Node::new("fake");
        let vendor = bundle.vendor_for(&node).unwrap();

        let err = vendor
            .validate(&node, "second_method", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::InvalidParameterValue(_)));

        vendor
            .vendor_passthru(&node, "first_method", &HashMap::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_capability_is_observable() {
        let base = fake_driver();
        let bare = DriverBundle::new("bare", base.power.clone(), base.deploy.clone());
        let node = Node::new("bare");

        let err = bare.vendor_for(&node).unwrap_err();
        match err {
            DriverError::UnsupportedDriverExtension {
                driver, extension, ..
            } => {
                assert_eq!(driver, "bare");
                assert_eq!(extension, "vendor passthru");
            }
            other => panic!("expected UnsupportedDriverExtension, got {other:?}"),
        }
        assert!(bare.console_for(&node).is_err());
    }
}
