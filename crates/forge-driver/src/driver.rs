use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use forge_domain::{Node, PowerState, ProvisionState};
use serde_json::Value;

use crate::error::DriverError;

/// Power control capability.
///
/// Implementations talk to real hardware and may block on the network; they
/// are shared across tasks on different nodes concurrently, so any session or
/// socket state they keep must be internally synchronized.
#[async_trait]
pub trait PowerInterface: Send + Sync + 'static {
    /// Check that `node.driver_info` is sufficient to manage power.
    async fn validate(&self, node: &Node) -> Result<(), DriverError>;

    /// Live-probe the hardware. Never served from a cache.
    async fn get_power_state(&self, node: &Node) -> Result<PowerState, DriverError>;

    async fn set_power_state(&self, node: &Node, target: PowerState) -> Result<(), DriverError>;
}

/// Deployment capability.
///
/// `deploy` / `tear_down` return the provisioning state the node is in when
/// the call completes. Returning a non-terminal state (e.g. still
/// `Deploying`) is the driver's contract to finish the transition later via
/// an out-of-band callback.
#[async_trait]
pub trait DeployInterface: Send + Sync + 'static {
    async fn validate(&self, node: &Node) -> Result<(), DriverError>;
    async fn deploy(&self, node: &Node) -> Result<ProvisionState, DriverError>;
    async fn tear_down(&self, node: &Node) -> Result<ProvisionState, DriverError>;
}

/// Driver-defined escape hatch for operations outside the standard
/// capability interfaces.
#[async_trait]
pub trait VendorInterface: Send + Sync + std::fmt::Debug + 'static {
    /// Validate `method` + `info` against the node; returns the driver's
    /// synchronous payload (may be data the caller wanted).
    async fn validate(
        &self,
        node: &Node,
        method: &str,
        info: &HashMap<String, Value>,
    ) -> Result<Value, DriverError>;

    async fn vendor_passthru(
        &self,
        node: &Node,
        method: &str,
        info: &HashMap<String, Value>,
    ) -> Result<(), DriverError>;
}

/// Serial/graphical console capability. Optional on every bundle.
#[async_trait]
pub trait ConsoleInterface: Send + Sync + 'static {
    async fn validate(&self, node: &Node) -> Result<(), DriverError>;
    async fn start_console(&self, node: &Node) -> Result<(), DriverError>;
    async fn stop_console(&self, node: &Node) -> Result<(), DriverError>;
}

/// A named bundle of capability implementations for one class of hardware.
///
/// Power and deploy are mandatory; vendor and console are optional and their
/// absence is observable (and tested) before use via the `*_for` accessors.
pub struct DriverBundle {
    name: String,
    pub power: Arc<dyn PowerInterface>,
    pub deploy: Arc<dyn DeployInterface>,
    pub vendor: Option<Arc<dyn VendorInterface>>,
    pub console: Option<Arc<dyn ConsoleInterface>>,
}

impl DriverBundle {
    pub fn new(
        name: impl Into<String>,
        power: Arc<dyn PowerInterface>,
        deploy: Arc<dyn DeployInterface>,
    ) -> Self {
        DriverBundle {
            name: name.into(),
            power,
            deploy,
            vendor: None,
            console: None,
        }
    }

    pub fn with_vendor(mut self, vendor: Arc<dyn VendorInterface>) -> Self {
        self.vendor = Some(vendor);
        self
    }

    pub fn with_console(mut self, console: Arc<dyn ConsoleInterface>) -> Self {
        self.console = Some(console);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The vendor capability, or `UnsupportedDriverExtension` naming the
    /// driver, node and missing extension.
    pub fn vendor_for(&self, node: &Node) -> Result<&Arc<dyn VendorInterface>, DriverError> {
        self.vendor
            .as_ref()
            .ok_or_else(|| DriverError::UnsupportedDriverExtension {
                driver: self.name.clone(),
                node: node.uuid.to_string(),
                extension: "vendor passthru".to_string(),
            })
    }

    pub fn console_for(&self, node: &Node) -> Result<&Arc<dyn ConsoleInterface>, DriverError> {
        self.console
            .as_ref()
            .ok_or_else(|| DriverError::UnsupportedDriverExtension {
                driver: self.name.clone(),
                node: node.uuid.to_string(),
                extension: "console".to_string(),
            })
    }
}

impl std::fmt::Debug for DriverBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverBundle")
            .field("name", &self.name)
            .field("vendor", &self.vendor.is_some())
            .field("console", &self.console.is_some())
            .finish()
    }
}
