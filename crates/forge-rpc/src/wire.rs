use forge_conductor::ConductorError;
use forge_driver::DriverError;
use forge_store::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Version history:
///
///   1.0 - Initial version. Included get_node_power_state.
///   1.1 - Added update_node and start_power_state_change.
///   1.2 - Added vendor passthru.
///   1.3 - Renamed start_power_state_change to change_node_power_state.
///   1.4 - Added do_node_deploy and do_node_tear_down.
pub const RPC_API_VERSION: &str = "1.4";

/// Topic the conductor manager serves on.
pub const MANAGER_TOPIC: &str = "forge.conductor_manager";

/// Fault kinds a client may reconstruct as typed domain errors. Anything
/// outside this list surfaces as an opaque remote error.
pub const ALLOWED_FAULT_KINDS: &[&str] = &[
    "NodeNotFound",
    "ChassisNotFound",
    "PortNotFound",
    "ConductorNotFound",
    "NodeLocked",
    "NodeInWrongPowerState",
    "InvalidParameterValue",
    "DriverNotFound",
    "UnsupportedDriverExtension",
    "InstanceDeployFailure",
    "ConductorAlreadyRegistered",
    "ChassisNotEmpty",
    "InvalidUpdate",
];

/// One message on the conductor topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Client API version; the server accepts same-major, minor ≤ its own.
    pub version: String,
    pub method: String,
    #[serde(default)]
    pub args: Value,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, args: Value) -> Self {
        RpcRequest {
            version: RPC_API_VERSION.to_string(),
            method: method.into(),
            args,
        }
    }
}

/// A serialized error crossing the RPC boundary.
#[derive(Debug, Clone, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct RpcFault {
    pub kind: String,
    pub message: String,
}

impl RpcFault {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        RpcFault {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Map a conductor error onto its wire fault kind.
pub fn fault_for(err: &ConductorError) -> RpcFault {
    let kind = match err {
        ConductorError::Store(e) => match e {
            StoreError::NodeNotFound(_) => "NodeNotFound",
            StoreError::ChassisNotFound(_) => "ChassisNotFound",
            StoreError::PortNotFound(_) => "PortNotFound",
            StoreError::ConductorNotFound(_) => "ConductorNotFound",
            StoreError::NodeLocked { .. } => "NodeLocked",
            StoreError::ChassisNotEmpty(_) => "ChassisNotEmpty",
            StoreError::ConductorAlreadyRegistered(_) => "ConductorAlreadyRegistered",
            StoreError::InvalidParameter(_) => "InvalidParameterValue",
            StoreError::Serialization(_) | StoreError::Internal(_) => "InternalError",
        },
        ConductorError::Driver(e) => match e {
            DriverError::DriverNotFound(_) => "DriverNotFound",
            DriverError::UnsupportedDriverExtension { .. } => "UnsupportedDriverExtension",
            DriverError::InvalidParameterValue(_) => "InvalidParameterValue",
            DriverError::OperationFailed(_) => "DriverOperationFailed",
        },
        ConductorError::NodeInWrongPowerState { .. } => "NodeInWrongPowerState",
        ConductorError::InstanceDeployFailure(_) => "InstanceDeployFailure",
        ConductorError::InvalidUpdate(_) => "InvalidUpdate",
    };
    RpcFault::new(kind, err.to_string())
}
