use forge_domain::PowerState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConductorError {
    #[error("store error: {0}")]
    Store(#[from] forge_store::StoreError),

    #[error("driver error: {0}")]
    Driver(#[from] forge_driver::DriverError),

    /// Associating a workload was refused because the node is not powered off.
    #[error("node {node} is in the wrong power state: {pstate}")]
    NodeInWrongPowerState { node: String, pstate: PowerState },

    /// Provision-state precondition violated, or the driver failed during
    /// deploy / tear-down.
    #[error("instance deploy failure: {0}")]
    InstanceDeployFailure(String),

    #[error("invalid update: {0}")]
    InvalidUpdate(String),
}
