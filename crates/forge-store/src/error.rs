use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("node not found: {0}")]
    NodeNotFound(String),

    #[error("chassis not found: {0}")]
    ChassisNotFound(String),

    #[error("port not found: {0}")]
    PortNotFound(String),

    #[error("conductor not found: {0}")]
    ConductorNotFound(String),

    /// The exclusive reservation on a node is already held.
    #[error("node {node} locked by {holder}")]
    NodeLocked { node: String, holder: String },

    #[error("chassis {0} still has nodes attached")]
    ChassisNotEmpty(String),

    #[error("conductor already registered: {0}")]
    ConductorAlreadyRegistered(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
