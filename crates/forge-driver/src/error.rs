use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("driver not found: {0}")]
    DriverNotFound(String),

    /// A loaded driver was asked for a capability it does not carry.
    #[error("driver {driver} does not support {extension} (node {node})")]
    UnsupportedDriverExtension {
        driver: String,
        node: String,
        extension: String,
    },

    /// Driver validation rejected the node's configuration or the request.
    #[error("invalid parameter: {0}")]
    InvalidParameterValue(String),

    /// The hardware operation itself failed (unreachable BMC, timeout, ...).
    #[error("driver operation failed: {0}")]
    OperationFailed(String),
}
