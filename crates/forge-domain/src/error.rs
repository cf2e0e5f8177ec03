use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid MAC address: {0}")]
    InvalidMacAddress(String),

    #[error("invalid power state target: {0}")]
    InvalidPowerTarget(String),
}
