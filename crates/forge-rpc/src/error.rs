use thiserror::Error;

use crate::wire::{RpcFault, ALLOWED_FAULT_KINDS};

/// Client-side RPC failure.
#[derive(Debug, Error)]
pub enum RpcError {
    /// A reconstructable domain error (kind on the allow-list).
    #[error("{0}")]
    Fault(RpcFault),

    /// A fault the client is not allowed to reconstruct.
    #[error("remote error: {kind}: {message}")]
    Remote { kind: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RpcError {
    /// Classify a wire fault: allow-listed kinds stay typed, everything else
    /// collapses to an opaque remote error.
    pub fn from_fault(fault: RpcFault) -> Self {
        if ALLOWED_FAULT_KINDS.contains(&fault.kind.as_str()) {
            RpcError::Fault(fault)
        } else {
            RpcError::Remote {
                kind: fault.kind,
                message: fault.message,
            }
        }
    }

    /// The fault kind, when one crossed the wire.
    pub fn kind(&self) -> Option<&str> {
        match self {
            RpcError::Fault(f) => Some(&f.kind),
            RpcError::Remote { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
