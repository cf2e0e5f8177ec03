pub mod error;
pub mod types;

pub use error::DomainError;
pub use types::{
    Chassis, Conductor, ListParams, Node, NodePatch, Port, PowerState, ProvisionState, SortDir,
    SortKey,
};
