pub mod bus;
pub mod client;
pub mod dispatch;
pub mod error;
pub mod wire;

pub use bus::{InProcessBus, MessageBus};
pub use client::ConductorClient;
pub use dispatch::ConductorDispatcher;
pub use error::RpcError;
pub use wire::{RpcFault, RpcRequest, ALLOWED_FAULT_KINDS, MANAGER_TOPIC, RPC_API_VERSION};
