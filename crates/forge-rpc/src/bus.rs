use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::dispatch::ConductorDispatcher;
use crate::error::RpcError;
use crate::wire::RpcRequest;

/// The transport the client rides on. The message bus itself (broker,
/// serialization, topic routing) is someone else's problem; this is the
/// interface the core consumes.
#[async_trait]
pub trait MessageBus: Send + Sync + 'static {
    /// Send and wait for the reply.
    async fn call(&self, topic: &str, request: RpcRequest) -> Result<Value, RpcError>;

    /// Fire-and-forget: returns once the message is handed off, not when the
    /// handler finishes.
    async fn cast(&self, topic: &str, request: RpcRequest) -> Result<(), RpcError>;
}

/// Binds a dispatcher directly for the single-binary deployment: `call` runs
/// the handler inline, `cast` spawns it onto the runtime.
pub struct InProcessBus {
    dispatcher: Arc<ConductorDispatcher>,
}

impl InProcessBus {
    pub fn new(dispatcher: Arc<ConductorDispatcher>) -> Self {
        InProcessBus { dispatcher }
    }
}

#[async_trait]
impl MessageBus for InProcessBus {
    async fn call(&self, _topic: &str, request: RpcRequest) -> Result<Value, RpcError> {
        self.dispatcher
            .dispatch(request)
            .await
            .map_err(RpcError::from_fault)
    }

    async fn cast(&self, _topic: &str, request: RpcRequest) -> Result<(), RpcError> {
        let dispatcher = self.dispatcher.clone();
        let method = request.method.clone();
        tokio::spawn(async move {
            if let Err(fault) = dispatcher.dispatch(request).await {
                warn!(%method, kind = %fault.kind, message = %fault.message, "cast handler failed");
            }
        });
        Ok(())
    }
}
