use std::sync::Arc;

use forge_rpc::ConductorClient;
use forge_store::InventoryStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InventoryStore>,
    pub conductor: Arc<ConductorClient>,
    pub auth_token: Arc<String>,
    /// Base URL used when emitting collection `next` links.
    pub api_base: Arc<String>,
}
