use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use forge_rpc::ConductorClient;
use forge_store::InventoryStore;
use tower_http::trace::TraceLayer;

use crate::auth::require_token;
use crate::handlers;
use crate::state::AppState;

pub fn build_app(
    store: Arc<dyn InventoryStore>,
    conductor: Arc<ConductorClient>,
    auth_token: Arc<String>,
    api_base: String,
) -> Router {
    let state = AppState {
        store,
        conductor,
        auth_token,
        api_base: Arc::new(api_base),
    };

    Router::new()
        // Health
        .route("/health", get(handlers::health))
        .route("/ready", get(handlers::ready))
        // Chassis
        .route(
            "/v1/chassis",
            get(handlers::list_chassis).post(handlers::create_chassis),
        )
        .route(
            "/v1/chassis/:uuid",
            get(handlers::get_chassis)
                .patch(handlers::patch_chassis)
                .delete(handlers::delete_chassis),
        )
        .route("/v1/chassis/:uuid/nodes", get(handlers::list_chassis_nodes))
        // Nodes
        .route(
            "/v1/nodes",
            get(handlers::list_nodes).post(handlers::create_node),
        )
        .route(
            "/v1/nodes/:uuid",
            get(handlers::get_node)
                .patch(handlers::patch_node)
                .delete(handlers::delete_node),
        )
        // Node state
        .route(
            "/v1/nodes/:uuid/states/power",
            get(handlers::get_node_power).put(handlers::put_node_power),
        )
        .route(
            "/v1/nodes/:uuid/states/provision",
            put(handlers::put_node_provision),
        )
        // Vendor passthru
        .route(
            "/v1/nodes/:uuid/vendor/:method",
            post(handlers::vendor_passthru),
        )
        // Auth middleware applies to all routes above
        .route_layer(middleware::from_fn_with_state(state.clone(), require_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
