use std::collections::HashMap;
use std::sync::Arc;

use forge_conductor::ConductorManager;
use forge_domain::{NodePatch, PowerState};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::wire::{fault_for, RpcFault, RpcRequest, RPC_API_VERSION};

/// Server side of the conductor RPC API: an explicit table from message name
/// to manager call. Both `call` and `cast` messages land here; the transport
/// decides whether anyone waits for the result.
pub struct ConductorDispatcher {
    manager: Arc<ConductorManager>,
}

#[derive(Deserialize)]
struct NodeIdArgs {
    node_id: Uuid,
}

#[derive(Deserialize)]
struct UpdateNodeArgs {
    node: NodePatch,
}

#[derive(Deserialize)]
struct PowerStateArgs {
    node_id: Uuid,
    new_state: PowerState,
}

#[derive(Deserialize)]
struct VendorArgs {
    node_id: Uuid,
    driver_method: String,
    #[serde(default)]
    info: HashMap<String, Value>,
}

fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, RpcFault> {
    serde_json::from_value(args)
        .map_err(|e| RpcFault::new("InvalidParameterValue", format!("invalid rpc arguments: {e}")))
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value, RpcFault> {
    serde_json::to_value(v).map_err(|e| RpcFault::new("InternalError", e.to_string()))
}

/// Same major, minor no newer than ours.
pub fn version_compatible(requested: &str) -> bool {
    fn parse(s: &str) -> Option<(u32, u32)> {
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        Some((major, minor))
    }
    match (parse(requested), parse(RPC_API_VERSION)) {
        (Some((rmaj, rmin)), Some((smaj, smin))) => rmaj == smaj && rmin <= smin,
        _ => false,
    }
}

impl ConductorDispatcher {
    pub fn new(manager: Arc<ConductorManager>) -> Self {
        ConductorDispatcher { manager }
    }

    pub async fn dispatch(&self, request: RpcRequest) -> Result<Value, RpcFault> {
        if !version_compatible(&request.version) {
            return Err(RpcFault::new(
                "IncompatibleRpcVersion",
                format!(
                    "requested version {} is not compatible with {}",
                    request.version, RPC_API_VERSION
                ),
            ));
        }
        debug!(method = %request.method, "dispatching rpc message");

        match request.method.as_str() {
            "get_node_power_state" => {
                let args: NodeIdArgs = parse_args(request.args)?;
                let state = self
                    .manager
                    .get_node_power_state(&args.node_id)
                    .await
                    .map_err(|e| fault_for(&e))?;
                to_value(state)
            }
            "update_node" => {
                let args: UpdateNodeArgs = parse_args(request.args)?;
                let node = self
                    .manager
                    .update_node(&args.node)
                    .await
                    .map_err(|e| fault_for(&e))?;
                to_value(node)
            }
            "change_node_power_state" => {
                let args: PowerStateArgs = parse_args(request.args)?;
                self.manager
                    .change_node_power_state(&args.node_id, args.new_state)
                    .await
                    .map_err(|e| fault_for(&e))?;
                Ok(Value::Null)
            }
            "validate_vendor_action" => {
                let args: VendorArgs = parse_args(request.args)?;
                self.manager
                    .validate_vendor_action(&args.node_id, &args.driver_method, &args.info)
                    .await
                    .map_err(|e| fault_for(&e))
            }
            "do_vendor_action" => {
                let args: VendorArgs = parse_args(request.args)?;
                self.manager
                    .do_vendor_action(&args.node_id, &args.driver_method, &args.info)
                    .await
                    .map_err(|e| fault_for(&e))?;
                Ok(Value::Null)
            }
            "do_node_deploy" => {
                let args: NodeIdArgs = parse_args(request.args)?;
                self.manager
                    .do_node_deploy(&args.node_id)
                    .await
                    .map_err(|e| fault_for(&e))?;
                Ok(Value::Null)
            }
            "do_node_tear_down" => {
                let args: NodeIdArgs = parse_args(request.args)?;
                self.manager
                    .do_node_tear_down(&args.node_id)
                    .await
                    .map_err(|e| fault_for(&e))?;
                Ok(Value::Null)
            }
            other => Err(RpcFault::new(
                "NoSuchMethod",
                format!("unknown rpc method: {other}"),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate() {
        assert!(version_compatible("1.4"));
        assert!(version_compatible("1.0"));
        assert!(!version_compatible("1.5"));
        assert!(!version_compatible("2.0"));
        assert!(!version_compatible("garbage"));
    }
}
