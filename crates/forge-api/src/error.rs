use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use forge_rpc::RpcError;
use forge_store::StoreError;
use serde_json::json;

pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::BAD_REQUEST,
            message: msg.into(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::CONFLICT,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.message }));
        (self.status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NodeNotFound(_)
            | StoreError::ChassisNotFound(_)
            | StoreError::PortNotFound(_)
            | StoreError::ConductorNotFound(_) => ApiError::not_found(e.to_string()),
            StoreError::NodeLocked { .. }
            | StoreError::ChassisNotEmpty(_)
            | StoreError::ConductorAlreadyRegistered(_) => ApiError::conflict(e.to_string()),
            StoreError::InvalidParameter(_) => ApiError::bad_request(e.to_string()),
            _ => ApiError::internal(e.to_string()),
        }
    }
}

impl From<RpcError> for ApiError {
    fn from(e: RpcError) -> Self {
        let message = e.to_string();
        match e.kind() {
            Some("NodeNotFound") | Some("ChassisNotFound") | Some("PortNotFound")
            | Some("ConductorNotFound") => ApiError::not_found(message),
            Some("NodeLocked") | Some("NodeInWrongPowerState") | Some("ChassisNotEmpty")
            | Some("ConductorAlreadyRegistered") => ApiError::conflict(message),
            Some("InvalidParameterValue") | Some("InvalidUpdate") | Some("DriverNotFound")
            | Some("UnsupportedDriverExtension") | Some("InstanceDeployFailure") => {
                ApiError::bad_request(message)
            }
            _ => ApiError::internal(message),
        }
    }
}
