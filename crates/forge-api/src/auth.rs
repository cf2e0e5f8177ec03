use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::state::AppState;

/// Token auth for every route; no public endpoints.
///
/// Accepts the service token either as `Authorization: Bearer <token>` or as
/// the `X-Auth-Token: <token>` header; anything missing, malformed, or wrong
/// gets a 401.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let headers = request.headers();
    let bearer = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "));
    let x_auth = headers.get("x-auth-token").and_then(|v| v.to_str().ok());

    let expected = state.auth_token.as_str();
    match (bearer, x_auth) {
        (Some(token), _) if token == expected => next.run(request).await,
        (_, Some(token)) if token == expected => next.run(request).await,
        _ => (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response(),
    }
}
