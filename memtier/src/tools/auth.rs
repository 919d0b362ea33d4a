use axum::body::Body;
use axum::extract::State;
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderValue, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sha2::{Digest, Sha256};

use super::AppState;

/// Identity attached to the request by `tool_auth_middleware`, readable by
/// tool handlers via the MCP request's extensions.
#[derive(Debug, Clone)]
pub struct ToolAuthContext {
    pub user_id: String,
}

/// Bearer-token gate on the tool-dispatch transport (§6.2 `TOOL_API_KEYS`).
/// The distilled spec lists authN/authZ as a core Non-goal for the pipeline
/// itself, but a network-facing tool endpoint still needs a shared-secret
/// gate at the transport boundary.
pub async fn tool_auth_middleware(State(state): State<AppState>, mut request: Request<Body>, next: Next) -> Response {
    if state.api_keys.is_empty() {
        return unauthorized_json_rpc("Unauthorized: no API keys configured. Set TOOL_API_KEYS to enable tool access.");
    }

    let Some(auth_header) = request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok()) else {
        return unauthorized_challenge("Unauthorized");
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return unauthorized_json_rpc("Unauthorized: invalid authorization header format. Expected: Bearer <token>");
    };
    let token = token.to_string();

    if !state.api_keys.iter().any(|key| key == &token) {
        return unauthorized_json_rpc("Unauthorized: invalid or expired API key");
    }

    request.extensions_mut().insert(ToolAuthContext {
        user_id: user_id_from_api_key(&token),
    });

    next.run(request).await
}

pub fn auth_context_from_parts(parts: &axum::http::request::Parts) -> Option<ToolAuthContext> {
    parts.extensions.get::<ToolAuthContext>().cloned()
}

fn user_id_from_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    let digest = hasher.finalize();
    let hash = format!("{digest:x}");
    format!("api_key_{}", &hash[..16])
}

fn unauthorized_challenge(message: &str) -> Response {
    let mut response = (StatusCode::UNAUTHORIZED, message.to_string()).into_response();
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer"),
    );
    response
}

fn unauthorized_json_rpc(message: &str) -> Response {
    let payload = json!({
        "jsonrpc": "2.0",
        "error": { "code": -32000, "message": message },
        "id": serde_json::Value::Null,
    });

    let mut response = (StatusCode::UNAUTHORIZED, axum::Json(payload)).into_response();
    response.headers_mut().insert(
        WWW_AUTHENTICATE,
        HeaderValue::from_static("Bearer error=\"invalid_token\""),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_id_is_stable_and_hides_key() {
        let user_id = user_id_from_api_key("super-secret");
        assert!(user_id.starts_with("api_key_"));
        assert_ne!(user_id, "super-secret");
        assert_eq!(user_id.len(), "api_key_".len() + 16);
    }

    #[test]
    fn test_user_id_is_deterministic() {
        assert_eq!(user_id_from_api_key("same-key"), user_id_from_api_key("same-key"));
    }
}
