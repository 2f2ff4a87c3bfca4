use crate::gateway::auth;
use crate::gateway::server::GatewayState;
use crate::store::SecretError;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::{
    headers::{authorization::Basic, Authorization},
    TypedHeader,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

/// Build all routes for the gateway. Secret and webhook paths come from
/// configuration.
pub fn build_routes(state: GatewayState) -> Router {
    let get_path = state.config.api_get_path.clone();
    let post_path = state.config.api_post_path.clone();
    let webhook_path = state.config.webhook_path.clone();

    Router::new()
        // Health
        .route("/health", get(health_handler))
        // Secrets
        .route(&get_path, get(get_secret_handler))
        .route(&post_path, post(post_secret_handler))
        // Webhooks
        .route(&webhook_path, post(webhook_handler))
        .with_state(state)
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
struct SecretResponse {
    name: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct PushedResponse {
    name: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    error: String,
}

fn error_response(status: StatusCode, name: Option<String>, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            name,
            error: message.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Health
// ============================================================================

async fn health_handler() -> &'static str {
    "OK"
}

// ============================================================================
// Secrets
// ============================================================================

#[derive(Debug, Deserialize)]
struct GetSecretQuery {
    #[serde(default)]
    name: String,
}

async fn get_secret_handler(
    State(state): State<GatewayState>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    Query(query): Query<GetSecretQuery>,
) -> Response {
    if let Some(denied) = check_auth(&state, &credentials) {
        return denied;
    }
    if query.name.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            None,
            "Missing 'name' query parameter",
        );
    }

    debug!("received GET request for secret '{}'", query.name);
    match state.secrets.get_secret(&query.name).await {
        Ok(value) => {
            debug!("completed GET request for secret '{}'", query.name);
            Json(SecretResponse {
                name: query.name,
                value,
            })
            .into_response()
        }
        Err(SecretError::NotFound { name }) => {
            error_response(StatusCode::NOT_FOUND, Some(name), "Secret not found")
        }
        Err(err) => {
            error!("error retrieving secret '{}': {}", query.name, err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(query.name),
                "An error occurred retrieving secret",
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PostSecretRequest {
    name: String,
    value: String,
}

async fn post_secret_handler(
    State(state): State<GatewayState>,
    credentials: Option<TypedHeader<Authorization<Basic>>>,
    body: Bytes,
) -> Response {
    if let Some(denied) = check_auth(&state, &credentials) {
        return denied;
    }
    if !state.config.git_push_enabled {
        return error_response(
            StatusCode::BAD_REQUEST,
            None,
            "Push is not enabled, set GIT_PUSH_ENABLED to allow writes",
        );
    }

    let request: PostSecretRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            debug!("rejected malformed post body: {}", err);
            return error_response(
                StatusCode::BAD_REQUEST,
                None,
                "Request body must be JSON with 'name' and 'value' fields",
            );
        }
    };
    if request.name.is_empty() || request.value.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            None,
            "Fields 'name' and 'value' must not be empty",
        );
    }

    debug!("received POST request for secret '{}'", request.name);
    match state.secrets.put_secret(&request.name, &request.value).await {
        Ok(()) => Json(PushedResponse { name: request.name }).into_response(),
        Err(err) => {
            error!("error storing secret '{}': {}", request.name, err);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                Some(request.name),
                "An error occurred storing secret",
            )
        }
    }
}

// ============================================================================
// Webhooks
// ============================================================================

async fn webhook_handler(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    // Always ack; outcomes are logged, refreshes run in the background.
    state.webhooks.handle(&headers, &body);
    StatusCode::OK
}

// ============================================================================
// Auth
// ============================================================================

fn check_auth(
    state: &GatewayState,
    credentials: &Option<TypedHeader<Authorization<Basic>>>,
) -> Option<Response> {
    let provided = credentials
        .as_ref()
        .map(|TypedHeader(Authorization(basic))| (basic.username(), basic.password()));
    if auth::authorize(state.config.api_auth.as_ref(), provided) {
        return None;
    }
    warn!("rejected request with missing or invalid credentials");
    Some(
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, auth::WWW_AUTHENTICATE_CHALLENGE)],
            Json(ErrorResponse {
                name: None,
                error: "Unauthorized".to_string(),
            }),
        )
            .into_response(),
    )
}
