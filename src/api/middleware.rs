use axum::{
    extract::{Extension, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tower_cookies::{Cookies, Key};

pub const SESSION_COOKIE: &str = "catkeeper_user";

/// Rejects requests without a valid signed session cookie and exposes the
/// user id as an `i32` extension.
pub async fn auth_middleware(
    Extension(key): Extension<Key>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let session = cookies
        .signed(&key)
        .get(SESSION_COOKIE)
        .and_then(|cookie| cookie.value().parse::<i32>().ok());

    if let Some(user_id) = session {
        tracing::Span::current().record("user_id", user_id);
        request.extensions_mut().insert(user_id);
        return next.run(request).await;
    }
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"success": false, "error": "Unauthorized", "code": "unauthorized"})),
    )
        .into_response()
}
