use super::middleware::SESSION_COOKIE;
use crate::entities::user;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, SqlErr};
use serde_json::json;
use tower_cookies::{Cookie, Cookies, Key};
use tracing::field::display;

#[derive(serde::Deserialize)]
pub struct Credentials {
    email: String,
    password: String,
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"success": false, "error": message}))).into_response()
}

pub async fn register(
    Extension(db): Extension<DatabaseConnection>,
    Json(payload): Json<Credentials>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    if email.is_empty() || payload.password.is_empty() {
        return error(StatusCode::BAD_REQUEST, "Email and password are required");
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = match Argon2::default().hash_password(payload.password.as_bytes(), &salt) {
        Ok(hash) => hash.to_string(),
        Err(_) => return error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to hash password"),
    };

    let now = chrono::Utc::now().naive_utc();
    let new_user = user::ActiveModel {
        email: Set(email),
        password_hash: Set(password_hash),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };

    match new_user.insert(&db).await {
        Ok(user) => {
            tracing::Span::current()
                .record("action", "register_user")
                .record("user_id", user.id)
                .record("business_event", "User registered successfully");

            crate::metrics::increment_users_registered();

            (
                StatusCode::CREATED,
                Json(json!({"success": true, "id": user.id, "email": user.email})),
            )
                .into_response()
        }
        Err(e) => {
            if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                tracing::Span::current()
                    .record("action", "register_user_failed")
                    .record("error", "duplicate_email");
                return error(StatusCode::CONFLICT, "Email already exists");
            }

            tracing::Span::current()
                .record("action", "register_user_error")
                .record("error", display(&e));
            error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string())
        }
    }
}

pub async fn login(
    Extension(db): Extension<DatabaseConnection>,
    Extension(key): Extension<Key>,
    cookies: Cookies,
    Json(payload): Json<Credentials>,
) -> Response {
    let email = payload.email.trim().to_lowercase();
    let user = match user::Entity::find()
        .filter(user::Column::Email.eq(email))
        .one(&db)
        .await
    {
        Ok(Some(u)) => u,
        Ok(None) => return error(StatusCode::UNAUTHORIZED, "Invalid email or password"),
        Err(e) => return error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let parsed_hash = match PasswordHash::new(&user.password_hash) {
        Ok(h) => h,
        Err(_) => return error(StatusCode::INTERNAL_SERVER_ERROR, "Invalid password hash in DB"),
    };

    if Argon2::default()
        .verify_password(payload.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        tracing::Span::current()
            .record("action", "login_user_failed")
            .record("error", "invalid_credentials");
        return error(StatusCode::UNAUTHORIZED, "Invalid email or password");
    }

    let mut cookie = Cookie::new(SESSION_COOKIE, user.id.to_string());
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookies.signed(&key).add(cookie);

    tracing::Span::current()
        .record("action", "login_user")
        .record("user_id", user.id)
        .record("business_event", "User logged in successfully");

    (
        StatusCode::OK,
        Json(json!({"success": true, "id": user.id, "email": user.email})),
    )
        .into_response()
}

pub async fn logout(cookies: Cookies) -> Response {
    let mut cookie = Cookie::from(SESSION_COOKIE);
    cookie.set_path("/");
    cookies.remove(cookie);

    tracing::Span::current().record("action", "logout_user");
    (StatusCode::OK, Json(json!({"success": true}))).into_response()
}
