pub mod auth;
pub mod cats;
pub mod generate;
pub mod media;
pub mod middleware;
pub mod videos;

use crate::cache::LocalCache;
use crate::generator::Generator;
use crate::relay::MediaRelay;
use axum::{
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::services::ServeDir;

/// Long-lived collaborators shared by every request.
#[derive(Clone)]
pub struct Services {
    pub generator: Arc<Generator>,
    pub relay: Arc<MediaRelay>,
    pub cache: LocalCache,
    /// Signs and verifies the session cookie.
    pub session_key: Key,
}

/// DashScope proxy endpoints. No session required.
pub fn proxy_routes() -> Router {
    Router::new()
        .route("/api/generate-image", post(generate::generate_image))
        .route("/api/generate-video", post(generate::generate_video))
        .route("/api/fetch-image", post(media::fetch_image))
        .route("/api/fetch-video", post(media::fetch_video))
}

pub fn session_routes() -> Router {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
}

pub fn cat_routes() -> Router {
    Router::new()
        .route("/api/cats", get(cats::list_cats).post(cats::adopt_cat))
        .route("/api/cats/:id", get(cats::get_cat).delete(cats::delete_cat))
        .route(
            "/api/cats/:id/videos",
            get(videos::list_cat_videos).post(videos::create_cat_video),
        )
        .route_layer(axum::middleware::from_fn(middleware::auth_middleware))
}

async fn health_check() -> &'static str {
    "OK"
}

/// Every route plus the shared services. The database connection is layered
/// on by the caller.
pub fn app(services: Services) -> Router {
    let cache_dir = services.cache.dir().to_path_buf();

    Router::new()
        .route("/health", get(health_check))
        .merge(proxy_routes())
        .merge(session_routes())
        .merge(cat_routes())
        .nest_service("/cache", ServeDir::new(cache_dir))
        .layer(Extension(services.generator))
        .layer(Extension(services.relay))
        .layer(Extension(services.cache))
        .layer(Extension(services.session_key))
        .layer(CookieManagerLayer::new())
}
