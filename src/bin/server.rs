use axum::{routing::get, Extension, Router};
use catkeeper_server::api::{self, Services};
use catkeeper_server::cache::{self, LocalCache};
use catkeeper_server::config::Config;
use catkeeper_server::dashscope::DashScopeClient;
use catkeeper_server::generator::Generator;
use catkeeper_server::migrator;
use catkeeper_server::relay::{HttpSource, MediaRelay};
use catkeeper_server::storage::GcsStore;
use sea_orm::Database;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    catkeeper_server::telemetry::init_telemetry("catkeeper-server")?;

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            return Err(e.into());
        }
    };

    let (prometheus_layer, metric_handle) = axum_prometheus::PrometheusMetricLayer::pair();

    let db = Database::connect(&config.database_url).await?;

    use sea_orm_migration::MigratorTrait;
    migrator::Migrator::up(&db, None).await?;

    catkeeper_server::metrics::init_metrics(&db).await;

    let gcs_config = google_cloud_storage::client::ClientConfig::default()
        .with_auth()
        .await?;
    let gcs_client = google_cloud_storage::client::Client::new(gcs_config);

    let http = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .read_timeout(Duration::from_secs(30))
        .build()?;

    let provider = DashScopeClient::new(
        http.clone(),
        config.dashscope_api_key.clone(),
        config.dashscope_base_url.clone(),
    );
    let generator = Generator::new(
        Arc::new(provider),
        config.submit,
        config.image_poll,
        config.video_poll,
    );
    let relay = MediaRelay::new(
        Arc::new(HttpSource::new(http, Some(config.dashscope_api_key.clone()))),
        Arc::new(GcsStore::new(
            gcs_client,
            config.bucket.clone(),
            config.public_base_url.clone(),
        )),
    );

    let local_cache = LocalCache::open(config.cache_dir.clone()).await?;
    cache::spawn_sweeper(local_cache.clone(), cache::SWEEP_EVERY, cache::MAX_AGE);

    let services = Services {
        generator: Arc::new(generator),
        relay: Arc::new(relay),
        cache: local_cache,
        session_key: config.session_key.clone(),
    };

    let app = app(&config, services, db, prometheus_layer, metric_handle)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn app(
    config: &Config,
    services: Services,
    db: sea_orm::DatabaseConnection,
    prometheus_layer: axum_prometheus::PrometheusMetricLayer<'static>,
    metric_handle: metrics_exporter_prometheus::PrometheusHandle,
) -> Result<Router, axum::http::header::InvalidHeaderValue> {
    let origin = config.cors_origin.parse::<axum::http::HeaderValue>()?;

    Ok(api::app(services)
        .layer(Extension(db))
        .layer(prometheus_layer)
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<axum::body::Body>| {
                    let matched_path = request
                        .extensions()
                        .get::<axum::extract::MatchedPath>()
                        .map(|matched| matched.as_str());

                    // "POST /api/generate-image"
                    let span_name = match matched_path {
                        Some(path) => format!("{} {}", request.method(), path),
                        None => format!("{} {}", request.method(), request.uri().path()),
                    };

                    let user_ip = request
                        .headers()
                        .get("x-forwarded-for")
                        .and_then(|v| v.to_str().ok())
                        .or_else(|| {
                            request
                                .headers()
                                .get("x-real-ip")
                                .and_then(|v| v.to_str().ok())
                        })
                        .unwrap_or("unknown");

                    // Handlers fill in the empty fields.
                    tracing::info_span!(
                        "request",
                        "otel.name" = span_name,
                        user_ip = user_ip,
                        method = ?request.method(),
                        uri = ?request.uri(),
                        action = tracing::field::Empty,
                        user_id = tracing::field::Empty,
                        cat_id = tracing::field::Empty,
                        task_id = tracing::field::Empty,
                        business_event = tracing::field::Empty,
                        error = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency = tracing::field::Empty,
                    )
                })
                .on_request(|_request: &axum::http::Request<axum::body::Body>, _span: &tracing::Span| {})
                .on_response(
                    |response: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record("status", tracing::field::display(response.status()));
                        span.record("latency", tracing::field::debug(latency));
                        tracing::info!("request completed");
                    },
                ),
        )
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                ])
                .allow_headers([axum::http::header::CONTENT_TYPE])
                .allow_credentials(true),
        )
        .route("/metrics", get(|| async move { metric_handle.render() })))
}
