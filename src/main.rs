pub mod api;
mod config;
mod providers;
mod sync;

use std::sync::Arc;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use providers::{five_eleven, FiveElevenClient};
use sync::{PredictionStore, RefreshManager};

#[derive(OpenApi)]
#[openapi(
    info(title = "Muni Display API", version = "0.1.0"),
    paths(
        api::predictions::list_predictions,
        api::predictions::get_predictions_by_stop,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::predictions::PredictionListResponse,
        api::predictions::StopPredictionsResponse,
        api::health::HealthResponse,
        sync::Stop,
        sync::Prediction,
    )),
    tags(
        (name = "predictions", description = "Cached departure predictions"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    tracing::info!(stops = config.stops.len(), "Loaded configuration");

    let access_token = config
        .provider_key(five_eleven::SOURCE)
        .expect("No 511.org access token provided in config keys")
        .to_string();
    let timezone = config
        .display_timezone()
        .expect("Invalid timezone in config");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Start the refresh loop in the background
    let predictor = FiveElevenClient::new(access_token).expect("Failed to build 511.org client");
    let store = Arc::new(PredictionStore::new());
    let stops = Arc::new(config.stops.clone());

    let manager = Arc::new(RefreshManager::new(
        stops.clone(),
        store.clone(),
        predictor,
        Duration::from_secs(config.refresh.check_interval_secs),
        timezone,
    ));
    tokio::spawn(async move {
        manager.start().await;
    });

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(store, stops))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .expect("Failed to bind to configured address");

    tracing::info!(address = %config.bind_address, "Server running");
    tracing::info!("Swagger UI: http://{}/swagger-ui", config.bind_address);

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Muni Display API"
}
