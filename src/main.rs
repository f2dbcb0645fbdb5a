use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use backend::{
    AppState,
    config::Config,
    middleware::{RateLimiter, auth_middleware, log_errors, rate_limit},
    routes,
};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    if config.cloudinary_api_key.is_none() {
        tracing::warn!("Cloudinary credentials missing; image routes will answer 503");
    }
    if config.firebase_api_key.is_none() || config.firebase_project_id.is_none() {
        tracing::warn!("Firebase configuration missing; auth routes will answer 503");
    }

    // One shared outbound client. The User-Agent is mandatory for Nominatim.
    let http = reqwest::Client::builder()
        .user_agent(config.outbound_user_agent.clone())
        .build()
        .expect("Failed to build HTTP client");

    let state = AppState {
        config: config.clone(),
        http,
    };

    let rate_limiter = Arc::new(RateLimiter::new(config.clone()));

    // Expired rate-limit entries are swept in the background.
    let sweeper = rate_limiter.clone();
    let sweep_interval = config.rate_limit_sweep();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            let removed = sweeper.sweep_expired().await;
            if removed > 0 {
                tracing::debug!("swept {} expired rate-limit entries", removed);
            }
        }
    });

    let public_routes = Router::new()
        .route("/health", get(routes::health::ping))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/geo/reverse", get(routes::geo::reverse_geocode))
        .route("/geo/route", get(routes::geo::route));

    let protected_routes = Router::new()
        .route("/auth/session", get(routes::auth::session))
        .route("/memories/upload", post(routes::memory::upload_image))
        .route("/memories/list", get(routes::memory::list_memories))
        .route("/memories/delete", post(routes::memory::delete_image))
        .route("/memories/delete-memory", post(routes::memory::delete_memory))
        .layer(axum::middleware::from_fn(auth_middleware));

    let router = Router::new().nest(
        &config.api_base_uri.clone(),
        Router::new().merge(public_routes).merge(protected_routes),
    );

    let router = router.layer(axum::middleware::from_fn(log_errors)).layer(
        axum::middleware::from_fn_with_state(rate_limiter, rate_limit),
    );

    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    let app = router.with_state(state.clone());

    let addr = SocketAddr::new(
        state.config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        state.config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
