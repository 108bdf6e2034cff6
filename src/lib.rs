//! Data layer and HTTP surface of a restaurant directory backed by Redis.
//!
//! Restaurants, reviews and cuisines are kept as Redis hashes, lists, sets and a sorted set.
//! The average rating and the ranking derived from reviews are updated in the same atomic step
//! as the review itself. A per-restaurant weather lookup is cached for a fixed window.
//!
//! # Layout
//!
//! - [`keys`]: key namespace, `prefix:kind:id`
//! - [`database`]: store facade trait, [`redis_store`] and [`memory`] implementations
//! - [`gate`]: restaurant existence check run before every restaurant-scoped operation
//! - [`restaurants`], [`reviews`], [`ranking`], [`cuisines`], [`weather`]: the operations
//! - [`routes`]: axum handlers, [`error`]: failure taxonomy and its HTTP mapping
//!
//! # Known gaps
//!
//! - The existence check and the operation it guards are separate round trips.
//! - Reading a restaurant bumps `viewCount` and fetches the hash concurrently, so the count in
//!   a response may already include other readers.
//! - Deleting a review does not touch the average unless `RECOMPUTE_ON_DELETE` is set.
//! - Cuisine sets are never pruned; restaurants cannot be deleted.
//!
//! # Setup
//!
//! Needs Redis with the RedisJSON module for restaurant details.
//! ```sh
//! docker run -p 6379:6379 redis/redis-stack-server
//! RUST_LOG=info WEATHER_API_KEY=... cargo run
//! ```
//!
//! Without Redis.
//! ```sh
//! RUST_LOG=debug cargo run -- --memory
//! ```
use std::time::Duration;

use axum::http::{
    Method,
    header::CONTENT_TYPE,
};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub mod config;
pub mod cuisines;
pub mod database;
pub mod error;
pub mod gate;
pub mod keys;
pub mod memory;
pub mod ranking;
pub mod redis_store;
pub mod restaurants;
pub mod reviews;
pub mod routes;
pub mod state;
pub mod utils;
pub mod weather;

use config::Config;
use error::AppError;
use state::{AppState, Backend};

pub async fn start_server(config: Config, backend: Backend) -> Result<(), AppError> {
    info!("Initializing state...");
    let state = AppState::new(config, backend).await?;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = routes::router(state.clone()).layer(cors);

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| AppError::Config(format!("cannot bind {address}: {e}")))?;
    info!("Server running on {address}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    state.store.close().await;
    info!("Server shut down");

    served.map_err(|e| AppError::Internal(format!("server error: {e}")))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
