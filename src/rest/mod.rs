// rest/mod.rs — Read-mostly HTTP surface beside the realtime channel.
//
// Endpoints:
//   GET  /         health text
//   GET  /health   JSON status
//   GET  /tasks    all persisted tasks, flat array (500 on store failure)
//   POST /users    dedupe registration
//   GET  /users    registered users

pub mod routes;

use anyhow::Result;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.http_port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("HTTP server listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    let cors = cors_layer(&ctx.config.cors_origins);
    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health))
        .route("/tasks", get(routes::tasks::list_tasks))
        .route(
            "/users",
            get(routes::users::list_users).post(routes::users::register_user),
        )
        .layer(cors)
        .with_state(ctx)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "invalid CORS origin — skipped");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}
