//! Web server module

mod error;
mod middleware;
mod routes;

use anyhow::Result;
use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::prediction::Predictor;
use crate::query::QueryService;
use middleware::RequestLoggingLayer;

pub struct AppState {
    pub db: Database,
    pub queries: QueryService,
    pub predictor: Arc<dyn Predictor>,
}

impl AppState {
    pub fn new(db: Database, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            queries: QueryService::new(db.clone()),
            db,
            predictor,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    // Map pages are served from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/statuses", get(routes::api_statuses))
        .route("/vessels", get(routes::api_reports).post(routes::api_ingest))
        .route("/vessels/latest", get(routes::api_latest))
        .route("/vessels/catalog", get(routes::api_catalog))
        .route("/vessels/:mmsi/history", get(routes::api_history))
        .route("/vessels/:mmsi/latest", get(routes::api_vessel_latest))
        .route("/predict/type", post(routes::api_predict_type))
        .route(
            "/predict/trajectory",
            get(routes::api_predict_trajectory_query).post(routes::api_predict_trajectory_form),
        )
        .route("/predict/cluster", post(routes::api_predict_cluster))
        .route("/predict/clusters", get(routes::api_clusters))
        .layer(RequestLoggingLayer)
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: &Config, state: Arc<AppState>) -> Result<()> {
    let app = router(state);

    let addr = config.bind_address();
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
