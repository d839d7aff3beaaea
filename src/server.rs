use crate::dashboard::{Dashboard, Selection};
use crate::error::DashboardError;
use crate::render::{encode_png, render_png};
use crate::types::{Gender, MapLayer, Tab};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{error, info};

pub struct AppState {
    pub dashboard: Dashboard,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    gender: Option<Gender>,
    tab: Option<Tab>,
    rank_limit: Option<usize>,
    venue_limit: Option<usize>,
    /// Comma-separated multiselect values.
    countries: Option<String>,
}

impl ViewParams {
    fn selection(&self, dashboard: &Dashboard) -> Selection {
        let mut selection = Selection::new(
            dashboard.config(),
            self.gender.unwrap_or(Gender::Men),
            self.tab.unwrap_or(Tab::Intro),
        );
        if let Some(limit) = self.rank_limit {
            selection.rank_limit = limit;
        }
        if let Some(limit) = self.venue_limit {
            selection.venue_limit = limit;
        }
        if let Some(countries) = &self.countries {
            selection.countries = countries
                .split(',')
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect();
        }
        selection.clamped()
    }
}

pub enum ApiError {
    Dashboard(DashboardError),
    Internal(String),
}

impl From<DashboardError> for ApiError {
    fn from(err: DashboardError) -> Self {
        ApiError::Dashboard(err)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Dashboard(DashboardError::ReferenceUnavailable { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Dashboard(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Dashboard(err) => err.to_string(),
            ApiError::Internal(msg) => msg.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        error!(%status, error = %message, "request failed");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let static_dir = state.dashboard.config().server.static_dir.clone();

    let app = Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/map/:gender/:layer", get(geojson_handler))
        .route("/api/map/:gender/:layer/png", get(png_handler));

    let app = match static_dir {
        Some(dir) => app.fallback_service(ServeDir::new(dir)),
        None => app,
    };

    app.layer(CorsLayer::permissive()).with_state(state)
}

pub async fn start_server(dashboard: Dashboard) -> Result<()> {
    let port = dashboard.config().server.port;
    let state = Arc::new(AppState { dashboard });

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn view_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ViewParams>,
) -> Result<Response, ApiError> {
    let selection = params.selection(&state.dashboard);
    let view = tokio::task::spawn_blocking(move || state.dashboard.render(&selection)).await??;
    Ok(Json(view).into_response())
}

async fn geojson_handler(
    State(state): State<Arc<AppState>>,
    Path((gender, layer)): Path<(Gender, MapLayer)>,
) -> Result<Response, ApiError> {
    let choropleth =
        tokio::task::spawn_blocking(move || state.dashboard.choropleth(gender, layer)).await??;
    Ok((
        [(header::CONTENT_TYPE, "application/geo+json")],
        Json(choropleth.to_geojson()),
    )
        .into_response())
}

async fn png_handler(
    State(state): State<Arc<AppState>>,
    Path((gender, layer)): Path<(Gender, MapLayer)>,
) -> Result<Response, ApiError> {
    let bytes = tokio::task::spawn_blocking(move || {
        let output = &state.dashboard.config().output;
        let choropleth = state.dashboard.choropleth(gender, layer)?;
        let img = render_png(&choropleth, output.width, output.height)?;
        encode_png(&img)
    })
    .await??;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}
