mod routes;

pub use routes::create_router;

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use climatelens_core::{
    ChartRenderer, ClimatePreview, Geocoder, NarrativeService, Report, ReportError,
    ReportPipeline, RiskDataProvider,
};
use serde::Serialize;
use std::sync::Arc;

/// What the HTTP layer needs from the report pipeline.
#[async_trait]
pub trait ReportService: Send + Sync {
    async fn preview(&self, address: &str) -> climatelens_core::Result<ClimatePreview>;
    async fn generate(&self, address: &str) -> climatelens_core::Result<Report>;
}

#[async_trait]
impl<G, P, N, R> ReportService for ReportPipeline<G, P, N, R>
where
    G: Geocoder + 'static,
    P: RiskDataProvider + 'static,
    N: NarrativeService + 'static,
    R: ChartRenderer + 'static,
{
    async fn preview(&self, address: &str) -> climatelens_core::Result<ClimatePreview> {
        ReportPipeline::preview(self, address).await
    }

    async fn generate(&self, address: &str) -> climatelens_core::Result<Report> {
        ReportPipeline::generate(self, address).await
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub reports: Arc<dyn ReportService>,
    pub start_time: std::time::Instant,
}

/// JSON response wrapper
#[derive(Serialize)]
pub struct JsonResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl<T: Serialize> JsonResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            kind: None,
        }
    }

    pub fn err(msg: impl Into<String>, kind: Option<&'static str>) -> JsonResponse<()> {
        JsonResponse {
            success: false,
            data: None,
            error: Some(msg.into()),
            kind,
        }
    }
}

/// Error type for HTTP handlers
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Report(ReportError),
    Internal(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Report(e) => match e {
                ReportError::GeocodingFailed { .. } => StatusCode::NOT_FOUND,
                ReportError::NarrativeServiceFailed(_)
                | ReportError::InvalidNarrativeFormat(_)
                | ReportError::NarrativeSchemaViolation { .. }
                | ReportError::DatasetFetchFailed { .. }
                | ReportError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, kind) = match &self {
            AppError::BadRequest(msg) => (msg.clone(), None),
            AppError::Report(e) => (e.to_string(), Some(e.kind_str())),
            AppError::Internal(e) => (e.to_string(), None),
        };
        if status.is_server_error() {
            tracing::error!(status = %status, "{}", message);
        } else {
            tracing::warn!(status = %status, "{}", message);
        }
        (status, Json(JsonResponse::<()>::err(message, kind))).into_response()
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        Self::Report(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;
