use super::{AppError, AppResult, AppState, JsonResponse};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use climatelens_core::ClimatePreview;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/report/preview", post(preview))
        .route("/report/download", get(download))
        .route("/contact", post(contact))
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .expose_headers([header::CONTENT_DISPOSITION])
}

#[derive(Serialize)]
struct HealthResponse {
    healthy: bool,
    version: String,
    uptime_seconds: u64,
}

async fn health(State(state): State<AppState>) -> Json<JsonResponse<HealthResponse>> {
    Json(JsonResponse::ok(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    }))
}

#[derive(Deserialize)]
struct AddressRequest {
    address: String,
}

fn required_address(address: &str) -> AppResult<&str> {
    let address = address.trim();
    if address.is_empty() {
        return Err(AppError::BadRequest("address must not be empty".into()));
    }
    Ok(address)
}

async fn preview(
    State(state): State<AppState>,
    Json(body): Json<AddressRequest>,
) -> AppResult<Json<ClimatePreview>> {
    let address = required_address(&body.address)?;
    let preview = state.reports.preview(address).await?;
    Ok(Json(preview))
}

async fn download(
    State(state): State<AppState>,
    Query(query): Query<AddressRequest>,
) -> AppResult<Response> {
    let address = required_address(&query.address)?;
    let report = state.reports.generate(address).await?;
    let disposition = content_disposition(&report.file_name())?;
    tracing::info!(
        request_id = %report.request_id,
        pages = report.document.page_count(),
        bytes = report.document.bytes.len(),
        "Serving report"
    );
    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/pdf")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        report.document.bytes,
    )
        .into_response())
}

/// Attachment header with an ASCII fallback name plus the RFC 5987 UTF-8 form.
fn content_disposition(file_name: &str) -> AppResult<HeaderValue> {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let value = format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(file_name)
    );
    HeaderValue::from_str(&value).map_err(|e| AppError::Internal(e.into()))
}

#[derive(Deserialize)]
struct ContactRequest {
    name: String,
    email: String,
    message: String,
}

#[derive(Serialize)]
struct ContactResponse {
    status: &'static str,
    message: &'static str,
}

async fn contact(Json(body): Json<ContactRequest>) -> Json<ContactResponse> {
    tracing::info!(
        name = %body.name,
        email = %body.email,
        length = body.message.len(),
        "Contact form submission"
    );
    Json(ContactResponse {
        status: "success",
        message: "Thank you for contacting us!",
    })
}
