use crate::clients::{http_client, EnviroTrustClient, GroqNarrator, NominatimGeocoder};
use crate::config::Settings;
use crate::http::{create_router, AppState};
use anyhow::Context;
use climatelens_core::{RasterChartRenderer, ReportPipeline};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub type Pipeline =
    ReportPipeline<NominatimGeocoder, EnviroTrustClient, GroqNarrator, RasterChartRenderer>;

/// Wire the upstream clients into a report pipeline.
pub fn build_pipeline(settings: &Settings) -> anyhow::Result<Pipeline> {
    let config = settings.pipeline_config();
    let backstop = config
        .fetch_timeout
        .max(config.geocode_timeout)
        .max(config.narrative_timeout)
        + Duration::from_secs(5);
    let http = http_client(backstop)?;

    let provider_key = settings
        .provider_api_key
        .clone()
        .context("risk-data provider API key missing")?;
    let narrative_key = settings
        .narrative_api_key
        .clone()
        .context("narrative service API key missing")?;

    let geocoder = NominatimGeocoder::new(
        http.clone(),
        &settings.geocoder_url,
        settings.geocoder_user_agent.clone(),
    );
    let provider = EnviroTrustClient::new(http.clone(), &settings.provider_url, provider_key);
    let narrator = GroqNarrator::new(
        http,
        &settings.narrative_url,
        narrative_key,
        settings.narrative_model.clone(),
        settings.narrative_temperature,
    );

    Ok(ReportPipeline::new(
        geocoder,
        provider,
        narrator,
        RasterChartRenderer::new(),
        config,
    ))
}

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let pipeline = build_pipeline(&settings)?;
    let state = AppState {
        reports: Arc::new(pipeline),
        start_time: std::time::Instant::now(),
    };
    let app = create_router(state, &settings.cors_origins);

    info!("Starting HTTP server on {}", settings.http_addr);
    info!("CORS origins: {:?}", settings.cors_origins);
    let listener = tokio::net::TcpListener::bind(settings.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.http_addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal, draining connections...");
}
