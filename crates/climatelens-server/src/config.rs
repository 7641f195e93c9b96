use clap::{Args, Parser, Subcommand};
use climatelens_core::{DocumentConfig, FontSource, PipelineConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "climatelens")]
#[command(version, about = "Climate and ESG risk reports for property addresses")]
pub struct Cli {
    #[command(flatten)]
    pub settings: Settings,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP API
    Serve,
    /// Generate a PDF report for one address
    Generate(GenerateArgs),
    /// Print the risk preview for one address as JSON
    Preview(PreviewArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Property address
    #[arg(long)]
    pub address: String,

    /// Output path. Defaults to `{address}_ClimateReport.pdf` in the current directory
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PreviewArgs {
    /// Property address
    #[arg(long)]
    pub address: String,
}

/// Process-wide settings. Read once at startup.
#[derive(Args, Debug, Clone)]
pub struct Settings {
    /// HTTP listen address
    #[arg(long, global = true, env = "CLIMATELENS_HTTP_ADDR", default_value = "0.0.0.0:8000")]
    pub http_addr: SocketAddr,

    /// Allowed CORS origins (comma separated)
    #[arg(
        long,
        global = true,
        env = "CLIMATELENS_CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:8080,http://127.0.0.1:8080"
    )]
    pub cors_origins: Vec<String>,

    /// Risk-data provider base URL
    #[arg(
        long,
        global = true,
        env = "CLIMATELENS_PROVIDER_URL",
        default_value = "https://api.envirotrust.eu"
    )]
    pub provider_url: String,

    /// Risk-data provider API key
    #[arg(long, global = true, env = "ENVIROTRUST_API_KEY", hide_env_values = true)]
    pub provider_api_key: Option<String>,

    /// Narrative service base URL (OpenAI-compatible)
    #[arg(
        long,
        global = true,
        env = "CLIMATELENS_NARRATIVE_URL",
        default_value = "https://api.groq.com/openai/v1"
    )]
    pub narrative_url: String,

    /// Narrative service API key
    #[arg(long, global = true, env = "GROQ_API_KEY", hide_env_values = true)]
    pub narrative_api_key: Option<String>,

    /// Narrative model
    #[arg(long, global = true, env = "CLIMATELENS_NARRATIVE_MODEL", default_value = "qwen/qwen3-32b")]
    pub narrative_model: String,

    /// Sampling temperature for the narrative model
    #[arg(long, global = true, env = "CLIMATELENS_NARRATIVE_TEMPERATURE", default_value = "0.1")]
    pub narrative_temperature: f32,

    /// Geocoder search endpoint (Nominatim-compatible)
    #[arg(
        long,
        global = true,
        env = "CLIMATELENS_GEOCODER_URL",
        default_value = "https://nominatim.openstreetmap.org"
    )]
    pub geocoder_url: String,

    /// User-Agent sent to the geocoder
    #[arg(long, global = true, env = "CLIMATELENS_GEOCODER_USER_AGENT", default_value = "climatelens/0.1")]
    pub geocoder_user_agent: String,

    /// Per-dataset fetch timeout in seconds
    #[arg(long, global = true, env = "CLIMATELENS_FETCH_TIMEOUT", default_value = "60")]
    pub fetch_timeout: u64,

    /// Geocoding timeout in seconds
    #[arg(long, global = true, env = "CLIMATELENS_GEOCODE_TIMEOUT", default_value = "10")]
    pub geocode_timeout: u64,

    /// Narrative generation timeout in seconds
    #[arg(long, global = true, env = "CLIMATELENS_NARRATIVE_TIMEOUT", default_value = "120")]
    pub narrative_timeout: u64,

    /// Parent directory for per-request chart scratch space
    #[arg(long, global = true, env = "CLIMATELENS_SCRATCH_DIR")]
    pub scratch_dir: Option<PathBuf>,

    /// Cover-page logo image
    #[arg(long, global = true, env = "CLIMATELENS_LOGO")]
    pub logo: Option<PathBuf>,

    /// TrueType font for body text. Requires --font-bold
    #[arg(long, global = true, env = "CLIMATELENS_FONT_REGULAR", requires = "font_bold")]
    pub font_regular: Option<PathBuf>,

    /// TrueType font for headings. Requires --font-regular
    #[arg(long, global = true, env = "CLIMATELENS_FONT_BOLD", requires = "font_regular")]
    pub font_bold: Option<PathBuf>,
}

impl Settings {
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_fetch_timeout(Duration::from_secs(self.fetch_timeout))
            .with_geocode_timeout(Duration::from_secs(self.geocode_timeout))
            .with_narrative_timeout(Duration::from_secs(self.narrative_timeout))
            .with_document(self.document_config());
        if let Some(dir) = &self.scratch_dir {
            config = config.with_scratch_root(dir);
        }
        config
    }

    pub fn document_config(&self) -> DocumentConfig {
        let mut config = DocumentConfig::default();
        if let Some(logo) = &self.logo {
            config = config.with_logo(logo);
        }
        if let (Some(regular), Some(bold)) = (&self.font_regular, &self.font_bold) {
            config = config.with_font(FontSource::TrueType {
                regular: regular.clone(),
                bold: bold.clone(),
            });
        }
        config
    }

    /// Fail fast on settings that would only surface mid-request.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.provider_api_key.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("ENVIROTRUST_API_KEY is not set (or pass --provider-api-key)");
        }
        if self.narrative_api_key.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("GROQ_API_KEY is not set (or pass --narrative-api-key)");
        }
        if !(0.0..=2.0).contains(&self.narrative_temperature) {
            anyhow::bail!(
                "narrative temperature must be between 0 and 2, got {}",
                self.narrative_temperature
            );
        }
        for (name, secs) in [
            ("fetch", self.fetch_timeout),
            ("geocode", self.geocode_timeout),
            ("narrative", self.narrative_timeout),
        ] {
            if secs == 0 {
                anyhow::bail!("{} timeout must be at least one second", name);
            }
        }
        for font in [&self.font_regular, &self.font_bold].into_iter().flatten() {
            if !font.is_file() {
                anyhow::bail!("font asset {} not found", font.display());
            }
        }
        if let Some(dir) = &self.scratch_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
