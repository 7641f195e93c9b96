mod clients;
mod config;
mod http;
mod serve;

use anyhow::Context;
use clap::Parser;
use config::{Cli, Commands};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    cli.settings.validate()?;

    match cli.command {
        Commands::Serve => {
            info!("Starting ClimateLens v{}", env!("CARGO_PKG_VERSION"));
            serve::run(cli.settings).await
        }
        Commands::Generate(args) => {
            let pipeline = serve::build_pipeline(&cli.settings)?;
            let report = pipeline.generate(&args.address).await?;
            let output = args
                .output
                .unwrap_or_else(|| report.file_name().into());
            std::fs::write(&output, &report.document.bytes)
                .with_context(|| format!("writing {}", output.display()))?;
            info!(
                "Wrote {} ({} pages, charts {:?})",
                output.display(),
                report.document.page_count(),
                report.charts
            );
            if !report.failed_datasets.is_empty() {
                info!("Datasets unavailable: {:?}", report.failed_datasets);
            }
            Ok(())
        }
        Commands::Preview(args) => {
            let pipeline = serve::build_pipeline(&cli.settings)?;
            let preview = pipeline.preview(&args.address).await?;
            println!("{}", serde_json::to_string_pretty(&preview)?);
            Ok(())
        }
    }
}
