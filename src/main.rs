use clap::Parser;
use hawk_apiserver::{ApplicationConfig, entrypoint};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, fmt::time::ChronoUtc, prelude::*};

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(
                    EnvFilter::builder()
                        .with_default_directive(LevelFilter::INFO.into())
                        .from_env_lossy(),
                ),
        )
        .with(ErrorLayer::default())
        .init();
    let config = ApplicationConfig::parse();
    entrypoint(config).await
}
