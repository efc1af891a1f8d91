use clap::Parser;
use neuphonic_cli::{cli::Cli, commands};
use tracing_subscriber::{EnvFilter, fmt::time::ChronoLocal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_timer(ChronoLocal::rfc_3339())
        .with_writer(std::io::stderr)
        .init();

    commands::run(cli).await
}
