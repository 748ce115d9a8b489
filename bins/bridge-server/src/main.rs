mod cli;
mod error;
mod serve;

use clap::Parser;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = cli::Cli::parse();
    if let Err(e) = serve::run(cli).await {
        tracing::error!(error = %e, "metadata bridge failed");
        std::process::exit(1);
    }
}
