use std::path::PathBuf;

use rmcp::{ServiceExt, transport::stdio};

use council::config::Config;
use council::server::CouncilServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    load_dotenv();

    tracing::info!("council starting");

    let config = Config::load();
    tracing::info!(
        panel = %config.roles.panel,
        arbiter = %config.roles.arbiter,
        max_attempts = config.retry.max_attempts,
        "configuration loaded"
    );
    let server = CouncilServer::new(config);

    let service = server
        .serve(stdio())
        .await
        .inspect_err(|e| tracing::error!("serving error: {e:?}"))?;

    service.waiting().await?;

    tracing::info!("council shutting down");
    Ok(())
}

/// Load `.env` next to the binary, then the cargo project root (development
/// builds: target/release/../..), then dotenvy's default CWD search.
/// MCP clients may start the server from any working directory.
fn load_dotenv() {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from));

    if let Some(dir) = exe_dir {
        for candidate in [dir.join(".env"), dir.join("../../.env")] {
            if candidate.exists() {
                dotenvy::from_path(&candidate).ok();
                return;
            }
        }
    }
    dotenvy::dotenv().ok();
}
