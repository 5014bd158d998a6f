use server::{config::ServerConfig, start_server};
use utils::logging::init_tracing;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::debug!(?config, "Loaded server configuration");
    start_server(config).await
}
