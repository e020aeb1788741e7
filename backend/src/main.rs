use anyhow::Context;
use backend::config::Config;
use backend::logging::init_logging;
use backend::{app, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_logging(&config);

    let state = AppState::from_config(&config)
        .await
        .context("failed to open participant store")?;
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    tracing::info!(
        addr = %config.bind_addr,
        reveal_policy = ?config.reveal_policy,
        persist_path = ?config.persist_path,
        "starting server"
    );
    axum::serve(listener, app).await?;
    Ok(())
}
