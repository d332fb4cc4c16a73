use recipe_api::{app, config::Config, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::load();
    let state = AppState::new(&config.data_dir)?;

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    info!("recipe API listening on http://0.0.0.0:{}", config.port);
    info!("data directory: {}", config.data_dir.display());

    axum::serve(listener, app(state)).await?;
    Ok(())
}
