use anyhow::Context;

use tokoledger_api::config::ApiConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tokoledger_observability::init();

    let config = ApiConfig::from_env()?;
    let bind = config.bind;
    let app = tokoledger_api::app::build_app(config).await;

    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
