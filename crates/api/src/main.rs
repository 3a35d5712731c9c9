use anyhow::Context;

use herdbook_config::AppConfig;
use herdbook_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    herdbook_observability::init(LogFormat::from_json_flag(config.logging.json));

    if config.auth.jwt_secret == "dev-secret" {
        tracing::warn!("auth.jwt_secret not set; using insecure dev default");
    }

    let bind_addr = config.http.bind_addr();
    let app = herdbook_api::app::build_app(config).await?;

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
