use std::sync::Arc;

use anyhow::Context;

use weighbridge_api::app::{AppServices, build_app};
use weighbridge_infra::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    weighbridge_observability::init();

    let settings = Settings::from_env();
    let bind_addr = settings.bind_addr.clone();

    let services = AppServices::from_settings(settings)
        .await
        .context("failed to initialise stores")?;
    tracing::info!(backend = services.backend().as_str(), "stores ready");

    let app = build_app(Arc::new(services));

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
