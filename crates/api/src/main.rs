use eventline_api::app;
use eventline_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    eventline_observability::init();

    let config = AppConfig::from_env();
    let services = app::build_services(&config)?;
    let dispatcher = services.dispatcher.clone();
    let router = app::build_app(services, &config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await?;

    dispatcher.shutdown().await;
    Ok(())
}
