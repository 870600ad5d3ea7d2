use gridbase::config::Settings;
use gridbase::http::{router, AppState};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info")).unwrap();
    fmt().with_env_filter(filter).init();

    let settings = Settings::from_env();
    info!(
        target: "gridbase",
        "gridbase starting: http_port={}, batch_size={}, delay={:?}, use_rabbitmq={}",
        settings.http_port, settings.batch_size, settings.delay, settings.use_rabbitmq
    );

    let port = settings.http_port;
    let app = router(AppState::new(settings));
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(target: "gridbase", "listening on 0.0.0.0:{port}");
    axum::serve(listener, app).await?;
    Ok(())
}
