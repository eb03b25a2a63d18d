use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryStores, Services};
use crate::routes::with_recruitment_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use hirewire::config::AppConfig;
use hirewire::error::AppError;
use hirewire::telemetry;
use hirewire::workflows::recruitment::pipeline::PipelineError;
use hirewire::workflows::recruitment::RepositoryError;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let stores = InMemoryStores::seeded().map_err(seed_failure)?;
    let services = Services::build(&config, stores.ports());

    let app = with_recruitment_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "hiring pipeline service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

pub(crate) fn seed_failure(err: RepositoryError) -> AppError {
    AppError::Pipeline(PipelineError::from(err))
}
