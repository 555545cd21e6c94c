use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_query_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use property_query::config::AppConfig;
use property_query::error::AppError;
use property_query::telemetry;
use property_query::workflows::property_query::{PropertyQueryEngine, TokenCache};
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

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let tokens = Arc::new(TokenCache::new());
    let engine = Arc::new(PropertyQueryEngine::rentvine(&config, tokens)?);

    let app = with_query_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        provider = %config.provider.base_url,
        "property query service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
