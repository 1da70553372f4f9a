use crate::cli::ServeArgs;
use crate::infra::AppState;
use crate::routes::with_review_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use review_desk::config::AppConfig;
use review_desk::error::AppError;
use review_desk::telemetry;
use review_desk::workflows::review::{FeatureSwitches, ReviewService, TracingNotifier};
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

    let features = Arc::new(FeatureSwitches::from_config(&config.review));
    let notifier = Arc::new(TracingNotifier::following(&features));
    let review_service = Arc::new(ReviewService::with_features(
        &config.review,
        notifier,
        features,
    ));
    let sweeper = review_service.sweeper();
    info!(
        deadline_hours = sweeper.deadline().num_hours(),
        period_secs = sweeper.period().as_secs(),
        "expiry sweeper scheduled"
    );
    let sweep_task = sweeper.spawn();

    let app = with_review_routes(review_service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        quorum = review_service.quorum(),
        open_roster = review_service.roster().is_open(),
        accepting = review_service.is_accepting(),
        settings = ?config.review.settings_path,
        "application review desk ready"
    );

    let served = axum::serve(listener, app).await;
    sweep_task.abort();
    served?;
    Ok(())
}
