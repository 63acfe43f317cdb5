use crate::cli::ServeArgs;
use crate::infra::{load_ledger, AppState, InMemoryRequestStore, InMemoryTransport};
use crate::routes::with_donation_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use donation_matcher::config::AppConfig;
use donation_matcher::error::AppError;
use donation_matcher::telemetry;
use donation_matcher::workflows::donations::{AllocationCoordinator, DonationService};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(strategy) = args.strategy.take() {
        config.donations.strategy = strategy;
    }
    if let Some(seed) = args.seed.take() {
        config.donations.rng_seed = Some(seed);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let ledger = match config.donations.ledger_path.as_deref() {
        Some(path) => {
            let requests = load_ledger(path)?;
            info!(path = %path.display(), requests = requests.len(), "request ledger loaded");
            requests
        }
        None => {
            warn!("DONATION_LEDGER_PATH not set; starting with an empty request ledger");
            Vec::new()
        }
    };
    if config.donations.sender_number.is_empty() {
        warn!("DONATION_SENDER_NUMBER not set; outbound texts will carry an empty sender");
    }

    let store = Arc::new(InMemoryRequestStore::from_requests(ledger));
    let transport = Arc::new(InMemoryTransport::default());
    let coordinator = Arc::new(AllocationCoordinator::new(
        store,
        transport,
        config.donations.allocation_settings(),
    ));
    let strategy = coordinator.settings().strategy;
    let donation_service = Arc::new(DonationService::new(
        coordinator,
        config.donations.requests_table_id.clone(),
    ));

    let app = with_donation_routes(donation_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        %strategy,
        table = %config.donations.requests_table_id,
        "donation matcher ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
