use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tracing::info;

use storefront_checkout::{
    app_router,
    config::{self, AppConfig},
    events::{self, EventSender},
    integrations::memory::{
        FlatRateShipping, InMemoryAddressDirectory, InMemoryCart, InMemoryGateway,
        InMemoryOrders, InMemoryVouchers, InMemoryWarehouse,
    },
    recovery::InMemoryRecoveryStore,
    services::{
        AddressResolver, CheckoutSagaCoordinator, PaymentReturnReconciler, ShippingFeeQuoter,
        VoucherValidator,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    let state = Arc::new(build_state(Arc::new(cfg.clone())));
    tokio::spawn(sweep_expired_state(state.clone()));
    let app = app_router(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(%addr, "storefront-checkout listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Wires the checkout services over in-memory collaborators. The real
/// storefront deploys this service behind adapters for its cart, order,
/// directory, voucher and gateway systems; those transports live with the
/// owning systems.
fn build_state(cfg: Arc<AppConfig>) -> AppState {
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(event_tx);
    tokio::spawn(events::process_events(event_rx));

    let cart = Arc::new(InMemoryCart::new());
    let directory = Arc::new(InMemoryAddressDirectory::new());
    let warehouse = Arc::new(InMemoryWarehouse::new());
    let rates = Arc::new(FlatRateShipping::new(
        rust_decimal_macros::dec!(20000),
        rust_decimal_macros::dec!(5000),
    ));
    let vouchers = Arc::new(InMemoryVouchers::new());
    let orders = Arc::new(InMemoryOrders::new());
    let gateway = Arc::new(InMemoryGateway::new());
    let recovery = Arc::new(InMemoryRecoveryStore::new());

    let resolver = AddressResolver::new(directory);
    let quoter = ShippingFeeQuoter::new(
        warehouse,
        rates,
        cfg.fallback_shipping_fee,
        cfg.free_shipping_threshold,
    );
    let validator = VoucherValidator::new(vouchers);

    let coordinator = Arc::new(CheckoutSagaCoordinator::new(
        cfg.clone(),
        cart.clone(),
        resolver.clone(),
        quoter,
        validator,
        orders.clone(),
        gateway,
        recovery.clone(),
        event_sender.clone(),
    ));
    let reconciler = Arc::new(PaymentReturnReconciler::new(
        cfg.clone(),
        orders,
        cart,
        recovery,
        event_sender.clone(),
    ));

    AppState {
        config: cfg,
        coordinator,
        reconciler,
        resolver,
        events: event_sender,
    }
}

/// Periodic cleanup: drops checkout sessions abandoned past the configured
/// ttl and ages out settled cart-clear latch entries.
async fn sweep_expired_state(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
    loop {
        interval.tick().await;
        state
            .coordinator
            .sweep_expired_sessions(state.config.session_ttl());
        state.reconciler.prune_cleared_latch(chrono::Duration::hours(1));
    }
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
