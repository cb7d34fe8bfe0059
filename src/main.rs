use std::{net::SocketAddr, sync::Arc};

use tokio::{signal, sync::mpsc};
use tracing::{error, info};

use juicebar_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);
    let config = Arc::new(cfg);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Payment gateway: only wired up when credentials are present.
    let gateway: Option<Arc<dyn api::services::payments::PaymentGateway>> =
        if config.paypal.is_configured() {
            info!(environment = %config.paypal.environment, "PayPal checkout enabled");
            Some(Arc::new(api::services::payments::PayPalClient::new(
                config.paypal.clone(),
            )?))
        } else {
            info!("PayPal credentials not configured; PayPal checkout disabled");
            None
        };

    let services = api::handlers::AppServices::new(
        db.clone(),
        config.clone(),
        event_sender.clone(),
        gateway,
    );

    // Reclaim stock from abandoned PayPal checkouts in the background.
    let sweep = api::services::sweep::PendingOrderSweep::new(
        db.clone(),
        services.orders.clone(),
        &config.checkout,
    );
    tokio::spawn(sweep.run());

    let port = config.port;
    let state = Arc::new(api::AppState {
        db,
        config,
        event_sender,
        services,
    });
    let app = api::app_router(state);

    // Bind and serve
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("juicebar-api listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
