use hypercopy::api::router::create_router;
use hypercopy::app::{App, Components};
use hypercopy::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    // rustls needs an explicit process-wide crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = AppConfig::from_env()?;
    config.validate()?;
    tracing::debug!(?config, "Configuration loaded");

    let metrics_handle = hypercopy::metrics::init_metrics()?;
    let addr = format!("{}:{}", config.host, config.port);

    let components = Components::hyperliquid(&config)?;
    let mut app = App::start(config, components, metrics_handle).await;

    // --- Status server ---
    let router = create_router(app.state());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {addr}");
    let (server_stop_tx, mut server_stop_rx) = tokio::sync::watch::channel(false);
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_stop_rx.wait_for(|stop| *stop).await;
            })
            .await
    });

    let fatal = tokio::select! {
        _ = shutdown_signal() => None,
        err = app.fatal() => Some(err),
    };

    let reason = match &fatal {
        Some(err) => format!("fatal: {err}"),
        None => "signal received".to_string(),
    };
    app.shutdown(&reason).await;

    let _ = server_stop_tx.send(true);
    match server.await {
        Ok(Err(e)) => tracing::error!(error = %e, "Status server error"),
        Err(e) => tracing::error!(error = %e, "Status server task failed"),
        Ok(Ok(())) => {}
    }

    if let Some(err) = fatal {
        tracing::error!(error = %err, "Exiting after fatal error");
        return Err(err.into());
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,hypercopy=debug"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
