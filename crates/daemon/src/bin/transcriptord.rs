//! The daemon entrypoint: load configuration, initialise logging, open the
//! application context, run startup recovery, then serve HTTP until a
//! shutdown signal arrives (SPEC §2, §9).

use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

use transcriptord_daemon::config::{Config, LogFormat};
use transcriptord_daemon::{routes, AppContext};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    init_tracing(&config);

    let ctx = AppContext::new(config.clone());
    ctx.open().await?;

    let durable = ctx.durable().ok_or("app context failed to open the durable store")?;
    let ephemeral = ctx.ephemeral().ok_or("app context failed to open the ephemeral store")?;
    let dispatcher = ctx.dispatcher().ok_or("app context failed to open the dispatcher")?;
    let report = transcriptord_engine::recover(&durable, &ephemeral, &dispatcher).await?;
    tracing::info!(recovered = report.recovered, aborted = report.aborted, "startup recovery complete");

    let addr: SocketAddr = format!("{}:{}", config.http.bind_address, config.http.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let app = routes::router(ctx.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.close().await;
    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.pretty().init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
