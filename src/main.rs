use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use stayd::engine::Engine;
use stayd::identity::{AssumeVerified, IdentityProvider, VerifiedGuestFile};
use stayd::ledger::{JsonlSink, Ledger};
use stayd::maintenance;
use stayd::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("STAYD_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    stayd::observability::init(metrics_port);

    let port = std::env::var("STAYD_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("STAYD_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("STAYD_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("STAYD_PASSWORD").unwrap_or_else(|_| "stayd".into());
    let max_connections: usize = std::env::var("STAYD_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("STAYD_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);

    let tls_cert = std::env::var("STAYD_TLS_CERT").ok();
    let tls_key = std::env::var("STAYD_TLS_KEY").ok();
    let tls_acceptor = stayd::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let ledger_path = std::env::var("STAYD_LEDGER_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(&data_dir).join("ledger.jsonl"));
    let ledger = Ledger::spawn(Arc::new(JsonlSink::new(ledger_path.clone())));

    let identity: Arc<dyn IdentityProvider> = match std::env::var("STAYD_VERIFIED_GUESTS") {
        Ok(path) => {
            let provider = VerifiedGuestFile::load(std::path::Path::new(&path))?;
            info!("loaded {} verified guests from {path}", provider.len());
            Arc::new(provider)
        }
        Err(_) => {
            tracing::warn!("STAYD_VERIFIED_GUESTS not set, assuming all guests verified upstream");
            Arc::new(AssumeVerified)
        }
    };

    let wal_path = PathBuf::from(&data_dir).join("stayd.wal");
    let engine = Arc::new(Engine::new(wal_path, ledger, identity)?);

    let compactor_engine = engine.clone();
    tokio::spawn(async move {
        maintenance::run_compactor(compactor_engine, compact_threshold).await;
    });

    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("stayd listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  ledger: {}", ledger_path.display());
    info!("  max_connections: {max_connections}");
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(stayd::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(stayd::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(stayd::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let engine = engine.clone();
                let pw = password.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, engine, pw, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(stayd::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("stayd stopped");
    Ok(())
}
