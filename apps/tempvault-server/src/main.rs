//! Tempvault Server - temporary and permanent document storage over HTTP.
//!
//! Documents live in an S3-compatible bucket. Temporary documents carry
//! their expiry in object metadata and are removed by a periodic sweep.
//!
//! # Usage
//!
//! ```text
//! MINIO_ACCESS_KEY=... MINIO_SECRET_KEY=... tempvault-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `MINIO_ENDPOINT` | `localhost` | Storage host |
//! | `MINIO_PORT` | `9000` | Storage port |
//! | `MINIO_USE_SSL` | `false` | Use `https` towards storage |
//! | `MINIO_ACCESS_KEY` | *(required)* | Access key id |
//! | `MINIO_SECRET_KEY` | *(required)* | Secret access key |
//! | `MINIO_BUCKET` | `drive-documents` | Bucket holding documents |
//! | `MINIO_REGION` | `us-east-1` | Signing region |
//! | `LISTEN_ADDR` | `0.0.0.0:5000` | Bind address |
//! | `UPLOAD_AUTH_TOKEN` | *(unset)* | Bearer token for permanent uploads |
//! | `CORS_ORIGIN` | `*` | `Access-Control-Allow-Origin` value |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod auth;
mod body;
mod config;
mod multipart;
mod service;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tempvault_core::StorageConfig;
use tempvault_documents::{DocumentManager, SweepOutcome, spawn_sweeper};
use tempvault_s3_client::{ObjectStore, ReqwestTransport, SignedClient};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::service::{AppState, DocumentService};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to `LOG_LEVEL`.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    Ok(())
}

/// Run the accept loop until ctrl-c, then drain in-flight connections.
async fn serve(listener: TcpListener, service: DocumentService) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let conn = http.serve_connection(TokioIo::new(stream), service.for_peer(peer_addr));
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => break,
        }
    }

    graceful.shutdown().await;
    info!("all connections drained, exiting");

    Ok(())
}

/// Probe `GET /health` on a running server, for container health checks.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;
    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.starts_with("HTTP/1.1 200") && response.contains("\"ok\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

/// Build the document manager and make sure its bucket exists.
async fn build_manager(storage: StorageConfig) -> Result<DocumentManager> {
    storage.validate().context("invalid storage configuration")?;

    let client = SignedClient::new(storage, Arc::new(ReqwestTransport::new()));
    let store = ObjectStore::new(client);
    store
        .ensure_bucket()
        .await
        .with_context(|| format!("failed to ensure bucket {}", store.bucket()))?;

    Ok(DocumentManager::new(store))
}

/// Run one sweep before accepting traffic. Failures are logged, not fatal.
async fn startup_sweep(manager: &DocumentManager) {
    match manager.cleanup().await {
        Ok(SweepOutcome::Completed(report)) => {
            info!(
                scanned = report.scanned,
                deleted = report.deleted,
                failed = report.failed,
                "startup sweep finished"
            );
        }
        Ok(SweepOutcome::Skipped) => info!("startup sweep skipped, another sweep is running"),
        Err(e) => warn!(error = %e, "startup sweep failed"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let server_config = ServerConfig::from_env();

    if std::env::args().any(|a| a == "--health-check") {
        let addr = server_config.listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    init_tracing(&server_config.log_level)?;

    let storage_config = StorageConfig::from_env();
    info!(
        endpoint = %storage_config.origin(),
        bucket = %storage_config.bucket,
        region = %storage_config.region,
        "initializing document storage",
    );
    if server_config.upload_auth_token.is_none() {
        warn!("UPLOAD_AUTH_TOKEN is not set, permanent uploads are disabled");
    }

    let manager = Arc::new(build_manager(storage_config).await?);
    startup_sweep(&manager).await;
    let sweeper = spawn_sweeper(Arc::clone(&manager), server_config.sweep_interval);

    let addr: SocketAddr = server_config
        .listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", server_config.listen))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, version = VERSION, "starting Tempvault Server");

    let service = DocumentService::new(Arc::new(AppState::new(manager, server_config)));
    let result = serve(listener, service).await;
    sweeper.abort();
    result
}
