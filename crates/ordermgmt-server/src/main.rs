#![doc = include_str!("../README.md")]

mod server;

use anyhow::Context;
use clap::Parser;
use futures::Stream;
use ordermgmt_core::proto::{
    FILE_DESCRIPTOR_SET, order_management_server::OrderManagementServer,
    product_info_server::ProductInfoServer,
};
use server::config::{CliArgs, ServerConfig};
use server::service::handler::OrderService;
use server::store::{catalog::ProductCatalog, orders::OrderStore};
use server::telemetry::{TelemetryProviders, init_telemetry};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Connected;
use tonic::{codec::CompressionEncoding, transport::Server};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    // Seed data is a boot precondition: refuse to start without it.
    let orders = OrderStore::load(&config.orders_path).context("failed to load seed orders")?;
    #[cfg(feature = "tracing")]
    tracing::info!(
        "Loaded {} orders from {}",
        orders.len(),
        config.orders_path.display()
    );
    #[cfg(feature = "tracing")]
    if orders.is_empty() {
        tracing::warn!("Seed file {} holds no orders", config.orders_path.display());
    }

    let service = OrderService::new(config.clone(), ProductCatalog::default(), orders);

    if config.uds {
        #[cfg(unix)]
        {
            use tokio::net::UnixListener;
            use tokio_stream::wrappers::UnixListenerStream;
            let uds_path = config.server_addr.clone();
            remove_stale_socket(&uds_path)?;
            let uds = UnixListener::bind(&uds_path)
                .with_context(|| format!("failed to bind unix socket {uds_path}"))?;
            let incoming = UnixListenerStream::new(uds);
            log_startup_info(&uds_path, &config);
            let res = run_server_with_incoming(service, providers, incoming).await;
            let _ = std::fs::remove_file(&uds_path);
            res
        }
        #[cfg(not(unix))]
        {
            anyhow::bail!("Unix domain sockets are not supported on this platform");
        }
    } else {
        let tcp_path = config.server_addr.clone();
        let tcp = TcpListener::bind(&tcp_path).await?;
        let incoming = TcpListenerStream::new(tcp);
        log_startup_info(&tcp_path, &config);
        run_server_with_incoming(service, providers, incoming).await
    }
}

/// Removes a socket file left behind by a previous run that did not exit
/// cleanly. Anything at the path that is not a socket is left alone.
#[cfg(unix)]
fn remove_stale_socket(path: &str) -> anyhow::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_socket() => {
            #[cfg(feature = "tracing")]
            tracing::warn!("Removing stale socket file {}", path);
            std::fs::remove_file(path)
                .with_context(|| format!("failed to remove stale socket {path}"))
        }
        Ok(_) => anyhow::bail!("{path} exists and is not a unix socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to inspect {path}")),
    }
}

async fn run_server_with_incoming<I, IO, IE>(
    service: OrderService,
    providers: TelemetryProviders,
    incoming: I,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IE: Into<tower::BoxError>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<ProductInfoServer<OrderService>>()
        .await;
    health_reporter
        .set_serving::<OrderManagementServer<OrderService>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    Server::builder()
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(build_product_service(service.clone()))
        .add_service(build_order_service(service.clone()))
        .serve_with_incoming_shutdown(
            incoming,
            shutdown_signal(service, health_reporter, providers),
        )
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

fn log_startup_info(_addr: &str, _config: &ServerConfig) {
    if cfg!(debug_assertions) {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting order service on {} with full config: {:#?}",
            _addr,
            _config
        );
    } else {
        #[cfg(feature = "tracing")]
        tracing::info!(
            "Starting order service on {} with batch size {}",
            _addr,
            _config.batch_size
        );
    }
}

fn build_product_service(service: OrderService) -> ProductInfoServer<OrderService> {
    ProductInfoServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

fn build_order_service(service: OrderService) -> OrderManagementServer<OrderService> {
    OrderManagementServer::new(service)
        .send_compressed(CompressionEncoding::Zstd)
        .send_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Deflate)
        .accept_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Gzip)
        .accept_compressed(CompressionEncoding::Deflate)
}

async fn shutdown_signal(
    service: OrderService,
    health_reporter: HealthReporter,
    providers: TelemetryProviders,
) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received Ctrl+C signal");
        },
        () = terminate => {
            #[cfg(feature = "tracing")]
            tracing::info!("Received SIGTERM signal");
        },
    }

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<ProductInfoServer<OrderService>>()
        .await;
    health_reporter
        .set_not_serving::<OrderManagementServer<OrderService>>()
        .await;

    // 2. Drain, then cancel, in-flight streams
    if let Err(_e) = service.shutdown().await {
        #[cfg(feature = "tracing")]
        tracing::error!("Error during service shutdown: {:?}", _e);
    }

    // 3. Flush exporters
    providers.shutdown();
}

#[cfg(all(test, unix))]
mod tests {
    use super::remove_stale_socket;

    #[test]
    fn stale_socket_is_removed_before_rebinding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordermgmt.sock");
        let path_str = path.to_str().unwrap();

        let stale = std::os::unix::net::UnixListener::bind(&path).unwrap();
        drop(stale);
        assert!(path.exists());

        remove_stale_socket(path_str).unwrap();
        assert!(!path.exists());
        std::os::unix::net::UnixListener::bind(&path).unwrap();
    }

    #[test]
    fn missing_socket_is_fine() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        remove_stale_socket(path.to_str().unwrap()).unwrap();
    }

    #[test]
    fn regular_file_is_left_alone() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap();

        assert!(remove_stale_socket(path).is_err());
        assert!(file.path().exists());
    }
}
