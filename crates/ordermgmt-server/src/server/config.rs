use anyhow::bail;
use clap::Parser;
use ordermgmt_core::types::DEFAULT_BATCH_SIZE;
use std::path::PathBuf;

/// Runtime configuration for the `ordermgmt-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for local use.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordermgmt-server",
    version,
    about = "A gRPC service for products, orders and batched shipments"
)]
pub struct CliArgs {
    /// Path of the JSON seed file loaded into the order store at boot.
    ///
    /// The file holds an object of orders keyed by order id. A missing or
    /// malformed file aborts startup.
    ///
    /// Environment variable: `ORDERS_PATH`
    #[arg(long, env = "ORDERS_PATH", default_value = "data/example_orders.json")]
    pub orders_path: PathBuf,

    /// Number of order ids received by `ProcessOrders` before every pending
    /// shipment is flushed to the client.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Capacity of the response buffer between a streaming handler and the
    /// gRPC stream.
    ///
    /// Lower values increase backpressure responsiveness; higher values let
    /// producers run further ahead of slow clients.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Seconds to wait for in-flight streams to finish during shutdown before
    /// they are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 3)]
    pub shutdown_timeout: u64,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/ordermgmt.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub orders_path: PathBuf,
    pub batch_size: usize,
    pub stream_buffer_size: usize,
    pub shutdown_timeout: u64,
    pub server_addr: String,
    pub uds: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            orders_path: PathBuf::from("data/example_orders.json"),
            batch_size: DEFAULT_BATCH_SIZE,
            stream_buffer_size: 8,
            shutdown_timeout: 3,
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            orders_path: args.orders_path,
            batch_size: args.batch_size,
            stream_buffer_size: args.stream_buffer_size,
            shutdown_timeout: args.shutdown_timeout,
            server_addr: args.server_addr,
            uds: args.uds,
        })
    }
}
