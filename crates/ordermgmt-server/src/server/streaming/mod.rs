//! Streaming flows behind the `OrderManagement` RPCs.
//!
//! Each flow is written against plain `futures::Stream` inputs and a bounded
//! [`mpsc::Sender`] output so it can be driven by tonic in production and by
//! in-memory streams in tests.
//!
//! - [`search`] - server-streaming substring search over the order store.
//! - [`ingest`] - client-streaming bulk upserts with a closing summary.
//! - [`batcher`] - bidirectional grouping of orders into shipments.

pub mod batcher;
pub mod ingest;
pub mod search;

use ordermgmt_core::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Sends one item to the client, waiting for buffer space.
///
/// Resolves early with [`Error::ServiceShutdown`] if the server begins
/// shutting down while the send is blocked on backpressure.
pub(crate) async fn forward<T>(
    resp_tx: &mpsc::Sender<Result<T, Status>>,
    item: T,
    shutdown: &CancellationToken,
) -> ordermgmt_core::Result<()> {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => Err(Error::ServiceShutdown),
        sent = resp_tx.send(Ok(item)) => sent.map_err(|e| Error::ChannelError {
            context: format!("Failed to forward response: {e}"),
        }),
    }
}

/// Makes a best effort to terminate the client's stream with `err`.
///
/// The client may already be gone (which is often why we failed), so a
/// failed send is only logged.
pub(crate) async fn surface_error<T>(resp_tx: &mpsc::Sender<Result<T, Status>>, err: Error) {
    if let Err(_e) = resp_tx.send(Err(err.into())).await {
        #[cfg(feature = "tracing")]
        tracing::debug!("Failed to forward err: {}", _e);
    }
}
