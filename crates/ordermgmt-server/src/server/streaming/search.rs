use super::forward;
use crate::server::store::orders::OrderStore;
use ordermgmt_core::proto::Order;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Returns `true` if any line item of `order` contains `query`.
///
/// Scanning stops at the first matching item.
pub fn matches(order: &Order, query: &str) -> bool {
    order.items.iter().any(|item| item.contains(query))
}

/// Streams every order with an item containing `query` to the client.
///
/// The scan runs over a snapshot taken when the call starts, so concurrent
/// upserts neither block it nor show up mid-scan. Each matching order is
/// sent exactly once. Result order follows map iteration and is not stable.
///
/// Returns the number of orders sent.
///
/// # Errors
///
/// - [`Error::ChannelError`](ordermgmt_core::Error::ChannelError) if the
///   client disconnects mid-scan.
/// - [`Error::ServiceShutdown`](ordermgmt_core::Error::ServiceShutdown) if
///   the server shuts down while the scan is blocked on backpressure.
pub async fn feed_matches(
    query: &str,
    orders: &OrderStore,
    resp_tx: &mpsc::Sender<Result<Order, Status>>,
    shutdown: &CancellationToken,
) -> ordermgmt_core::Result<usize> {
    let mut sent = 0;

    for order in orders.snapshot() {
        if !matches(&order, query) {
            continue;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Matching order found: {}", order.id);

        forward(resp_tx, order, shutdown).await?;
        sent += 1;
    }

    Ok(sent)
}
