use crate::server::store::orders::OrderStore;
use futures::{Stream, StreamExt};
use ordermgmt_core::{
    Error,
    proto::{Order, UpdateSummary},
    types::UPDATE_SUMMARY_PREFIX,
};
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Applies each streamed order to the store, in arrival order, and returns
/// the summary once the client closes its side.
///
/// The summary lists every received id followed by `", "`, in the order they
/// arrived (duplicates included).
///
/// # Errors
///
/// - [`Error::Stream`] if the client stream fails before a clean end of
///   input. No summary is produced, but upserts already applied are kept.
/// - [`Error::ServiceShutdown`] if the server shuts down mid-stream.
pub async fn ingest_updates<S>(
    mut updates: S,
    orders: &OrderStore,
    shutdown: &CancellationToken,
) -> ordermgmt_core::Result<(UpdateSummary, usize)>
where
    S: Stream<Item = Result<Order, Status>> + Unpin,
{
    let mut updated_ids = String::new();
    let mut count = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(Error::ServiceShutdown),
            next = updates.next() => next,
        };

        match next {
            Some(Ok(order)) => {
                updated_ids.push_str(&order.id);
                updated_ids.push_str(", ");
                count += 1;

                #[cfg(feature = "tracing")]
                tracing::debug!("Order {} updated", order.id);

                orders.upsert(order);
            }
            Some(Err(status)) => return Err(Error::Stream(status)),
            None => {
                let summary = UpdateSummary {
                    value: format!("{UPDATE_SUMMARY_PREFIX}{updated_ids}"),
                };
                return Ok((summary, count));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: &str, destination: &str) -> Order {
        Order {
            id: id.to_string(),
            items: vec!["Amazon Echo".to_string()],
            description: String::new(),
            price: 30.0,
            destination: destination.to_string(),
        }
    }

    #[tokio::test]
    async fn summary_lists_ids_in_receive_order() {
        let store = OrderStore::from_orders([order("A", "Old")]);
        let input = futures::stream::iter([
            Ok(order("A", "Austin")),
            Ok(order("B", "Boston")),
            Ok(order("C", "Chicago")),
        ]);

        let (summary, count) = ingest_updates(input, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(
            summary.value,
            "Orders processed Updated Order IDs: A, B, C, "
        );
        assert_eq!(store.len(), 3);
        assert_eq!(store.get("A").unwrap().destination, "Austin");
        assert_eq!(store.get("B").unwrap().destination, "Boston");
        assert_eq!(store.get("C").unwrap().destination, "Chicago");
    }

    #[tokio::test]
    async fn empty_stream_yields_bare_summary() {
        let store = OrderStore::default();
        let input = futures::stream::iter(Vec::<Result<Order, Status>>::new());

        let (summary, count) = ingest_updates(input, &store, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(count, 0);
        assert_eq!(summary.value, UPDATE_SUMMARY_PREFIX);
    }

    #[tokio::test]
    async fn receive_error_aborts_without_summary_but_keeps_applied_upserts() {
        let store = OrderStore::default();
        let input = futures::stream::iter([
            Ok(order("A", "Austin")),
            Err(Status::aborted("client reset")),
            Ok(order("B", "Boston")),
        ]);

        let err = ingest_updates(input, &store, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            Error::Stream(status) => assert_eq!(status.code(), tonic::Code::Aborted),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.get("A").is_ok());
        assert!(store.get("B").is_err());
    }

    #[tokio::test]
    async fn shutdown_interrupts_idle_stream() {
        let store = OrderStore::default();
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = ingest_updates(futures::stream::pending::<Result<Order, Status>>(), &store, &shutdown)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ServiceShutdown));
    }
}
