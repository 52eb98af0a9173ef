//! Destination-grouped shipment batching for `ProcessOrders`.
//!
//! Order ids arrive one at a time on the client stream. Each resolved order
//! joins the [`CombinedShipment`] for its destination within the current
//! window. Every `batch_size` received ids the whole window is flushed (one
//! message per destination) and a new window starts. When the client closes
//! its side, whatever the current window holds is flushed before the call
//! completes, so no received order is dropped.

use super::forward;
use crate::server::store::orders::OrderStore;
use futures::{Stream, StreamExt};
use ordermgmt_core::{
    Error,
    proto::{CombinedShipment, Order, OrderId},
    types::{SHIPMENT_STATUS_PROCESSED, shipment_id},
};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

/// Accumulator for a single batching window.
///
/// Owned exclusively by the receive loop of one call; nothing in here is
/// shared between calls.
#[derive(Debug)]
pub struct ShipmentBatch {
    batch_size: usize,
    received: usize,
    shipments: BTreeMap<String, CombinedShipment>,
}

impl ShipmentBatch {
    /// Creates an empty window that fills after `batch_size` orders.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            received: 0,
            shipments: BTreeMap::new(),
        }
    }

    /// Adds `order` to the shipment for its destination, creating the
    /// shipment if this is the first order bound there in this window.
    ///
    /// Returns every shipment in the window once this order fills it, and
    /// resets the window. Otherwise returns `None`.
    pub fn push(&mut self, order: Order) -> Option<Vec<CombinedShipment>> {
        let destination = order.destination.clone();
        self.shipments
            .entry(destination)
            .or_insert_with_key(|destination| CombinedShipment {
                id: shipment_id(destination),
                status: SHIPMENT_STATUS_PROCESSED.to_string(),
                orders_list: Vec::new(),
            })
            .orders_list
            .push(order);

        self.received += 1;
        (self.received == self.batch_size).then(|| self.drain())
    }

    /// Takes every shipment in the window, ordered by destination, and
    /// starts a new window.
    pub fn drain(&mut self) -> Vec<CombinedShipment> {
        self.received = 0;
        core::mem::take(&mut self.shipments).into_values().collect()
    }

    /// Orders received since the window last flushed.
    pub fn pending(&self) -> usize {
        self.received
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }
}

/// Drives one `ProcessOrders` call to completion.
///
/// Ids are consumed strictly in arrival order. Returns the number of
/// shipments sent.
///
/// # Errors
///
/// - [`Error::Stream`] if the client stream fails before a clean end of
///   input; the pending window is discarded.
/// - [`Error::NotFound`] if an id does not resolve to a stored order.
/// - [`Error::ChannelError`] or [`Error::RequestCancelled`] if the client
///   goes away.
/// - [`Error::ServiceShutdown`] if the server shuts down mid-call.
///
/// Shipments sent before the failure are not recalled.
pub async fn process_orders<S>(
    mut order_ids: S,
    orders: &OrderStore,
    mut batch: ShipmentBatch,
    resp_tx: &mpsc::Sender<Result<CombinedShipment, Status>>,
    shutdown: &CancellationToken,
) -> ordermgmt_core::Result<usize>
where
    S: Stream<Item = Result<OrderId, Status>> + Unpin,
{
    let mut sent = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => return Err(Error::ServiceShutdown),
            () = resp_tx.closed() => return Err(Error::RequestCancelled),
            next = order_ids.next() => next,
        };

        let order_id = match next {
            Some(Ok(order_id)) => order_id,
            Some(Err(status)) => return Err(Error::Stream(status)),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Client closed stream, flushing {} pending orders",
                    batch.pending()
                );
                if !batch.is_empty() {
                    sent += flush(batch.drain(), resp_tx, shutdown).await?;
                }
                return Ok(sent);
            }
        };

        let order = orders.get(&order_id.value)?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Reading order {} bound for {}", order.id, order.destination);

        if let Some(shipments) = batch.push(order) {
            sent += flush(shipments, resp_tx, shutdown).await?;
        }
    }
}

async fn flush(
    shipments: Vec<CombinedShipment>,
    resp_tx: &mpsc::Sender<Result<CombinedShipment, Status>>,
    shutdown: &CancellationToken,
) -> ordermgmt_core::Result<usize> {
    let count = shipments.len();
    for shipment in shipments {
        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Shipping {} with {} orders",
            shipment.id,
            shipment.orders_list.len()
        );
        forward(resp_tx, shipment, shutdown).await?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use tokio_stream::wrappers::ReceiverStream;

    fn order(id: &str, destination: &str) -> Order {
        Order {
            id: id.to_string(),
            items: vec!["Apple Watch S4".to_string()],
            description: String::new(),
            price: 400.0,
            destination: destination.to_string(),
        }
    }

    fn order_id(value: &str) -> OrderId {
        OrderId {
            value: value.to_string(),
        }
    }

    fn summarize(shipments: &[CombinedShipment]) -> Vec<(String, Vec<String>)> {
        shipments
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    s.orders_list.iter().map(|o| o.id.clone()).collect(),
                )
            })
            .collect()
    }

    fn store() -> OrderStore {
        OrderStore::from_orders([
            order("1", "D1"),
            order("2", "D1"),
            order("3", "D2"),
            order("4", "D1"),
        ])
    }

    #[test]
    fn window_flushes_every_group_when_full() {
        let mut batch = ShipmentBatch::new(3);
        assert!(batch.push(order("1", "D1")).is_none());
        assert!(batch.push(order("2", "D1")).is_none());

        let flushed = batch.push(order("3", "D2")).unwrap();
        assert_eq!(
            summarize(&flushed),
            vec![
                ("cmb - D1".to_string(), vec!["1".to_string(), "2".to_string()]),
                ("cmb - D2".to_string(), vec!["3".to_string()]),
            ]
        );
        assert!(flushed.iter().all(|s| s.status == "Processed"));
        assert!(batch.is_empty());
        assert_eq!(batch.pending(), 0);

        assert!(batch.push(order("4", "D1")).is_none());
        assert_eq!(
            summarize(&batch.drain()),
            vec![("cmb - D1".to_string(), vec!["4".to_string()])]
        );
    }

    #[test]
    fn every_window_holds_exactly_batch_size_orders() {
        let mut batch = ShipmentBatch::new(2);
        let mut flushes = Vec::new();
        for i in 0..6 {
            if let Some(shipments) = batch.push(order(&i.to_string(), "D")) {
                flushes.push(i);
                assert_eq!(shipments[0].orders_list.len(), 2);
            }
        }
        assert_eq!(flushes, vec![1, 3, 5]);
    }

    #[test]
    fn grouped_orders_share_destination() {
        let mut batch = ShipmentBatch::new(10);
        for (i, dest) in ["A", "B", "A", "C", "B", "A"].into_iter().enumerate() {
            batch.push(order(&i.to_string(), dest));
        }
        for shipment in batch.drain() {
            let dest = shipment.id.trim_start_matches("cmb - ");
            assert!(shipment.orders_list.iter().all(|o| o.destination == dest));
        }
    }

    #[test]
    fn batch_size_one_flushes_each_order() {
        let mut batch = ShipmentBatch::new(1);
        assert_eq!(batch.push(order("1", "D1")).unwrap().len(), 1);
        assert_eq!(batch.push(order("2", "D1")).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mid_stream_and_final_flush() {
        let store = store();
        let (in_tx, in_rx) = mpsc::channel(4);
        let (resp_tx, mut resp_rx) = mpsc::channel(8);
        let shutdown = CancellationToken::new();

        let task = async {
            process_orders(
                ReceiverStream::new(in_rx),
                &store,
                ShipmentBatch::new(3),
                &resp_tx,
                &shutdown,
            )
            .await
        };

        let client = async {
            for id in ["1", "2", "3"] {
                in_tx.send(Ok(order_id(id))).await.unwrap();
            }
            let first = resp_rx.recv().await.unwrap().unwrap();
            let second = resp_rx.recv().await.unwrap().unwrap();
            assert_eq!(
                summarize(&[first, second]),
                vec![
                    ("cmb - D1".to_string(), vec!["1".to_string(), "2".to_string()]),
                    ("cmb - D2".to_string(), vec!["3".to_string()]),
                ]
            );

            // Nothing more until the window fills or input ends.
            in_tx.send(Ok(order_id("4"))).await.unwrap();
            assert!(
                tokio::time::timeout(Duration::from_millis(50), resp_rx.recv())
                    .await
                    .is_err()
            );

            drop(in_tx);
            let last = resp_rx.recv().await.unwrap().unwrap();
            assert_eq!(
                summarize(&[last]),
                vec![("cmb - D1".to_string(), vec!["4".to_string()])]
            );
        };

        let (sent, ()) = tokio::join!(task, client);
        assert_eq!(sent.unwrap(), 3);
    }

    #[tokio::test]
    async fn empty_input_sends_nothing() {
        let store = store();
        let (resp_tx, mut resp_rx) = mpsc::channel(1);

        let sent = process_orders(
            futures::stream::iter(Vec::<Result<OrderId, Status>>::new()),
            &store,
            ShipmentBatch::new(3),
            &resp_tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(sent, 0);
        drop(resp_tx);
        assert!(resp_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn unknown_order_id_fails_the_call() {
        let store = store();
        let (resp_tx, _resp_rx) = mpsc::channel(4);

        let err = process_orders(
            futures::stream::iter([Ok(order_id("1")), Ok(order_id("missing"))]),
            &store,
            ShipmentBatch::new(3),
            &resp_tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::NotFound { kind: "Order", .. }));
    }

    #[tokio::test]
    async fn receive_error_discards_pending_window() {
        let store = store();
        let (resp_tx, mut resp_rx) = mpsc::channel(4);

        let err = process_orders(
            futures::stream::iter([Ok(order_id("1")), Err(Status::cancelled("gone"))]),
            &store,
            ShipmentBatch::new(3),
            &resp_tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::Stream(_)));
        drop(resp_tx);
        assert!(resp_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_client_ends_call() {
        let store = store();
        let (resp_tx, resp_rx) = mpsc::channel(4);
        drop(resp_rx);

        let err = process_orders(
            futures::stream::pending::<Result<OrderId, Status>>(),
            &store,
            ShipmentBatch::new(3),
            &resp_tx,
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::RequestCancelled));
    }
}
