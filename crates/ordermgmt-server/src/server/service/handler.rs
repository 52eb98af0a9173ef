//! gRPC service implementation for products, orders and shipments.
//!
//! This module defines [`OrderService`], the concrete implementation of both
//! the [`ProductInfo`] and [`OrderManagement`] gRPC services. It owns the
//! shared stores for the lifetime of the process and dispatches each call to
//! the matching store operation or streaming flow.
//!
//! ## Responsibilities
//!
//! - Serve unary product and order lookups straight from the stores.
//! - Spawn a producer task per server-streaming call, connected to tonic via
//!   a bounded channel so slow clients apply backpressure.
//! - Register streaming calls with the [`StreamLifecycle`] so shutdown can
//!   drain or cancel them.

use crate::server::{
    config::ServerConfig,
    service::lifecycle::StreamLifecycle,
    store::{catalog::ProductCatalog, orders::OrderStore},
    streaming::{
        batcher::{ShipmentBatch, process_orders},
        ingest::ingest_updates,
        search::feed_matches,
        surface_error,
    },
    telemetry::{
        increment_orders_matched, increment_orders_updated, increment_requests,
        increment_shipments_sent, increment_stream_errors, record_orders_per_shipment,
        record_stream_duration,
    },
};
use core::{pin::Pin, time::Duration};
use futures::TryStreamExt;
use ordermgmt_core::{
    Error,
    proto::{
        CombinedShipment, Order, OrderId, Product, ProductId, SearchOrderQuery, UpdateSummary,
        order_management_server::OrderManagement, product_info_server::ProductInfo,
    },
};
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;
use tokio_stream::{Stream, wrappers::ReceiverStream};
use tonic::{Request, Response, Status, Streaming};

/// gRPC facade over the product catalog and the order store.
///
/// Cloning is cheap; every clone shares the same stores and lifecycle.
#[derive(Clone)]
pub struct OrderService {
    config: ServerConfig,
    catalog: Arc<ProductCatalog>,
    orders: Arc<OrderStore>,
    lifecycle: Arc<StreamLifecycle>,
}

impl OrderService {
    pub fn new(config: ServerConfig, catalog: ProductCatalog, orders: OrderStore) -> Self {
        let lifecycle = StreamLifecycle::new(Duration::from_secs(config.shutdown_timeout));
        Self {
            config,
            catalog: Arc::new(catalog),
            orders: Arc::new(orders),
            lifecycle: Arc::new(lifecycle),
        }
    }

    /// Initiates a graceful shutdown of all streaming calls.
    ///
    /// New streaming calls are refused; in-flight ones get the configured
    /// grace period before being cancelled.
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.lifecycle.shutdown().await
    }
}

#[tonic::async_trait]
impl ProductInfo for OrderService {
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(name = %req.get_ref().name)))]
    async fn add_product(&self, req: Request<Product>) -> Result<Response<ProductId>, Status> {
        increment_requests("AddProduct");
        let id = self.catalog.add(req.into_inner())?;

        #[cfg(feature = "tracing")]
        tracing::info!("Product {id} added");

        Ok(Response::new(ProductId { value: id }))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().value)))]
    async fn get_product(&self, req: Request<ProductId>) -> Result<Response<Product>, Status> {
        increment_requests("GetProduct");
        let product = self.catalog.get(&req.get_ref().value)?;
        Ok(Response::new(product))
    }
}

#[tonic::async_trait]
impl OrderManagement for OrderService {
    type SearchOrdersStream = Pin<Box<dyn Stream<Item = Result<Order, Status>> + Send>>;
    type ProcessOrdersStream = Pin<Box<dyn Stream<Item = Result<CombinedShipment, Status>> + Send>>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(id = %req.get_ref().value)))]
    async fn get_order(&self, req: Request<OrderId>) -> Result<Response<Order>, Status> {
        increment_requests("GetOrder");
        let order = self.orders.get(&req.get_ref().value)?;
        Ok(Response::new(order))
    }

    /// Streams every order with a line item containing the query.
    ///
    /// Result order is unspecified. Each matching order is sent once.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(query = %req.get_ref().query)))]
    async fn search_orders(
        &self,
        req: Request<SearchOrderQuery>,
    ) -> Result<Response<Self::SearchOrdersStream>, Status> {
        let start = Instant::now();
        increment_requests("SearchOrders");
        let guard = self.lifecycle.begin()?;

        let query = req.into_inner().query;
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<Order, Status>>(self.config.stream_buffer_size);
        let orders = Arc::clone(&self.orders);
        let shutdown = self.lifecycle.token().clone();

        let fut = async move {
            let _guard = guard;
            match feed_matches(&query, &orders, &resp_tx, &shutdown).await {
                Ok(matched) => {
                    increment_orders_matched(matched as u64);
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Error: {}", e);
                    surface_error(&resp_tx, e).await;
                }
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("searching");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx).inspect_err(|_e| {
            increment_stream_errors();
        });

        Ok(Response::new(Box::pin(stream)))
    }

    /// Upserts every streamed order and replies with the ids received, once
    /// the client closes its side.
    ///
    /// If the client stream fails first, the call fails with that status and
    /// no summary is sent.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn update_orders(
        &self,
        req: Request<Streaming<Order>>,
    ) -> Result<Response<UpdateSummary>, Status> {
        let start = Instant::now();
        increment_requests("UpdateOrders");
        let _guard = self.lifecycle.begin()?;

        match ingest_updates(req.into_inner(), &self.orders, self.lifecycle.token()).await {
            Ok((summary, count)) => {
                #[cfg(feature = "tracing")]
                tracing::info!("{count} orders updated");
                increment_orders_updated(count as u64);
                record_stream_duration(start.elapsed().as_millis() as f64);
                Ok(Response::new(summary))
            }
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Error: {}", e);
                increment_stream_errors();
                Err(e.into())
            }
        }
    }

    /// Groups streamed order ids into per-destination shipments.
    ///
    /// A flush of every pending shipment happens each `batch_size` ids and
    /// again when the client closes its side.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(batch_size = self.config.batch_size)))]
    async fn process_orders(
        &self,
        req: Request<Streaming<OrderId>>,
    ) -> Result<Response<Self::ProcessOrdersStream>, Status> {
        let start = Instant::now();
        increment_requests("ProcessOrders");
        let guard = self.lifecycle.begin()?;

        let order_ids = req.into_inner();
        let (resp_tx, resp_rx) =
            mpsc::channel::<Result<CombinedShipment, Status>>(self.config.stream_buffer_size);
        let orders = Arc::clone(&self.orders);
        let batch = ShipmentBatch::new(self.config.batch_size);
        let shutdown = self.lifecycle.token().clone();

        let fut = async move {
            let _guard = guard;
            match process_orders(order_ids, &orders, batch, &resp_tx, &shutdown).await {
                Ok(_shipments) => {
                    #[cfg(feature = "tracing")]
                    tracing::info!("{_shipments} shipments sent");
                    record_stream_duration(start.elapsed().as_millis() as f64);
                }
                Err(e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Error: {}", e);
                    surface_error(&resp_tx, e).await;
                }
            }
        };
        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::info_span!("batching");
            fut.instrument(span)
        };

        tokio::spawn(fut);

        let stream = ReceiverStream::new(resp_rx)
            .inspect_ok(|shipment| {
                increment_shipments_sent();
                record_orders_per_shipment(shipment.orders_list.len() as f64);
            })
            .inspect_err(|_e| {
                increment_stream_errors();
            });

        Ok(Response::new(Box::pin(stream)))
    }
}
