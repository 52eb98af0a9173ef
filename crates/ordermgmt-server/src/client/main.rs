//! Command-line client that walks through every RPC of the order-management
//! service against a running `ordermgmt-server`.

use anyhow::Context;
use clap::Parser;
use ordermgmt_core::proto::{
    Order, OrderId, Product, ProductId, SearchOrderQuery,
    order_management_client::OrderManagementClient, product_info_client::ProductInfoClient,
};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{codec::CompressionEncoding, transport::Endpoint};

#[derive(Parser, Debug, Clone)]
#[command(
    name = "ordermgmt-client",
    version,
    about = "Exercises every order-management RPC against a running server"
)]
struct ClientArgs {
    /// URL of the server to call.
    ///
    /// Environment variable: `SERVER_URL`
    #[arg(long, env = "SERVER_URL", default_value_t = String::from("http://127.0.0.1:50051"))]
    server_url: String,

    /// Seed file whose orders are re-sent through `UpdateOrders` and whose ids
    /// are fed to `ProcessOrders`.
    ///
    /// Environment variable: `ORDERS_PATH`
    #[arg(long, env = "ORDERS_PATH", default_value = "data/example_orders.json")]
    orders_path: PathBuf,

    /// Item substring passed to `SearchOrders`.
    #[arg(long, default_value_t = String::from("Si"))]
    query: String,

    /// Order fetched with `GetOrder`.
    #[arg(long, default_value_t = String::from("102"))]
    order_id: String,

    /// Pause between ids sent on the `ProcessOrders` stream, in milliseconds.
    #[arg(long, default_value_t = 100)]
    send_interval_ms: u64,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let args = ClientArgs::parse();

    let orders = load_orders(&args.orders_path)?;

    let channel = Endpoint::try_from(args.server_url.clone())?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.server_url))?;
    let mut products = ProductInfoClient::new(channel.clone())
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);
    let mut order_mgmt = OrderManagementClient::new(channel)
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    println!("\n=== Products ===");
    let id = products
        .add_product(Product {
            id: String::new(),
            name: "Apple iPhone 11".to_string(),
            description: "Meet Apple iPhone 11. All-new dual-camera system with Ultra Wide \
                          and Night mode."
                .to_string(),
            price: 1000.0,
        })
        .await?
        .into_inner()
        .value;
    println!("Product ID: {id} added successfully");

    let product = products
        .get_product(ProductId { value: id })
        .await?
        .into_inner();
    println!("Product: {product:?}");

    println!("\n=== GetOrder ===");
    match order_mgmt
        .get_order(OrderId {
            value: args.order_id.clone(),
        })
        .await
    {
        Ok(resp) => println!("Order: {:?}", resp.into_inner()),
        Err(status) => println!("Order {} not available: {}", args.order_id, status.message()),
    }

    println!("\n=== SearchOrders ({:?}) ===", args.query);
    let mut results = order_mgmt
        .search_orders(SearchOrderQuery {
            query: args.query.clone(),
        })
        .await?
        .into_inner();
    let mut found = 0;
    while let Some(order) = results.message().await? {
        found += 1;
        println!("Search result {found}: {order:?}");
    }

    println!("\n=== UpdateOrders ===");
    let updates: Vec<Order> = orders.values().cloned().collect();
    let summary = order_mgmt
        .update_orders(tokio_stream::iter(updates))
        .await?
        .into_inner();
    println!("{}", summary.value);

    println!("\n=== ProcessOrders ===");
    let (tx, rx) = mpsc::channel(4);
    let interval = Duration::from_millis(args.send_interval_ms);
    let ids: Vec<String> = orders.keys().cloned().collect();
    let sender = tokio::spawn(async move {
        for value in ids {
            println!("Sending order id {value}");
            if tx.send(OrderId { value }).await.is_err() {
                break;
            }
            tokio::time::sleep(interval).await;
        }
    });

    let mut shipments = order_mgmt
        .process_orders(ReceiverStream::new(rx))
        .await?
        .into_inner();
    while let Some(shipment) = shipments.message().await? {
        let ids: Vec<_> = shipment.orders_list.iter().map(|o| o.id.as_str()).collect();
        println!(
            "Shipment {} [{}]: {}",
            shipment.id,
            shipment.status,
            ids.join(", ")
        );
    }
    sender.await?;

    Ok(())
}

fn load_orders(path: &Path) -> anyhow::Result<BTreeMap<String, Order>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut orders: BTreeMap<String, Order> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    for (key, order) in &mut orders {
        if order.id.is_empty() {
            order.id = key.clone();
        }
    }
    Ok(orders)
}
