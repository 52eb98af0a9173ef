use anyhow::{Context, bail};
use ordermgmt_core::{Error, Result, proto::Order};
use parking_lot::RwLock;
use std::{collections::HashMap, path::Path};

/// Orders keyed by order id.
///
/// Updates always replace a whole record, so readers never observe a
/// partially applied upsert.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderStore {
    pub fn from_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let orders = orders
            .into_iter()
            .map(|order| (order.id.clone(), order))
            .collect();
        Self {
            orders: RwLock::new(orders),
        }
    }

    /// Reads the seed file at `path`: a JSON object mapping order ids to
    /// orders. A record without an `id` takes its key.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, is not valid JSON, or a record's
    /// `id` disagrees with its key. Callers treat this as fatal.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("failed to read seed orders from {}", path.display()))?;
        let seeded: HashMap<String, Order> = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to decode seed orders in {}", path.display()))?;

        let mut orders = HashMap::with_capacity(seeded.len());
        for (key, mut order) in seeded {
            if order.id.is_empty() {
                order.id.clone_from(&key);
            } else if order.id != key {
                bail!(
                    "seed order keyed {key:?} carries mismatched id {:?} in {}",
                    order.id,
                    path.display()
                );
            }
            orders.insert(key, order);
        }

        Ok(Self {
            orders: RwLock::new(orders),
        })
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no order has this id.
    pub fn get(&self, id: &str) -> Result<Order> {
        self.orders
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::order_not_found(id))
    }

    /// Inserts `order`, replacing any existing record with the same id.
    pub fn upsert(&self, order: Order) {
        self.orders.write().insert(order.id.clone(), order);
    }

    /// Clones every order out of the store, in map iteration order.
    pub fn snapshot(&self) -> Vec<Order> {
        self.orders.read().values().cloned().collect()
    }

    #[cfg(any(test, feature = "tracing"))]
    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    #[cfg(any(test, feature = "tracing"))]
    pub fn is_empty(&self) -> bool {
        self.orders.read().is_empty()
    }
}
