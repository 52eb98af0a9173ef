use ordermgmt_core::{Error, Result, proto::Product};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Source of fresh, unique product ids.
///
/// The catalog never interprets the ids it receives; they only need to be
/// unique for the lifetime of the process.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> Result<String>;
}

/// Random UUID v4 ids rendered in hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> Result<String> {
        Ok(uuid::Uuid::new_v4().to_string())
    }
}

/// Products keyed by the id assigned on insertion.
pub struct ProductCatalog {
    products: RwLock<HashMap<String, Product>>,
    ids: Box<dyn IdSource>,
}

impl Default for ProductCatalog {
    fn default() -> Self {
        Self::new(UuidSource)
    }
}

impl ProductCatalog {
    pub fn new(ids: impl IdSource + 'static) -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
            ids: Box::new(ids),
        }
    }

    /// Stores `product` under a freshly generated id and returns that id.
    ///
    /// Any id already present on `product` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdGeneration`] if the id source fails.
    pub fn add(&self, mut product: Product) -> Result<String> {
        let id = self.ids.next_id()?;
        product.id.clone_from(&id);
        self.products.write().insert(id.clone(), product);
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no product has this id.
    pub fn get(&self, id: &str) -> Result<Product> {
        self.products
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| Error::product_not_found(id))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.products.read().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.products.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct FailingSource;

    impl IdSource for FailingSource {
        fn next_id(&self) -> Result<String> {
            Err(Error::IdGeneration {
                reason: "no entropy".to_string(),
            })
        }
    }

    fn iphone() -> Product {
        Product {
            id: String::new(),
            name: "Apple iPhone 11".to_string(),
            description: "Dual-camera system with Ultra Wide and Night mode.".to_string(),
            price: 1000.0,
        }
    }

    #[test]
    fn add_then_get_returns_input_with_assigned_id() {
        let catalog = ProductCatalog::default();
        let id = catalog.add(iphone()).unwrap();

        let stored = catalog.get(&id).unwrap();
        assert_eq!(stored.id, id);
        assert_eq!(Product { id: String::new(), ..stored }, iphone());
    }

    #[test]
    fn caller_supplied_id_is_replaced() {
        let catalog = ProductCatalog::default();
        let id = catalog
            .add(Product {
                id: "chosen-by-client".to_string(),
                ..iphone()
            })
            .unwrap();

        assert_ne!(id, "chosen-by-client");
        assert!(matches!(
            catalog.get("chosen-by-client"),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn assigned_ids_are_unique() {
        let catalog = ProductCatalog::default();
        let a = catalog.add(iphone()).unwrap();
        let b = catalog.add(iphone()).unwrap();
        assert_ne!(a, b);
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let catalog = ProductCatalog::default();
        assert!(catalog.is_empty());
        assert!(matches!(
            catalog.get("missing"),
            Err(Error::NotFound { kind: "Product", .. })
        ));
    }

    #[test]
    fn id_source_failure_stores_nothing() {
        let catalog = ProductCatalog::new(FailingSource);
        assert!(matches!(
            catalog.add(iphone()),
            Err(Error::IdGeneration { .. })
        ));
        assert!(catalog.is_empty());
    }

    #[test]
    fn concurrent_adds_are_all_kept() {
        let catalog = Arc::new(ProductCatalog::default());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let catalog = Arc::clone(&catalog);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        catalog.add(iphone()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(catalog.len(), 800);
    }
}
