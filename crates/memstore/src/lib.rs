//! In-memory order store and catalog with thread-safe access.
//!
//! Implements the same repository traits as the Postgres layer, including the
//! status compare-and-set, which runs under a single write lock. Used for the
//! standalone mode and for tests.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use model::{Order, OrderStatus, PaymentMeta, Product};
use repository::{OrdersRepository, ProductsRepository, RepositoryError, StatusUpdate, Transition};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Thread-safe in-memory store of orders and products.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    orders: Arc<RwLock<HashMap<Uuid, Order>>>,
    products: Arc<RwLock<HashMap<String, Product>>>,
}

impl InMemoryStore {
    /// Create a new, empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose catalog holds `products`.
    pub async fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.upsert_product(product).await;
        }
        store
    }

    /// Insert or replace a catalog entry.
    pub async fn upsert_product(&self, product: Product) {
        let mut map = self.products.write().await;
        map.insert(product.id.clone(), product);
    }

    /// Load catalog entries from a JSON array of products.
    pub async fn load_catalog_file(&self, path: &str) -> Result<usize> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog file {path}"))?;
        let products: Vec<Product> =
            serde_json::from_str(&raw).with_context(|| format!("Invalid catalog file {path}"))?;
        let count = products.len();
        for product in products {
            self.upsert_product(product).await;
        }
        Ok(count)
    }

    /// Number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Overwrite the creation time of an order, e.g. to age it past a time window.
    pub async fn set_created_at(&self, id: Uuid, created_at: DateTime<Utc>) -> bool {
        let mut map = self.orders.write().await;
        match map.get_mut(&id) {
            Some(order) => {
                order.created_at = created_at;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl OrdersRepository for InMemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut map = self.orders.write().await;
        map.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError> {
        let map = self.orders.read().await;
        map.get(&id).cloned().ok_or(RepositoryError::NotFound)
    }

    async fn get_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Order, RepositoryError> {
        let map = self.orders.read().await;
        map.values()
            .filter(|o| o.gateway_order_id.as_deref() == Some(gateway_order_id))
            .max_by_key(|o| o.created_at)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn find_recent_pending(
        &self,
        phone: &str,
        total_amount: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let map = self.orders.read().await;
        Ok(map
            .values()
            .filter(|o| {
                o.customer.phone == phone
                    && o.total_amount == total_amount
                    && o.created_at >= since
                    && o.status.is_pending()
            })
            .max_by_key(|o| o.created_at)
            .cloned())
    }

    async fn attach_gateway_order(
        &self,
        id: Uuid,
        gateway_order_id: &str,
        meta: &PaymentMeta,
    ) -> Result<Transition, RepositoryError> {
        let mut map = self.orders.write().await;
        let order = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.status != OrderStatus::PendingPayment {
            return Ok(Transition::Unchanged(order.clone()));
        }
        order.gateway_order_id = Some(gateway_order_id.to_string());
        order.meta.merge(meta);
        order.updated_at = Utc::now();
        Ok(Transition::Applied(order.clone()))
    }

    async fn transition(&self, id: Uuid, update: &StatusUpdate) -> Result<Transition, RepositoryError> {
        let mut map = self.orders.write().await;
        let order = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        if order.status != update.expected {
            return Ok(Transition::Unchanged(order.clone()));
        }
        order.status = update.target;
        if order.payment_id.is_none() {
            order.payment_id = update.payment_id.clone();
        }
        order.meta.merge(&update.meta);
        order.updated_at = Utc::now();
        Ok(Transition::Applied(order.clone()))
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        meta: &PaymentMeta,
    ) -> Result<Order, RepositoryError> {
        let mut map = self.orders.write().await;
        let order = map.get_mut(&id).ok_or(RepositoryError::NotFound)?;
        order.status = status;
        order.meta.merge(meta);
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let map = self.orders.read().await;
        let mut orders: Vec<Order> = map
            .values()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(orders)
    }
}

#[async_trait]
impl ProductsRepository for InMemoryStore {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError> {
        let map = self.products.read().await;
        Ok(ids.iter().filter_map(|id| map.get(id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use model::{Customer, OrderItem, PaymentMethod};

    fn sample_order(phone: &str, method: PaymentMethod) -> Order {
        let customer = Customer {
            name: "Test User".to_string(),
            phone: phone.to_string(),
            address: "Street 1".to_string(),
            ..Default::default()
        };
        let items = vec![OrderItem {
            product_id: "book-1".to_string(),
            title: "Book".to_string(),
            unit_price: 15920,
            quantity: 1,
        }];
        Order::new(customer, items, method)
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = InMemoryStore::new();
        assert!(matches!(
            store.get_by_id(Uuid::new_v4()).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_transition_applies_once() {
        let store = InMemoryStore::new();
        let order = sample_order("9876543210", PaymentMethod::Gateway);
        store.insert(&order).await.unwrap();

        let confirm = StatusUpdate::confirm_payment(Some("pay_1".into()), PaymentMeta::default());
        let first = store.transition(order.id, &confirm).await.unwrap();
        assert!(first.applied());
        assert_eq!(first.order().status, OrderStatus::Confirmed);

        let fail = StatusUpdate::fail_payment(PaymentMeta {
            failure_reason: Some("late failure".into()),
            ..Default::default()
        });
        let second = store.transition(order.id, &fail).await.unwrap();
        assert!(!second.applied());
        assert_eq!(second.order().status, OrderStatus::Confirmed);
        assert_eq!(second.order().meta.failure_reason, None);
    }

    #[tokio::test]
    async fn test_first_payment_id_kept() {
        let store = InMemoryStore::new();
        let order = sample_order("9876543210", PaymentMethod::Gateway);
        store.insert(&order).await.unwrap();

        // Same status on both sides, so the guard holds twice.
        let mut update = StatusUpdate::confirm_payment(Some("pay_1".into()), PaymentMeta::default());
        update.target = OrderStatus::PendingPayment;
        store.transition(order.id, &update).await.unwrap();
        update.payment_id = Some("pay_2".into());
        let t = store.transition(order.id, &update).await.unwrap();

        assert_eq!(t.order().payment_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_find_recent_pending_respects_window_and_status() {
        let store = InMemoryStore::new();
        let order = sample_order("9876543210", PaymentMethod::Whatsapp);
        store.insert(&order).await.unwrap();
        let since = Utc::now() - Duration::minutes(5);

        let found = store
            .find_recent_pending("9876543210", order.total_amount, since)
            .await
            .unwrap();
        assert_eq!(found.map(|o| o.id), Some(order.id));

        assert!(
            store
                .find_recent_pending("9876543210", order.total_amount + 1, since)
                .await
                .unwrap()
                .is_none()
        );

        store
            .set_created_at(order.id, Utc::now() - Duration::minutes(10))
            .await;
        assert!(
            store
                .find_recent_pending("9876543210", order.total_amount, since)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_attach_gateway_order_only_while_pending_payment() {
        let store = InMemoryStore::new();
        let order = sample_order("9876543210", PaymentMethod::Whatsapp);
        store.insert(&order).await.unwrap();

        let t = store
            .attach_gateway_order(order.id, "order_X", &PaymentMeta::default())
            .await
            .unwrap();
        assert!(!t.applied());
        assert_eq!(t.order().gateway_order_id, None);
    }

    #[tokio::test]
    async fn test_list_recent_newest_first() {
        let store = InMemoryStore::new();
        let older = sample_order("9000000001", PaymentMethod::Cod);
        let newer = sample_order("9000000002", PaymentMethod::Gateway);
        store.insert(&older).await.unwrap();
        store.insert(&newer).await.unwrap();
        store
            .set_created_at(older.id, Utc::now() - Duration::hours(1))
            .await;

        let all = store.list_recent(None, 10).await.unwrap();
        assert_eq!(all.iter().map(|o| o.id).collect::<Vec<_>>(), vec![newer.id, older.id]);

        let pending_payment = store
            .list_recent(Some(OrderStatus::PendingPayment), 10)
            .await
            .unwrap();
        assert_eq!(pending_payment.len(), 1);
        assert_eq!(store.list_recent(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_catalog_lookup_skips_unknown() {
        let store = InMemoryStore::with_products(vec![Product {
            id: "book-1".into(),
            title: "Book".into(),
            mrp: 19900,
            stock: 3,
        }])
        .await;
        let found = store
            .get_by_ids(&["book-1".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].mrp, 19900);
    }
}
