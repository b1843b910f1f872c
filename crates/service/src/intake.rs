//! Order intake: validation, server-side pricing, duplicate detection, persistence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use model::{
    CURRENCY, CreateOrderRequest, CreateOrderResponse, FallbackResponse, Order, OrderItem,
    OrderStatus, PaymentMeta, Product,
};
use notifier::message::{chat_deep_link, order_confirmation_text};
use notifier::{NotificationDispatcher, OrderEvent};
use repository::{OrdersRepository, ProductsRepository};
use tracing::{info, instrument, warn};

use crate::validation::{ValidatedCart, validate};
use crate::{OrderService, ServiceError, parse_order_id};

const DEFAULT_LIST_LIMIT: i64 = 50;
const MAX_LIST_LIMIT: i64 = 200;

/// Statuses an administrator may set by hand.
const ADMIN_TARGETS: [OrderStatus; 4] = [
    OrderStatus::Confirmed,
    OrderStatus::Shipped,
    OrderStatus::Fulfilled,
    OrderStatus::Cancelled,
];

/// Tunables of the intake flow.
#[derive(Debug, Clone)]
pub struct IntakeSettings {
    /// How far back an identical pending order is considered a duplicate submission.
    pub dedup_window: Duration,
    /// Business chat number for deep links; empty disables links.
    pub whatsapp_number: String,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(5 * 60),
            whatsapp_number: String::new(),
        }
    }
}

/// Implementation of [`OrderService`] over injected repositories.
pub struct OrderServiceImpl {
    orders: Arc<dyn OrdersRepository>,
    products: Arc<dyn ProductsRepository>,
    notifier: NotificationDispatcher,
    settings: IntakeSettings,
}

impl OrderServiceImpl {
    pub fn new(
        orders: Arc<dyn OrdersRepository>,
        products: Arc<dyn ProductsRepository>,
        notifier: NotificationDispatcher,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            orders,
            products,
            notifier,
            settings,
        }
    }

    /// Looks up live catalog data for every line and builds the priced item snapshot.
    async fn price_cart(&self, cart: &ValidatedCart) -> Result<Vec<OrderItem>, ServiceError> {
        let ids: Vec<String> = cart.lines.iter().map(|l| l.product_id.clone()).collect();
        let catalog: HashMap<String, Product> = self
            .products
            .get_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id.clone(), p))
            .collect();

        let mut resolved = Vec::with_capacity(cart.lines.len());
        for line in &cart.lines {
            let product = catalog
                .get(&line.product_id)
                .ok_or_else(|| ServiceError::ProductNotFound(line.product_id.clone()))?;
            if line.quantity > product.stock {
                return Err(ServiceError::InsufficientStock {
                    product_id: product.id.clone(),
                    requested: line.quantity,
                    available: product.stock.max(0),
                });
            }
            resolved.push((product, line.quantity));
        }

        // One tier for the whole cart, from the summed quantity.
        let total_qty: u64 = resolved.iter().map(|(_, q)| *q as u64).sum();
        let percent = pricing::discount_percent_for_quantity(total_qty);

        Ok(resolved
            .into_iter()
            .map(|(product, quantity)| OrderItem {
                product_id: product.id.clone(),
                title: product.title.clone(),
                unit_price: pricing::sale_price_from_mrp(product.mrp, percent),
                quantity,
            })
            .collect())
    }

    fn fallback_for(&self, order: &Order) -> FallbackResponse {
        let message = order_confirmation_text(order);
        let deep_link = chat_deep_link(&self.settings.whatsapp_number, &message);
        FallbackResponse {
            order_id: order.id,
            message,
            deep_link,
        }
    }
}

fn order_response(order: &Order, is_existing: bool) -> CreateOrderResponse {
    CreateOrderResponse {
        order_id: order.id,
        total_amount: order.total_amount,
        currency: CURRENCY.to_string(),
        status: order.status,
        is_existing,
    }
}

#[async_trait]
impl OrderService for OrderServiceImpl {
    #[instrument(skip(self, request), fields(payment_method = ?request.payment_method))]
    async fn create_order(&self, request: CreateOrderRequest) -> Result<CreateOrderResponse, ServiceError> {
        let cart = validate(&request)?;
        let items = self.price_cart(&cart).await?;
        let total_amount: i64 = items.iter().map(OrderItem::subtotal).sum();

        // Two requests racing past this check can both insert; accepted as a rare duplicate.
        let window = chrono::Duration::from_std(self.settings.dedup_window)
            .map_err(|e| ServiceError::Unexpected(format!("dedup window: {e}")))?;
        let since = Utc::now() - window;
        if let Some(existing) = self
            .orders
            .find_recent_pending(&cart.customer.phone, total_amount, since)
            .await?
        {
            info!(order_id = %existing.id, total_amount, "Returning existing order for duplicate submission");
            return Ok(order_response(&existing, true));
        }

        let order = Order::new(cart.customer, items, request.payment_method);
        self.orders.insert(&order).await?;
        info!(
            order_id = %order.id,
            total_amount = order.total_amount,
            status = %order.status,
            "Order created"
        );

        let fallback = self.fallback_for(&order);
        self.notifier.dispatch(OrderEvent::OrderPlaced {
            order: order.clone(),
            message: fallback.message,
            deep_link: fallback.deep_link,
        });

        Ok(order_response(&order, false))
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> Result<Order, ServiceError> {
        let id = parse_order_id(order_id)?;
        self.orders
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_lookup(e, order_id))
    }

    #[instrument(skip(self))]
    async fn chat_fallback(&self, order_id: &str) -> Result<FallbackResponse, ServiceError> {
        let order = self.get_order(order_id).await?;
        if !order.status.is_pending() {
            return Err(ServiceError::InvalidOrderState(format!(
                "Order is already {}",
                order.status
            )));
        }
        let fallback = self.fallback_for(&order);
        if fallback.deep_link.is_none() {
            warn!("Chat fallback requested but no business number is configured");
        }
        Ok(fallback)
    }

    #[instrument(skip(self))]
    async fn list_orders(&self, status: Option<OrderStatus>, limit: Option<i64>) -> Result<Vec<Order>, ServiceError> {
        let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        Ok(self.orders.list_recent(status, limit).await?)
    }

    #[instrument(skip(self))]
    async fn admin_set_status(&self, order_id: &str, status: OrderStatus) -> Result<Order, ServiceError> {
        if !ADMIN_TARGETS.contains(&status) {
            return Err(ServiceError::Validation(format!(
                "Status {status} cannot be set manually"
            )));
        }
        let id = parse_order_id(order_id)?;
        let meta = PaymentMeta {
            admin_updated_at: Some(Utc::now()),
            ..Default::default()
        };
        let order = self
            .orders
            .set_status(id, status, &meta)
            .await
            .map_err(|e| ServiceError::from_lookup(e, order_id))?;
        info!(order_id = %order.id, status = %order.status, "Order status set by admin");
        Ok(order)
    }
}
