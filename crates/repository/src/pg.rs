//! PostgreSQL implementations of the repository traits.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use model::{Customer, Order, OrderItem, OrderStatus, PaymentMeta, PaymentMethod, Product};
use tokio_postgres::Row;
use tokio_postgres::types::{Json, ToSql};
use uuid::Uuid;

use crate::{OrdersRepository, ProductsRepository, RepositoryError, StatusUpdate, Transition};

const ORDER_COLUMNS: &str = "id, customer_name, customer_phone, customer_email, address, pincode, \
     city, state, total_amount, status, payment_method, gateway_order_id, payment_id, meta, \
     created_at, updated_at";

const PENDING_STATUSES: [&str; 2] = ["PENDING_WHATSAPP", "PENDING_PAYMENT"];

/// PostgreSQL implementation of the OrdersRepository trait.
///
/// Orders live in `orders`, their frozen item snapshots in `order_items`.
pub struct PgOrdersRepository {
    pool: Pool,
}

impl PgOrdersRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn fetch_one(
        &self,
        client: &Object,
        column: &str,
        value: &(dyn ToSql + Sync),
    ) -> Result<Order, RepositoryError> {
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE {column} = $1 ORDER BY created_at DESC LIMIT 1"
        );
        let row = client.query_opt(query.as_str(), &[value]).await?;
        match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                load_items(client, std::slice::from_mut(&mut order)).await?;
                Ok(order)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    /// Maps the row returned by a guarded UPDATE; falls back to the current state when
    /// the guard did not hold.
    async fn guarded_result(
        &self,
        client: &Object,
        id: Uuid,
        row: Option<Row>,
    ) -> Result<Transition, RepositoryError> {
        match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                load_items(client, std::slice::from_mut(&mut order)).await?;
                Ok(Transition::Applied(order))
            }
            None => Ok(Transition::Unchanged(self.fetch_one(client, "id", &id).await?)),
        }
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let c = &order.customer;
        tx.execute(
            r#"
            INSERT INTO orders (
                id, customer_name, customer_phone, customer_email, address, pincode, city, state,
                total_amount, status, payment_method, gateway_order_id, payment_id, meta,
                created_at, updated_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16)
            "#,
            &[
                &order.id,
                &c.name,
                &c.phone,
                &c.email,
                &c.address,
                &c.pincode,
                &c.city,
                &c.state,
                &order.total_amount,
                &order.status.as_str(),
                &order.payment_method.as_str(),
                &order.gateway_order_id,
                &order.payment_id,
                &Json(&order.meta),
                &order.created_at,
                &order.updated_at,
            ],
        )
        .await?;

        for (position, it) in order.items.iter().enumerate() {
            let position = position as i32;
            tx.execute(
                r#"
                INSERT INTO order_items (order_id, position, product_id, title, unit_price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
                &[&order.id, &position, &it.product_id, &it.title, &it.unit_price, &it.quantity],
            )
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Order, RepositoryError> {
        let client = self.pool.get().await?;
        self.fetch_one(&client, "id", &id).await
    }

    async fn get_by_gateway_order_id(&self, gateway_order_id: &str) -> Result<Order, RepositoryError> {
        let client = self.pool.get().await?;
        self.fetch_one(&client, "gateway_order_id", &gateway_order_id).await
    }

    async fn find_recent_pending(
        &self,
        phone: &str,
        total_amount: i64,
        since: DateTime<Utc>,
    ) -> Result<Option<Order>, RepositoryError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE customer_phone = $1 AND total_amount = $2 AND created_at >= $3 AND status = ANY($4)
             ORDER BY created_at DESC LIMIT 1"
        );
        let statuses: Vec<&str> = PENDING_STATUSES.to_vec();
        let row = client
            .query_opt(query.as_str(), &[&phone, &total_amount, &since, &statuses])
            .await?;
        match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                load_items(&client, std::slice::from_mut(&mut order)).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn attach_gateway_order(
        &self,
        id: Uuid,
        gateway_order_id: &str,
        meta: &PaymentMeta,
    ) -> Result<Transition, RepositoryError> {
        let client = self.pool.get().await?;
        let query = format!(
            "UPDATE orders
             SET gateway_order_id = $2, meta = meta || $3::jsonb, updated_at = now()
             WHERE id = $1 AND status = 'PENDING_PAYMENT'
             RETURNING {ORDER_COLUMNS}"
        );
        let row = client
            .query_opt(query.as_str(), &[&id, &gateway_order_id, &Json(meta)])
            .await?;
        self.guarded_result(&client, id, row).await
    }

    async fn transition(&self, id: Uuid, update: &StatusUpdate) -> Result<Transition, RepositoryError> {
        let client = self.pool.get().await?;
        let query = format!(
            "UPDATE orders
             SET status = $3,
                 payment_id = COALESCE(payment_id, $4),
                 meta = meta || $5::jsonb,
                 updated_at = now()
             WHERE id = $1 AND status = $2
             RETURNING {ORDER_COLUMNS}"
        );
        let row = client
            .query_opt(
                query.as_str(),
                &[
                    &id,
                    &update.expected.as_str(),
                    &update.target.as_str(),
                    &update.payment_id,
                    &Json(&update.meta),
                ],
            )
            .await?;
        self.guarded_result(&client, id, row).await
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        meta: &PaymentMeta,
    ) -> Result<Order, RepositoryError> {
        let client = self.pool.get().await?;
        let query = format!(
            "UPDATE orders SET status = $2, meta = meta || $3::jsonb, updated_at = now()
             WHERE id = $1
             RETURNING {ORDER_COLUMNS}"
        );
        let row = client
            .query_opt(query.as_str(), &[&id, &status.as_str(), &Json(meta)])
            .await?;
        match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                load_items(&client, std::slice::from_mut(&mut order)).await?;
                Ok(order)
            }
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn list_recent(
        &self,
        status: Option<OrderStatus>,
        limit: i64,
    ) -> Result<Vec<Order>, RepositoryError> {
        let client = self.pool.get().await?;
        let query = format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::text IS NULL OR status = $1)
             ORDER BY created_at DESC LIMIT $2"
        );
        let status = status.map(|s| s.as_str());
        let rows = client.query(query.as_str(), &[&status, &limit]).await?;
        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        load_items(&client, &mut orders).await?;
        Ok(orders)
    }
}

fn order_from_row(row: &Row) -> Result<Order, RepositoryError> {
    let status: String = row.try_get("status")?;
    let status = status
        .parse::<OrderStatus>()
        .map_err(|e| RepositoryError::Corrupt(e.to_string()))?;
    let payment_method: String = row.try_get("payment_method")?;
    let payment_method = payment_method
        .parse::<PaymentMethod>()
        .map_err(|e| RepositoryError::Corrupt(format!("payment method: {e}")))?;
    let Json(meta): Json<PaymentMeta> = row.try_get("meta")?;

    Ok(Order {
        id: row.try_get("id")?,
        customer: Customer {
            name: row.try_get("customer_name")?,
            phone: row.try_get("customer_phone")?,
            email: row.try_get("customer_email")?,
            address: row.try_get("address")?,
            pincode: row.try_get("pincode")?,
            city: row.try_get("city")?,
            state: row.try_get("state")?,
        },
        items: Vec::new(), // filled by load_items
        total_amount: row.try_get("total_amount")?,
        status,
        payment_method,
        gateway_order_id: row.try_get("gateway_order_id")?,
        payment_id: row.try_get("payment_id")?,
        meta,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Fills `items` of every order with one query.
async fn load_items(client: &Object, orders: &mut [Order]) -> Result<(), RepositoryError> {
    if orders.is_empty() {
        return Ok(());
    }
    let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
    let rows = client
        .query(
            r#"
            SELECT order_id, product_id, title, unit_price, quantity
            FROM order_items WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
            &[&ids],
        )
        .await?;

    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let order_id: Uuid = row.try_get("order_id")?;
        by_order.entry(order_id).or_default().push(OrderItem {
            product_id: row.try_get("product_id")?,
            title: row.try_get("title")?,
            unit_price: row.try_get("unit_price")?,
            quantity: row.try_get("quantity")?,
        });
    }
    for order in orders.iter_mut() {
        order.items = by_order.remove(&order.id).unwrap_or_default();
    }
    Ok(())
}

/// PostgreSQL implementation of the ProductsRepository trait.
pub struct PgProductsRepository {
    pool: Pool,
}

impl PgProductsRepository {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProductsRepository for PgProductsRepository {
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                "SELECT id, title, mrp_paise, stock FROM products WHERE id = ANY($1)",
                &[&ids],
            )
            .await?;
        rows.iter()
            .map(|row| -> Result<Product, RepositoryError> {
                Ok(Product {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    mrp: row.try_get("mrp_paise")?,
                    stock: row.try_get("stock")?,
                })
            })
            .collect()
    }
}
