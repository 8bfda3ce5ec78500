// storefront/src/store/postgres.rs

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{FromRow, Postgres, Transaction};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::{
  escape_like, NewOrder, NewOrderItem, NewPayment, OrderPaymentUpdate, Page, PaymentSettlement, Store, StoreTx,
};
use crate::error::{ShopError, ShopResult};
use crate::model::{
  Order, OrderId, OrderItem, OrderItemId, OrderRecord, OrderStatus, Payment, PaymentId, ProductId, Variant, VariantId,
};

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

const ORDER_COLUMNS: &str = "id, customer_name, customer_email, customer_phone, shipping_address, total, status, \
                             payment_status, payment_reference, created_at, updated_at";
const ITEM_COLUMNS: &str = "id, order_id, product_id, variant_id, quantity, unit_price";
const VARIANT_COLUMNS: &str = "id, product_id, name, price, stock";
const PAYMENT_COLUMNS: &str = "id, order_id, amount, currency, method, request_id, checkout_request_id, status, \
                               reference, response_data, created_at, settled_at";

#[derive(FromRow)]
struct VariantRow {
  id: VariantId,
  product_id: ProductId,
  name: String,
  price: Decimal,
  stock: i32,
}

impl TryFrom<VariantRow> for Variant {
  type Error = ShopError;

  fn try_from(row: VariantRow) -> ShopResult<Self> {
    Variant::new(row.id, row.product_id, row.name, row.price, i64::from(row.stock))
  }
}

#[derive(FromRow)]
struct OrderItemRow {
  id: OrderItemId,
  order_id: OrderId,
  product_id: ProductId,
  variant_id: VariantId,
  quantity: i32,
  unit_price: Decimal,
}

impl TryFrom<OrderItemRow> for OrderItem {
  type Error = ShopError;

  fn try_from(row: OrderItemRow) -> ShopResult<Self> {
    let quantity = u32::try_from(row.quantity)
      .map_err(|_| ShopError::Integrity(format!("order item {} has quantity {}", row.id, row.quantity)))?;
    Ok(OrderItem {
      id: row.id,
      order_id: row.order_id,
      product_id: row.product_id,
      variant_id: row.variant_id,
      quantity,
      unit_price: row.unit_price,
    })
  }
}

fn quantity_param(quantity: u32) -> ShopResult<i32> {
  i32::try_from(quantity).map_err(|_| ShopError::Validation(format!("quantity {} is too large", quantity)))
}

/// Postgres-backed store. Holds only the pool handed to it.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  pub async fn connect(database_url: &str, max_connections: u32) -> ShopResult<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(database_url)
      .await?;
    Ok(Self::new(pool))
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }

  /// Applies the embedded migrations.
  pub async fn migrate(&self) -> ShopResult<()> {
    MIGRATOR
      .run(&self.pool)
      .await
      .map_err(|e| ShopError::Database(sqlx::Error::from(e)))
  }

  /// Attaches items to each record with a single query.
  async fn hydrate(&self, records: Vec<OrderRecord>) -> ShopResult<Vec<Order>> {
    if records.is_empty() {
      return Ok(Vec::new());
    }
    let ids: Vec<OrderId> = records.iter().map(|r| r.id).collect();
    let rows: Vec<OrderItemRow> = sqlx::query_as(&format!(
      "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id ASC"
    ))
    .bind(ids)
    .fetch_all(&self.pool)
    .await?;

    let mut by_order: HashMap<OrderId, Vec<OrderItem>> = HashMap::new();
    for row in rows {
      let item = OrderItem::try_from(row)?;
      by_order.entry(item.order_id).or_default().push(item);
    }
    records
      .into_iter()
      .map(|record| {
        let items = by_order.remove(&record.id).unwrap_or_default();
        Order::assemble(record, items)
      })
      .collect()
  }
}

#[async_trait]
impl Store for PgStore {
  async fn begin(&self) -> ShopResult<Box<dyn StoreTx>> {
    let tx = self.pool.begin().await?;
    Ok(Box::new(PgTx { tx }))
  }

  async fn variant(&self, id: VariantId) -> ShopResult<Option<Variant>> {
    let row: Option<VariantRow> =
      sqlx::query_as(&format!("SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1"))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
    row.map(Variant::try_from).transpose()
  }

  async fn order(&self, id: OrderId) -> ShopResult<Option<Order>> {
    let record: Option<OrderRecord> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
      .bind(id)
      .fetch_optional(&self.pool)
      .await?;
    match record {
      Some(record) => Ok(self.hydrate(vec![record]).await?.pop()),
      None => Ok(None),
    }
  }

  async fn orders_by_email(&self, email: &str) -> ShopResult<Vec<Order>> {
    let records: Vec<OrderRecord> = sqlx::query_as(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders WHERE customer_email = $1 ORDER BY created_at DESC, id DESC"
    ))
    .bind(email)
    .fetch_all(&self.pool)
    .await?;
    self.hydrate(records).await
  }

  async fn list_orders(&self, page: Page) -> ShopResult<Vec<Order>> {
    let records: Vec<OrderRecord> = sqlx::query_as(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
    ))
    .bind(i64::from(page.limit))
    .bind(i64::from(page.offset))
    .fetch_all(&self.pool)
    .await?;
    self.hydrate(records).await
  }

  async fn search_orders(&self, term: &str, limit: u32) -> ShopResult<Vec<Order>> {
    let pattern = format!("%{}%", escape_like(term));
    let records: Vec<OrderRecord> = sqlx::query_as(&format!(
      "SELECT {ORDER_COLUMNS} FROM orders \
       WHERE customer_name ILIKE $1 OR customer_email ILIKE $1 OR customer_phone ILIKE $1 \
       ORDER BY created_at DESC, id DESC LIMIT $2"
    ))
    .bind(pattern)
    .bind(i64::from(limit))
    .fetch_all(&self.pool)
    .await?;
    self.hydrate(records).await
  }

  async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> ShopResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = $1, updated_at = now() WHERE id = $2")
      .bind(status)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn latest_payment(&self, order_id: OrderId) -> ShopResult<Option<Payment>> {
    let payment = sqlx::query_as(&format!(
      "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1 ORDER BY created_at DESC LIMIT 1"
    ))
    .bind(order_id)
    .fetch_optional(&self.pool)
    .await?;
    Ok(payment)
  }
}

struct PgTx {
  tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
  async fn lock_variant(&mut self, id: VariantId) -> ShopResult<Option<Variant>> {
    let row: Option<VariantRow> = sqlx::query_as(&format!(
      "SELECT {VARIANT_COLUMNS} FROM product_variants WHERE id = $1 FOR UPDATE"
    ))
    .bind(id)
    .fetch_optional(&mut *self.tx)
    .await?;
    row.map(Variant::try_from).transpose()
  }

  async fn insert_order(&mut self, order: &NewOrder) -> ShopResult<OrderRecord> {
    let record = sqlx::query_as(&format!(
      "INSERT INTO orders (customer_name, customer_email, customer_phone, shipping_address, total) \
       VALUES ($1, $2, $3, $4, $5) RETURNING {ORDER_COLUMNS}"
    ))
    .bind(&order.customer.name)
    .bind(&order.customer.email)
    .bind(&order.customer.phone)
    .bind(&order.shipping_address)
    .bind(order.total)
    .fetch_one(&mut *self.tx)
    .await?;
    Ok(record)
  }

  async fn insert_order_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> ShopResult<OrderItem> {
    let row: OrderItemRow = sqlx::query_as(&format!(
      "INSERT INTO order_items (order_id, product_id, variant_id, quantity, unit_price) \
       VALUES ($1, $2, $3, $4, $5) RETURNING {ITEM_COLUMNS}"
    ))
    .bind(order_id)
    .bind(item.product_id)
    .bind(item.variant_id)
    .bind(quantity_param(item.quantity)?)
    .bind(item.unit_price)
    .fetch_one(&mut *self.tx)
    .await?;
    OrderItem::try_from(row)
  }

  #[instrument(name = "PgTx::decrement_stock", skip(self), level = "debug")]
  async fn decrement_stock(&mut self, id: VariantId, quantity: u32) -> ShopResult<()> {
    let result = sqlx::query(
      "UPDATE product_variants SET stock = stock - $1, updated_at = now() WHERE id = $2 AND stock >= $1",
    )
    .bind(quantity_param(quantity)?)
    .bind(id)
    .execute(&mut *self.tx)
    .await?;
    if result.rows_affected() != 1 {
      return Err(ShopError::Integrity(format!(
        "stock decrement of {} on variant {} would go below zero",
        quantity, id
      )));
    }
    debug!("Stock decremented.");
    Ok(())
  }

  async fn lock_order(&mut self, id: OrderId) -> ShopResult<Option<OrderRecord>> {
    let record = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
      .bind(id)
      .fetch_optional(&mut *self.tx)
      .await?;
    Ok(record)
  }

  async fn insert_payment(&mut self, payment: &NewPayment) -> ShopResult<Payment> {
    let inserted = sqlx::query_as(&format!(
      "INSERT INTO payments (id, order_id, amount, currency, method, request_id, checkout_request_id, response_data) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {PAYMENT_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(payment.order_id)
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.method)
    .bind(&payment.request_id)
    .bind(&payment.checkout_request_id)
    .bind(&payment.response_data)
    .fetch_one(&mut *self.tx)
    .await?;
    Ok(inserted)
  }

  async fn lock_payment_by_request_id(&mut self, request_id: &str) -> ShopResult<Option<Payment>> {
    let payment = sqlx::query_as(&format!(
      "SELECT {PAYMENT_COLUMNS} FROM payments WHERE request_id = $1 FOR UPDATE"
    ))
    .bind(request_id)
    .fetch_optional(&mut *self.tx)
    .await?;
    Ok(payment)
  }

  async fn settle_payment(&mut self, id: PaymentId, settlement: &PaymentSettlement) -> ShopResult<bool> {
    let result = sqlx::query(
      "UPDATE payments SET status = $1, reference = COALESCE($2, reference), response_data = $3, settled_at = now() \
       WHERE id = $4 AND status = 'initiated'",
    )
    .bind(settlement.status)
    .bind(&settlement.reference)
    .bind(&settlement.response_data)
    .bind(id)
    .execute(&mut *self.tx)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  async fn update_order_payment(&mut self, id: OrderId, update: &OrderPaymentUpdate) -> ShopResult<()> {
    let result = sqlx::query(
      "UPDATE orders SET payment_status = $1, status = COALESCE($2, status), \
       payment_reference = COALESCE($3, payment_reference), updated_at = now() WHERE id = $4",
    )
    .bind(update.payment_status)
    .bind(update.status)
    .bind(&update.reference)
    .bind(id)
    .execute(&mut *self.tx)
    .await?;
    if result.rows_affected() != 1 {
      return Err(ShopError::not_found("Order", id));
    }
    Ok(())
  }

  async fn commit(self: Box<Self>) -> ShopResult<()> {
    self.tx.commit().await?;
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> ShopResult<()> {
    self.tx.rollback().await?;
    Ok(())
  }
}
