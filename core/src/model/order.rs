// storefront/src/model/order.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use std::str::FromStr;

use super::{OrderId, OrderItemId, ProductId, VariantId};
use crate::error::{ShopError, ShopResult};

/// Order lifecycle. Admin edits may move between any two values; the only
/// system-driven move is pending -> processing on a successful payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Processing,
  Shipped,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  pub const ALL: [OrderStatus; 5] = [
    OrderStatus::Pending,
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
    OrderStatus::Cancelled,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Processing => "processing",
      OrderStatus::Shipped => "shipped",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for OrderStatus {
  type Err = ShopError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    OrderStatus::ALL
      .into_iter()
      .find(|status| status.as_str() == s)
      .ok_or_else(|| ShopError::Validation(format!("Invalid order status '{}'", s)))
  }
}

/// Payment state as seen from the order, independent of fulfilment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderPaymentStatus {
  Unset,
  Initiated,
  Completed,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
  pub name: String,
  pub email: String,
  pub phone: String,
}

/// The `orders` row on its own, without line items.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct OrderRecord {
  pub id: OrderId,
  pub customer_name: String,
  pub customer_email: String,
  pub customer_phone: String,
  pub shipping_address: String,
  pub total: Decimal,
  pub status: OrderStatus,
  pub payment_status: OrderPaymentStatus,
  pub payment_reference: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// One line of an order. Immutable once written; `unit_price` is the variant price at order time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
  pub id: OrderItemId,
  pub order_id: OrderId,
  pub product_id: ProductId,
  pub variant_id: VariantId,
  pub quantity: u32,
  pub unit_price: Decimal,
}

impl OrderItem {
  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}

/// An order together with the items it owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
  #[serde(flatten)]
  record: OrderRecord,
  items: Vec<OrderItem>,
}

impl Order {
  /// Joins a record with its items, checking ownership and that the stored
  /// total equals the sum of the line totals.
  pub fn assemble(record: OrderRecord, items: Vec<OrderItem>) -> ShopResult<Self> {
    if let Some(stray) = items.iter().find(|item| item.order_id != record.id) {
      return Err(ShopError::Integrity(format!(
        "order item {} belongs to order {}, not {}",
        stray.id, stray.order_id, record.id
      )));
    }
    let line_sum: Decimal = items.iter().map(OrderItem::line_total).sum();
    if line_sum != record.total {
      return Err(ShopError::Integrity(format!(
        "order {} total {} does not match line items sum {}",
        record.id, record.total, line_sum
      )));
    }
    Ok(Self { record, items })
  }

  pub fn record(&self) -> &OrderRecord {
    &self.record
  }

  pub fn items(&self) -> &[OrderItem] {
    &self.items
  }

  pub fn id(&self) -> OrderId {
    self.record.id
  }

  pub fn total(&self) -> Decimal {
    self.record.total
  }

  pub fn status(&self) -> OrderStatus {
    self.record.status
  }

  pub fn payment_status(&self) -> OrderPaymentStatus {
    self.record.payment_status
  }

  pub fn payment_reference(&self) -> Option<&str> {
    self.record.payment_reference.as_deref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn record(total: Decimal) -> OrderRecord {
    OrderRecord {
      id: 1,
      customer_name: "Wanjiku".into(),
      customer_email: "wanjiku@example.com".into(),
      customer_phone: "0712345678".into(),
      shipping_address: "Moi Avenue, Nairobi".into(),
      total,
      status: OrderStatus::Pending,
      payment_status: OrderPaymentStatus::Unset,
      payment_reference: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn item(id: OrderItemId, quantity: u32, unit_price: i64) -> OrderItem {
    OrderItem {
      id,
      order_id: 1,
      product_id: 10,
      variant_id: 100 + id,
      quantity,
      unit_price: Decimal::from(unit_price),
    }
  }

  #[test]
  fn assemble_accepts_matching_total() {
    let order = Order::assemble(record(Decimal::from(200)), vec![item(1, 1, 100), item(2, 2, 50)]).unwrap();
    assert_eq!(order.items().len(), 2);
    assert_eq!(order.total(), Decimal::from(200));
  }

  #[test]
  fn assemble_rejects_total_mismatch() {
    let err = Order::assemble(record(Decimal::from(150)), vec![item(1, 1, 100), item(2, 2, 50)]).unwrap_err();
    assert!(matches!(err, ShopError::Integrity(_)));
  }

  #[test]
  fn status_parses_only_known_values() {
    assert_eq!("shipped".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
    assert!("refunded".parse::<OrderStatus>().is_err());
  }
}
