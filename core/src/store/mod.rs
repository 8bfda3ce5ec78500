// storefront/src/store/mod.rs

//! The persistence seam. `Store` serves plain reads and single-statement
//! writes; everything that must be atomic goes through a `StoreTx` obtained
//! from `Store::begin`. Dropping a `StoreTx` without committing rolls it back.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;

use crate::error::ShopResult;
use crate::model::{
  Customer, Order, OrderId, OrderItem, OrderPaymentStatus, OrderRecord, OrderStatus, Payment, PaymentId,
  PaymentStatus, ProductId, Variant, VariantId,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Hard cap on rows returned by any listing call.
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const DEFAULT_SEARCH_LIMIT: u32 = 20;

/// A limit/offset window, clamped to `MAX_PAGE_SIZE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
  pub limit: u32,
  pub offset: u32,
}

impl Page {
  pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
    Self {
      limit: limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE),
      offset: offset.unwrap_or(0),
    }
  }
}

impl Default for Page {
  fn default() -> Self {
    Page::new(None, None)
  }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
  pub customer: Customer,
  pub shipping_address: String,
  pub total: Decimal,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
  pub product_id: ProductId,
  pub variant_id: VariantId,
  pub quantity: u32,
  pub unit_price: Decimal,
}

impl NewOrderItem {
  pub fn line_total(&self) -> Decimal {
    self.unit_price * Decimal::from(self.quantity)
  }
}

#[derive(Debug, Clone)]
pub struct NewPayment {
  pub order_id: OrderId,
  pub amount: Decimal,
  pub currency: String,
  pub method: String,
  pub request_id: String,
  pub checkout_request_id: Option<String>,
  pub response_data: JsonValue,
}

/// Terminal outcome written onto a payment row.
#[derive(Debug, Clone)]
pub struct PaymentSettlement {
  pub status: PaymentStatus,
  pub reference: Option<String>,
  pub response_data: JsonValue,
}

/// Payment-driven changes to an order row. `None` fields are left untouched.
#[derive(Debug, Clone)]
pub struct OrderPaymentUpdate {
  pub payment_status: OrderPaymentStatus,
  pub status: Option<OrderStatus>,
  pub reference: Option<String>,
}

#[async_trait]
pub trait Store: Send + Sync {
  async fn begin(&self) -> ShopResult<Box<dyn StoreTx>>;

  async fn variant(&self, id: VariantId) -> ShopResult<Option<Variant>>;

  async fn order(&self, id: OrderId) -> ShopResult<Option<Order>>;

  /// Newest first.
  async fn orders_by_email(&self, email: &str) -> ShopResult<Vec<Order>>;

  /// Newest first.
  async fn list_orders(&self, page: Page) -> ShopResult<Vec<Order>>;

  /// Case-insensitive substring match on customer name, email or phone. Newest first.
  async fn search_orders(&self, term: &str, limit: u32) -> ShopResult<Vec<Order>>;

  /// Overwrites the status unconditionally. Returns false when the order does not exist.
  async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> ShopResult<bool>;

  async fn latest_payment(&self, order_id: OrderId) -> ShopResult<Option<Payment>>;
}

/// One atomic unit of work. Row reads through `lock_*` hold the row until commit or rollback.
#[async_trait]
pub trait StoreTx: Send {
  async fn lock_variant(&mut self, id: VariantId) -> ShopResult<Option<Variant>>;

  async fn insert_order(&mut self, order: &NewOrder) -> ShopResult<OrderRecord>;

  async fn insert_order_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> ShopResult<OrderItem>;

  /// Fails rather than letting stock go below zero.
  async fn decrement_stock(&mut self, id: VariantId, quantity: u32) -> ShopResult<()>;

  async fn lock_order(&mut self, id: OrderId) -> ShopResult<Option<OrderRecord>>;

  async fn insert_payment(&mut self, payment: &NewPayment) -> ShopResult<Payment>;

  async fn lock_payment_by_request_id(&mut self, request_id: &str) -> ShopResult<Option<Payment>>;

  /// Compare-and-set from `initiated`. Returns false when the payment was already settled.
  async fn settle_payment(&mut self, id: PaymentId, settlement: &PaymentSettlement) -> ShopResult<bool>;

  async fn update_order_payment(&mut self, id: OrderId, update: &OrderPaymentUpdate) -> ShopResult<()>;

  async fn commit(self: Box<Self>) -> ShopResult<()>;

  async fn rollback(self: Box<Self>) -> ShopResult<()>;
}

/// Escapes LIKE wildcards so a search term matches literally.
pub(crate) fn escape_like(term: &str) -> String {
  let mut escaped = String::with_capacity(term.len());
  for ch in term.chars() {
    if matches!(ch, '\\' | '%' | '_') {
      escaped.push('\\');
    }
    escaped.push(ch);
  }
  escaped
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn page_is_capped() {
    assert_eq!(Page::new(Some(500), None).limit, MAX_PAGE_SIZE);
    assert_eq!(Page::default().limit, DEFAULT_PAGE_SIZE);
  }

  #[test]
  fn like_wildcards_are_escaped() {
    assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
  }
}
