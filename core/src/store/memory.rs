// storefront/src/store/memory.rs

//! In-process store with the same transactional contract as `PgStore`.
//!
//! Transactions are fully serialized: `begin` takes an owned lock on the whole
//! state, writes go to a staged copy, and `commit` publishes the copy. A
//! dropped or rolled-back transaction simply discards it.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use super::{
  NewOrder, NewOrderItem, NewPayment, OrderPaymentUpdate, Page, PaymentSettlement, Store, StoreTx,
};
use crate::error::{ShopError, ShopResult};
use crate::model::{
  Order, OrderId, OrderItem, OrderPaymentStatus, OrderRecord, OrderStatus, Payment, PaymentId, PaymentStatus,
  ProductId, Variant, VariantId,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
  next_id: i64,
  products: BTreeMap<ProductId, String>,
  variants: BTreeMap<VariantId, Variant>,
  orders: BTreeMap<OrderId, OrderRecord>,
  items: Vec<OrderItem>,
  payments: Vec<Payment>,
}

impl MemoryState {
  fn next_id(&mut self) -> i64 {
    self.next_id += 1;
    self.next_id
  }

  fn assemble(&self, record: &OrderRecord) -> ShopResult<Order> {
    let items = self
      .items
      .iter()
      .filter(|item| item.order_id == record.id)
      .cloned()
      .collect();
    Order::assemble(record.clone(), items)
  }

  /// Newest first, matching the SQL ordering.
  fn newest_first<'a>(&'a self, keep: impl Fn(&OrderRecord) -> bool + 'a) -> impl Iterator<Item = &'a OrderRecord> + 'a {
    self.orders.values().rev().filter(move |r| keep(*r))
  }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
  state: Arc<AsyncMutex<MemoryState>>,
  failing_decrements: Arc<Mutex<HashSet<VariantId>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn add_product(&self, name: &str) -> ProductId {
    let mut state = self.state.lock().await;
    let id = state.next_id();
    state.products.insert(id, name.to_string());
    id
  }

  pub async fn add_variant(&self, product_id: ProductId, name: &str, price: Decimal, stock: u32) -> VariantId {
    let mut state = self.state.lock().await;
    let id = state.next_id();
    state.variants.insert(
      id,
      Variant {
        id,
        product_id,
        name: name.to_string(),
        price,
        stock,
      },
    );
    id
  }

  /// Catalog price edit, outside any order transaction.
  pub async fn set_variant_price(&self, id: VariantId, price: Decimal) -> ShopResult<()> {
    let mut state = self.state.lock().await;
    let variant = state
      .variants
      .get_mut(&id)
      .ok_or_else(|| ShopError::not_found("Variant", id))?;
    variant.price = price;
    Ok(())
  }

  /// Makes every later stock decrement of `variant_id` fail, to exercise rollback.
  pub fn fail_stock_decrement(&self, variant_id: VariantId) {
    self.failing_decrements.lock().insert(variant_id);
  }

  pub async fn order_count(&self) -> usize {
    self.state.lock().await.orders.len()
  }

  pub async fn item_count(&self) -> usize {
    self.state.lock().await.items.len()
  }

  pub async fn payments_for(&self, order_id: OrderId) -> Vec<Payment> {
    let state = self.state.lock().await;
    state.payments.iter().filter(|p| p.order_id == order_id).cloned().collect()
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn begin(&self) -> ShopResult<Box<dyn StoreTx>> {
    let guard = self.state.clone().lock_owned().await;
    let staged = guard.clone();
    Ok(Box::new(MemoryTx {
      guard,
      staged,
      failing_decrements: self.failing_decrements.clone(),
    }))
  }

  async fn variant(&self, id: VariantId) -> ShopResult<Option<Variant>> {
    Ok(self.state.lock().await.variants.get(&id).cloned())
  }

  async fn order(&self, id: OrderId) -> ShopResult<Option<Order>> {
    let state = self.state.lock().await;
    state.orders.get(&id).map(|record| state.assemble(record)).transpose()
  }

  async fn orders_by_email(&self, email: &str) -> ShopResult<Vec<Order>> {
    let state = self.state.lock().await;
    state
      .newest_first(|r| r.customer_email == email)
      .map(|r| state.assemble(r))
      .collect()
  }

  async fn list_orders(&self, page: Page) -> ShopResult<Vec<Order>> {
    let state = self.state.lock().await;
    state
      .newest_first(|_| true)
      .skip(page.offset as usize)
      .take(page.limit as usize)
      .map(|r| state.assemble(r))
      .collect()
  }

  async fn search_orders(&self, term: &str, limit: u32) -> ShopResult<Vec<Order>> {
    let needle = term.to_lowercase();
    let state = self.state.lock().await;
    state
      .newest_first(|r| {
        [&r.customer_name, &r.customer_email, &r.customer_phone]
          .iter()
          .any(|field| field.to_lowercase().contains(&needle))
      })
      .take(limit as usize)
      .map(|r| state.assemble(r))
      .collect()
  }

  async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> ShopResult<bool> {
    let mut state = self.state.lock().await;
    debug!(order_id = id, status = %status, "Overwriting order status.");
    match state.orders.get_mut(&id) {
      Some(record) => {
        record.status = status;
        record.updated_at = Utc::now();
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn latest_payment(&self, order_id: OrderId) -> ShopResult<Option<Payment>> {
    let state = self.state.lock().await;
    Ok(state.payments.iter().rev().find(|p| p.order_id == order_id).cloned())
  }
}

struct MemoryTx {
  guard: OwnedMutexGuard<MemoryState>,
  staged: MemoryState,
  failing_decrements: Arc<Mutex<HashSet<VariantId>>>,
}

#[async_trait]
impl StoreTx for MemoryTx {
  async fn lock_variant(&mut self, id: VariantId) -> ShopResult<Option<Variant>> {
    Ok(self.staged.variants.get(&id).cloned())
  }

  async fn insert_order(&mut self, order: &NewOrder) -> ShopResult<OrderRecord> {
    let now = Utc::now();
    let record = OrderRecord {
      id: self.staged.next_id(),
      customer_name: order.customer.name.clone(),
      customer_email: order.customer.email.clone(),
      customer_phone: order.customer.phone.clone(),
      shipping_address: order.shipping_address.clone(),
      total: order.total,
      status: OrderStatus::Pending,
      payment_status: OrderPaymentStatus::Unset,
      payment_reference: None,
      created_at: now,
      updated_at: now,
    };
    self.staged.orders.insert(record.id, record.clone());
    Ok(record)
  }

  async fn insert_order_item(&mut self, order_id: OrderId, item: &NewOrderItem) -> ShopResult<OrderItem> {
    if !self.staged.orders.contains_key(&order_id) {
      return Err(ShopError::Integrity(format!("order item references missing order {}", order_id)));
    }
    let item = OrderItem {
      id: self.staged.next_id(),
      order_id,
      product_id: item.product_id,
      variant_id: item.variant_id,
      quantity: item.quantity,
      unit_price: item.unit_price,
    };
    self.staged.items.push(item.clone());
    Ok(item)
  }

  async fn decrement_stock(&mut self, id: VariantId, quantity: u32) -> ShopResult<()> {
    if self.failing_decrements.lock().contains(&id) {
      return Err(ShopError::Integrity(format!("injected stock decrement failure on variant {}", id)));
    }
    let variant = self
      .staged
      .variants
      .get_mut(&id)
      .ok_or_else(|| ShopError::not_found("Variant", id))?;
    variant.stock = variant.stock.checked_sub(quantity).ok_or_else(|| {
      ShopError::Integrity(format!("stock decrement of {} on variant {} would go below zero", quantity, id))
    })?;
    Ok(())
  }

  async fn lock_order(&mut self, id: OrderId) -> ShopResult<Option<OrderRecord>> {
    Ok(self.staged.orders.get(&id).cloned())
  }

  async fn insert_payment(&mut self, payment: &NewPayment) -> ShopResult<Payment> {
    if !self.staged.orders.contains_key(&payment.order_id) {
      return Err(ShopError::Integrity(format!("payment references missing order {}", payment.order_id)));
    }
    if self.staged.payments.iter().any(|p| p.request_id == payment.request_id) {
      return Err(ShopError::Integrity(format!("duplicate payment request id {}", payment.request_id)));
    }
    let inserted = Payment {
      id: Uuid::new_v4(),
      order_id: payment.order_id,
      amount: payment.amount,
      currency: payment.currency.clone(),
      method: payment.method.clone(),
      request_id: payment.request_id.clone(),
      checkout_request_id: payment.checkout_request_id.clone(),
      status: PaymentStatus::Initiated,
      reference: None,
      response_data: payment.response_data.clone(),
      created_at: Utc::now(),
      settled_at: None,
    };
    self.staged.payments.push(inserted.clone());
    Ok(inserted)
  }

  async fn lock_payment_by_request_id(&mut self, request_id: &str) -> ShopResult<Option<Payment>> {
    Ok(self.staged.payments.iter().find(|p| p.request_id == request_id).cloned())
  }

  async fn settle_payment(&mut self, id: PaymentId, settlement: &PaymentSettlement) -> ShopResult<bool> {
    let payment = self
      .staged
      .payments
      .iter_mut()
      .find(|p| p.id == id)
      .ok_or_else(|| ShopError::not_found("Payment", id))?;
    if payment.status != PaymentStatus::Initiated {
      return Ok(false);
    }
    payment.status = settlement.status;
    if settlement.reference.is_some() {
      payment.reference = settlement.reference.clone();
    }
    payment.response_data = settlement.response_data.clone();
    payment.settled_at = Some(Utc::now());
    Ok(true)
  }

  async fn update_order_payment(&mut self, id: OrderId, update: &OrderPaymentUpdate) -> ShopResult<()> {
    let record = self
      .staged
      .orders
      .get_mut(&id)
      .ok_or_else(|| ShopError::not_found("Order", id))?;
    record.payment_status = update.payment_status;
    if let Some(status) = update.status {
      record.status = status;
    }
    if update.reference.is_some() {
      record.payment_reference = update.reference.clone();
    }
    record.updated_at = Utc::now();
    Ok(())
  }

  async fn commit(self: Box<Self>) -> ShopResult<()> {
    let MemoryTx { mut guard, staged, .. } = *self;
    *guard = staged;
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> ShopResult<()> {
    Ok(())
  }
}
