// storefront/src/orders/engine.rs

//! The Order Engine. Order creation is one transaction: every variant is
//! locked and checked, then the order, its items and the stock decrements are
//! written, and the whole unit commits or rolls back together.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::error::{ShopError, ShopResult};
use crate::model::{Customer, Order, OrderId, OrderStatus, ProductId, Variant, VariantId};
use crate::store::{NewOrder, NewOrderItem, Page, Store, StoreTx, DEFAULT_SEARCH_LIMIT};

/// Minimum number of characters a search term must have.
pub const MIN_SEARCH_TERM_CHARS: usize = 2;

/// One requested line. `product_id`, when given, must be the variant's parent product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
  pub product_id: Option<ProductId>,
  pub variant_id: VariantId,
  pub quantity: u32,
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
  pub customer: Customer,
  pub shipping_address: String,
  pub items: Vec<OrderLine>,
}

/// Total quantity asked of one variant across all lines of a request.
#[derive(Debug, Clone, Copy)]
struct Demand {
  product_id: Option<ProductId>,
  quantity: u32,
}

#[derive(Clone)]
pub struct OrderEngine {
  store: Arc<dyn Store>,
}

impl OrderEngine {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Creates an order, snapshotting prices and decrementing stock atomically.
  ///
  /// Fails with `NotFound` for an unknown variant and `InsufficientStock`
  /// naming the first short variant (in ascending id order). A failure in any
  /// write step surfaces as `TransactionFailure` and leaves no trace.
  #[instrument(
    name = "OrderEngine::create",
    skip(self, request),
    fields(customer_email = %request.customer.email, lines = request.items.len())
  )]
  pub async fn create(&self, request: OrderRequest) -> ShopResult<Order> {
    let demand = aggregate_demand(&request.items)?;

    let mut tx = self.store.begin().await?;
    match place_order(tx.as_mut(), &request, &demand).await {
      Ok(order) => {
        tx.commit().await.map_err(ShopError::during("commit"))?;
        info!(order_id = order.id(), total = %order.total(), "Order created.");
        Ok(order)
      }
      Err(err) => {
        if let Err(rollback_err) = tx.rollback().await {
          error!(error = %rollback_err, "Rollback after failed order creation also failed.");
        }
        match &err {
          ShopError::TransactionFailure { .. } | ShopError::Database(_) => {
            error!(error = %err, "Order creation rolled back.")
          }
          _ => warn!(error = %err, "Order rejected."),
        }
        Err(err)
      }
    }
  }

  #[instrument(name = "OrderEngine::get_by_id", skip(self))]
  pub async fn get_by_id(&self, id: OrderId) -> ShopResult<Order> {
    self
      .store
      .order(id)
      .await?
      .ok_or_else(|| ShopError::not_found("Order", id))
  }

  pub async fn get_by_email(&self, email: &str) -> ShopResult<Vec<Order>> {
    self.store.orders_by_email(email).await
  }

  pub async fn get_all(&self, page: Page) -> ShopResult<Vec<Order>> {
    self.store.list_orders(page).await
  }

  #[instrument(name = "OrderEngine::search", skip(self))]
  pub async fn search(&self, term: &str) -> ShopResult<Vec<Order>> {
    let term = term.trim();
    if term.chars().count() < MIN_SEARCH_TERM_CHARS {
      return Err(ShopError::Validation(format!(
        "Search term must be at least {} characters",
        MIN_SEARCH_TERM_CHARS
      )));
    }
    self.store.search_orders(term, DEFAULT_SEARCH_LIMIT).await
  }

  /// Overwrites the order status. Any status may follow any other.
  #[instrument(name = "OrderEngine::update_status", skip(self))]
  pub async fn update_status(&self, id: OrderId, status: OrderStatus) -> ShopResult<Order> {
    if !self.store.set_order_status(id, status).await? {
      return Err(ShopError::not_found("Order", id));
    }
    info!(order_id = id, status = %status, "Order status updated.");
    self.get_by_id(id).await
  }
}

/// Folds the request lines into per-variant demand, keyed in lock order.
fn aggregate_demand(lines: &[OrderLine]) -> ShopResult<BTreeMap<VariantId, Demand>> {
  if lines.is_empty() {
    return Err(ShopError::Validation("Order must contain at least one item".to_string()));
  }
  let mut demand: BTreeMap<VariantId, Demand> = BTreeMap::new();
  for line in lines {
    if line.quantity == 0 {
      return Err(ShopError::Validation(format!(
        "Quantity for variant {} must be at least 1",
        line.variant_id
      )));
    }
    let entry = demand.entry(line.variant_id).or_insert(Demand {
      product_id: line.product_id,
      quantity: 0,
    });
    match (entry.product_id, line.product_id) {
      (Some(a), Some(b)) if a != b => {
        return Err(ShopError::Validation(format!(
          "Variant {} is listed under both product {} and product {}",
          line.variant_id, a, b
        )));
      }
      (None, Some(b)) => entry.product_id = Some(b),
      _ => {}
    }
    entry.quantity = entry
      .quantity
      .checked_add(line.quantity)
      .ok_or_else(|| ShopError::Validation(format!("Quantity for variant {} is too large", line.variant_id)))?;
  }
  Ok(demand)
}

/// Everything between `begin` and `commit`. Any error leaves the caller to roll back.
async fn place_order(
  tx: &mut dyn StoreTx,
  request: &OrderRequest,
  demand: &BTreeMap<VariantId, Demand>,
) -> ShopResult<Order> {
  let mut locked: BTreeMap<VariantId, Variant> = BTreeMap::new();
  for (&variant_id, wanted) in demand {
    let variant = tx
      .lock_variant(variant_id)
      .await?
      .ok_or_else(|| ShopError::not_found("Variant", variant_id))?;
    if let Some(product_id) = wanted.product_id {
      if product_id != variant.product_id {
        return Err(ShopError::Validation(format!(
          "Variant {} does not belong to product {}",
          variant_id, product_id
        )));
      }
    }
    if variant.stock < wanted.quantity {
      return Err(ShopError::InsufficientStock {
        variant_id,
        variant_name: variant.name.clone(),
        available: variant.stock,
        requested: wanted.quantity,
      });
    }
    locked.insert(variant_id, variant);
  }

  // Prices come from the locked rows, never from the caller.
  let mut new_items = Vec::with_capacity(request.items.len());
  for line in &request.items {
    let variant = locked
      .get(&line.variant_id)
      .ok_or_else(|| ShopError::not_found("Variant", line.variant_id))?;
    new_items.push(NewOrderItem {
      product_id: variant.product_id,
      variant_id: variant.id,
      quantity: line.quantity,
      unit_price: variant.price,
    });
  }
  let total: Decimal = new_items.iter().map(NewOrderItem::line_total).sum();

  let new_order = NewOrder {
    customer: request.customer.clone(),
    shipping_address: request.shipping_address.clone(),
    total,
  };
  let record = tx
    .insert_order(&new_order)
    .await
    .map_err(ShopError::during("insert order"))?;

  let mut items = Vec::with_capacity(new_items.len());
  for item in &new_items {
    items.push(
      tx.insert_order_item(record.id, item)
        .await
        .map_err(ShopError::during("insert order item"))?,
    );
  }

  for (&variant_id, wanted) in demand {
    tx.decrement_stock(variant_id, wanted.quantity)
      .await
      .map_err(ShopError::during("decrement stock"))?;
  }

  Order::assemble(record, items)
}
