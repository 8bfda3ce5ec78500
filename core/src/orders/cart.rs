// storefront/src/orders/cart.rs

//! Read-only cart checks against current catalog prices and stock. Nothing
//! here reserves or decrements stock.

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::ShopResult;
use crate::model::{ProductId, VariantId};
use crate::store::Store;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
  pub variant_id: VariantId,
  pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedLine {
  pub variant_id: VariantId,
  pub product_id: ProductId,
  pub variant_name: String,
  pub quantity: u32,
  pub unit_price: Decimal,
  pub line_total: Decimal,
  pub stock_available: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartValidation {
  pub items: Vec<ValidatedLine>,
  pub total: Decimal,
  pub errors: Vec<String>,
}

impl CartValidation {
  pub fn is_valid(&self) -> bool {
    self.errors.is_empty()
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockLevel {
  pub variant_id: VariantId,
  pub stock: u32,
  pub price: Decimal,
  pub in_stock: bool,
}

#[derive(Clone)]
pub struct CartService {
  store: Arc<dyn Store>,
}

impl CartService {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Prices each line at the current catalog price. Unknown variants and
  /// shortfalls are reported in `errors` and left out of the total.
  #[instrument(name = "CartService::validate_cart", skip(self, lines), fields(lines = lines.len()))]
  pub async fn validate_cart(&self, lines: &[CartLine]) -> ShopResult<CartValidation> {
    let mut items = Vec::with_capacity(lines.len());
    let mut errors = Vec::new();
    let mut total = Decimal::ZERO;

    for line in lines {
      let Some(variant) = self.store.variant(line.variant_id).await? else {
        errors.push(format!("Variant not found: {}", line.variant_id));
        continue;
      };
      if variant.stock < line.quantity {
        errors.push(format!(
          "Insufficient stock for {} (#{}). Available: {}, Requested: {}",
          variant.name, variant.id, variant.stock, line.quantity
        ));
        continue;
      }
      let line_total = variant.price * Decimal::from(line.quantity);
      total += line_total;
      items.push(ValidatedLine {
        variant_id: variant.id,
        product_id: variant.product_id,
        variant_name: variant.name,
        quantity: line.quantity,
        unit_price: variant.price,
        line_total,
        stock_available: variant.stock,
      });
    }

    debug!(valid = items.len(), errors = errors.len(), "Cart validated.");
    Ok(CartValidation { items, total, errors })
  }

  /// Unknown ids are skipped.
  pub async fn check_stock(&self, variant_ids: &[VariantId]) -> ShopResult<Vec<StockLevel>> {
    let mut levels = Vec::with_capacity(variant_ids.len());
    for &id in variant_ids {
      if let Some(variant) = self.store.variant(id).await? {
        levels.push(StockLevel {
          variant_id: variant.id,
          stock: variant.stock,
          price: variant.price,
          in_stock: variant.in_stock(),
        });
      }
    }
    Ok(levels)
  }
}
