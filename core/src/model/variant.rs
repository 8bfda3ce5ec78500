// storefront/src/model/variant.rs

use rust_decimal::Decimal;
use serde::Serialize;

use super::{ProductId, VariantId};
use crate::error::{ShopError, ShopResult};

/// A purchasable SKU. Stock is unsigned, so a committed variant can never hold a negative count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Variant {
  pub id: VariantId,
  pub product_id: ProductId,
  pub name: String,
  pub price: Decimal,
  pub stock: u32,
}

impl Variant {
  /// Builds a variant from raw column values, rejecting negative stock or price.
  pub fn new(id: VariantId, product_id: ProductId, name: String, price: Decimal, stock: i64) -> ShopResult<Self> {
    let stock = u32::try_from(stock)
      .map_err(|_| ShopError::Integrity(format!("variant {} has out-of-range stock {}", id, stock)))?;
    if price.is_sign_negative() {
      return Err(ShopError::Integrity(format!("variant {} has negative price {}", id, price)));
    }
    Ok(Self {
      id,
      product_id,
      name,
      price,
      stock,
    })
  }

  pub fn in_stock(&self) -> bool {
    self.stock > 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn negative_stock_is_rejected() {
    let err = Variant::new(1, 1, "Small".into(), Decimal::new(100, 0), -1).unwrap_err();
    assert!(matches!(err, ShopError::Integrity(_)));
  }

  #[test]
  fn zero_stock_is_out_of_stock() {
    let v = Variant::new(1, 1, "Small".into(), Decimal::new(100, 0), 0).unwrap();
    assert!(!v.in_stock());
  }
}
