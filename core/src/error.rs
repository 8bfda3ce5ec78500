// storefront/src/error.rs
use thiserror::Error;

use crate::model::{OrderId, VariantId};

#[derive(Debug, Error)]
pub enum ShopError {
  #[error("{entity} {id} not found")]
  NotFound { entity: &'static str, id: String },

  #[error("Insufficient stock for variant {variant_name} (#{variant_id}): available {available}, requested {requested}")]
  InsufficientStock {
    variant_id: VariantId,
    variant_name: String,
    available: u32,
    requested: u32,
  },

  #[error("Invalid phone number format: '{0}'")]
  InvalidPhoneFormat(String),

  #[error("Payment gateway unavailable: {0}")]
  GatewayUnavailable(String),

  #[error("No payment matches correlation id '{request_id}'")]
  UnknownPayment { request_id: String },

  #[error("Malformed payment callback: {0}")]
  MalformedCallback(String),

  /// A write step of the atomic order-creation path failed; the whole transaction was rolled back.
  #[error("Order transaction failed during {step}: {reason}")]
  TransactionFailure { step: &'static str, reason: String },

  #[error("Validation failed: {0}")]
  Validation(String),

  #[error("Order {order_id} has already been paid")]
  PaymentAlreadyCompleted { order_id: OrderId },

  /// A persisted row violates a record invariant (negative stock, total mismatch, ...).
  #[error("Data integrity violation: {0}")]
  Integrity(String),

  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),
}

impl ShopError {
  pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
    ShopError::NotFound {
      entity,
      id: id.to_string(),
    }
  }

  /// Domain outcomes pass through unchanged; anything else raised by a write step
  /// becomes a `TransactionFailure` naming that step.
  pub(crate) fn during(step: &'static str) -> impl FnOnce(ShopError) -> ShopError {
    move |err| match err {
      ShopError::NotFound { .. } | ShopError::InsufficientStock { .. } | ShopError::Validation(_) => err,
      ShopError::TransactionFailure { .. } => err,
      other => ShopError::TransactionFailure {
        step,
        reason: other.to_string(),
      },
    }
  }

  /// Callback failures that the provider cannot fix by retrying.
  pub fn is_callback_rejection(&self) -> bool {
    matches!(self, ShopError::UnknownPayment { .. } | ShopError::MalformedCallback(_))
  }
}

pub type ShopResult<T, E = ShopError> = std::result::Result<T, E>;
