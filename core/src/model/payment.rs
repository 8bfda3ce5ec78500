// storefront/src/model/payment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{FromRow, Type as SqlxType};

use super::{OrderId, PaymentId};

pub const CURRENCY_KES: &str = "KES";
pub const METHOD_MPESA: &str = "M-Pesa";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Initiated,
  Completed,
  Failed,
}

impl PaymentStatus {
  /// Completed and failed payments accept no further outcome.
  pub fn is_terminal(&self) -> bool {
    !matches!(self, PaymentStatus::Initiated)
  }
}

/// One payment attempt against an order. `request_id` is the provider's
/// correlation id that the asynchronous callback is matched on.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
pub struct Payment {
  pub id: PaymentId,
  pub order_id: OrderId,
  pub amount: Decimal,
  pub currency: String,
  pub method: String,
  pub request_id: String,
  pub checkout_request_id: Option<String>,
  pub status: PaymentStatus,
  pub reference: Option<String>,
  pub response_data: JsonValue,
  pub created_at: DateTime<Utc>,
  pub settled_at: Option<DateTime<Utc>>,
}
