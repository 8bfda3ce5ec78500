// storefront/src/payments/gateway.rs

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::ShopResult;
use crate::model::OrderId;

/// A short-lived bearer credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
  pub fn new(token: impl Into<String>) -> Self {
    Self(token.into())
  }

  pub fn secret(&self) -> &str {
    &self.0
  }
}

impl fmt::Debug for AccessToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str("AccessToken([REDACTED])")
  }
}

/// The provider's synchronous answer to a prompt request.
#[derive(Debug, Clone, PartialEq)]
pub struct PromptAck {
  /// Correlation id the asynchronous callback will carry.
  pub merchant_request_id: String,
  pub checkout_request_id: Option<String>,
  pub response_description: String,
  /// Full response body, kept on the payment row.
  pub raw: JsonValue,
}

/// Outbound side of the mobile-money provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
  /// `None` on any transport or auth failure. Callers treat absence as a hard failure.
  async fn request_access_token(&self) -> Option<AccessToken>;

  /// Sends a payment prompt to `phone_number` for `amount` whole currency units.
  /// Fails with `InvalidPhoneFormat` or `GatewayUnavailable`.
  async fn initiate_prompt(
    &self,
    phone_number: &str,
    amount: i64,
    order_id: OrderId,
    token: &AccessToken,
  ) -> ShopResult<PromptAck>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn token_debug_is_redacted() {
    let token = AccessToken::new("s3cr3t");
    assert!(!format!("{:?}", token).contains("s3cr3t"));
    assert_eq!(token.secret(), "s3cr3t");
  }
}
