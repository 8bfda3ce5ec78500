// storefront/src/payments/callback.rs

//! Wire shape of the STK push result callback:
//! `{Body: {stkCallback: {MerchantRequestID, CheckoutRequestID, ResultCode,
//! ResultDesc, CallbackMetadata: {Item: [{Name, Value}, ...]}}}}`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::str::FromStr;

use crate::error::{ShopError, ShopResult};

pub const META_AMOUNT: &str = "Amount";
pub const META_RECEIPT: &str = "MpesaReceiptNumber";
pub const META_TRANSACTION_DATE: &str = "TransactionDate";
pub const META_PHONE_NUMBER: &str = "PhoneNumber";

#[derive(Debug, Deserialize)]
struct Envelope {
  #[serde(rename = "Body")]
  body: Body,
}

#[derive(Debug, Deserialize)]
struct Body {
  #[serde(rename = "stkCallback")]
  stk_callback: StkCallback,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StkCallback {
  #[serde(rename = "MerchantRequestID")]
  pub merchant_request_id: String,
  #[serde(rename = "CheckoutRequestID", default)]
  pub checkout_request_id: Option<String>,
  #[serde(rename = "ResultCode", deserialize_with = "int_or_string")]
  pub result_code: i64,
  #[serde(rename = "ResultDesc", default)]
  pub result_desc: String,
  #[serde(rename = "CallbackMetadata", default)]
  pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CallbackMetadata {
  #[serde(rename = "Item", default)]
  pub items: Vec<MetadataItem>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetadataItem {
  #[serde(rename = "Name")]
  pub name: String,
  #[serde(rename = "Value", default)]
  pub value: Option<JsonValue>,
}

/// Fields a successful callback carries in its metadata list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessDetails {
  pub amount: Option<Decimal>,
  pub receipt: Option<String>,
  pub transaction_date: Option<String>,
  pub phone_number: Option<String>,
}

impl StkCallback {
  pub fn is_success(&self) -> bool {
    self.result_code == 0
  }

  /// First metadata value with the given name.
  pub fn metadata(&self, name: &str) -> Option<&JsonValue> {
    self
      .callback_metadata
      .as_ref()?
      .items
      .iter()
      .find(|item| item.name == name)
      .and_then(|item| item.value.as_ref())
  }

  /// Metadata value rendered as text. Numbers are printed as-is.
  pub fn metadata_text(&self, name: &str) -> Option<String> {
    match self.metadata(name)? {
      JsonValue::String(s) => Some(s.clone()),
      JsonValue::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  pub fn success_details(&self) -> SuccessDetails {
    SuccessDetails {
      amount: self
        .metadata_text(META_AMOUNT)
        .and_then(|text| Decimal::from_str(&text).ok()),
      receipt: self.metadata_text(META_RECEIPT),
      transaction_date: self.metadata_text(META_TRANSACTION_DATE),
      phone_number: self.metadata_text(META_PHONE_NUMBER),
    }
  }
}

/// Parses a raw callback body. Returns the typed callback and the payload as
/// JSON for storage. Anything not matching the wire shape is `MalformedCallback`.
pub fn parse_callback(payload: &[u8]) -> ShopResult<(StkCallback, JsonValue)> {
  let raw: JsonValue =
    serde_json::from_slice(payload).map_err(|e| ShopError::MalformedCallback(format!("invalid JSON: {}", e)))?;
  let envelope: Envelope = serde_json::from_value(raw.clone())
    .map_err(|e| ShopError::MalformedCallback(format!("unexpected structure: {}", e)))?;
  let callback = envelope.body.stk_callback;
  if callback.merchant_request_id.trim().is_empty() {
    return Err(ShopError::MalformedCallback("empty MerchantRequestID".to_string()));
  }
  Ok((callback, raw))
}

fn int_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Code {
    Int(i64),
    Text(String),
  }
  match Code::deserialize(deserializer)? {
    Code::Int(code) => Ok(code),
    Code::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
  }
}
