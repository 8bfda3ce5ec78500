// storefront/src/payments/mpesa.rs

//! Safaricom Daraja client: OAuth token exchange and STK push (the
//! "Lipa na M-Pesa Online" payment prompt).

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

use super::gateway::{AccessToken, PaymentGateway, PromptAck};
use super::phone::normalize_phone;
use crate::error::{ShopError, ShopResult};
use crate::model::OrderId;

pub const SANDBOX_BASE_URL: &str = "https://sandbox.safaricom.co.ke";
pub const PRODUCTION_BASE_URL: &str = "https://api.safaricom.co.ke";

const TOKEN_PATH: &str = "/oauth/v1/generate";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const TRANSACTION_TYPE: &str = "CustomerPayBillOnline";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
/// East Africa Time, the clock Daraja validates timestamps against.
const EAT_OFFSET_HOURS: i64 = 3;
/// Tokens are refreshed this long before the provider says they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3599);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MpesaEnvironment {
  #[default]
  Sandbox,
  Production,
}

impl MpesaEnvironment {
  pub fn base_url(&self) -> &'static str {
    match self {
      MpesaEnvironment::Sandbox => SANDBOX_BASE_URL,
      MpesaEnvironment::Production => PRODUCTION_BASE_URL,
    }
  }
}

impl FromStr for MpesaEnvironment {
  type Err = ShopError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "sandbox" => Ok(MpesaEnvironment::Sandbox),
      "production" => Ok(MpesaEnvironment::Production),
      other => Err(ShopError::Validation(format!(
        "Unknown M-Pesa environment '{}', expected 'sandbox' or 'production'",
        other
      ))),
    }
  }
}

#[derive(Clone)]
pub struct MpesaConfig {
  pub consumer_key: String,
  pub consumer_secret: String,
  pub business_short_code: String,
  pub passkey: String,
  pub environment: MpesaEnvironment,
  /// Overrides the environment's base URL when set.
  pub base_url: Option<String>,
  pub callback_url: String,
  pub timeout: Duration,
}

impl MpesaConfig {
  pub fn base_url(&self) -> &str {
    self
      .base_url
      .as_deref()
      .unwrap_or_else(|| self.environment.base_url())
      .trim_end_matches('/')
  }
}

impl fmt::Debug for MpesaConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MpesaConfig")
      .field("consumer_key", &self.consumer_key)
      .field("consumer_secret", &"[REDACTED]")
      .field("business_short_code", &self.business_short_code)
      .field("passkey", &"[REDACTED]")
      .field("environment", &self.environment)
      .field("base_url", &self.base_url())
      .field("callback_url", &self.callback_url)
      .field("timeout", &self.timeout)
      .finish()
  }
}

/// `base64(shortcode + passkey + timestamp)`.
pub fn stk_password(business_short_code: &str, passkey: &str, timestamp: &str) -> String {
  STANDARD.encode(format!("{}{}{}", business_short_code, passkey, timestamp))
}

/// `YYYYMMDDHHMMSS` in East Africa Time.
pub fn eat_timestamp(now: DateTime<Utc>) -> String {
  (now + chrono::Duration::hours(EAT_OFFSET_HOURS))
    .format(TIMESTAMP_FORMAT)
    .to_string()
}

#[derive(Deserialize)]
struct TokenResponse {
  access_token: Option<String>,
  /// Daraja sends this as a string of seconds.
  #[serde(default)]
  expires_in: Option<JsonValue>,
}

impl TokenResponse {
  fn ttl(&self) -> Duration {
    let seconds = match &self.expires_in {
      Some(JsonValue::Number(n)) => n.as_u64(),
      Some(JsonValue::String(s)) => s.trim().parse().ok(),
      _ => None,
    };
    seconds.map(Duration::from_secs).unwrap_or(DEFAULT_TOKEN_TTL)
  }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
  business_short_code: &'a str,
  password: String,
  timestamp: String,
  transaction_type: &'a str,
  amount: i64,
  party_a: &'a str,
  party_b: &'a str,
  phone_number: &'a str,
  #[serde(rename = "CallBackURL")]
  callback_url: &'a str,
  account_reference: String,
  transaction_desc: String,
}

#[derive(Deserialize)]
struct StkPushResponse {
  #[serde(rename = "MerchantRequestID")]
  merchant_request_id: Option<String>,
  #[serde(rename = "CheckoutRequestID")]
  checkout_request_id: Option<String>,
  #[serde(rename = "ResponseCode")]
  response_code: Option<String>,
  #[serde(rename = "ResponseDescription")]
  response_description: Option<String>,
  #[serde(rename = "CustomerMessage")]
  customer_message: Option<String>,
}

struct CachedToken {
  token: AccessToken,
  refresh_at: Instant,
}

/// HTTP client for Daraja. The access token is cached between calls.
pub struct MpesaClient {
  config: MpesaConfig,
  http: reqwest::Client,
  token: Mutex<Option<CachedToken>>,
}

impl MpesaClient {
  /// Every outbound call is bounded by `config.timeout`.
  pub fn new(config: MpesaConfig) -> ShopResult<Self> {
    let http = reqwest::Client::builder()
      .timeout(config.timeout)
      .build()
      .map_err(|e| ShopError::GatewayUnavailable(format!("failed to build HTTP client: {}", e)))?;
    Ok(Self {
      config,
      http,
      token: Mutex::new(None),
    })
  }

  pub fn config(&self) -> &MpesaConfig {
    &self.config
  }

  fn cached_token(&self) -> Option<AccessToken> {
    let guard = self.token.lock();
    guard
      .as_ref()
      .filter(|cached| Instant::now() < cached.refresh_at)
      .map(|cached| cached.token.clone())
  }

  async fn fetch_token(&self) -> ShopResult<AccessToken> {
    let url = format!("{}{}", self.config.base_url(), TOKEN_PATH);
    let response = self
      .http
      .get(&url)
      .query(&[("grant_type", "client_credentials")])
      .basic_auth(&self.config.consumer_key, Some(&self.config.consumer_secret))
      .send()
      .await
      .map_err(|e| transport_error("token request", e))?;

    let status = response.status();
    if !status.is_success() {
      return Err(ShopError::GatewayUnavailable(format!("token request returned {}", status)));
    }
    let body: TokenResponse = response
      .json()
      .await
      .map_err(|e| transport_error("token response", e))?;
    let ttl = body.ttl();
    let token = body
      .access_token
      .filter(|t| !t.is_empty())
      .map(AccessToken::new)
      .ok_or_else(|| ShopError::GatewayUnavailable("token response carried no access_token".to_string()))?;

    *self.token.lock() = Some(CachedToken {
      token: token.clone(),
      refresh_at: Instant::now() + ttl.saturating_sub(TOKEN_REFRESH_MARGIN),
    });
    debug!(ttl_secs = ttl.as_secs(), "Fetched M-Pesa access token.");
    Ok(token)
  }
}

fn transport_error(what: &str, err: reqwest::Error) -> ShopError {
  if err.is_timeout() {
    ShopError::GatewayUnavailable(format!("{} timed out", what))
  } else {
    ShopError::GatewayUnavailable(format!("{} failed: {}", what, err))
  }
}

#[async_trait]
impl PaymentGateway for MpesaClient {
  #[instrument(name = "MpesaClient::request_access_token", skip(self))]
  async fn request_access_token(&self) -> Option<AccessToken> {
    if let Some(token) = self.cached_token() {
      return Some(token);
    }
    match self.fetch_token().await {
      Ok(token) => Some(token),
      Err(e) => {
        warn!(error = %e, "Could not obtain M-Pesa access token.");
        None
      }
    }
  }

  #[instrument(name = "MpesaClient::initiate_prompt", skip(self, phone_number, token))]
  async fn initiate_prompt(
    &self,
    phone_number: &str,
    amount: i64,
    order_id: OrderId,
    token: &AccessToken,
  ) -> ShopResult<PromptAck> {
    let phone = normalize_phone(phone_number)?;
    let timestamp = eat_timestamp(Utc::now());
    let short_code = self.config.business_short_code.as_str();
    let request = StkPushRequest {
      business_short_code: short_code,
      password: stk_password(short_code, &self.config.passkey, &timestamp),
      timestamp,
      transaction_type: TRANSACTION_TYPE,
      amount,
      party_a: &phone,
      party_b: short_code,
      phone_number: &phone,
      callback_url: &self.config.callback_url,
      account_reference: format!("Order{}", order_id),
      transaction_desc: format!("Payment for Order #{}", order_id),
    };

    let url = format!("{}{}", self.config.base_url(), STK_PUSH_PATH);
    let response = self
      .http
      .post(&url)
      .bearer_auth(token.secret())
      .json(&request)
      .send()
      .await
      .map_err(|e| transport_error("prompt request", e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| transport_error("prompt response", e))?;
    if !status.is_success() {
      return Err(ShopError::GatewayUnavailable(format!(
        "prompt request returned {}: {}",
        status, body
      )));
    }
    let raw: JsonValue = serde_json::from_str(&body)
      .map_err(|e| ShopError::GatewayUnavailable(format!("prompt response is not JSON: {}", e)))?;

    let parsed: StkPushResponse = serde_json::from_value(raw.clone())
      .map_err(|e| ShopError::GatewayUnavailable(format!("unexpected prompt response: {}", e)))?;
    if parsed.response_code.as_deref() != Some("0") {
      return Err(ShopError::GatewayUnavailable(format!(
        "prompt rejected with response code {:?}: {}",
        parsed.response_code,
        parsed.response_description.as_deref().unwrap_or("no description")
      )));
    }
    let merchant_request_id = parsed
      .merchant_request_id
      .filter(|id| !id.is_empty())
      .ok_or_else(|| ShopError::GatewayUnavailable("prompt response carried no MerchantRequestID".to_string()))?;

    info!(merchant_request_id = %merchant_request_id, "Payment prompt accepted by M-Pesa.");
    Ok(PromptAck {
      merchant_request_id,
      checkout_request_id: parsed.checkout_request_id,
      response_description: parsed
        .customer_message
        .or(parsed.response_description)
        .unwrap_or_else(|| "Payment prompt sent to your phone".to_string()),
      raw,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  #[test]
  fn password_matches_daraja_reference_value() {
    let password = stk_password(
      "174379",
      "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919",
      "20160216165627",
    );
    assert_eq!(
      password,
      "MTc0Mzc5YmZiMjc5ZjlhYTliZGJjZjE1OGU5N2RkNzFhNDY3Y2QyZTBjODkzMDU5YjEwZjc4ZTZiNzJhZGExZWQyYzkxOTIwMTYwMjE2MTY1NjI3"
    );
  }

  #[test]
  fn timestamp_is_east_africa_time() {
    let now = Utc.with_ymd_and_hms(2024, 12, 31, 22, 30, 5).unwrap();
    assert_eq!(eat_timestamp(now), "20250101013005");
  }

  #[test]
  fn environment_selects_base_url_unless_overridden() {
    let mut config = MpesaConfig {
      consumer_key: "key".into(),
      consumer_secret: "consumer-s3cr3t".into(),
      business_short_code: "174379".into(),
      passkey: "pass-k3y".into(),
      environment: "production".parse().unwrap(),
      base_url: None,
      callback_url: "https://shop.example/api/payment/callback".into(),
      timeout: Duration::from_secs(5),
    };
    assert_eq!(config.base_url(), PRODUCTION_BASE_URL);
    config.base_url = Some("http://127.0.0.1:9000/".into());
    assert_eq!(config.base_url(), "http://127.0.0.1:9000");

    let printed = format!("{:?}", config);
    assert!(!printed.contains("consumer-s3cr3t"));
    assert!(!printed.contains("pass-k3y"));
  }

  #[test]
  fn token_ttl_accepts_string_or_number() {
    let from_string: TokenResponse = serde_json::from_str(r#"{"access_token":"t","expires_in":"120"}"#).unwrap();
    assert_eq!(from_string.ttl(), Duration::from_secs(120));
    let from_number: TokenResponse = serde_json::from_str(r#"{"access_token":"t","expires_in":90}"#).unwrap();
    assert_eq!(from_number.ttl(), Duration::from_secs(90));
  }
}
