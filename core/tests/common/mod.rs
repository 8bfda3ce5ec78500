// tests/common/mod.rs
#![allow(dead_code)] // Each test binary uses a different subset of these helpers.

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use storefront::{
  AccessToken, Customer, MemoryStore, OrderEngine, OrderId, OrderLine, OrderRequest, PaymentGateway,
  PaymentReconciler, PaymentService, ProductId, PromptAck, ShopError, ShopResult, Store, VariantId,
};
use tracing::Level;

// --- Helper for Tracing Setup ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Catalog Fixtures ---

/// A store with one product ("Kiondo Basket") and two variants:
/// A at 100.00 with stock 5, B at 50.00 with stock 1.
pub struct Shop {
  pub store: MemoryStore,
  pub engine: OrderEngine,
  pub product: ProductId,
  pub variant_a: VariantId,
  pub variant_b: VariantId,
}

impl Shop {
  pub async fn new() -> Self {
    let store = MemoryStore::new();
    let product = store.add_product("Kiondo Basket").await;
    let variant_a = store.add_variant(product, "Large / Natural", Decimal::new(100, 0), 5).await;
    let variant_b = store.add_variant(product, "Small / Indigo", Decimal::new(50, 0), 1).await;
    let engine = OrderEngine::new(Arc::new(store.clone()));
    Self {
      store,
      engine,
      product,
      variant_a,
      variant_b,
    }
  }

  pub fn shared_store(&self) -> Arc<dyn Store> {
    Arc::new(self.store.clone())
  }

  pub async fn stock_of(&self, variant_id: VariantId) -> u32 {
    self
      .store
      .variant(variant_id)
      .await
      .unwrap()
      .expect("variant exists")
      .stock
  }
}

pub fn customer() -> Customer {
  Customer {
    name: "Achieng Otieno".to_string(),
    email: "achieng@example.com".to_string(),
    phone: "0712345678".to_string(),
  }
}

pub fn line(variant_id: VariantId, quantity: u32) -> OrderLine {
  OrderLine {
    product_id: None,
    variant_id,
    quantity,
  }
}

pub fn order_request(items: Vec<OrderLine>) -> OrderRequest {
  OrderRequest {
    customer: customer(),
    shipping_address: "Kenyatta Avenue 12, Nairobi".to_string(),
    items,
  }
}

// --- Gateway Stub ---

/// Records every prompt and answers with sequential correlation ids `mr-<order>-<n>`.
#[derive(Default)]
pub struct StubGateway {
  pub token_unavailable: AtomicBool,
  pub reject_prompts: AtomicBool,
  pub prompts: AtomicUsize,
  pub phones: Mutex<Vec<String>>,
}

impl StubGateway {
  pub fn prompt_count(&self) -> usize {
    self.prompts.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl PaymentGateway for StubGateway {
  async fn request_access_token(&self) -> Option<AccessToken> {
    if self.token_unavailable.load(Ordering::SeqCst) {
      None
    } else {
      Some(AccessToken::new("stub-token"))
    }
  }

  async fn initiate_prompt(
    &self,
    phone_number: &str,
    amount: i64,
    order_id: OrderId,
    _token: &AccessToken,
  ) -> ShopResult<PromptAck> {
    if self.reject_prompts.load(Ordering::SeqCst) {
      return Err(ShopError::GatewayUnavailable("stub rejects prompts".to_string()));
    }
    let n = self.prompts.fetch_add(1, Ordering::SeqCst) + 1;
    self.phones.lock().push(phone_number.to_string());
    let merchant_request_id = format!("mr-{}-{}", order_id, n);
    Ok(PromptAck {
      merchant_request_id: merchant_request_id.clone(),
      checkout_request_id: Some(format!("ws_CO_{}", n)),
      response_description: "Success. Request accepted for processing".to_string(),
      raw: json!({
        "MerchantRequestID": merchant_request_id,
        "CheckoutRequestID": format!("ws_CO_{}", n),
        "ResponseCode": "0",
        "Amount": amount,
      }),
    })
  }
}

/// Services wired over one shop's store.
pub struct Payments {
  pub gateway: Arc<StubGateway>,
  pub service: PaymentService,
  pub reconciler: PaymentReconciler,
}

impl Payments {
  pub fn over(shop: &Shop) -> Self {
    let gateway = Arc::new(StubGateway::default());
    Self {
      service: PaymentService::new(shop.shared_store(), gateway.clone()),
      reconciler: PaymentReconciler::new(shop.shared_store()),
      gateway,
    }
  }
}

// --- Callback Payloads ---

pub fn success_callback(request_id: &str, amount: i64, receipt: &str) -> Vec<u8> {
  json!({
    "Body": {
      "stkCallback": {
        "MerchantRequestID": request_id,
        "CheckoutRequestID": "ws_CO_test",
        "ResultCode": 0,
        "ResultDesc": "The service request is processed successfully.",
        "CallbackMetadata": {
          "Item": [
            {"Name": "Amount", "Value": amount},
            {"Name": "MpesaReceiptNumber", "Value": receipt},
            {"Name": "TransactionDate", "Value": 20240611143015u64},
            {"Name": "PhoneNumber", "Value": 254712345678u64}
          ]
        }
      }
    }
  })
  .to_string()
  .into_bytes()
}

pub fn failure_callback(request_id: &str, result_code: i64, description: &str) -> Vec<u8> {
  json!({
    "Body": {
      "stkCallback": {
        "MerchantRequestID": request_id,
        "CheckoutRequestID": "ws_CO_test",
        "ResultCode": result_code,
        "ResultDesc": description
      }
    }
  })
  .to_string()
  .into_bytes()
}
