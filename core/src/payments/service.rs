// storefront/src/payments/service.rs

use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::gateway::PaymentGateway;
use super::phone::normalize_phone;
use crate::error::{ShopError, ShopResult};
use crate::model::{OrderId, OrderPaymentStatus, Payment, PaymentId, CURRENCY_KES, METHOD_MPESA};
use crate::store::{NewPayment, OrderPaymentUpdate, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
  pub order_id: OrderId,
  pub phone_number: String,
  /// Whole currency units.
  pub amount: i64,
}

/// What the caller gets back once the prompt is out and the attempt is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInitiation {
  pub order_id: OrderId,
  pub payment_id: PaymentId,
  pub request_id: String,
  pub checkout_request_id: Option<String>,
  pub message: String,
}

#[derive(Clone)]
pub struct PaymentService {
  store: Arc<dyn Store>,
  gateway: Arc<dyn PaymentGateway>,
}

impl PaymentService {
  pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>) -> Self {
    Self { store, gateway }
  }

  /// Sends a payment prompt for an order and records an `initiated` payment
  /// carrying the provider's correlation id.
  #[instrument(name = "PaymentService::initiate", skip(self, request), fields(order_id = request.order_id, amount = request.amount))]
  pub async fn initiate(&self, request: PaymentRequest) -> ShopResult<PaymentInitiation> {
    if request.amount <= 0 {
      return Err(ShopError::Validation("Amount must be a positive whole number".to_string()));
    }
    let phone = normalize_phone(&request.phone_number)?;

    let order = self
      .store
      .order(request.order_id)
      .await?
      .ok_or_else(|| ShopError::not_found("Order", request.order_id))?;
    if order.payment_status() == OrderPaymentStatus::Completed {
      return Err(ShopError::PaymentAlreadyCompleted { order_id: order.id() });
    }
    let amount = Decimal::from(request.amount);
    if amount != order.total() {
      warn!(order_total = %order.total(), "Requested amount differs from the order total.");
    }

    let token = self
      .gateway
      .request_access_token()
      .await
      .ok_or_else(|| ShopError::GatewayUnavailable("Failed to get M-Pesa access token".to_string()))?;
    let ack = self
      .gateway
      .initiate_prompt(&phone, request.amount, order.id(), &token)
      .await?;

    // The prompt can take seconds; an earlier attempt may have settled meanwhile.
    let mut tx = self.store.begin().await?;
    let locked = tx
      .lock_order(order.id())
      .await?
      .ok_or_else(|| ShopError::not_found("Order", order.id()))?;
    if locked.payment_status == OrderPaymentStatus::Completed {
      tx.rollback().await?;
      warn!(request_id = %ack.merchant_request_id, "Order was paid while the prompt was in flight.");
      return Err(ShopError::PaymentAlreadyCompleted { order_id: order.id() });
    }
    let payment = tx
      .insert_payment(&NewPayment {
        order_id: order.id(),
        amount,
        currency: CURRENCY_KES.to_string(),
        method: METHOD_MPESA.to_string(),
        request_id: ack.merchant_request_id.clone(),
        checkout_request_id: ack.checkout_request_id.clone(),
        response_data: ack.raw.clone(),
      })
      .await?;
    tx.update_order_payment(
      order.id(),
      &OrderPaymentUpdate {
        payment_status: OrderPaymentStatus::Initiated,
        status: None,
        reference: None,
      },
    )
    .await?;
    tx.commit().await?;

    info!(payment_id = %payment.id, request_id = %payment.request_id, "Payment initiated.");
    Ok(PaymentInitiation {
      order_id: order.id(),
      payment_id: payment.id,
      request_id: payment.request_id,
      checkout_request_id: payment.checkout_request_id,
      message: ack.response_description,
    })
  }

  /// The newest payment attempt for an order.
  pub async fn latest_for_order(&self, order_id: OrderId) -> ShopResult<Payment> {
    self
      .store
      .latest_payment(order_id)
      .await?
      .ok_or_else(|| ShopError::not_found("Payment for order", order_id))
  }
}
