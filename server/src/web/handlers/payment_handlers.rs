// storefront_server/src/web/handlers/payment_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use storefront::{OrderId, PaymentRequest};
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize, Debug)]
pub struct InitiatePaymentPayload {
  pub order_id: OrderId,
  pub phone_number: String,
  /// Whole KES.
  pub amount: i64,
}

/// The acknowledgement body the provider expects from a callback endpoint.
fn callback_ack() -> HttpResponse {
  HttpResponse::Ok().json(json!({"ResultCode": 0, "ResultDesc": "Accepted"}))
}

#[instrument(
    name = "handler::initiate_payment",
    skip(app_state, req_payload),
    fields(order_id = req_payload.order_id, amount = req_payload.amount)
)]
pub async fn initiate_payment_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<InitiatePaymentPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let initiation = app_state
    .payments
    .initiate(PaymentRequest {
      order_id: payload.order_id,
      phone_number: payload.phone_number,
      amount: payload.amount,
    })
    .await?;

  info!(request_id = %initiation.request_id, "Payment prompt sent.");
  Ok(HttpResponse::Ok().json(json!({
    "message": "Payment initiated successfully",
    "payment": initiation,
  })))
}

/// Provider callback. The body is handed over untouched so it can be stored verbatim.
///
/// Storage failures answer 500 so the provider redelivers. Unknown or malformed
/// callbacks are acknowledged when `callback_ack_on_error` is set.
#[instrument(name = "handler::payment_callback", skip(app_state, body), fields(bytes = body.len()))]
pub async fn payment_callback_handler(
  app_state: web::Data<AppState>,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  match app_state.reconciler.reconcile(&body).await {
    Ok(outcome) => {
      info!(?outcome, "Payment callback processed.");
      Ok(callback_ack())
    }
    Err(err) if err.is_callback_rejection() && app_state.config.callback_ack_on_error => {
      warn!(error = %err, "Acknowledging a callback that matched nothing.");
      Ok(callback_ack())
    }
    Err(err) => Err(err.into()),
  }
}

#[instrument(name = "handler::payment_status", skip(app_state))]
pub async fn payment_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<OrderId>,
) -> Result<HttpResponse, AppError> {
  let payment = app_state.payments.latest_for_order(path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "payment": payment })))
}
