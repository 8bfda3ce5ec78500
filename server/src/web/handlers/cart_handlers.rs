// storefront_server/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use storefront::{CartLine, VariantId};
use tracing::{info, instrument};
use validator::Validate;

use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct CartLinePayload {
  pub variant_id: VariantId,
  #[validate(range(min = 1, message = "Quantity must be at least 1"))]
  pub quantity: u32,
}

#[derive(Deserialize, Debug, Validate)]
pub struct ValidateCartPayload {
  #[validate(length(min = 1, message = "Cart is empty"), nested)]
  pub items: Vec<CartLinePayload>,
}

#[derive(Deserialize, Debug, Validate)]
pub struct CheckStockPayload {
  #[validate(length(min = 1, message = "At least one variant id is required"))]
  pub variant_ids: Vec<VariantId>,
}

#[instrument(name = "handler::validate_cart", skip(app_state, req_payload), fields(lines = req_payload.items.len()))]
pub async fn validate_cart_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<ValidateCartPayload>,
) -> Result<HttpResponse, AppError> {
  req_payload.validate()?;
  let lines: Vec<CartLine> = req_payload
    .items
    .iter()
    .map(|item| CartLine {
      variant_id: item.variant_id,
      quantity: item.quantity,
    })
    .collect();

  let validation = app_state.cart.validate_cart(&lines).await?;
  info!(valid = validation.is_valid(), total = %validation.total, "Cart validated.");
  Ok(HttpResponse::Ok().json(json!({
    "valid": validation.is_valid(),
    "items": validation.items,
    "total": validation.total,
    "errors": validation.errors,
  })))
}

#[instrument(name = "handler::check_stock", skip(app_state, req_payload))]
pub async fn check_stock_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<CheckStockPayload>,
) -> Result<HttpResponse, AppError> {
  req_payload.validate()?;
  let levels = app_state.cart.check_stock(&req_payload.variant_ids).await?;
  Ok(HttpResponse::Ok().json(json!({ "stock": levels })))
}
