// storefront_server/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use storefront::{Customer, OrderId, OrderLine, OrderRequest, OrderStatus, Page, ProductId, ShopError, VariantId};
use tracing::{info, instrument};
use validator::{Validate, ValidateEmail, ValidationError};

use crate::errors::AppError;
use crate::state::AppState;

/// `+254XXXXXXXXX` or `0XXXXXXXXX`.
fn validate_kenyan_phone(phone: &str) -> Result<(), ValidationError> {
  let digits = phone
    .strip_prefix("+254")
    .or_else(|| phone.strip_prefix('0'))
    .filter(|rest| rest.len() == 9 && rest.bytes().all(|b| b.is_ascii_digit()));
  match digits {
    Some(_) => Ok(()),
    None => Err(ValidationError::new("phone").with_message("Phone must be +254XXXXXXXXX or 0XXXXXXXXX".into())),
  }
}

// --- Request DTOs ---

#[derive(Deserialize, Serialize, Debug, Validate)]
pub struct OrderItemPayload {
  pub product_id: Option<ProductId>,
  pub variant_id: VariantId,
  #[validate(range(min = 1, message = "Quantity must be at least 1"))]
  pub quantity: u32,
}

#[derive(Deserialize, Debug, Validate)]
pub struct CreateOrderPayload {
  #[validate(length(min = 3, message = "Name must be at least 3 characters"))]
  pub customer_name: String,
  #[validate(email(message = "Invalid email address"))]
  pub customer_email: String,
  #[validate(custom(function = "validate_kenyan_phone"))]
  pub customer_phone: String,
  #[validate(length(min = 10, message = "Shipping address must be at least 10 characters"))]
  pub shipping_address: String,
  #[validate(length(min = 1, message = "Order must contain at least one item"), nested)]
  pub items: Vec<OrderItemPayload>,
}

impl From<CreateOrderPayload> for OrderRequest {
  fn from(payload: CreateOrderPayload) -> Self {
    OrderRequest {
      customer: Customer {
        name: payload.customer_name.trim().to_string(),
        email: payload.customer_email.trim().to_string(),
        phone: payload.customer_phone.trim().to_string(),
      },
      shipping_address: payload.shipping_address.trim().to_string(),
      items: payload
        .items
        .into_iter()
        .map(|item| OrderLine {
          product_id: item.product_id,
          variant_id: item.variant_id,
          quantity: item.quantity,
        })
        .collect(),
    }
  }
}

#[derive(Deserialize, Debug)]
pub struct ListOrdersQuery {
  pub limit: Option<u32>,
  pub offset: Option<u32>,
}

#[derive(Deserialize, Debug)]
pub struct SearchOrdersQuery {
  #[serde(default)]
  pub q: String,
}

#[derive(Deserialize, Debug)]
pub struct UpdateStatusPayload {
  pub status: String,
}

// --- Handlers ---

#[instrument(
    name = "handler::create_order",
    skip(app_state, req_payload),
    fields(customer_email = %req_payload.customer_email, lines = req_payload.items.len())
)]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<CreateOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  payload.validate()?;

  let order = app_state.orders.create(payload.into()).await?;
  info!(order_id = order.id(), total = %order.total(), "Order created via API.");
  Ok(HttpResponse::Created().json(json!({
    "message": "Order created successfully",
    "order": order,
  })))
}

#[instrument(name = "handler::get_order", skip(app_state))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  path: web::Path<OrderId>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.orders.get_by_id(path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

#[instrument(name = "handler::list_orders", skip(app_state))]
pub async fn list_orders_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, AppError> {
  let page = Page::new(query.limit, query.offset);
  let orders = app_state.orders.get_all(page).await?;
  Ok(HttpResponse::Ok().json(json!({
    "orders": orders,
    "limit": page.limit,
    "offset": page.offset,
  })))
}

#[instrument(name = "handler::search_orders", skip(app_state))]
pub async fn search_orders_handler(
  app_state: web::Data<AppState>,
  query: web::Query<SearchOrdersQuery>,
) -> Result<HttpResponse, AppError> {
  let orders = app_state.orders.search(&query.q).await?;
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

#[instrument(name = "handler::orders_by_email", skip(app_state, path))]
pub async fn orders_by_email_handler(
  app_state: web::Data<AppState>,
  path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
  let email = path.into_inner();
  if !email.validate_email() {
    return Err(ShopError::Validation("Invalid email address".to_string()).into());
  }
  let orders = app_state.orders.get_by_email(&email).await?;
  Ok(HttpResponse::Ok().json(json!({ "orders": orders })))
}

#[instrument(name = "handler::update_order_status", skip(app_state, req_payload), fields(status = %req_payload.status))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  path: web::Path<OrderId>,
  req_payload: web::Json<UpdateStatusPayload>,
) -> Result<HttpResponse, AppError> {
  let status: OrderStatus = req_payload.status.trim().parse()?;
  let order = app_state.orders.update_status(path.into_inner(), status).await?;
  Ok(HttpResponse::Ok().json(json!({
    "message": "Order status updated successfully",
    "order": order,
  })))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn kenyan_phone_shapes() {
    assert!(validate_kenyan_phone("0712345678").is_ok());
    assert!(validate_kenyan_phone("+254712345678").is_ok());
    assert!(validate_kenyan_phone("254712345678").is_err());
    assert!(validate_kenyan_phone("071234567").is_err());
    assert!(validate_kenyan_phone("07123456ab").is_err());
  }
}
