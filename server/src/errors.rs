// storefront_server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::collections::BTreeMap;
use storefront::ShopError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
  #[error(transparent)]
  Shop(#[from] ShopError),

  /// Request body or query failed shape validation.
  #[error("Invalid request: {0}")]
  InvalidRequest(#[from] validator::ValidationErrors),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

// Handlers and bootstrap code may use `?` on anyhow results.
impl From<anyhow::Error> for AppError {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<ShopError>() {
      Ok(shop_err) => AppError::Shop(shop_err),
      Err(other) => AppError::Internal(other.to_string()),
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Shop(err) => match err {
        ShopError::NotFound { .. } | ShopError::UnknownPayment { .. } => StatusCode::NOT_FOUND,
        ShopError::InsufficientStock { .. } | ShopError::PaymentAlreadyCompleted { .. } => StatusCode::CONFLICT,
        ShopError::Validation(_) | ShopError::InvalidPhoneFormat(_) | ShopError::MalformedCallback(_) => {
          StatusCode::BAD_REQUEST
        }
        ShopError::GatewayUnavailable(_) => StatusCode::BAD_GATEWAY,
        ShopError::TransactionFailure { .. } | ShopError::Integrity(_) | ShopError::Database(_) => {
          StatusCode::INTERNAL_SERVER_ERROR
        }
      },
      AppError::InvalidRequest(_) => StatusCode::UNPROCESSABLE_ENTITY,
      AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::warn!(application_error = %self, "Rejecting request");
    }

    match self {
      AppError::Shop(ShopError::Database(_)) => {
        HttpResponse::build(status).json(json!({"error": "Database operation failed"}))
      }
      AppError::InvalidRequest(errors) => HttpResponse::build(status).json(json!({
        "error": self.to_string(),
        "fields": field_messages(errors),
      })),
      other => HttpResponse::build(status).json(json!({"error": other.to_string()})),
    }
  }
}

/// Field name to messages, falling back to the validator code when no message was given.
fn field_messages(errors: &validator::ValidationErrors) -> BTreeMap<String, Vec<String>> {
  errors
    .field_errors()
    .into_iter()
    .map(|(field, errs)| {
      let messages = errs
        .iter()
        .map(|e| match &e.message {
          Some(message) => message.to_string(),
          None => e.code.to_string(),
        })
        .collect();
      (field.to_string(), messages)
    })
    .collect()
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
