// storefront/src/payments/reconciler.rs

//! Applies asynchronous payment outcomes. Callbacks arrive at least once, in
//! any order, at any delay. Each one is handled in a single transaction that
//! locks the payment row, so duplicates serialize behind the first delivery
//! and find the payment already terminal.

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{error, info, instrument, warn, Span};

use super::callback::{parse_callback, StkCallback};
use crate::error::{ShopError, ShopResult};
use crate::model::{OrderId, OrderPaymentStatus, OrderStatus, PaymentId, PaymentStatus};
use crate::store::{OrderPaymentUpdate, PaymentSettlement, Store, StoreTx};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
  Completed {
    payment_id: PaymentId,
    order_id: OrderId,
    receipt: Option<String>,
  },
  Failed {
    payment_id: PaymentId,
    order_id: OrderId,
    result_code: i64,
    reason: String,
  },
  /// The payment had already reached a terminal status; nothing was written.
  AlreadySettled {
    payment_id: PaymentId,
    order_id: OrderId,
    status: PaymentStatus,
  },
}

#[derive(Clone)]
pub struct PaymentReconciler {
  store: Arc<dyn Store>,
}

impl PaymentReconciler {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Matches a raw callback body to its payment and applies the outcome.
  ///
  /// Unmatched or malformed callbacks fail with `UnknownPayment` or
  /// `MalformedCallback`; nothing is written for them.
  #[instrument(name = "PaymentReconciler::reconcile", skip(self, payload), fields(request_id = tracing::field::Empty))]
  pub async fn reconcile(&self, payload: &[u8]) -> ShopResult<ReconcileOutcome> {
    info!(payload = %String::from_utf8_lossy(payload), "Payment callback received.");

    let (callback, raw) = parse_callback(payload).map_err(|e| {
      warn!(error = %e, "Rejecting payment callback.");
      e
    })?;
    Span::current().record("request_id", callback.merchant_request_id.as_str());

    let mut tx = self.store.begin().await?;
    match apply_callback(tx.as_mut(), &callback, raw).await {
      Ok(outcome @ ReconcileOutcome::AlreadySettled { .. }) => {
        tx.rollback().await?;
        Ok(outcome)
      }
      Ok(outcome) => {
        tx.commit().await?;
        info!(outcome = ?outcome, "Payment callback applied.");
        Ok(outcome)
      }
      Err(err) => {
        if let Err(rollback_err) = tx.rollback().await {
          error!(error = %rollback_err, "Rollback after failed reconciliation also failed.");
        }
        if err.is_callback_rejection() {
          warn!(error = %err, "Payment callback not applied.");
        } else {
          error!(error = %err, "Payment callback could not be applied.");
        }
        Err(err)
      }
    }
  }
}

async fn apply_callback(
  tx: &mut dyn StoreTx,
  callback: &StkCallback,
  raw: JsonValue,
) -> ShopResult<ReconcileOutcome> {
  let request_id = callback.merchant_request_id.as_str();
  let payment = tx
    .lock_payment_by_request_id(request_id)
    .await?
    .ok_or_else(|| ShopError::UnknownPayment {
      request_id: request_id.to_string(),
    })?;

  if payment.status.is_terminal() {
    warn!(payment_id = %payment.id, status = ?payment.status, "Duplicate callback for a settled payment ignored.");
    return Ok(ReconcileOutcome::AlreadySettled {
      payment_id: payment.id,
      order_id: payment.order_id,
      status: payment.status,
    });
  }

  let order = tx
    .lock_order(payment.order_id)
    .await?
    .ok_or_else(|| ShopError::not_found("Order", payment.order_id))?;

  if callback.is_success() {
    let details = callback.success_details();
    if let Some(paid) = details.amount {
      if paid != payment.amount {
        warn!(expected = %payment.amount, paid = %paid, "Callback amount differs from the payment amount.");
      }
    }
    if details.receipt.is_none() {
      warn!("Successful callback carried no receipt number.");
    }

    let settlement = PaymentSettlement {
      status: PaymentStatus::Completed,
      reference: details.receipt.clone(),
      response_data: raw,
    };
    if !tx.settle_payment(payment.id, &settlement).await? {
      return already_settled(tx, request_id).await;
    }

    // Only a pending order advances; admin-set statuses stay.
    let status = (order.status == OrderStatus::Pending).then_some(OrderStatus::Processing);
    tx.update_order_payment(
      order.id,
      &OrderPaymentUpdate {
        payment_status: OrderPaymentStatus::Completed,
        status,
        reference: details.receipt.clone(),
      },
    )
    .await?;

    Ok(ReconcileOutcome::Completed {
      payment_id: payment.id,
      order_id: order.id,
      receipt: details.receipt,
    })
  } else {
    let settlement = PaymentSettlement {
      status: PaymentStatus::Failed,
      reference: None,
      response_data: raw,
    };
    if !tx.settle_payment(payment.id, &settlement).await? {
      return already_settled(tx, request_id).await;
    }

    if order.payment_status == OrderPaymentStatus::Completed {
      info!(order_id = order.id, "Order already paid by another attempt; keeping its payment status.");
    } else {
      tx.update_order_payment(
        order.id,
        &OrderPaymentUpdate {
          payment_status: OrderPaymentStatus::Failed,
          status: None,
          reference: None,
        },
      )
      .await?;
    }

    Ok(ReconcileOutcome::Failed {
      payment_id: payment.id,
      order_id: order.id,
      result_code: callback.result_code,
      reason: callback.result_desc.clone(),
    })
  }
}

/// The compare-and-set lost; report whatever status won.
async fn already_settled(tx: &mut dyn StoreTx, request_id: &str) -> ShopResult<ReconcileOutcome> {
  let current = tx
    .lock_payment_by_request_id(request_id)
    .await?
    .ok_or_else(|| ShopError::UnknownPayment {
      request_id: request_id.to_string(),
    })?;
  warn!(payment_id = %current.id, status = ?current.status, "Payment settled concurrently; callback ignored.");
  Ok(ReconcileOutcome::AlreadySettled {
    payment_id: current.id,
    order_id: current.order_id,
    status: current.status,
  })
}
