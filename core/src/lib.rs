// src/lib.rs

//! Storefront: order creation under inventory constraints and asynchronous
//! M-Pesa payment reconciliation.
//!
//! The crate is organised leaf-first:
//!  - `model`: typed records for variants, orders, order items and payments.
//!  - `store`: the persistence seam (`Store` / `StoreTx`) with a Postgres and an in-memory backend.
//!  - `orders`: the Order Engine (atomic create with stock decrement, reads, status edits) and cart checks.
//!  - `payments`: the gateway client, payment initiation and the callback reconciler.
//!
//! Every component receives its collaborators at construction; nothing reads
//! global state or the environment.

pub mod error;
pub mod model;
pub mod orders;
pub mod payments;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::error::{ShopError, ShopResult};

pub use crate::model::{
  Customer, Order, OrderId, OrderItem, OrderPaymentStatus, OrderRecord, OrderStatus, Payment, PaymentId,
  PaymentStatus, ProductId, Variant, VariantId,
};

pub use crate::store::{MemoryStore, Page, PgStore, Store, StoreTx};

pub use crate::orders::{
  CartLine, CartService, CartValidation, OrderEngine, OrderLine, OrderRequest, StockLevel, ValidatedLine,
};

pub use crate::payments::{
  normalize_phone, AccessToken, MpesaClient, MpesaConfig, MpesaEnvironment, PaymentGateway, PaymentInitiation,
  PaymentReconciler, PaymentRequest, PaymentService, PromptAck, ReconcileOutcome,
};
