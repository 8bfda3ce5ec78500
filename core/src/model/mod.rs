// storefront/src/model/mod.rs

//! Typed records for the persisted entities. Constructors check the record
//! invariants so a value of these types is always internally consistent.

pub mod order;
pub mod payment;
pub mod variant;

pub use order::{Customer, Order, OrderItem, OrderPaymentStatus, OrderRecord, OrderStatus};
pub use payment::{Payment, PaymentStatus, CURRENCY_KES, METHOD_MPESA};
pub use variant::Variant;

pub type ProductId = i64;
pub type VariantId = i64;
pub type OrderId = i64;
pub type OrderItemId = i64;
pub type PaymentId = uuid::Uuid;
