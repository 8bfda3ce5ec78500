// storefront/src/payments/mod.rs

//! Mobile-money payments: prompting the customer through the gateway,
//! recording the attempt, and settling it when the provider calls back.

pub mod callback;
pub mod gateway;
pub mod mpesa;
pub mod phone;
pub mod reconciler;
pub mod service;

pub use callback::{parse_callback, StkCallback, SuccessDetails};
pub use gateway::{AccessToken, PaymentGateway, PromptAck};
pub use mpesa::{MpesaClient, MpesaConfig, MpesaEnvironment};
pub use phone::normalize_phone;
pub use reconciler::{PaymentReconciler, ReconcileOutcome};
pub use service::{PaymentInitiation, PaymentRequest, PaymentService};
