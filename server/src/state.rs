// storefront_server/src/state.rs
use crate::config::AppConfig;
use std::sync::Arc;
use storefront::{CartService, OrderEngine, PaymentGateway, PaymentReconciler, PaymentService, Store};

#[derive(Clone)]
pub struct AppState {
  pub orders: OrderEngine,
  pub cart: CartService,
  pub payments: PaymentService,
  pub reconciler: PaymentReconciler,
  pub config: Arc<AppConfig>,
}

impl AppState {
  /// Wires every service over one store and one gateway.
  pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, config: Arc<AppConfig>) -> Self {
    Self {
      orders: OrderEngine::new(store.clone()),
      cart: CartService::new(store.clone()),
      payments: PaymentService::new(store.clone(), gateway),
      reconciler: PaymentReconciler::new(store),
      config,
    }
  }
}
