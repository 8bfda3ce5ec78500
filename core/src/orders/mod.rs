// storefront/src/orders/mod.rs

pub mod cart;
pub mod engine;

pub use cart::{CartLine, CartService, CartValidation, StockLevel, ValidatedLine};
pub use engine::{OrderEngine, OrderLine, OrderRequest};
