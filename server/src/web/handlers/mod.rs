// storefront_server/src/web/handlers/mod.rs

pub mod cart_handlers;
pub mod order_handlers;
pub mod payment_handlers;
