// storefront_server/src/lib.rs

pub mod config;
pub mod errors;
pub mod state;
pub mod web;

pub use config::AppConfig;
pub use errors::AppError;
pub use state::AppState;
