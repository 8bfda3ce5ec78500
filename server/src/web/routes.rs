// storefront_server/src/web/routes.rs

use actix_web::web;

use crate::web::handlers::{cart_handlers, order_handlers, payment_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api")
      .route("/health", web::get().to(health_check_handler))
      // Literal segments are registered ahead of `/{id}`.
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/search", web::get().to(order_handlers::search_orders_handler))
          .route("/email/{email}", web::get().to(order_handlers::orders_by_email_handler))
          .route("/{id}", web::get().to(order_handlers::get_order_handler))
          .route("/{id}/status", web::put().to(order_handlers::update_order_status_handler)),
      )
      .service(
        web::scope("/payment")
          .route("/initiate", web::post().to(payment_handlers::initiate_payment_handler))
          .route("/callback", web::post().to(payment_handlers::payment_callback_handler))
          .route(
            "/status/{order_id}",
            web::get().to(payment_handlers::payment_status_handler),
          ),
      )
      .service(
        web::scope("/cart")
          .route("/validate", web::post().to(cart_handlers::validate_cart_handler))
          .route("/check-stock", web::post().to(cart_handlers::check_stock_handler)),
      ),
  );
}
