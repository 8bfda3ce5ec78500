// storefront_server/src/main.rs

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use std::sync::Arc;
use storefront::{MpesaClient, PgStore};
use storefront_server::web::configure_app_routes;
use storefront_server::{AppConfig, AppState};
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE)
    .init();

  tracing::info!("Starting storefront server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(e.into());
    }
  };

  let store = PgStore::connect(&app_config.database_url, app_config.database_max_connections)
    .await
    .context("connecting to the database")?;
  tracing::info!("Successfully connected to the database.");

  if app_config.run_migrations {
    store.migrate().await.context("applying migrations")?;
    tracing::info!("Database migrations applied.");
  }

  let gateway = MpesaClient::new(app_config.mpesa.clone()).context("building the M-Pesa client")?;
  tracing::info!(base_url = %gateway.config().base_url(), "M-Pesa client ready.");

  let app_state = AppState::new(Arc::new(store), Arc::new(gateway), app_config.clone());

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await?;

  Ok(())
}
