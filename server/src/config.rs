// storefront_server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::fmt;
use std::time::Duration;
use storefront::{MpesaConfig, MpesaEnvironment};

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,
  pub run_migrations: bool,
  pub mpesa: MpesaConfig,

  /// Acknowledge unknown or malformed callbacks with 200 so the provider stops retrying them.
  pub callback_ack_on_error: bool,
}

fn parse_flag(var_name: &str, raw: &str) -> Result<bool> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    other => Err(AppError::Config(format!("Invalid {} value: '{}'", var_name, other))),
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let database_max_connections = get_env("DATABASE_MAX_CONNECTIONS")
      .unwrap_or_else(|_| "10".to_string())
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", e)))?;
    let run_migrations = parse_flag(
      "RUN_MIGRATIONS",
      &get_env("RUN_MIGRATIONS").unwrap_or_else(|_| "true".to_string()),
    )?;

    let consumer_key = get_env("MPESA_CONSUMER_KEY")?;
    let consumer_secret = get_env("MPESA_CONSUMER_SECRET")?;
    let business_short_code = get_env("MPESA_BUSINESS_SHORT_CODE")?;
    let passkey = get_env("MPESA_PASSKEY")?;
    let environment = get_env("MPESA_ENVIRONMENT")
      .unwrap_or_else(|_| "sandbox".to_string())
      .parse::<MpesaEnvironment>()
      .map_err(|e| AppError::Config(format!("Invalid MPESA_ENVIRONMENT: {}", e)))?;
    let base_url = get_env("MPESA_BASE_URL").ok().filter(|url| !url.trim().is_empty());
    let timeout = get_env("MPESA_TIMEOUT_SECS")
      .unwrap_or_else(|_| "30".to_string())
      .parse::<u64>()
      .map(Duration::from_secs)
      .map_err(|e| AppError::Config(format!("Invalid MPESA_TIMEOUT_SECS: {}", e)))?;
    let callback_url = get_env("PAYMENT_CALLBACK_URL")?;

    let callback_ack_on_error = parse_flag(
      "CALLBACK_ACK_ON_ERROR",
      &get_env("CALLBACK_ACK_ON_ERROR").unwrap_or_else(|_| "true".to_string()),
    )?;

    tracing::info!(
      environment = ?environment,
      run_migrations,
      callback_ack_on_error,
      "Application configuration loaded successfully."
    );

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      run_migrations,
      mpesa: MpesaConfig {
        consumer_key,
        consumer_secret,
        business_short_code,
        passkey,
        environment,
        base_url,
        callback_url,
        timeout,
      },
      callback_ack_on_error,
    })
  }
}

// The database URL may embed credentials; only its presence is shown.
impl fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("database_url", &"[REDACTED]")
      .field("database_max_connections", &self.database_max_connections)
      .field("run_migrations", &self.run_migrations)
      .field("mpesa", &self.mpesa)
      .field("callback_ack_on_error", &self.callback_ack_on_error)
      .finish()
  }
}
