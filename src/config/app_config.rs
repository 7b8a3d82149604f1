//! config/app_config.rs
//! Configuración global leída de variables de entorno (cargadas con dotenv).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::gateway::GatewayVendor;

pub const DEFAULT_PLAN_LIMIT: i64 = 3;
pub const DEFAULT_BATCH_SIZE: i64 = 5;
pub const DEFAULT_CLAIM_LIMIT: i64 = 20;
pub const DEFAULT_GATEWAY_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_WEBHOOK_TIMEOUT_SECS: u64 = 30;

/// Credenciales del gateway. Si falta la URL o el token admin, no hay gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub vendor: GatewayVendor,
    pub base_url: String,
    pub admin_token: String,
    pub timeout: Duration,
}

/// Parámetros del motor de despacho
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub batch_size: i64,
    pub claim_limit: i64,
    pub webhook_timeout: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            batch_size: DEFAULT_BATCH_SIZE,
            claim_limit: DEFAULT_CLAIM_LIMIT,
            webhook_timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_host: String,
    pub port: u16,
    pub gateway: Option<GatewayConfig>,
    pub default_plan_limit: i64,
    pub dispatch: DispatchSettings,
}

impl AppConfig {
    /// Lee toda la configuración del entorno. Solo falla con valores mal formados.
    pub fn from_env() -> Result<Self> {
        let gateway = match (
            non_empty_var("GATEWAY_BASE_URL"),
            non_empty_var("GATEWAY_ADMIN_TOKEN"),
        ) {
            (Some(base_url), Some(admin_token)) => {
                let vendor = non_empty_var("GATEWAY_VENDOR")
                    .unwrap_or_else(|| "evolution".to_string())
                    .parse::<GatewayVendor>()?;
                Some(GatewayConfig {
                    vendor,
                    base_url: base_url.trim_end_matches('/').to_string(),
                    admin_token,
                    timeout: Duration::from_secs(parse_var(
                        "GATEWAY_TIMEOUT_SECS",
                        DEFAULT_GATEWAY_TIMEOUT_SECS,
                    )?),
                })
            }
            _ => {
                log::warn!(
                    "(AppConfig::from_env) GATEWAY_BASE_URL / GATEWAY_ADMIN_TOKEN no definidos; \
                     las operaciones con el gateway quedarán deshabilitadas."
                );
                None
            }
        };

        Ok(AppConfig {
            database_url: non_empty_var("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:./data/campaigns.db".to_string()),
            bind_host: non_empty_var("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_var("PORT", 5022)?,
            gateway,
            default_plan_limit: parse_var("INSTANCE_PLAN_LIMIT", DEFAULT_PLAN_LIMIT)?,
            dispatch: DispatchSettings {
                batch_size: parse_var("DISPATCH_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
                claim_limit: parse_var("SCHEDULED_CLAIM_LIMIT", DEFAULT_CLAIM_LIMIT)?,
                webhook_timeout: Duration::from_secs(parse_var(
                    "WEBHOOK_TIMEOUT_SECS",
                    DEFAULT_WEBHOOK_TIMEOUT_SECS,
                )?),
            },
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(key: &str, default: T) -> Result<T> {
    match non_empty_var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow!("Valor inválido para {}: '{}'", key, raw)),
        None => Ok(default),
    }
}
