use std::str::FromStr;

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use dotenv::dotenv;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::app_config::AppConfig;
use crate::logger::init_logger;
use crate::services::campaign_service::CampaignService;
use crate::services::dispatch_service::DispatchService;
use crate::services::inbound_service::InboundService;
use crate::services::instance_service::InstanceService;
use crate::services::webhook_dispatch_service::WebhookDispatchService;

mod app;
mod config;
mod errors;
mod gateway;
mod handlers;
mod logger;
mod models;
mod services;

#[cfg(test)]
mod tests;

async fn setup_database(database_url: &str) -> Result<Pool<Sqlite>> {
    // Crear carpeta del archivo si hace falta (ej: ./data/campaigns.db)
    if let Some(path) = database_url.strip_prefix("sqlite:") {
        let path = path.trim_start_matches("//");
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !path.starts_with(":memory:") {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("No se pudo crear directorio {:?}", parent))?;
            }
        }
    }

    log::info!("Conectando a SQLite en {}", database_url);
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("No se pudo conectar a la base de datos SQLite.")?;

    Ok(db_pool)
}

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv().ok(); // Cargar .env al inicio
    init_logger();

    let config = AppConfig::from_env()?;
    let db_pool = setup_database(&config.database_url).await?;

    let campaign_service = CampaignService::new(db_pool.clone());
    campaign_service
        .run_migrations()
        .await
        .context("Fallo en migraciones")?;

    // Adaptador del gateway (opcional: sin él solo funciona el receptor de eventos)
    let gateway = match &config.gateway {
        Some(gw_config) => {
            log::info!(
                "Gateway {:?} en {}",
                gw_config.vendor,
                gw_config.base_url
            );
            Some(gateway::build_adapter(gw_config)?)
        }
        None => None,
    };

    let instance_service =
        InstanceService::new(db_pool.clone(), gateway.clone(), config.default_plan_limit);
    let dispatch_service = DispatchService::new(
        campaign_service.clone(),
        instance_service.clone(),
        gateway.clone(),
        config.dispatch.clone(),
    );
    let webhook_dispatch_service = WebhookDispatchService::new(
        db_pool.clone(),
        campaign_service.clone(),
        config.dispatch.clone(),
    );
    let inbound_service = InboundService::new(db_pool.clone());

    log::info!("Levantando servidor en {}:{}", config.bind_host, config.port);
    HttpServer::new(move || {
        App::new()
            .app_data(web::JsonConfig::default().limit(2 * 1024 * 1024))
            .app_data(web::Data::new(instance_service.clone()))
            .app_data(web::Data::new(dispatch_service.clone()))
            .app_data(web::Data::new(webhook_dispatch_service.clone()))
            .app_data(web::Data::new(inbound_service.clone()))
            .configure(app::init_app)
    })
    .bind((config.bind_host.as_str(), config.port))?
    .run()
    .await?;

    Ok(())
}
