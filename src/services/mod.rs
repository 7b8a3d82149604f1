//! services/mod.rs
//! Módulo que agrupa los "servicios" o "capas de negocio" de la app.

use chrono::{DateTime, SecondsFormat, Utc};

pub mod campaign_service;
pub mod dispatch_service;
pub mod inbound_service;
pub mod instance_service;
pub mod template;
pub mod webhook_dispatch_service;

/// Formato único de timestamps en DB (RFC 3339, segundos, `Z`), comparable como texto.
pub fn db_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
