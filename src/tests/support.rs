//! tests/support.rs
//! Helpers compartidos: DB temporal migrada y datos de prueba.

use std::sync::Arc;
use std::time::Duration;

use httpmock::MockServer;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use tempfile::TempDir;

use crate::config::app_config::GatewayConfig;
use crate::gateway::{build_adapter, GatewayAdapter, GatewayVendor};
use crate::models::campaign_model::{CampaignRecord, RecipientRecord};
use crate::models::instance_model::InstanceRecord;
use crate::services::campaign_service::CampaignService;

/// Fila de `chats`, solo para verificar lo que guarda el receptor.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatRow {
    pub id: String,
    pub remote_jid: String,
    pub name: Option<String>,
    pub last_message: Option<String>,
    pub unread_count: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRow {
    pub chat_id: String,
    pub text: Option<String>,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub timestamp: String,
    pub status: String,
}

pub const ADMIN_TOKEN: &str = "admin-token";
pub const PAST: &str = "2020-01-01T00:00:00Z";
pub const FUTURE: &str = "2999-01-01T00:00:00Z";

/// La carpeta temporal vive mientras viva la DB.
pub struct TestDb {
    pub pool: Pool<Sqlite>,
    _dir: TempDir,
}

pub async fn test_db() -> TestDb {
    let dir = tempfile::tempdir().expect("tempdir");
    let options = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .expect("connect sqlite");
    CampaignService::new(pool.clone())
        .run_migrations()
        .await
        .expect("migrations");
    TestDb { pool, _dir: dir }
}

pub fn gateway_for(server: &MockServer, vendor: GatewayVendor) -> Arc<dyn GatewayAdapter> {
    build_adapter(&GatewayConfig {
        vendor,
        base_url: server.base_url(),
        admin_token: ADMIN_TOKEN.to_string(),
        timeout: Duration::from_secs(5),
    })
    .expect("adapter")
}

pub async fn insert_plan(pool: &Pool<Sqlite>, user_id: &str, limit: i64) {
    sqlx::query("INSERT INTO user_plans (user_id, instance_limit) VALUES (?1, ?2)")
        .bind(user_id)
        .bind(limit)
        .execute(pool)
        .await
        .expect("insert plan");
}

pub async fn insert_instance(
    pool: &Pool<Sqlite>,
    id: &str,
    user_id: &str,
    name: &str,
    status: &str,
    updated_at: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO instances (id, user_id, instance_name, token, status, qrcode, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(name)
    .bind(format!("tok-{}", name))
    .bind(status)
    .bind(if status == "connected" { None } else { Some("old-qr") })
    .bind(updated_at)
    .execute(pool)
    .await
    .expect("insert instance");
}

pub async fn insert_client(
    pool: &Pool<Sqlite>,
    id: &str,
    instance_name: Option<&str>,
    instance_url: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO clients (id, name, gateway_instance_name, gateway_instance_url) VALUES (?1, ?1, ?2, ?3)",
    )
    .bind(id)
    .bind(instance_name)
    .bind(instance_url)
    .execute(pool)
    .await
    .expect("insert client");
}

pub struct NewCampaign<'a> {
    pub id: &'a str,
    pub client_id: &'a str,
    pub instance_name: Option<&'a str>,
    pub template: &'a str,
    pub mode: &'a str,
    pub status: &'a str,
    pub scheduled_at: Option<&'a str>,
    pub payload: Option<&'a str>,
}

impl<'a> NewCampaign<'a> {
    pub fn gateway(id: &'a str, instance_name: &'a str, template: &'a str) -> Self {
        NewCampaign {
            id,
            client_id: "client-1",
            instance_name: Some(instance_name),
            template,
            mode: "gateway",
            status: "em_andamento",
            scheduled_at: None,
            payload: None,
        }
    }

    pub fn webhook(id: &'a str, client_id: &'a str) -> Self {
        NewCampaign {
            id,
            client_id,
            instance_name: None,
            template: "Hi {{name}}",
            mode: "webhook",
            status: "agendada",
            scheduled_at: Some(PAST),
            payload: None,
        }
    }
}

pub async fn insert_campaign(pool: &Pool<Sqlite>, c: NewCampaign<'_>) {
    sqlx::query(
        r#"
        INSERT INTO campaigns (
            id, client_id, instance_name, message_template, dispatch_mode, status,
            scheduled_at, payload, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
        "#,
    )
    .bind(c.id)
    .bind(c.client_id)
    .bind(c.instance_name)
    .bind(c.template)
    .bind(c.mode)
    .bind(c.status)
    .bind(c.scheduled_at)
    .bind(c.payload)
    .bind(PAST)
    .execute(pool)
    .await
    .expect("insert campaign");
}

pub async fn insert_recipient(
    pool: &Pool<Sqlite>,
    id: &str,
    campaign_id: &str,
    address: &str,
    fields: Value,
) {
    sqlx::query(
        "INSERT INTO campaign_recipients (id, campaign_id, address, fields) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(id)
    .bind(campaign_id)
    .bind(address)
    .bind(fields.to_string())
    .execute(pool)
    .await
    .expect("insert recipient");
}

pub async fn insert_webhook_config(
    pool: &Pool<Sqlite>,
    id: &str,
    client_id: &str,
    url: &str,
    headers: Value,
    active: bool,
    direction: &str,
) {
    sqlx::query(
        r#"
        INSERT INTO webhook_configs (id, client_id, url, method, headers, active, direction, created_at)
        VALUES (?1, ?2, ?3, 'POST', ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(id)
    .bind(client_id)
    .bind(url)
    .bind(headers.to_string())
    .bind(active)
    .bind(direction)
    .bind(PAST)
    .execute(pool)
    .await
    .expect("insert webhook config");
}

pub async fn campaign(pool: &Pool<Sqlite>, id: &str) -> CampaignRecord {
    sqlx::query_as::<_, CampaignRecord>("SELECT * FROM campaigns WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("campaign exists")
}

pub async fn recipient(pool: &Pool<Sqlite>, id: &str) -> RecipientRecord {
    sqlx::query_as::<_, RecipientRecord>("SELECT * FROM campaign_recipients WHERE id = ?1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("recipient exists")
}

pub async fn instance(pool: &Pool<Sqlite>, id: &str) -> Option<InstanceRecord> {
    sqlx::query_as::<_, InstanceRecord>("SELECT * FROM instances WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("query instance")
}

pub async fn count(pool: &Pool<Sqlite>, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count")
}
