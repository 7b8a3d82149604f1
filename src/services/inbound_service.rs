//! services/inbound_service.rs
//! Receptor de eventos del gateway: guarda chats y mensajes entrantes.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::models::chat_model::{InboundEnvelope, InboundMessage, InboundOutcome};
use crate::services::db_timestamp;

/// Rutas conocidas de texto, en orden de preferencia
const TEXT_PATHS: &[&str] = &[
    "/conversation",
    "/extendedTextMessage/text",
    "/imageMessage/caption",
    "/videoMessage/caption",
    "/documentMessage/caption",
    "/buttonsResponseMessage/selectedDisplayText",
    "/listResponseMessage/title",
];

/// (clave del mensaje, tipo, texto de reemplazo)
const MESSAGE_KINDS: &[(&str, &str, &str)] = &[
    ("conversation", "text", "[mensagem]"),
    ("extendedTextMessage", "text", "[mensagem]"),
    ("imageMessage", "image", "[imagem]"),
    ("videoMessage", "video", "[vídeo]"),
    ("audioMessage", "audio", "[áudio]"),
    ("documentMessage", "document", "[documento]"),
    ("stickerMessage", "sticker", "[figurinha]"),
    ("locationMessage", "location", "[localização]"),
    ("contactMessage", "contact", "[contato]"),
];

#[derive(Clone, Debug)]
pub struct InboundService {
    db_pool: Pool<Sqlite>,
}

impl InboundService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        InboundService { db_pool }
    }

    pub async fn handle_event(
        &self,
        envelope: InboundEnvelope,
    ) -> Result<InboundOutcome, ServiceError> {
        // otros eventos se aceptan (200) para que el gateway no reintente
        if !is_message_upsert(&envelope.event) {
            log::debug!("(handle_event) Evento ignorado: '{}'", envelope.event);
            return Ok(InboundOutcome::Ignored {
                event: envelope.event,
            });
        }

        let client_id = self
            .resolve_client(
                envelope.instance.as_deref(),
                envelope.instance_url.as_deref(),
            )
            .await?
            .ok_or_else(|| {
                log::warn!(
                    "(handle_event) Sin cliente para instance={:?} url={:?}",
                    envelope.instance,
                    envelope.instance_url
                );
                ServiceError::NotFound(format!(
                    "no client configured for instance {}",
                    envelope
                        .instance
                        .as_deref()
                        .or(envelope.instance_url.as_deref())
                        .unwrap_or("<unknown>")
                ))
            })?;

        let messages = parse_messages(&envelope.data);
        for msg in &messages {
            self.store_message(&client_id, msg).await?;
        }

        log::info!(
            "(handle_event) client={} mensajes guardados={}",
            client_id,
            messages.len()
        );
        Ok(InboundOutcome::Stored {
            client_id,
            messages: messages.len(),
        })
    }

    async fn resolve_client(
        &self,
        instance: Option<&str>,
        instance_url: Option<&str>,
    ) -> Result<Option<String>, sqlx::Error> {
        let instance = instance.map(str::trim).filter(|s| !s.is_empty());
        let instance_url = instance_url
            .map(|u| u.trim().trim_end_matches('/'))
            .filter(|s| !s.is_empty());
        if instance.is_none() && instance_url.is_none() {
            return Ok(None);
        }

        sqlx::query_scalar(
            r#"
            SELECT id FROM clients
            WHERE (?1 IS NOT NULL AND gateway_instance_name = ?1)
               OR (?2 IS NOT NULL AND RTRIM(gateway_instance_url, '/') = ?2)
            LIMIT 1
            "#,
        )
        .bind(instance)
        .bind(instance_url)
        .fetch_optional(&self.db_pool)
        .await
    }

    /// Upsert del chat + mensaje en una transacción. Reentregas sobrescriben el
    /// mensaje; la vista previa del chat solo avanza con mensajes más nuevos.
    async fn store_message(&self, client_id: &str, msg: &InboundMessage) -> Result<(), sqlx::Error> {
        let kind = message_kind(msg);
        let text = message_text(&msg.message).unwrap_or_else(|| placeholder_for(&kind).to_string());
        let timestamp = db_timestamp(message_time(&msg.message_timestamp));
        let status = msg
            .status
            .clone()
            .map(|s| s.to_ascii_lowercase())
            .unwrap_or_else(|| {
                if msg.key.from_me {
                    "sent".to_string()
                } else {
                    "received".to_string()
                }
            });

        let mut tx = self.db_pool.begin().await?;

        let already_stored: Option<i64> = sqlx::query_scalar("SELECT 1 FROM messages WHERE id = ?1")
            .bind(&msg.key.id)
            .fetch_optional(&mut *tx)
            .await?;
        let unread_increment: i64 = if already_stored.is_none() && !msg.key.from_me {
            1
        } else {
            0
        };
        let chat_name = if msg.key.from_me {
            None
        } else {
            msg.push_name.clone().filter(|n| !n.trim().is_empty())
        };

        let chat_id: String = sqlx::query_scalar(
            r#"
            INSERT INTO chats (id, client_id, remote_jid, name, last_message, unread_count, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (client_id, remote_jid) DO UPDATE SET
                name = COALESCE(excluded.name, chats.name),
                last_message = CASE
                    WHEN excluded.updated_at >= chats.updated_at THEN excluded.last_message
                    ELSE chats.last_message
                END,
                unread_count = chats.unread_count + excluded.unread_count,
                updated_at = MAX(chats.updated_at, excluded.updated_at)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(client_id)
        .bind(&msg.key.remote_jid)
        .bind(&chat_name)
        .bind(&text)
        .bind(unread_increment)
        .bind(&timestamp)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO messages (id, chat_id, client_id, text, type, from_me, timestamp, status)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT (id) DO UPDATE SET
                text = excluded.text,
                type = excluded.type,
                timestamp = excluded.timestamp,
                status = excluded.status
            "#,
        )
        .bind(&msg.key.id)
        .bind(&chat_id)
        .bind(client_id)
        .bind(&text)
        .bind(&kind)
        .bind(msg.key.from_me)
        .bind(&timestamp)
        .bind(&status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// "MESSAGES_UPSERT" o "messages.upsert"
pub fn is_message_upsert(event: &str) -> bool {
    event.trim().replace('.', "_").eq_ignore_ascii_case("MESSAGES_UPSERT")
}

/// `data.messages[]` o un único mensaje en `data`. Entradas mal formadas se descartan.
pub fn parse_messages(data: &Value) -> Vec<InboundMessage> {
    let raw: Vec<&Value> = match data.get("messages").and_then(Value::as_array) {
        Some(list) => list.iter().collect(),
        None if data.get("key").is_some() => vec![data],
        None => Vec::new(),
    };

    raw.into_iter()
        .filter_map(|v| match serde_json::from_value::<InboundMessage>(v.clone()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                log::warn!("(parse_messages) Mensaje descartado: {}", e);
                None
            }
        })
        .collect()
}

pub fn message_text(message: &Value) -> Option<String> {
    TEXT_PATHS.iter().find_map(|path| {
        message
            .pointer(path)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

pub fn message_kind(msg: &InboundMessage) -> String {
    MESSAGE_KINDS
        .iter()
        .find(|(key, _, _)| msg.message.get(*key).is_some())
        .map(|(_, kind, _)| kind.to_string())
        .or_else(|| msg.message_type.clone())
        .unwrap_or_else(|| "unknown".to_string())
}

fn placeholder_for(kind: &str) -> &'static str {
    MESSAGE_KINDS
        .iter()
        .find(|(_, k, _)| *k == kind)
        .map(|(_, _, placeholder)| *placeholder)
        .unwrap_or("[mensagem]")
}

/// `messageTimestamp` en segundos (número o string); si no sirve, ahora.
fn message_time(raw: &Value) -> DateTime<Utc> {
    let secs = match raw {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    secs.and_then(|s| Utc.timestamp_opt(s, 0).single())
        .unwrap_or_else(Utc::now)
}
