use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sobre del evento entrante del gateway
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEnvelope {
    #[serde(default)]
    pub event: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default, rename = "instanceUrl", alias = "instance_url", alias = "server_url")]
    pub instance_url: Option<String>,
    #[serde(default)]
    pub data: Value,
}

/// Un mensaje dentro de `data.messages` (o `data` directamente)
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Value,
    #[serde(default, rename = "messageTimestamp")]
    pub message_timestamp: Value,
    #[serde(default, rename = "pushName")]
    pub push_name: Option<String>,
    #[serde(default, rename = "messageType")]
    pub message_type: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageKey {
    #[serde(rename = "remoteJid")]
    pub remote_jid: String,
    #[serde(default, rename = "fromMe")]
    pub from_me: bool,
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum InboundOutcome {
    Ignored { event: String },
    Stored { client_id: String, messages: usize },
}
