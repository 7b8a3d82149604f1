use std::collections::BTreeMap;

use serde::Serialize;

/// Fila de `webhook_configs`. El despachador solo la lee.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct WebhookConfigRecord {
    pub id: String,
    pub client_id: String,
    pub url: String,
    pub method: String,
    pub headers: String, // JSON {"X-Api-Key": "..."}
    pub active: bool,
    pub direction: String, // "outbound" | "inbound"
    pub created_at: String,
}

impl WebhookConfigRecord {
    pub fn extra_headers(&self) -> BTreeMap<String, String> {
        serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(&self.headers)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
            .collect()
    }
}
