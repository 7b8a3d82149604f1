use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Estados de campaña. Los terminales no admiten transición.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CampaignStatus {
    #[serde(rename = "agendada")]
    Scheduled,
    #[serde(rename = "em_andamento")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
}

impl CampaignStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignStatus::Scheduled => "agendada",
            CampaignStatus::InProgress => "em_andamento",
            CampaignStatus::Completed => "completed",
            CampaignStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }

    pub const ALL: [CampaignStatus; 4] = [
        CampaignStatus::Scheduled,
        CampaignStatus::InProgress,
        CampaignStatus::Completed,
        CampaignStatus::Failed,
    ];

    pub fn can_transition_to(&self, next: CampaignStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (CampaignStatus::Scheduled, CampaignStatus::InProgress) => true,
            (CampaignStatus::Scheduled, CampaignStatus::Failed) => true,
            (CampaignStatus::InProgress, CampaignStatus::Completed) => true,
            (CampaignStatus::InProgress, CampaignStatus::Failed) => true,
            _ => false,
        }
    }

    /// Estados desde los que se puede llegar a `next`.
    pub fn sources_of(next: CampaignStatus) -> Vec<CampaignStatus> {
        Self::ALL
            .into_iter()
            .filter(|from| from.can_transition_to(next))
            .collect()
    }
}

/// Estados de destinatario: pendente -> processando -> enviado_padrao | erro
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecipientStatus {
    #[serde(rename = "pendente")]
    Pending,
    #[serde(rename = "processando")]
    Processing,
    #[serde(rename = "enviado_padrao")]
    Sent,
    #[serde(rename = "erro")]
    Error,
}

impl RecipientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipientStatus::Pending => "pendente",
            RecipientStatus::Processing => "processando",
            RecipientStatus::Sent => "enviado_padrao",
            RecipientStatus::Error => "erro",
        }
    }

    /// Solo avanza: pendente -> processando -> {enviado_padrao, erro}
    pub fn can_transition_to(&self, next: RecipientStatus) -> bool {
        matches!(
            (self, next),
            (RecipientStatus::Pending, RecipientStatus::Processing)
                | (RecipientStatus::Processing, RecipientStatus::Sent)
                | (RecipientStatus::Processing, RecipientStatus::Error)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Gateway,
    Webhook,
}

impl DispatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchMode::Gateway => "gateway",
            DispatchMode::Webhook => "webhook",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CampaignRecord {
    pub id: String,
    pub client_id: String,
    pub instance_name: Option<String>,
    pub message_template: String,
    pub dispatch_mode: String,
    pub status: String,
    pub scheduled_at: Option<String>,
    pub payload: Option<String>, // JSON preparado para webhook
    pub sent_count: i64,
    pub error_count: i64,
    pub error_log: Option<String>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct RecipientRecord {
    pub id: String,
    pub campaign_id: String,
    pub address: String,
    pub fields: String, // JSON {"name": "...", "company": "..."}
    pub status: String,
    pub error_detail: Option<String>,
    pub generated_message: Option<String>,
    pub sent_at: Option<String>,
}

impl RecipientRecord {
    /// Campos de sustitución. JSON inválido o valores no-string se ignoran / se stringifican.
    pub fn substitution_fields(&self) -> BTreeMap<String, String> {
        let parsed: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(&self.fields).unwrap_or_default();
        parsed
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::Null => None,
                serde_json::Value::String(s) => Some((k, s)),
                other => Some((k, other.to_string())),
            })
            .collect()
    }
}

/// Resumen de un ciclo de despacho directo
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub promoted: usize,
    pub campaigns_seen: usize,
    pub campaigns_skipped: usize,
    pub campaigns_failed: usize,
    pub recipients_claimed: usize,
    pub sent: usize,
    pub errors: usize,
}

/// Resumen de un ciclo de webhook saliente
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScheduledReport {
    pub claimed: usize,
    pub completed: Vec<String>,
    pub failed: Vec<FailedCampaign>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedCampaign {
    pub campaign_id: String,
    pub error: String,
}
