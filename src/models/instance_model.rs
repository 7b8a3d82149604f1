use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::gateway::{ConnectionStatus, GatewayError, InstanceRef, PairingArtifact};

/// Fila de `instances`
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct InstanceRecord {
    pub id: String,
    pub user_id: String,
    pub instance_name: String,
    #[serde(skip_serializing)]
    pub token: String,
    pub status: String, // "disconnected", "pending", "connecting", "connected"
    pub qrcode: Option<String>,
    pub pairing_code: Option<String>,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub phone_number: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Solo en listados: la consulta al gateway falló y `status` es el guardado.
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_error: Option<SyncError>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncError {
    pub error: String,
    pub details: Value,
}

impl From<&GatewayError> for SyncError {
    fn from(e: &GatewayError) -> Self {
        SyncError {
            error: e.to_string(),
            details: e.payload().cloned().unwrap_or(Value::Null),
        }
    }
}

impl InstanceRecord {
    pub fn connection_status(&self) -> ConnectionStatus {
        ConnectionStatus::from_db(&self.status)
    }

    pub fn gateway_ref(&self) -> InstanceRef {
        InstanceRef {
            name: self.instance_name.clone(),
            token: self.token.clone(),
        }
    }
}

/// Comandos del endpoint único de instancias, discriminados por "action".
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum InstanceCommand {
    Create,
    Connect {
        instance_id: Option<String>,
        phone: Option<String>,
    },
    RefreshQr {
        instance_id: Option<String>,
    },
    Status {
        instance_id: String,
    },
    Disconnect {
        instance_id: String,
    },
    Delete {
        instance_id: String,
    },
    #[serde(other)]
    Unknown,
}

/// Resultado de pedir emparejamiento
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PairingOutcome {
    Artifact {
        instance_id: String,
        #[serde(flatten)]
        artifact: PairingArtifact,
    },
    AlreadyConnected {
        instance_id: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutcome {
    pub instance_id: String,
    pub remote_deleted: bool,
}

/// Respuesta genérica
#[derive(Debug, Clone, Serialize)]
pub struct InstanceActionResponse<T: Serialize> {
    pub success: bool,
    pub message: String,
    pub data: T,
}
