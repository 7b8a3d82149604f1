//! gateway/mod.rs
//! Interfaz uniforme sobre los gateways HTTP de mensajería (Evolution, Uazapi).
//!
//! Toda llamada HTTP pasa por [`GatewayHttp::call`], que nunca falla: devuelve
//! un [`GatewayEnvelope`] `{ok, http_status, data}` sobre el que los adaptadores
//! deciden. El resto del sistema solo conoce el trait [`GatewayAdapter`].

pub mod evolution;
pub mod pairing;
pub mod uazapi;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::app_config::GatewayConfig;

pub use pairing::PairingArtifact;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayVendor {
    Evolution,
    Uazapi,
}

impl FromStr for GatewayVendor {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evolution" => Ok(GatewayVendor::Evolution),
            "uazapi" => Ok(GatewayVendor::Uazapi),
            other => Err(anyhow::anyhow!("Gateway no soportado: {}", other)),
        }
    }
}

/// Estado de conexión de una instancia, tal como se guarda localmente.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Pending,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }

    /// Lectura del valor guardado en DB; valores desconocidos cuentan como desconectado.
    pub fn from_db(raw: &str) -> Self {
        match raw {
            "pending" => ConnectionStatus::Pending,
            "connecting" => ConnectionStatus::Connecting,
            "connected" => ConnectionStatus::Connected,
            _ => ConnectionStatus::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normaliza los estados "vivos" de ambos vendors al mismo vocabulario.
/// Evolution: open / connecting / close. Uazapi: connected / connecting / disconnected / qrcode.
pub fn normalize_live_state(raw: &str) -> ConnectionStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "open" | "connected" | "online" => ConnectionStatus::Connected,
        "connecting" | "syncing" => ConnectionStatus::Connecting,
        "qrcode" | "qr" | "pending" | "pairing" => ConnectionStatus::Pending,
        _ => ConnectionStatus::Disconnected,
    }
}

/// Busca el estado vivo en las rutas conocidas de ambos vendors.
pub(crate) fn live_state_of(data: &Value) -> Option<ConnectionStatus> {
    let candidates = [
        data.pointer("/instance/state"),
        data.pointer("/instance/status"),
        data.get("state"),
        data.get("status"),
    ];
    for candidate in candidates.into_iter().flatten() {
        if let Some(raw) = candidate.as_str() {
            return Some(normalize_live_state(raw));
        }
    }
    // uazapi: {"status": {"connected": true}} o {"connected": true}
    data.pointer("/status/connected")
        .or_else(|| data.get("connected"))
        .and_then(Value::as_bool)
        .map(|connected| {
            if connected {
                ConnectionStatus::Connected
            } else {
                ConnectionStatus::Disconnected
            }
        })
}

/// Identidad remota de una instancia (nombre + token por instancia).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRef {
    pub name: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct CreatedInstance {
    pub instance: InstanceRef,
    pub pairing: PairingArtifact,
}

#[derive(Debug, Clone)]
pub struct PairingResponse {
    pub artifact: PairingArtifact,
    pub live_status: Option<ConnectionStatus>,
    pub raw: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveState {
    pub status: Option<ConnectionStatus>,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub phone_number: Option<String>,
}

impl LiveState {
    /// Estado normalizado; sin dato explícito se asume desconectado.
    pub fn connection_status(&self) -> ConnectionStatus {
        self.status.unwrap_or(ConnectionStatus::Disconnected)
    }
}

#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub accepted: bool,
    pub http_status: u16,
    pub raw: Value,
}

/// Sobre uniforme de respuesta del gateway.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEnvelope {
    pub ok: bool,
    pub http_status: u16,
    pub data: Value,
}

impl GatewayEnvelope {
    pub fn into_result(self) -> Result<Value, GatewayError> {
        if self.ok {
            Ok(self.data)
        } else if self.http_status == 0 {
            let message = self
                .data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("network error")
                .to_string();
            Err(GatewayError::Unreachable {
                message,
                payload: self.data,
            })
        } else {
            Err(GatewayError::Rejected {
                http_status: self.http_status,
                payload: self.data,
            })
        }
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway unreachable: {message}")]
    Unreachable { message: String, payload: Value },

    #[error("gateway rejected request with HTTP {http_status}")]
    Rejected { http_status: u16, payload: Value },

    #[error("unexpected gateway response: {reason}")]
    Unexpected { reason: String, payload: Value },

    #[error("gateway client setup failed: {0}")]
    Client(String),
}

impl GatewayError {
    pub fn payload(&self) -> Option<&Value> {
        match self {
            GatewayError::Unreachable { payload, .. }
            | GatewayError::Rejected { payload, .. }
            | GatewayError::Unexpected { payload, .. } => Some(payload),
            GatewayError::Client(_) => None,
        }
    }
}

#[async_trait]
pub trait GatewayAdapter: Send + Sync {
    fn vendor(&self) -> GatewayVendor;

    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, GatewayError>;

    async fn request_pairing(
        &self,
        instance: &InstanceRef,
        phone: Option<&str>,
    ) -> Result<PairingResponse, GatewayError>;

    async fn query_state(&self, instance: &InstanceRef) -> Result<LiveState, GatewayError>;

    /// Nunca falla: un rechazo o error de red vuelve como `accepted = false`.
    async fn send_text(&self, instance: &InstanceRef, address: &str, text: &str) -> SendOutcome;

    async fn disconnect(&self, instance: &InstanceRef) -> Result<(), GatewayError>;

    async fn delete(&self, instance: &InstanceRef) -> Result<(), GatewayError>;
}

/// Cliente HTTP compartido por los adaptadores. Cada request lleva timeout.
#[derive(Clone, Debug)]
pub struct GatewayHttp {
    client: Client,
    base_url: String,
}

impl GatewayHttp {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn call(
        &self,
        method: Method,
        path: &str,
        auth_header: (&str, &str),
        body: Option<&Value>,
    ) -> GatewayEnvelope {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("(GatewayHttp::call) {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header(auth_header.0, auth_header.1);
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                log::warn!("(GatewayHttp::call) {} {} falló: {}", method, url, e);
                return GatewayEnvelope {
                    ok: false,
                    http_status: 0,
                    data: json!({ "error": e.to_string(), "timeout": e.is_timeout() }),
                };
            }
        };

        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        let data = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text))
        };

        if !status.is_success() {
            log::warn!(
                "(GatewayHttp::call) {} {} respondió {}: {}",
                method,
                url,
                status,
                data
            );
        }

        GatewayEnvelope {
            ok: status.is_success(),
            http_status: status.as_u16(),
            data,
        }
    }
}

pub(crate) fn str_at<'a>(data: &'a Value, pointer: &str) -> Option<&'a str> {
    data.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Construye el adaptador del vendor configurado.
pub fn build_adapter(cfg: &GatewayConfig) -> Result<Arc<dyn GatewayAdapter>, GatewayError> {
    let http = GatewayHttp::new(&cfg.base_url, cfg.timeout)?;
    let adapter: Arc<dyn GatewayAdapter> = match cfg.vendor {
        GatewayVendor::Evolution => Arc::new(evolution::EvolutionGateway::new(
            http,
            cfg.admin_token.clone(),
        )),
        GatewayVendor::Uazapi => {
            Arc::new(uazapi::UazapiGateway::new(http, cfg.admin_token.clone()))
        }
    };
    Ok(adapter)
}
