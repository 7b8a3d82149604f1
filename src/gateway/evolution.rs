//! gateway/evolution.rs
//! Adaptador para Evolution API (rutas por nombre de instancia, header `apikey`).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use super::{
    live_state_of, pairing, str_at, CreatedInstance, GatewayAdapter, GatewayError, GatewayHttp,
    GatewayVendor, InstanceRef, LiveState, PairingResponse, SendOutcome,
};

const AUTH_HEADER: &str = "apikey";

#[derive(Clone, Debug)]
pub struct EvolutionGateway {
    http: GatewayHttp,
    admin_token: String,
}

impl EvolutionGateway {
    pub fn new(http: GatewayHttp, admin_token: String) -> Self {
        Self { http, admin_token }
    }

    fn encoded(name: &str) -> String {
        urlencoding::encode(name).into_owned()
    }
}

#[async_trait]
impl GatewayAdapter for EvolutionGateway {
    fn vendor(&self) -> GatewayVendor {
        GatewayVendor::Evolution
    }

    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, GatewayError> {
        let body = json!({
            "instanceName": name,
            "qrcode": true,
            "integration": "WHATSAPP-BAILEYS"
        });
        let data = self
            .http
            .call(
                Method::POST,
                "/instance/create",
                (AUTH_HEADER, self.admin_token.as_str()),
                Some(&body),
            )
            .await
            .into_result()?;

        // "hash" puede venir como string o como {"apikey": "..."}
        let token = str_at(&data, "/hash")
            .or_else(|| str_at(&data, "/hash/apikey"))
            .map(str::to_string)
            .unwrap_or_else(|| {
                log::warn!(
                    "(EvolutionGateway::create_instance) Respuesta sin hash para '{}', se usa la apikey global.",
                    name
                );
                self.admin_token.clone()
            });

        Ok(CreatedInstance {
            instance: InstanceRef {
                name: name.to_string(),
                token,
            },
            pairing: pairing::extract_artifact(&data),
        })
    }

    async fn request_pairing(
        &self,
        instance: &InstanceRef,
        phone: Option<&str>,
    ) -> Result<PairingResponse, GatewayError> {
        let mut path = format!("/instance/connect/{}", Self::encoded(&instance.name));
        if let Some(phone) = phone.filter(|p| !p.trim().is_empty()) {
            path.push_str(&format!("?number={}", urlencoding::encode(phone.trim())));
        }
        let data = self
            .http
            .call(Method::GET, &path, (AUTH_HEADER, instance.token.as_str()), None)
            .await
            .into_result()?;

        Ok(PairingResponse {
            artifact: pairing::extract_artifact(&data),
            live_status: live_state_of(&data),
            raw: data,
        })
    }

    async fn query_state(&self, instance: &InstanceRef) -> Result<LiveState, GatewayError> {
        let path = format!(
            "/instance/connectionState/{}",
            Self::encoded(&instance.name)
        );
        let data = self
            .http
            .call(Method::GET, &path, (AUTH_HEADER, instance.token.as_str()), None)
            .await
            .into_result()?;

        let status = live_state_of(&data).ok_or_else(|| GatewayError::Unexpected {
            reason: "connection state missing".to_string(),
            payload: data.clone(),
        })?;

        Ok(LiveState {
            status: Some(status),
            profile_name: str_at(&data, "/instance/profileName").map(str::to_string),
            profile_picture_url: str_at(&data, "/instance/profilePictureUrl").map(str::to_string),
            phone_number: str_at(&data, "/instance/owner").map(str::to_string),
        })
    }

    async fn send_text(&self, instance: &InstanceRef, address: &str, text: &str) -> SendOutcome {
        let path = format!("/message/sendText/{}", Self::encoded(&instance.name));
        let body = json!({ "number": address, "text": text });
        let envelope = self
            .http
            .call(Method::POST, &path, (AUTH_HEADER, instance.token.as_str()), Some(&body))
            .await;

        SendOutcome {
            accepted: envelope.ok,
            http_status: envelope.http_status,
            raw: envelope.data,
        }
    }

    async fn disconnect(&self, instance: &InstanceRef) -> Result<(), GatewayError> {
        let path = format!("/instance/logout/{}", Self::encoded(&instance.name));
        self.http
            .call(Method::DELETE, &path, (AUTH_HEADER, instance.token.as_str()), None)
            .await
            .into_result()
            .map(|_: Value| ())
    }

    async fn delete(&self, instance: &InstanceRef) -> Result<(), GatewayError> {
        let path = format!("/instance/delete/{}", Self::encoded(&instance.name));
        // borrar requiere la apikey global
        self.http
            .call(Method::DELETE, &path, (AUTH_HEADER, self.admin_token.as_str()), None)
            .await
            .into_result()
            .map(|_: Value| ())
    }
}
