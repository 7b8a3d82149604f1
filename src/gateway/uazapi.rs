//! gateway/uazapi.rs
//! Adaptador para Uazapi (token por instancia en el header `token`).

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};

use super::{
    live_state_of, pairing, str_at, CreatedInstance, GatewayAdapter, GatewayError, GatewayHttp,
    GatewayVendor, InstanceRef, LiveState, PairingResponse, SendOutcome,
};

#[derive(Clone, Debug)]
pub struct UazapiGateway {
    http: GatewayHttp,
    admin_token: String,
}

impl UazapiGateway {
    pub fn new(http: GatewayHttp, admin_token: String) -> Self {
        Self { http, admin_token }
    }

    /// La instancia ya existe en el gateway pero sin token no se puede operar:
    /// se borra con la credencial de administrador.
    async fn discard_orphan(&self, name: &str) {
        let body = json!({ "name": name });
        let envelope = self
            .http
            .call(
                Method::DELETE,
                "/instance",
                ("admintoken", self.admin_token.as_str()),
                Some(&body),
            )
            .await;
        if envelope.ok {
            log::warn!(
                "(UazapiGateway::create_instance) '{}' sin token; borrada en el gateway.",
                name
            );
        } else {
            log::error!(
                "(UazapiGateway::create_instance) '{}' sin token y no se pudo borrar (HTTP {}): {}",
                name,
                envelope.http_status,
                envelope.data
            );
        }
    }
}

#[async_trait]
impl GatewayAdapter for UazapiGateway {
    fn vendor(&self) -> GatewayVendor {
        GatewayVendor::Uazapi
    }

    async fn create_instance(&self, name: &str) -> Result<CreatedInstance, GatewayError> {
        let body = json!({ "name": name });
        let data = self
            .http
            .call(
                Method::POST,
                "/instance/init",
                ("admintoken", self.admin_token.as_str()),
                Some(&body),
            )
            .await
            .into_result()?;

        let token = match str_at(&data, "/token").or_else(|| str_at(&data, "/instance/token")) {
            Some(token) => token.to_string(),
            None => {
                self.discard_orphan(name).await;
                return Err(GatewayError::Unexpected {
                    reason: "instance token missing".to_string(),
                    payload: data,
                });
            }
        };

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
        // con "phone" el gateway responde código de emparejamiento en vez de QR
        let body = match phone.map(str::trim).filter(|p| !p.is_empty()) {
            Some(phone) => json!({ "phone": phone }),
            None => json!({}),
        };
        let data = self
            .http
            .call(
                Method::POST,
                "/instance/connect",
                ("token", instance.token.as_str()),
                Some(&body),
            )
            .await
            .into_result()?;

        Ok(PairingResponse {
            artifact: pairing::extract_artifact(&data),
            live_status: live_state_of(&data),
            raw: data,
        })
    }

    async fn query_state(&self, instance: &InstanceRef) -> Result<LiveState, GatewayError> {
        let data = self
            .http
            .call(
                Method::GET,
                "/instance/status",
                ("token", instance.token.as_str()),
                None,
            )
            .await
            .into_result()?;

        let status = live_state_of(&data).ok_or_else(|| GatewayError::Unexpected {
            reason: "instance status missing".to_string(),
            payload: data.clone(),
        })?;

        Ok(LiveState {
            status: Some(status),
            profile_name: str_at(&data, "/instance/profileName").map(str::to_string),
            profile_picture_url: str_at(&data, "/instance/profilePicUrl").map(str::to_string),
            phone_number: str_at(&data, "/instance/owner").map(str::to_string),
        })
    }

    async fn send_text(&self, instance: &InstanceRef, address: &str, text: &str) -> SendOutcome {
        let body = json!({ "number": address, "text": text });
        let envelope = self
            .http
            .call(
                Method::POST,
                "/send/text",
                ("token", instance.token.as_str()),
                Some(&body),
            )
            .await;

        SendOutcome {
            accepted: envelope.ok,
            http_status: envelope.http_status,
            raw: envelope.data,
        }
    }

    async fn disconnect(&self, instance: &InstanceRef) -> Result<(), GatewayError> {
        self.http
            .call(
                Method::POST,
                "/instance/disconnect",
                ("token", instance.token.as_str()),
                None,
            )
            .await
            .into_result()
            .map(|_: Value| ())
    }

    async fn delete(&self, instance: &InstanceRef) -> Result<(), GatewayError> {
        self.http
            .call(Method::DELETE, "/instance", ("token", instance.token.as_str()), None)
            .await
            .into_result()
            .map(|_: Value| ())
    }
}
