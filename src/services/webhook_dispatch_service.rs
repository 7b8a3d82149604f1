//! services/webhook_dispatch_service.rs
//! Variante de webhook saliente: reenvía el payload de cada campaña agendada
//! a la URL configurada por el cliente.

use chrono::Utc;
use reqwest::{header::CONTENT_TYPE, Client, Method};
use serde_json::{json, Value};
use sqlx::{Pool, Sqlite};
use uuid::Uuid;

use crate::config::app_config::DispatchSettings;
use crate::errors::ServiceError;
use crate::models::campaign_model::{
    CampaignRecord, DispatchMode, FailedCampaign, ScheduledReport,
};
use crate::models::webhook_model::WebhookConfigRecord;
use crate::services::campaign_service::CampaignService;
use crate::services::template;

const MAX_ERROR_BODY_CHARS: usize = 500;

#[derive(Clone)]
pub struct WebhookDispatchService {
    db_pool: Pool<Sqlite>,
    campaigns: CampaignService,
    http_client: Client,
    settings: DispatchSettings,
}

impl WebhookDispatchService {
    pub fn new(db_pool: Pool<Sqlite>, campaigns: CampaignService, settings: DispatchSettings) -> Self {
        Self {
            db_pool,
            campaigns,
            http_client: Client::new(),
            settings,
        }
    }

    pub async fn run_scheduled_cycle(&self) -> Result<ScheduledReport, ServiceError> {
        let worker_id = format!("webhook-{}", Uuid::new_v4());
        let claimed = self
            .campaigns
            .claim_due_campaigns(
                DispatchMode::Webhook,
                Utc::now(),
                self.settings.claim_limit,
                &worker_id,
            )
            .await?;

        let mut report = ScheduledReport {
            claimed: claimed.len(),
            ..ScheduledReport::default()
        };

        // cada campaña por separado: ninguna falla, de entrega o de DB, corta las demás
        for campaign in claimed {
            let delivered = match self.deliver(&campaign).await {
                Ok(delivered) => delivered,
                Err(e) => Err(format!("could not prepare delivery: {}", e)),
            };

            let error = match delivered {
                Ok(()) => match self.campaigns.mark_campaign_completed(&campaign.id).await {
                    Ok(_) => {
                        log::info!(
                            "(run_scheduled_cycle) Campaña {} entregada al webhook.",
                            campaign.id
                        );
                        report.completed.push(campaign.id);
                        continue;
                    }
                    Err(e) => format!("delivered but could not mark as completed: {}", e),
                },
                Err(error) => error,
            };

            log::error!(
                "(run_scheduled_cycle) Campaña {} falló: {}",
                campaign.id,
                error
            );
            if let Err(e) = self
                .campaigns
                .mark_campaign_failed(&campaign.id, &error)
                .await
            {
                log::error!(
                    "(run_scheduled_cycle) Campaña {} queda em_andamento: no se pudo marcar failed: {:?}",
                    campaign.id,
                    e
                );
            }
            report.failed.push(FailedCampaign {
                campaign_id: campaign.id,
                error,
            });
        }

        Ok(report)
    }

    /// Error externo = persistencia. Error interno = falla de entrega de la campaña.
    async fn deliver(
        &self,
        campaign: &CampaignRecord,
    ) -> Result<Result<(), String>, ServiceError> {
        let config = match self.active_outbound_config(&campaign.client_id).await? {
            Some(config) => config,
            None => {
                return Ok(Err(format!(
                    "no active outbound webhook configuration for client {}",
                    campaign.client_id
                )))
            }
        };

        let payload = self.prepared_payload(campaign).await?;
        let method = Method::from_bytes(config.method.trim().to_ascii_uppercase().as_bytes())
            .unwrap_or(Method::POST);

        let mut request = self
            .http_client
            .request(method, &config.url)
            .timeout(self.settings.webhook_timeout)
            .header(CONTENT_TYPE, "application/json");
        for (name, value) in config.extra_headers() {
            if name.eq_ignore_ascii_case("content-type") {
                continue;
            }
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = match request.body(payload.to_string()).send().await {
            Ok(resp) => resp,
            Err(e) if e.is_timeout() => {
                return Ok(Err(format!(
                    "webhook timed out after {}s",
                    self.settings.webhook_timeout.as_secs()
                )))
            }
            Err(e) => return Ok(Err(format!("webhook request failed: {}", e))),
        };

        let status = resp.status();
        if !status.is_success() {
            let body: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect();
            return Ok(Err(format!(
                "webhook responded with HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        Ok(Ok(()))
    }

    async fn active_outbound_config(
        &self,
        client_id: &str,
    ) -> Result<Option<WebhookConfigRecord>, sqlx::Error> {
        sqlx::query_as::<_, WebhookConfigRecord>(
            r#"
            SELECT * FROM webhook_configs
            WHERE client_id = ?1 AND active = 1 AND direction = 'outbound'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.db_pool)
        .await
    }

    /// Payload guardado en la campaña; si no hay, se arma con los destinatarios.
    async fn prepared_payload(&self, campaign: &CampaignRecord) -> Result<Value, sqlx::Error> {
        if let Some(raw) = campaign.payload.as_deref().filter(|p| !p.trim().is_empty()) {
            match serde_json::from_str::<Value>(raw) {
                Ok(value) => return Ok(value),
                Err(e) => log::warn!(
                    "(prepared_payload) Payload inválido en campaña {}, se arma uno por defecto: {}",
                    campaign.id,
                    e
                ),
            }
        }

        let recipients = self.campaigns.list_recipients(&campaign.id).await?;
        let recipients: Vec<Value> = recipients
            .iter()
            .map(|r| {
                let fields = r.substitution_fields();
                json!({
                    "id": r.id,
                    "address": template::normalize_address(&r.address),
                    "fields": fields,
                    "message": template::render(&campaign.message_template, &fields),
                })
            })
            .collect();

        Ok(json!({
            "campaign_id": campaign.id,
            "client_id": campaign.client_id,
            "instance_name": campaign.instance_name,
            "message_template": campaign.message_template,
            "recipients": recipients,
        }))
    }
}
