//! services/dispatch_service.rs
//! Motor de despacho directo: drena destinatarios pendientes vía el gateway.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use crate::config::app_config::DispatchSettings;
use crate::errors::ServiceError;
use crate::gateway::GatewayAdapter;
use crate::models::campaign_model::{CampaignRecord, DispatchMode, DispatchReport};
use crate::services::campaign_service::{CampaignCounter, CampaignService};
use crate::services::instance_service::InstanceService;
use crate::services::template;

#[derive(Clone)]
pub struct DispatchService {
    campaigns: CampaignService,
    instances: InstanceService,
    gateway: Option<Arc<dyn GatewayAdapter>>,
    settings: DispatchSettings,
}

impl DispatchService {
    pub fn new(
        campaigns: CampaignService,
        instances: InstanceService,
        gateway: Option<Arc<dyn GatewayAdapter>>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            campaigns,
            instances,
            gateway,
            settings,
        }
    }

    /// Un ciclo completo. Sin gateway configurado se aborta antes de tocar la cola.
    pub async fn run_gateway_cycle(&self) -> Result<DispatchReport, ServiceError> {
        let gateway = self.gateway.clone().ok_or_else(|| {
            ServiceError::Config("gateway URL/credentials are not configured".to_string())
        })?;

        let worker_id = format!("gateway-{}", Uuid::new_v4());
        let mut report = DispatchReport::default();

        // 1) agendadas y vencidas -> em_andamento
        let promoted = self
            .campaigns
            .claim_due_campaigns(
                DispatchMode::Gateway,
                Utc::now(),
                self.settings.claim_limit,
                &worker_id,
            )
            .await?;
        report.promoted = promoted.len();

        // 2) drenar un lote por campaña en curso
        let campaigns = self.campaigns.list_in_progress(DispatchMode::Gateway).await?;
        log::info!(
            "(run_gateway_cycle) worker={} campañas en curso={}",
            worker_id,
            campaigns.len()
        );

        for campaign in campaigns {
            report.campaigns_seen += 1;
            self.process_campaign(gateway.as_ref(), &campaign, &mut report)
                .await?;
        }

        log::info!(
            "(run_gateway_cycle) worker={} enviados={} errores={} omitidas={}",
            worker_id,
            report.sent,
            report.errors,
            report.campaigns_skipped
        );
        Ok(report)
    }

    async fn process_campaign(
        &self,
        gateway: &dyn GatewayAdapter,
        campaign: &CampaignRecord,
        report: &mut DispatchReport,
    ) -> Result<(), ServiceError> {
        let instance_name = match campaign
            .instance_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
        {
            Some(name) => name,
            None => {
                log::warn!(
                    "(process_campaign) Campaña {} sin instancia asociada, se omite.",
                    campaign.id
                );
                report.campaigns_skipped += 1;
                return Ok(());
            }
        };

        let pending = self
            .campaigns
            .pending_recipients(&campaign.id, self.settings.batch_size)
            .await?;
        if pending.is_empty() {
            // sin cierre automático: la campaña queda em_andamento
            report.campaigns_skipped += 1;
            return Ok(());
        }

        let instance = match self.instances.find_by_name(instance_name).await? {
            Some(instance) => instance,
            None => {
                let msg = format!("instance '{}' no longer exists", instance_name);
                log::error!("(process_campaign) Campaña {}: {}", campaign.id, msg);
                self.campaigns.mark_campaign_failed(&campaign.id, &msg).await?;
                report.campaigns_failed += 1;
                return Ok(());
            }
        };
        let instance_ref = instance.gateway_ref();

        for recipient in pending {
            // la escritura "processando" es el reclamo
            if !self.campaigns.claim_recipient(&recipient.id).await? {
                log::info!(
                    "(process_campaign) Destinatario {} ya reclamado por otra invocación.",
                    recipient.id
                );
                continue;
            }
            report.recipients_claimed += 1;

            let message =
                template::render(&campaign.message_template, &recipient.substitution_fields());
            let address = template::normalize_address(&recipient.address);

            if address.is_empty() {
                let detail = json!({ "error": "empty recipient address" }).to_string();
                self.campaigns
                    .mark_recipient_error(&recipient.id, &detail, &message)
                    .await
                    .map_err(|e| stranded(&recipient.id, e))?;
                self.campaigns
                    .increment_counter(&campaign.id, CampaignCounter::Errors)
                    .await;
                report.errors += 1;
                continue;
            }

            let outcome = gateway.send_text(&instance_ref, &address, &message).await;
            if outcome.accepted {
                self.campaigns
                    .mark_recipient_sent(&recipient.id, &message)
                    .await
                    .map_err(|e| stranded(&recipient.id, e))?;
                self.campaigns
                    .increment_counter(&campaign.id, CampaignCounter::Sent)
                    .await;
                report.sent += 1;
            } else {
                log::warn!(
                    "(process_campaign) Envío rechazado por {:?} campaña={} destinatario={} http={}",
                    gateway.vendor(),
                    campaign.id,
                    recipient.id,
                    outcome.http_status
                );
                let detail = json!({
                    "http_status": outcome.http_status,
                    "response": outcome.raw
                })
                .to_string();
                self.campaigns
                    .mark_recipient_error(&recipient.id, &detail, &message)
                    .await
                    .map_err(|e| stranded(&recipient.id, e))?;
                self.campaigns
                    .increment_counter(&campaign.id, CampaignCounter::Errors)
                    .await;
                report.errors += 1;
            }
        }

        Ok(())
    }
}

/// El destinatario ya está en "processando" y ninguna pasada lo vuelve a tomar.
fn stranded(recipient_id: &str, e: sqlx::Error) -> sqlx::Error {
    log::error!(
        "(process_campaign) Destinatario {} queda en processando: no se pudo guardar el resultado: {:?}",
        recipient_id,
        e
    );
    e
}
