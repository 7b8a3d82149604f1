//! services/campaign_service.rs
//! Cola de campañas: reclamo atómico, lectura de destinatarios y escritura de resultados.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Pool, Sqlite};

use crate::models::campaign_model::{
    CampaignRecord, CampaignStatus, DispatchMode, RecipientRecord, RecipientStatus,
};
use crate::services::db_timestamp;

/// Contador de campaña a incrementar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignCounter {
    Sent,
    Errors,
}

impl CampaignCounter {
    fn column(&self) -> &'static str {
        match self {
            CampaignCounter::Sent => "sent_count",
            CampaignCounter::Errors => "error_count",
        }
    }
}

#[derive(Clone, Debug)]
pub struct CampaignService {
    db_pool: Pool<Sqlite>,
}

impl CampaignService {
    pub fn new(db_pool: Pool<Sqlite>) -> Self {
        CampaignService { db_pool }
    }

    /// Corre migraciones con sqlx
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.db_pool)
            .await
            .context("Fallo al correr migraciones")?;
        Ok(())
    }

    /// Reclama campañas agendadas y vencidas en una sola sentencia.
    ///
    /// SQLite serializa escritores: una fila devuelta a un `UPDATE ... RETURNING`
    /// ya no cumple `status = 'agendada'` para ningún otro, así que cada campaña
    /// llega a lo sumo a una invocación.
    pub async fn claim_due_campaigns(
        &self,
        mode: DispatchMode,
        now: DateTime<Utc>,
        limit: i64,
        worker_id: &str,
    ) -> Result<Vec<CampaignRecord>, sqlx::Error> {
        let now = db_timestamp(now);
        let claimed = sqlx::query_as::<_, CampaignRecord>(
            r#"
            UPDATE campaigns
            SET status = ?1,
                claimed_by = ?2,
                claimed_at = ?3,
                updated_at = ?3
            WHERE status = ?4
              AND id IN (
                SELECT id FROM campaigns
                WHERE status = ?4
                  AND dispatch_mode = ?5
                  AND (scheduled_at IS NULL OR scheduled_at <= ?3)
                ORDER BY scheduled_at, created_at
                LIMIT ?6
              )
            RETURNING *
            "#,
        )
        .bind(CampaignStatus::InProgress.as_str())
        .bind(worker_id)
        .bind(&now)
        .bind(CampaignStatus::Scheduled.as_str())
        .bind(mode.as_str())
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await?;

        if !claimed.is_empty() {
            log::info!(
                "(claim_due_campaigns) worker={} reclamó {} campañas ({})",
                worker_id,
                claimed.len(),
                mode.as_str()
            );
        }
        Ok(claimed)
    }

    pub async fn list_in_progress(
        &self,
        mode: DispatchMode,
    ) -> Result<Vec<CampaignRecord>, sqlx::Error> {
        sqlx::query_as::<_, CampaignRecord>(
            r#"
            SELECT * FROM campaigns
            WHERE status = ?1 AND dispatch_mode = ?2
            ORDER BY created_at
            "#,
        )
        .bind(CampaignStatus::InProgress.as_str())
        .bind(mode.as_str())
        .fetch_all(&self.db_pool)
        .await
    }

    pub async fn pending_recipients(
        &self,
        campaign_id: &str,
        limit: i64,
    ) -> Result<Vec<RecipientRecord>, sqlx::Error> {
        sqlx::query_as::<_, RecipientRecord>(
            r#"
            SELECT * FROM campaign_recipients
            WHERE campaign_id = ?1 AND status = ?2
            LIMIT ?3
            "#,
        )
        .bind(campaign_id)
        .bind(RecipientStatus::Pending.as_str())
        .bind(limit)
        .fetch_all(&self.db_pool)
        .await
    }

    pub async fn list_recipients(
        &self,
        campaign_id: &str,
    ) -> Result<Vec<RecipientRecord>, sqlx::Error> {
        sqlx::query_as::<_, RecipientRecord>(
            "SELECT * FROM campaign_recipients WHERE campaign_id = ?1 ORDER BY rowid",
        )
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await
    }

    /// pendente -> processando. `false` si otra invocación lo tomó antes.
    pub async fn claim_recipient(&self, recipient_id: &str) -> Result<bool, sqlx::Error> {
        self.advance_recipient(
            recipient_id,
            RecipientStatus::Pending,
            RecipientStatus::Processing,
            None,
            None,
            None,
        )
        .await
    }

    pub async fn mark_recipient_sent(
        &self,
        recipient_id: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        let sent_at = db_timestamp(Utc::now());
        self.advance_recipient(
            recipient_id,
            RecipientStatus::Processing,
            RecipientStatus::Sent,
            Some(message),
            None,
            Some(&sent_at),
        )
        .await
    }

    pub async fn mark_recipient_error(
        &self,
        recipient_id: &str,
        error_detail: &str,
        message: &str,
    ) -> Result<bool, sqlx::Error> {
        self.advance_recipient(
            recipient_id,
            RecipientStatus::Processing,
            RecipientStatus::Error,
            Some(message),
            Some(error_detail),
            None,
        )
        .await
    }

    /// Escritura condicionada al estado anterior; nunca retrocede.
    async fn advance_recipient(
        &self,
        recipient_id: &str,
        from: RecipientStatus,
        to: RecipientStatus,
        message: Option<&str>,
        error_detail: Option<&str>,
        sent_at: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        debug_assert!(from.can_transition_to(to));
        let result = sqlx::query(
            r#"
            UPDATE campaign_recipients
            SET status = ?1,
                generated_message = COALESCE(?2, generated_message),
                error_detail = COALESCE(?3, error_detail),
                sent_at = COALESCE(?4, sent_at)
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(to.as_str())
        .bind(message)
        .bind(error_detail)
        .bind(sent_at)
        .bind(recipient_id)
        .bind(from.as_str())
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Incremento de contador. Primero atómico en el servidor; si falla, lectura y
    /// escritura (con carrera conocida). Nunca propaga error: solo loguea.
    pub async fn increment_counter(&self, campaign_id: &str, counter: CampaignCounter) {
        let column = counter.column();
        let now = db_timestamp(Utc::now());
        let atomic_sql = format!(
            r#"
            UPDATE campaigns
            SET {column} = {column} + 1,
                updated_at = ?1
            WHERE id = ?2
              AND sent_count + error_count <
                  (SELECT COUNT(*) FROM campaign_recipients WHERE campaign_id = ?2)
            "#
        );

        match sqlx::query(&atomic_sql)
            .bind(&now)
            .bind(campaign_id)
            .execute(&self.db_pool)
            .await
        {
            Ok(r) => {
                if r.rows_affected() == 0 {
                    log::warn!(
                        "(increment_counter) {} de campaña {} ya alcanzó el total de destinatarios",
                        column,
                        campaign_id
                    );
                }
            }
            Err(e) => {
                log::warn!(
                    "(increment_counter) Incremento atómico falló para {} ({}), usando lectura+escritura: {:?}",
                    campaign_id,
                    column,
                    e
                );
                if let Err(e) = self.increment_read_then_write(campaign_id, column).await {
                    log::error!(
                        "(increment_counter) No se pudo actualizar {} de campaña {}: {:?}",
                        column,
                        campaign_id,
                        e
                    );
                }
            }
        }
    }

    // Carrera aceptada: dos invocaciones pueden leer el mismo valor.
    async fn increment_read_then_write(
        &self,
        campaign_id: &str,
        column: &str,
    ) -> Result<(), sqlx::Error> {
        let read_sql = format!("SELECT {column} FROM campaigns WHERE id = ?1");
        let current: i64 = sqlx::query_scalar(&read_sql)
            .bind(campaign_id)
            .fetch_one(&self.db_pool)
            .await?;

        let write_sql = format!("UPDATE campaigns SET {column} = ?1 WHERE id = ?2");
        sqlx::query(&write_sql)
            .bind(current + 1)
            .bind(campaign_id)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    /// em_andamento -> completed
    pub async fn mark_campaign_completed(&self, campaign_id: &str) -> Result<bool, sqlx::Error> {
        self.finish_campaign(campaign_id, CampaignStatus::Completed, None)
            .await
    }

    /// agendada | em_andamento -> failed. Estados terminales no se tocan.
    pub async fn mark_campaign_failed(
        &self,
        campaign_id: &str,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        self.finish_campaign(campaign_id, CampaignStatus::Failed, Some(error))
            .await
    }

    /// Escribe `to` solo si el estado actual puede pasar a `to`.
    async fn finish_campaign(
        &self,
        campaign_id: &str,
        to: CampaignStatus,
        error: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let sources: Vec<&str> = CampaignStatus::sources_of(to)
            .iter()
            .map(CampaignStatus::as_str)
            .collect();
        let sources = serde_json::json!(sources).to_string();
        let now = db_timestamp(Utc::now());
        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = ?1,
                error_log = COALESCE(?2, error_log),
                updated_at = ?3
            WHERE id = ?4
              AND status IN (SELECT value FROM json_each(?5))
            "#,
        )
        .bind(to.as_str())
        .bind(error)
        .bind(&now)
        .bind(campaign_id)
        .bind(&sources)
        .execute(&self.db_pool)
        .await?;

        if result.rows_affected() == 0 {
            log::warn!(
                "(finish_campaign) Campaña {} no pasó a '{}' (ya terminal o inexistente)",
                campaign_id,
                to.as_str()
            );
        }
        Ok(result.rows_affected() == 1)
    }
}
