//! services/instance_service.rs
//! Ciclo de vida de instancias: alta, emparejamiento, sincronización de estado, baja.

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use sqlx::{Pool, Sqlite};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::gateway::{ConnectionStatus, GatewayAdapter, GatewayError, LiveState, PairingArtifact};
use crate::models::instance_model::{DeleteOutcome, InstanceRecord, PairingOutcome, SyncError};
use crate::services::db_timestamp;

/// Cambio de estado detectado al sincronizar contra el gateway
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    pub instance_id: String,
    pub status: ConnectionStatus,
    pub profile_name: Option<String>,
    pub profile_picture_url: Option<String>,
    pub phone_number: Option<String>,
}

/// Resultado de listar+sincronizar. `persist` corre en segundo plano y devuelve
/// cuántas escrituras fallaron; su resultado no afecta a `instances`.
pub struct SyncedInstances {
    pub instances: Vec<InstanceRecord>,
    pub persist: Option<JoinHandle<usize>>,
}

#[derive(Clone)]
pub struct InstanceService {
    db_pool: Pool<Sqlite>,
    gateway: Option<Arc<dyn GatewayAdapter>>,
    default_plan_limit: i64,
}

impl InstanceService {
    pub fn new(
        db_pool: Pool<Sqlite>,
        gateway: Option<Arc<dyn GatewayAdapter>>,
        default_plan_limit: i64,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            default_plan_limit,
        }
    }

    fn gateway(&self) -> Result<Arc<dyn GatewayAdapter>, ServiceError> {
        self.gateway.clone().ok_or_else(|| {
            ServiceError::Config("gateway URL/credentials are not configured".to_string())
        })
    }

    // ------------------------------------------------------------------
    // Listar + sincronizar
    // ------------------------------------------------------------------
    pub async fn list_and_sync(&self, user_id: &str) -> Result<SyncedInstances, ServiceError> {
        let gateway = self.gateway()?;
        let records = self.list_for_user(user_id).await?;

        // consultas al gateway en paralelo
        let lives = join_all(records.iter().map(|rec| {
            let gateway = gateway.clone();
            let instance = rec.gateway_ref();
            async move { gateway.query_state(&instance).await }
        }))
        .await;

        let mut updates = Vec::new();
        let mut instances = Vec::with_capacity(records.len());
        for (mut rec, live) in records.into_iter().zip(lives) {
            match live {
                Ok(live) => {
                    if let Some(update) = detect_change(&rec, &live) {
                        apply_update(&mut rec, &update);
                        updates.push(update);
                    }
                }
                Err(e) => {
                    log::warn!(
                        "(list_and_sync) No se pudo consultar estado de '{}': {}",
                        rec.instance_name,
                        e
                    );
                    rec.sync_error = Some(SyncError::from(&e));
                }
            }
            instances.push(rec);
        }

        let persist = if updates.is_empty() {
            None
        } else {
            log::info!(
                "(list_and_sync) {} instancias cambiaron de estado para user={}",
                updates.len(),
                user_id
            );
            Some(spawn_status_persist(self.db_pool.clone(), updates))
        };

        Ok(SyncedInstances { instances, persist })
    }

    /// Estado de una instancia, persistido antes de responder.
    pub async fn sync_one(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<InstanceRecord, ServiceError> {
        let gateway = self.gateway()?;
        let mut rec = self.owned_instance(user_id, instance_id).await?;
        let live = gateway.query_state(&rec.gateway_ref()).await?;
        if let Some(update) = detect_change(&rec, &live) {
            persist_status(&self.db_pool, &update).await?;
            apply_update(&mut rec, &update);
        }
        Ok(rec)
    }

    // ------------------------------------------------------------------
    // Alta
    // ------------------------------------------------------------------
    pub async fn create(&self, user_id: &str) -> Result<InstanceRecord, ServiceError> {
        let gateway = self.gateway()?;

        // Comparación exacta; la creación es rara y la inicia el usuario.
        let limit = self.plan_limit(user_id).await?;
        let current = self.count_for_user(user_id).await?;
        if current >= limit {
            log::warn!(
                "(create) user={} alcanzó su límite de instancias ({}/{})",
                user_id,
                current,
                limit
            );
            return Err(ServiceError::Capacity { current, limit });
        }

        let name = generate_instance_name(user_id);
        log::info!("(create) Creando instancia '{}' para user={}", name, user_id);
        let created = gateway.create_instance(&name).await?;

        let now = db_timestamp(Utc::now());
        let status = if created.pairing.is_empty() {
            ConnectionStatus::Disconnected
        } else {
            ConnectionStatus::Pending
        };
        let record = InstanceRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            instance_name: created.instance.name.clone(),
            token: created.instance.token.clone(),
            status: status.as_str().to_string(),
            qrcode: created.pairing.qrcode.clone(),
            pairing_code: created.pairing.pairing_code.clone(),
            profile_name: None,
            profile_picture_url: None,
            phone_number: None,
            created_at: now.clone(),
            updated_at: now,
            sync_error: None,
        };

        if let Err(e) = self.insert(&record).await {
            log::error!(
                "(create) Fallo al guardar instancia '{}', limpiando en el gateway: {:?}",
                name,
                e
            );
            if let Err(cleanup) = gateway.delete(&created.instance).await {
                log::error!(
                    "(create) Limpieza remota de '{}' también falló: {}",
                    name,
                    cleanup
                );
            }
            return Err(ServiceError::Persistence(e));
        }

        Ok(record)
    }

    // ------------------------------------------------------------------
    // Emparejamiento
    // ------------------------------------------------------------------
    pub async fn request_pairing(
        &self,
        user_id: &str,
        instance_id: Option<&str>,
        phone: Option<&str>,
    ) -> Result<PairingOutcome, ServiceError> {
        let gateway = self.gateway()?;
        let rec = self.resolve_pairing_target(user_id, instance_id).await?;

        let resp = gateway.request_pairing(&rec.gateway_ref(), phone).await?;

        if !resp.artifact.is_empty() {
            let status = match resp.live_status {
                Some(ConnectionStatus::Connecting) => ConnectionStatus::Connecting,
                _ => ConnectionStatus::Pending,
            };
            self.save_pairing(&rec.id, status, &resp.artifact).await?;
            log::info!(
                "(request_pairing) Artefacto de emparejamiento guardado para '{}'",
                rec.instance_name
            );
            return Ok(PairingOutcome::Artifact {
                instance_id: rec.id,
                artifact: resp.artifact,
            });
        }

        if resp.live_status == Some(ConnectionStatus::Connected) {
            self.save_pairing(&rec.id, ConnectionStatus::Connected, &PairingArtifact::default())
                .await?;
            return Ok(PairingOutcome::AlreadyConnected {
                instance_id: rec.id,
            });
        }

        Err(GatewayError::Unexpected {
            reason: "no pairing artifact in gateway response".to_string(),
            payload: resp.raw,
        }
        .into())
    }

    // ------------------------------------------------------------------
    // Desconexión / baja
    // ------------------------------------------------------------------
    pub async fn disconnect(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<InstanceRecord, ServiceError> {
        let gateway = self.gateway()?;
        let mut rec = self.owned_instance(user_id, instance_id).await?;

        gateway.disconnect(&rec.gateway_ref()).await?;
        self.save_pairing(
            &rec.id,
            ConnectionStatus::Disconnected,
            &PairingArtifact::default(),
        )
        .await?;

        rec.status = ConnectionStatus::Disconnected.as_str().to_string();
        rec.qrcode = None;
        rec.pairing_code = None;
        Ok(rec)
    }

    /// La baja local es incondicional; la remota es best-effort.
    pub async fn delete(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<DeleteOutcome, ServiceError> {
        let gateway = self.gateway()?;
        let rec = self.owned_instance(user_id, instance_id).await?;

        let remote_deleted = match gateway.delete(&rec.gateway_ref()).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!(
                    "(delete) Baja remota de '{}' falló, se borra igual localmente: {}",
                    rec.instance_name,
                    e
                );
                false
            }
        };

        sqlx::query("DELETE FROM instances WHERE id = ?1")
            .bind(&rec.id)
            .execute(&self.db_pool)
            .await?;

        Ok(DeleteOutcome {
            instance_id: rec.id,
            remote_deleted,
        })
    }

    // ------------------------------------------------------------------
    // Acceso a DB
    // ------------------------------------------------------------------
    pub async fn find_by_name(&self, name: &str) -> Result<Option<InstanceRecord>, sqlx::Error> {
        sqlx::query_as::<_, InstanceRecord>("SELECT * FROM instances WHERE instance_name = ?1")
            .bind(name)
            .fetch_optional(&self.db_pool)
            .await
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<InstanceRecord>, sqlx::Error> {
        sqlx::query_as::<_, InstanceRecord>(
            "SELECT * FROM instances WHERE user_id = ?1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await
    }

    async fn count_for_user(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM instances WHERE user_id = ?1")
            .bind(user_id)
            .fetch_one(&self.db_pool)
            .await
    }

    async fn plan_limit(&self, user_id: &str) -> Result<i64, sqlx::Error> {
        let limit: Option<i64> =
            sqlx::query_scalar("SELECT instance_limit FROM user_plans WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&self.db_pool)
                .await?;
        Ok(limit.unwrap_or(self.default_plan_limit))
    }

    /// Verifica propiedad antes de cualquier mutación.
    async fn owned_instance(
        &self,
        user_id: &str,
        instance_id: &str,
    ) -> Result<InstanceRecord, ServiceError> {
        let rec = sqlx::query_as::<_, InstanceRecord>("SELECT * FROM instances WHERE id = ?1")
            .bind(instance_id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("instance {}", instance_id)))?;

        if rec.user_id != user_id {
            return Err(ServiceError::Forbidden(format!(
                "instance {} does not belong to caller",
                instance_id
            )));
        }
        Ok(rec)
    }

    /// Sin id explícito (compatibilidad): la no-conectada más reciente del usuario.
    async fn resolve_pairing_target(
        &self,
        user_id: &str,
        instance_id: Option<&str>,
    ) -> Result<InstanceRecord, ServiceError> {
        if let Some(id) = instance_id.filter(|id| !id.trim().is_empty()) {
            return self.owned_instance(user_id, id).await;
        }

        sqlx::query_as::<_, InstanceRecord>(
            r#"
            SELECT * FROM instances
            WHERE user_id = ?1 AND status != ?2
            ORDER BY updated_at DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(ConnectionStatus::Connected.as_str())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ServiceError::NotFound("no unpaired instance for caller".to_string()))
    }

    async fn insert(&self, rec: &InstanceRecord) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO instances (
                id, user_id, instance_name, token, status, qrcode, pairing_code,
                profile_name, profile_picture_url, phone_number, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&rec.id)
        .bind(&rec.user_id)
        .bind(&rec.instance_name)
        .bind(&rec.token)
        .bind(&rec.status)
        .bind(&rec.qrcode)
        .bind(&rec.pairing_code)
        .bind(&rec.profile_name)
        .bind(&rec.profile_picture_url)
        .bind(&rec.phone_number)
        .bind(&rec.created_at)
        .bind(&rec.updated_at)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }

    /// Guarda estado y artefacto; un artefacto vacío limpia el QR/código guardado.
    async fn save_pairing(
        &self,
        instance_id: &str,
        status: ConnectionStatus,
        artifact: &PairingArtifact,
    ) -> Result<(), sqlx::Error> {
        let now = db_timestamp(Utc::now());
        sqlx::query(
            r#"
            UPDATE instances
            SET status = ?1, qrcode = ?2, pairing_code = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(status.as_str())
        .bind(&artifact.qrcode)
        .bind(&artifact.pairing_code)
        .bind(&now)
        .bind(instance_id)
        .execute(&self.db_pool)
        .await?;
        Ok(())
    }
}

/// Nombre global único: prefijo legible del usuario + sufijo aleatorio.
pub fn generate_instance_name(user_id: &str) -> String {
    let prefix: String = user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(8)
        .collect::<String>()
        .to_ascii_lowercase();
    let suffix = Uuid::new_v4().simple().to_string();
    if prefix.is_empty() {
        format!("inst-{}", &suffix[..12])
    } else {
        format!("inst-{}-{}", prefix, &suffix[..12])
    }
}

fn detect_change(rec: &InstanceRecord, live: &LiveState) -> Option<StatusUpdate> {
    let status = live.connection_status();
    let profile_changed = (live.profile_name.is_some() && live.profile_name != rec.profile_name)
        || (live.profile_picture_url.is_some()
            && live.profile_picture_url != rec.profile_picture_url)
        || (live.phone_number.is_some() && live.phone_number != rec.phone_number);

    if status == rec.connection_status() && !profile_changed {
        return None;
    }
    Some(StatusUpdate {
        instance_id: rec.id.clone(),
        status,
        profile_name: live.profile_name.clone(),
        profile_picture_url: live.profile_picture_url.clone(),
        phone_number: live.phone_number.clone(),
    })
}

fn apply_update(rec: &mut InstanceRecord, update: &StatusUpdate) {
    rec.status = update.status.as_str().to_string();
    if update.status == ConnectionStatus::Connected {
        rec.qrcode = None;
        rec.pairing_code = None;
    }
    if update.profile_name.is_some() {
        rec.profile_name = update.profile_name.clone();
    }
    if update.profile_picture_url.is_some() {
        rec.profile_picture_url = update.profile_picture_url.clone();
    }
    if update.phone_number.is_some() {
        rec.phone_number = update.phone_number.clone();
    }
}

async fn persist_status(db_pool: &Pool<Sqlite>, update: &StatusUpdate) -> Result<(), sqlx::Error> {
    let now = db_timestamp(Utc::now());
    let connected = update.status == ConnectionStatus::Connected;
    sqlx::query(
        r#"
        UPDATE instances
        SET status = ?1,
            profile_name = COALESCE(?2, profile_name),
            profile_picture_url = COALESCE(?3, profile_picture_url),
            phone_number = COALESCE(?4, phone_number),
            qrcode = CASE WHEN ?5 THEN NULL ELSE qrcode END,
            pairing_code = CASE WHEN ?5 THEN NULL ELSE pairing_code END,
            updated_at = ?6
        WHERE id = ?7
        "#,
    )
    .bind(update.status.as_str())
    .bind(&update.profile_name)
    .bind(&update.profile_picture_url)
    .bind(&update.phone_number)
    .bind(connected)
    .bind(&now)
    .bind(&update.instance_id)
    .execute(db_pool)
    .await?;
    Ok(())
}

/// Persistencia en segundo plano: los errores solo se loguean.
fn spawn_status_persist(db_pool: Pool<Sqlite>, updates: Vec<StatusUpdate>) -> JoinHandle<usize> {
    tokio::spawn(async move {
        let mut failures = 0;
        for update in &updates {
            if let Err(e) = persist_status(&db_pool, update).await {
                failures += 1;
                log::error!(
                    "(spawn_status_persist) No se pudo guardar estado '{}' de instancia {}: {:?}",
                    update.status,
                    update.instance_id,
                    e
                );
            }
        }
        failures
    })
}
