//! handlers/instance_handler.rs
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::{json, Value};

use crate::errors::ServiceError;
use crate::handlers::identity::CallerIdentity;
use crate::models::instance_model::{InstanceActionResponse, InstanceCommand};
use crate::services::instance_service::{InstanceService, SyncedInstances};

/// GET /api/instances
pub async fn list_instances_endpoint(
    caller: CallerIdentity,
    instance_service: web::Data<InstanceService>,
) -> HttpResponse {
    match instance_service.list_and_sync(&caller.user_id).await {
        Ok(SyncedInstances { instances, persist }) => {
            // la respuesta no espera la persistencia; sus fallas solo se loguean
            if let Some(persist) = persist {
                tokio::spawn(async move {
                    match persist.await {
                        Ok(0) => {}
                        Ok(failures) => log::warn!(
                            "(list_instances_endpoint) {} estados sincronizados no se guardaron",
                            failures
                        ),
                        Err(e) => log::error!(
                            "(list_instances_endpoint) Tarea de persistencia abortada: {}",
                            e
                        ),
                    }
                });
            }
            HttpResponse::Ok().json(InstanceActionResponse {
                success: true,
                message: format!("{} instances", instances.len()),
                data: instances,
            })
        }
        Err(e) => {
            log::error!("(list_instances_endpoint) {:?}", e);
            e.error_response()
        }
    }
}

/// POST /api/instances/actions
/// Body: `{"action": "create" | "connect" | "refresh_qr" | "status" | "disconnect" | "delete", ...}`
pub async fn instance_action_endpoint(
    caller: CallerIdentity,
    instance_service: web::Data<InstanceService>,
    body: web::Json<Value>,
) -> HttpResponse {
    let body = body.into_inner();
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let command = match serde_json::from_value::<InstanceCommand>(body) {
        Ok(command) => command,
        Err(e) => return ServiceError::InvalidCommand(e.to_string()).error_response(),
    };

    log::info!(
        "(instance_action_endpoint) user={} action='{}'",
        caller.user_id,
        action
    );

    let user_id = caller.user_id.as_str();
    let result = match command {
        InstanceCommand::Create => instance_service
            .create(user_id)
            .await
            .map(|rec| ("instance created", json!(rec))),
        InstanceCommand::Connect { instance_id, phone } => instance_service
            .request_pairing(user_id, instance_id.as_deref(), phone.as_deref())
            .await
            .map(|outcome| ("pairing requested", json!(outcome))),
        InstanceCommand::RefreshQr { instance_id } => instance_service
            .request_pairing(user_id, instance_id.as_deref(), None)
            .await
            .map(|outcome| ("pairing refreshed", json!(outcome))),
        InstanceCommand::Status { instance_id } => instance_service
            .sync_one(user_id, &instance_id)
            .await
            .map(|rec| ("status synced", json!(rec))),
        InstanceCommand::Disconnect { instance_id } => instance_service
            .disconnect(user_id, &instance_id)
            .await
            .map(|rec| ("instance disconnected", json!(rec))),
        InstanceCommand::Delete { instance_id } => instance_service
            .delete(user_id, &instance_id)
            .await
            .map(|outcome| ("instance deleted", json!(outcome))),
        InstanceCommand::Unknown => Err(ServiceError::UnknownCommand(action.clone())),
    };

    match result {
        Ok((message, data)) => HttpResponse::Ok().json(InstanceActionResponse {
            success: true,
            message: message.to_string(),
            data,
        }),
        Err(e) => {
            log::error!(
                "(instance_action_endpoint) action='{}' falló: {:?}",
                action,
                e
            );
            e.error_response()
        }
    }
}
