//! handlers/inbound_handler.rs
use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

use crate::models::chat_model::InboundEnvelope;
use crate::services::inbound_service::InboundService;

/// POST /api/webhooks/inbound
pub async fn inbound_event_endpoint(
    inbound_service: web::Data<InboundService>,
    body: web::Json<InboundEnvelope>,
) -> HttpResponse {
    match inbound_service.handle_event(body.into_inner()).await {
        Ok(outcome) => HttpResponse::Ok().json(json!({
            "success": true,
            "result": outcome
        })),
        Err(e) => {
            log::warn!("(inbound_event_endpoint) {}", e);
            e.error_response()
        }
    }
}

/// GET /api/health
pub async fn health_endpoint() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}
