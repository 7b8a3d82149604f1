//! handlers/dispatch_handler.rs
//! Disparadores de los ciclos de despacho (cron externo o manual).

use actix_web::{web, HttpResponse, ResponseError};
use serde_json::json;

use crate::services::{
    dispatch_service::DispatchService, webhook_dispatch_service::WebhookDispatchService,
};

/// POST /api/dispatch/gateway
pub async fn run_gateway_dispatch_endpoint(
    dispatch_service: web::Data<DispatchService>,
) -> HttpResponse {
    match dispatch_service.run_gateway_cycle().await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "report": report
        })),
        Err(e) => {
            log::error!("(run_gateway_dispatch_endpoint) {:?}", e);
            e.error_response()
        }
    }
}

/// POST /api/dispatch/scheduled
pub async fn run_scheduled_dispatch_endpoint(
    webhook_dispatch_service: web::Data<WebhookDispatchService>,
) -> HttpResponse {
    match webhook_dispatch_service.run_scheduled_cycle().await {
        Ok(report) => HttpResponse::Ok().json(json!({
            "success": true,
            "report": report
        })),
        Err(e) => {
            log::error!("(run_scheduled_dispatch_endpoint) {:?}", e);
            e.error_response()
        }
    }
}
