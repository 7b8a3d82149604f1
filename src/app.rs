//! app.rs
use crate::handlers::{dispatch_handler, inbound_handler, instance_handler};
use actix_web::web;

pub fn init_app(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(inbound_handler::health_endpoint))
            .service(
                web::scope("/instances")
                    .route(
                        "",
                        web::get().to(instance_handler::list_instances_endpoint),
                    )
                    .route(
                        "/actions",
                        web::post().to(instance_handler::instance_action_endpoint),
                    ),
            )
            .service(
                web::scope("/dispatch")
                    .route(
                        "/gateway",
                        web::post().to(dispatch_handler::run_gateway_dispatch_endpoint),
                    )
                    .route(
                        "/scheduled",
                        web::post().to(dispatch_handler::run_scheduled_dispatch_endpoint),
                    ),
            )
            .service(
                web::scope("/webhooks").route(
                    "/inbound",
                    web::post().to(inbound_handler::inbound_event_endpoint),
                ),
            ),
    );
}
