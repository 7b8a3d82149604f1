//! tests/handler_tests.rs
//! Rutas HTTP: identidad, comandos y mapeo de errores a códigos.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use actix_rt::test;
    use actix_web::test::{self as web_test, TestRequest};
    use actix_web::{http::StatusCode, web, App};
    use httpmock::Method::GET;
    use httpmock::MockServer;
    use serde_json::{json, Value};

    use crate::app::init_app;
    use crate::config::app_config::DispatchSettings;
    use crate::gateway::{GatewayAdapter, GatewayVendor};
    use crate::handlers::identity::USER_ID_HEADER;
    use crate::services::campaign_service::CampaignService;
    use crate::services::dispatch_service::DispatchService;
    use crate::services::inbound_service::InboundService;
    use crate::services::instance_service::InstanceService;
    use crate::services::webhook_dispatch_service::WebhookDispatchService;
    use crate::tests::support::*;

    macro_rules! app {
        ($db:expr, $gateway:expr) => {{
            let gateway: Option<Arc<dyn GatewayAdapter>> = $gateway;
            let campaigns = CampaignService::new($db.pool.clone());
            let instances = InstanceService::new($db.pool.clone(), gateway.clone(), 3);
            web_test::init_service(
                App::new()
                    .app_data(web::Data::new(instances.clone()))
                    .app_data(web::Data::new(DispatchService::new(
                        campaigns.clone(),
                        instances,
                        gateway,
                        DispatchSettings::default(),
                    )))
                    .app_data(web::Data::new(WebhookDispatchService::new(
                        $db.pool.clone(),
                        campaigns,
                        DispatchSettings::default(),
                    )))
                    .app_data(web::Data::new(InboundService::new($db.pool.clone())))
                    .configure(init_app),
            )
            .await
        }};
    }

    #[test]
    async fn health_is_open() {
        let db = test_db().await;
        let app = app!(db, None);
        let resp = web_test::call_service(&app, TestRequest::get().uri("/api/health").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    async fn missing_identity_is_unauthorized() {
        let db = test_db().await;
        let app = app!(db, None);
        let req = TestRequest::post()
            .uri("/api/instances/actions")
            .set_json(json!({ "action": "create" }))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(count(&db.pool, "instances").await, 0);
    }

    #[test]
    async fn unknown_action_is_bad_request() {
        let db = test_db().await;
        let app = app!(db, None);
        let req = TestRequest::post()
            .uri("/api/instances/actions")
            .insert_header((USER_ID_HEADER, "user-1"))
            .set_json(json!({ "action": "reboot" }))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = web_test::read_body_json(resp).await;
        assert_eq!(body["success"], json!(false));
        assert!(body["error"].as_str().unwrap().contains("reboot"));
    }

    #[test]
    async fn command_missing_instance_id_is_bad_request() {
        let db = test_db().await;
        let app = app!(db, None);
        let req = TestRequest::post()
            .uri("/api/instances/actions")
            .insert_header((USER_ID_HEADER, "user-1"))
            .set_json(json!({ "action": "status" }))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    async fn gateway_cycle_without_configuration_is_server_error() {
        let db = test_db().await;
        insert_campaign(&db.pool, NewCampaign::gateway("c-1", "inst-a", "Hi")).await;
        let app = app!(db, None);
        let resp = web_test::call_service(
            &app,
            TestRequest::post().uri("/api/dispatch/gateway").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(campaign(&db.pool, "c-1").await.status, "em_andamento");
    }

    #[test]
    async fn scheduled_cycle_reports_claimed_campaigns() {
        let db = test_db().await;
        insert_campaign(&db.pool, NewCampaign::webhook("c-1", "client-x")).await;
        let app = app!(db, None);
        let resp = web_test::call_service(
            &app,
            TestRequest::post().uri("/api/dispatch/scheduled").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = web_test::read_body_json(resp).await;
        assert_eq!(body["report"]["claimed"], json!(1));
        assert_eq!(body["report"]["failed"][0]["campaign_id"], json!("c-1"));
    }

    #[test]
    async fn inbound_from_unknown_instance_is_not_found() {
        let db = test_db().await;
        let app = app!(db, None);
        let req = TestRequest::post()
            .uri("/api/webhooks/inbound")
            .set_json(json!({
                "event": "messages.upsert",
                "instance": "nobody",
                "data": { "key": { "remoteJid": "a@s.whatsapp.net", "id": "m-1" } }
            }))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    async fn list_returns_only_callers_instances_without_tokens() {
        let db = test_db().await;
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/instance/connectionState/inst-a");
            then.status(200)
                .json_body(json!({ "instance": { "instanceName": "inst-a", "state": "open" } }));
        });
        insert_instance(&db.pool, "i-a", "user-1", "inst-a", "pending", PAST).await;
        insert_instance(&db.pool, "i-b", "user-2", "inst-b", "connected", PAST).await;

        let app = app!(db, Some(gateway_for(&server, GatewayVendor::Evolution)));
        let req = TestRequest::get()
            .uri("/api/instances")
            .insert_header((USER_ID_HEADER, "user-1"))
            .to_request();
        let resp = web_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body: Value = web_test::read_body_json(resp).await;
        let data = body["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], json!("i-a"));
        assert_eq!(data[0]["status"], json!("connected"));
        assert!(data[0].get("token").is_none());
        assert!(data[0].get("sync_error").is_none());

        // el cambio de estado se guarda en segundo plano
        let mut stored = String::new();
        for _ in 0..50 {
            stored = instance(&db.pool, "i-a").await.unwrap().status;
            if stored == "connected" {
                break;
            }
            actix_rt::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(stored, "connected");
    }
}
