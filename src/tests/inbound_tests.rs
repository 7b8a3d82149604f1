//! tests/inbound_tests.rs

#[cfg(test)]
mod tests {
    use actix_rt::test;
    use serde_json::{json, Value};
    use sqlx::{Pool, Sqlite};

    use crate::errors::ServiceError;
    use crate::models::chat_model::{InboundEnvelope, InboundOutcome};
    use crate::services::inbound_service::{self, InboundService};
    use crate::tests::support::*;

    fn envelope(raw: Value) -> InboundEnvelope {
        serde_json::from_value(raw).expect("envelope")
    }

    fn text_event(instance: &str, id: &str, from_me: bool, text: &str) -> InboundEnvelope {
        envelope(json!({
            "event": "messages.upsert",
            "instance": instance,
            "data": {
                "key": { "remoteJid": "5511999990000@s.whatsapp.net", "fromMe": from_me, "id": id },
                "pushName": "Ana",
                "messageTimestamp": 1_700_000_000,
                "message": { "conversation": text }
            }
        }))
    }

    async fn chats(pool: &Pool<Sqlite>) -> Vec<ChatRow> {
        sqlx::query_as::<_, ChatRow>("SELECT * FROM chats")
            .fetch_all(pool)
            .await
            .unwrap()
    }

    async fn message(pool: &Pool<Sqlite>, id: &str) -> MessageRow {
        sqlx::query_as::<_, MessageRow>("SELECT * FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[test]
    async fn unknown_instance_is_not_found_and_writes_nothing() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;

        let err = InboundService::new(db.pool.clone())
            .handle_event(text_event("inst-other", "m-1", false, "oi"))
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(count(&db.pool, "chats").await, 0);
        assert_eq!(count(&db.pool, "messages").await, 0);
    }

    #[test]
    async fn stores_chat_and_message() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;

        let outcome = InboundService::new(db.pool.clone())
            .handle_event(text_event("inst-a", "m-1", false, "oi"))
            .await
            .unwrap();

        match outcome {
            InboundOutcome::Stored { client_id, messages } => {
                assert_eq!(client_id, "client-1");
                assert_eq!(messages, 1);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let chats = chats(&db.pool).await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].remote_jid, "5511999990000@s.whatsapp.net");
        assert_eq!(chats[0].name.as_deref(), Some("Ana"));
        assert_eq!(chats[0].last_message.as_deref(), Some("oi"));
        assert_eq!(chats[0].unread_count, 1);

        let msg = message(&db.pool, "m-1").await;
        assert_eq!(msg.chat_id, chats[0].id);
        assert_eq!(msg.text.as_deref(), Some("oi"));
        assert_eq!(msg.kind, "text");
        assert_eq!(msg.status, "received");
        assert_eq!(msg.timestamp, "2023-11-14T22:13:20Z");
    }

    #[test]
    async fn redelivery_is_idempotent() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;
        let svc = InboundService::new(db.pool.clone());

        svc.handle_event(text_event("inst-a", "m-1", false, "oi")).await.unwrap();
        svc.handle_event(text_event("inst-a", "m-1", false, "oi")).await.unwrap();

        assert_eq!(count(&db.pool, "messages").await, 1);
        let chats = chats(&db.pool).await;
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].unread_count, 1);
    }

    #[test]
    async fn own_messages_do_not_count_as_unread() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;
        let svc = InboundService::new(db.pool.clone());

        svc.handle_event(text_event("inst-a", "m-1", false, "oi")).await.unwrap();
        svc.handle_event(text_event("inst-a", "m-2", true, "olá!")).await.unwrap();

        let chats = chats(&db.pool).await;
        assert_eq!(chats[0].unread_count, 1);
        assert_eq!(chats[0].last_message.as_deref(), Some("olá!"));
        // el nombre del contacto no se pisa con el propio
        assert_eq!(chats[0].name.as_deref(), Some("Ana"));
        assert_eq!(message(&db.pool, "m-2").await.status, "sent");
    }

    #[test]
    async fn older_message_does_not_replace_chat_preview() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;
        let svc = InboundService::new(db.pool.clone());
        let at = |id: &str, ts: i64, text: &str| {
            envelope(json!({
                "event": "messages.upsert",
                "instance": "inst-a",
                "data": {
                    "key": { "remoteJid": "5511999990000@s.whatsapp.net", "id": id },
                    "messageTimestamp": ts,
                    "message": { "conversation": text }
                }
            }))
        };

        svc.handle_event(at("m-new", 1_700_000_100, "nova")).await.unwrap();
        svc.handle_event(at("m-old", 1_700_000_000, "velha")).await.unwrap();

        let chats = chats(&db.pool).await;
        assert_eq!(chats[0].last_message.as_deref(), Some("nova"));
        assert_eq!(chats[0].updated_at, "2023-11-14T22:15:00Z");
        // el mensaje viejo se guarda igual
        assert_eq!(message(&db.pool, "m-old").await.text.as_deref(), Some("velha"));
        assert_eq!(chats[0].unread_count, 2);
    }

    #[test]
    async fn client_resolved_by_instance_url() {
        let db = test_db().await;
        insert_client(&db.pool, "client-url", None, Some("https://gw.example.com/")).await;

        let outcome = InboundService::new(db.pool.clone())
            .handle_event(envelope(json!({
                "event": "MESSAGES_UPSERT",
                "instanceUrl": " https://gw.example.com ",
                "data": { "messages": [
                    { "key": { "remoteJid": "a@s.whatsapp.net", "id": "m-1" }, "message": { "conversation": "x" } },
                    { "key": { "remoteJid": "b@s.whatsapp.net", "id": "m-2" }, "message": { "conversation": "y" } },
                    { "malformed": true }
                ] }
            })))
            .await
            .unwrap();

        assert!(matches!(outcome, InboundOutcome::Stored { messages: 2, .. }));
        assert_eq!(count(&db.pool, "chats").await, 2);
    }

    #[test]
    async fn other_events_are_ignored() {
        let db = test_db().await;
        let outcome = InboundService::new(db.pool.clone())
            .handle_event(envelope(json!({ "event": "connection.update", "instance": "inst-a" })))
            .await
            .unwrap();

        assert!(matches!(outcome, InboundOutcome::Ignored { .. }));
        assert_eq!(count(&db.pool, "chats").await, 0);
    }

    #[test]
    async fn media_without_caption_gets_placeholder() {
        let db = test_db().await;
        insert_client(&db.pool, "client-1", Some("inst-a"), None).await;

        InboundService::new(db.pool.clone())
            .handle_event(envelope(json!({
                "event": "messages.upsert",
                "instance": "inst-a",
                "data": {
                    "key": { "remoteJid": "a@s.whatsapp.net", "id": "m-img" },
                    "message": { "imageMessage": { "mimetype": "image/jpeg" } }
                }
            })))
            .await
            .unwrap();

        let msg = message(&db.pool, "m-img").await;
        assert_eq!(msg.kind, "image");
        assert_eq!(msg.text.as_deref(), Some("[imagem]"));
    }

    #[test]
    async fn text_extraction_prefers_known_paths() {
        assert_eq!(
            inbound_service::message_text(&json!({ "extendedTextMessage": { "text": "link" } })),
            Some("link".to_string())
        );
        assert_eq!(
            inbound_service::message_text(&json!({ "imageMessage": { "caption": "foto" } })),
            Some("foto".to_string())
        );
        assert_eq!(inbound_service::message_text(&json!({ "audioMessage": {} })), None);
        assert!(inbound_service::is_message_upsert("MESSAGES_UPSERT"));
        assert!(!inbound_service::is_message_upsert("messages.update"));
    }
}
