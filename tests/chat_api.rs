mod common;

use axum::http::{ Method, StatusCode };
use serde_json::json;

use common::{ body_json, body_text, request, TestApp };
use helpdesk_agent::history::ConversationStore;
use helpdesk_agent::llm::chat::{ StepChunk, ToolCall };
use helpdesk_agent::llm::LlmError;
use helpdesk_agent::server::stream::FALLBACK_REPLY;
use helpdesk_agent::test_utils::StepScript;

const ORDER_ROUTE: &str = r#"{"agent":"order","confidence":0.95,"reasoning":"tracking question"}"#;

#[tokio::test]
async fn order_question_streams_and_persists() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(StepScript::text(&["Your order ", "is on its way."]));

    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Where is my order?" })))
    ).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-agent-type"], "order");
    assert!(response.headers()["content-type"].to_str().unwrap().starts_with("text/plain"));
    let conversation_id = response.headers()["x-conversation-id"].to_str().unwrap().to_string();

    let body = body_text(response).await;
    assert!(body.contains("__PHASE:routing__"));
    assert!(body.ends_with("Your order is on its way."));

    let conversations = app.store.list_conversations("user_123", 20).await.unwrap();
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].id, conversation_id);

    let messages = app.store.recent_messages(&conversation_id, 50).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].content, "Your order is on its way.");
}

#[tokio::test]
async fn message_is_stored_as_sent() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(StepScript::text(&["On its way."]));

    let sent = "  Where is my order?\n";
    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": sent })))
    ).await;
    let conversation_id = response.headers()["x-conversation-id"].to_str().unwrap().to_string();
    body_text(response).await;

    let conversation = app.store.get_conversation(&conversation_id, "user_123").await.unwrap().unwrap();
    assert_eq!(conversation.title, sent);
    let messages = app.store.recent_messages(&conversation_id, 50).await.unwrap();
    assert_eq!(messages[0].content, sent);
}

#[tokio::test]
async fn tool_calls_are_recorded_with_the_reply() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(
        StepScript::chunks(
            vec![
                StepChunk::ToolCall(ToolCall {
                    id: "call_1".into(),
                    name: "getOrderById".into(),
                    arguments: json!({ "orderNumber": "ORD-2025-002" }),
                })
            ]
        )
    );
    app.agent_client.push_step(StepScript::text(&["ORD-2025-002 has shipped."]));

    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Status of ORD-2025-002?" })))
    ).await;
    let conversation_id = response.headers()["x-conversation-id"].to_str().unwrap().to_string();
    assert!(body_text(response).await.ends_with("ORD-2025-002 has shipped."));

    let messages = app.store.recent_messages(&conversation_id, 50).await.unwrap();
    let calls = messages[1].tool_calls.as_ref().unwrap();
    assert_eq!(calls[0]["name"], "getOrderById");
    assert_eq!(calls[0]["result"]["orderNumber"], "ORD-2025-002");
}

#[tokio::test]
async fn follow_up_reuses_the_conversation() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(StepScript::text(&["First."]));

    let first = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Where is my order?" })))
    ).await;
    let conversation_id = first.headers()["x-conversation-id"].to_str().unwrap().to_string();
    body_text(first).await;

    app.router_client.push_completion(
        Ok(r#"{"agent":"billing","confidence":0.9,"reasoning":"refund"}"#.into())
    );
    app.agent_client.push_step(StepScript::text(&["Second."]));
    let second = app.send(
        request(
            Method::POST,
            "/api/chat/messages",
            Some(&token),
            Some(json!({ "message": "And my refund?", "conversationId": conversation_id }))
        )
    ).await;
    assert_eq!(second.headers()["x-conversation-id"].to_str().unwrap(), conversation_id);
    assert_eq!(second.headers()["x-agent-type"], "billing");
    body_text(second).await;

    let response = app.send(
        request(Method::GET, &format!("/api/chat/conversations/{}", conversation_id), Some(&token), None)
    ).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["messages"].as_array().unwrap().len(), 4);
    assert_eq!(json["messages"][3]["agentType"], "billing");
    assert_eq!(json["messages"][3]["parsed"]["content"], "Second.");
    assert!(json["messages"][0].get("parsed").is_none());
}

#[tokio::test]
async fn missing_token_is_unauthorized() {
    let app = TestApp::new().await;
    let response = app.send(
        request(Method::POST, "/api/chat/messages", None, Some(json!({ "message": "hi" })))
    ).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["errorType"], "unauthorized");

    let forged = helpdesk_agent::server::auth::JwtKeys::new("other")
        .sign_access_token("user_123", None, chrono::Duration::minutes(5))
        .unwrap();
    let response = app.send(request(Method::GET, "/api/chat/conversations", Some(&forged), None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_message_is_a_validation_error() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "   " })))
    ).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["errorType"], "validation");
    assert_eq!(json["field"], "message");
    assert!(app.store.list_conversations("user_123", 20).await.unwrap().is_empty());
}

#[tokio::test]
async fn foreign_conversation_is_not_found() {
    let app = TestApp::new().await;
    let owned = app.store.create_conversation("someone_else", "Private").await.unwrap();
    let token = app.token("user_123");

    let response = app.send(
        request(Method::GET, &format!("/api/chat/conversations/{}", owned.id), Some(&token), None)
    ).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(
        request(
            Method::POST,
            "/api/chat/messages",
            Some(&token),
            Some(json!({ "message": "hello", "conversationId": owned.id }))
        )
    ).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app.send(
        request(Method::DELETE, &format!("/api/chat/conversations/{}", owned.id), Some(&token), None)
    ).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.store.get_conversation(&owned.id, "someone_else").await.unwrap().is_some());
}

#[tokio::test]
async fn list_and_delete_conversations() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    let first = app.store.create_conversation("user_123", "First").await.unwrap();
    app.store.create_conversation("user_123", "Second").await.unwrap();
    app.store.create_conversation("someone_else", "Hidden").await.unwrap();

    let response = app.send(request(Method::GET, "/api/chat/conversations", Some(&token), None)).await;
    let json = body_json(response).await;
    assert_eq!(json["conversations"].as_array().unwrap().len(), 2);

    let response = app.send(
        request(Method::DELETE, &format!("/api/chat/conversations/{}", first.id), Some(&token), None)
    ).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["success"], true);
    assert!(app.store.get_conversation(&first.id, "user_123").await.unwrap().is_none());
}

#[tokio::test]
async fn empty_reply_gets_fallback_and_is_not_persisted() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(StepScript::text(&[]));

    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Where is my order?" })))
    ).await;
    let conversation_id = response.headers()["x-conversation-id"].to_str().unwrap().to_string();
    assert!(body_text(response).await.ends_with(FALLBACK_REPLY));

    let messages = app.store.recent_messages(&conversation_id, 50).await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn provider_failure_mid_stream_is_reported_in_band() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Ok(ORDER_ROUTE.into()));
    app.agent_client.push_step(
        StepScript::text(&["Checking"]).then_fail(LlmError::Http { status: 429, body: "slow down".into() })
    );

    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Where is my order?" })))
    ).await;
    assert_eq!(response.status(), StatusCode::OK);
    let conversation_id = response.headers()["x-conversation-id"].to_str().unwrap().to_string();

    let body = body_text(response).await;
    assert!(body.contains("Checking"));
    assert!(body.contains("__ERROR:"));
    assert!(body.contains("rate_limit"));

    let messages = app.store.recent_messages(&conversation_id, 50).await.unwrap();
    assert_eq!(messages.len(), 1);
}

#[tokio::test]
async fn router_failure_falls_back_to_support() {
    let app = TestApp::new().await;
    let token = app.token("user_123");
    app.router_client.push_completion(Err(LlmError::Timeout(5)));
    app.agent_client.push_step(StepScript::text(&["Happy to help."]));

    let response = app.send(
        request(Method::POST, "/api/chat/messages", Some(&token), Some(json!({ "message": "Hello there" })))
    ).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-agent-type"], "support");
    assert!(body_text(response).await.ends_with("Happy to help."));
}
