//! End-to-end dispatch against a local HTTP server
//!
//! Exercises the real `HttpBackend` with the dispatcher: request shape,
//! bearer credentials, event reassembly across reads, error records and the
//! atomic upload path.

mod common;

use common::{ScriptedResponse, TestServer};
use docchat_core::{
    Attachment, ChatNotice, ClientConfig, Dispatcher, HttpBackend, MessageKind, SessionContext,
    SubmitOutcome, Submission,
};
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;

fn dispatcher_for(
    server: &TestServer,
) -> (Dispatcher<HttpBackend>, mpsc::Receiver<ChatNotice>) {
    let config = ClientConfig::with_base_url(&server.base_url);
    let backend = HttpBackend::new(&config).unwrap();
    let context = SessionContext::new("ada@example.com").with_credential("secret");
    let (tx, rx) = mpsc::channel(1024);
    (Dispatcher::new(backend, context, config, tx), rx)
}

fn drain(rx: &mut mpsc::Receiver<ChatNotice>) -> Vec<ChatNotice> {
    let mut notices = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        notices.push(notice);
    }
    notices
}

#[tokio::test]
async fn test_streamed_answer_over_http() {
    let server = TestServer::start(vec![ScriptedResponse::event_stream(&[
        "data: {\"chunk\":\"Hel\"}\n",
        "data: {\"chunk\":\"lo, \"}\n\ndata: {\"ch",
        "unk\":\"world\"}\n",
        "data: {\"done\":true}\n",
    ])])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    let outcome = dispatcher.submit(Submission::text("Hi")).await.unwrap();
    assert!(matches!(outcome, SubmitOutcome::Streaming(_)));
    dispatcher.wait_streaming().await;

    let answer = dispatcher.log().last().unwrap();
    assert_eq!(answer.kind(), MessageKind::Assistant);
    assert_eq!(answer.text(), "Hello, world");
    assert!(!answer.is_streaming());

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/query-stream");
    assert_eq!(request.header("authorization"), Some("Bearer secret"));

    let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"user_email": "ada@example.com", "query": "Hi"})
    );
}

#[tokio::test]
async fn test_error_event_over_http() {
    let server = TestServer::start(vec![ScriptedResponse::event_stream(&[
        "data: {\"error\":\"upstream timeout\"}\n",
        "data: {\"chunk\":\"never shown\"}\n",
    ])])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    dispatcher.submit(Submission::text("Hi")).await.unwrap();
    dispatcher.wait_streaming().await;

    let records = dispatcher.log().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].kind(), MessageKind::Error);
    assert_eq!(records[1].text(), "Streaming error: upstream timeout");
}

#[tokio::test]
async fn test_error_status_over_http() {
    let server = TestServer::start(vec![ScriptedResponse::empty(500)]).await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    dispatcher.submit(Submission::text("Hi")).await.unwrap();
    dispatcher.wait_streaming().await;

    assert_eq!(
        dispatcher.log().last().unwrap().text(),
        "Streaming error: HTTP error! status: 500"
    );
    assert!(!dispatcher.is_busy());
}

#[tokio::test]
async fn test_unauthorized_over_http() {
    let server = TestServer::start(vec![ScriptedResponse::json(
        401,
        r#"{"detail":"token expired"}"#,
    )])
    .await;
    let (mut dispatcher, mut rx) = dispatcher_for(&server);

    dispatcher.submit(Submission::text("Hi")).await.unwrap();
    dispatcher.wait_streaming().await;

    assert_eq!(dispatcher.log().last().unwrap().kind(), MessageKind::Error);
    assert!(drain(&mut rx)
        .iter()
        .any(|n| matches!(n, ChatNotice::SessionInvalidated)));
}

#[tokio::test]
async fn test_connection_closed_without_done() {
    let server = TestServer::start(vec![ScriptedResponse::event_stream(&[
        "data: {\"chunk\":\"partial answer\"}\n",
        "data: {\"chunk\":\"cut o",
    ])])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    dispatcher.submit(Submission::text("Hi")).await.unwrap();
    dispatcher.wait_streaming().await;

    let answer = dispatcher.log().last().unwrap();
    assert_eq!(answer.kind(), MessageKind::Assistant);
    assert_eq!(answer.text(), "partial answer");
    assert!(!answer.is_streaming());
}

#[tokio::test]
async fn test_upload_and_query_over_http() {
    let server = TestServer::start(vec![ScriptedResponse::json(
        200,
        r#"{"answer":"A","sources":[{"metadata":{"filename":"doc.pdf"}},{"metadata":{"filename":"doc.pdf"}}],"document_used":"doc.pdf"}"#,
    )])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    let attachment = Attachment::new("doc.pdf", b"%PDF-1.7 test".to_vec()).unwrap();
    let outcome = dispatcher
        .submit(Submission::text("Q").with_attachment(attachment))
        .await
        .unwrap();
    assert!(matches!(outcome, SubmitOutcome::Answered(_)));

    let records = dispatcher.log().records();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].attachment_name(), Some("doc.pdf"));
    assert_eq!(records[1].text(), "A");
    assert_eq!(records[1].sources(), ["doc.pdf"]);
    assert_eq!(records[1].context_label(), Some("doc.pdf"));
    assert!(!records[1].is_streaming());

    let request = &server.requests()[0];
    assert_eq!(request.method, "POST");
    assert_eq!(request.path, "/api/v1/upload-and-query");
    assert!(request
        .header("content-type")
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    assert_eq!(request.header("authorization"), Some("Bearer secret"));

    let body = request.body_text();
    assert!(body.contains("name=\"user_email\""));
    assert!(body.contains("ada@example.com"));
    assert!(body.contains("name=\"file\"; filename=\"doc.pdf\""));
    assert!(body.contains("%PDF-1.7 test"));
    assert!(body.contains("name=\"query\""));
}

#[tokio::test]
async fn test_upload_failure_uses_service_error_text() {
    let server = TestServer::start(vec![ScriptedResponse::json(
        400,
        r#"{"error":"File is empty"}"#,
    )])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    let attachment = Attachment::new("notes.txt", Vec::new()).unwrap();
    let outcome = dispatcher
        .submit(Submission::text("Q").with_attachment(attachment))
        .await
        .unwrap();

    assert!(matches!(outcome, SubmitOutcome::Failed(_)));
    let last = dispatcher.log().last().unwrap();
    assert_eq!(last.kind(), MessageKind::Error);
    assert_eq!(last.text(), "File is empty");
}

#[tokio::test]
async fn test_clear_history_over_http() {
    let server = TestServer::start(vec![
        ScriptedResponse::event_stream(&["data: {\"chunk\":\"ok\"}\n", "data: {\"done\":true}\n"]),
        ScriptedResponse::json(200, r#"{"status":"cleared"}"#),
    ])
    .await;
    let (mut dispatcher, _rx) = dispatcher_for(&server);

    dispatcher.submit(Submission::text("Hi")).await.unwrap();
    dispatcher.wait_streaming().await;
    assert_eq!(dispatcher.log().len(), 2);

    dispatcher.clear_history().await.unwrap();
    assert!(dispatcher.log().is_empty());

    let requests = server.requests();
    assert_eq!(requests[1].method, "DELETE");
    assert_eq!(requests[1].path, "/api/v1/conversations");
}
