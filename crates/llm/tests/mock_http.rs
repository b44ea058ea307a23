//! Mock HTTP server tests for `OpenRouterBackend::complete()`.
//!
//! Uses [`wiremock`] to emulate an OpenAI-compatible chat completions
//! endpoint, exercising the full request/response path without a real API.

use std::collections::HashMap;

use ace_core::{BackendError, ChatMessage, CompletionRequest, ModelId, ReasoningBackend};
use ace_llm::{BackendConfig, BackendKind, OpenRouterBackend};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn mock_config(server_url: &str) -> BackendConfig {
    BackendConfig {
        kind: BackendKind::OpenRouter,
        base_url: server_url.into(),
        api_key_env: "ACE_MOCK_UNUSED_KEY".into(),
        timeout_secs: 5,
        headers: HashMap::new(),
    }
}

fn backend(server: &MockServer) -> OpenRouterBackend {
    OpenRouterBackend::with_api_key(mock_config(&server.uri()), "sk-mock-key").unwrap()
}

fn request() -> CompletionRequest {
    CompletionRequest {
        model: ModelId::new("openai/gpt-3.5-turbo").unwrap(),
        messages: vec![
            ChatMessage::system("You are the task prosecution layer."),
            ChatMessage::user("Hello"),
        ],
        max_tokens: Some(64),
    }
}

fn completion(content: &str) -> serde_json::Value {
    serde_json::json!({
        "id": "gen-001",
        "object": "chat.completion",
        "model": "openai/gpt-3.5-turbo",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15 }
    })
}

#[tokio::test]
async fn complete_returns_first_choice_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("Authorization", "Bearer sk-mock-key"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(serde_json::json!({
            "model": "openai/gpt-3.5-turbo",
            "max_tokens": 64,
            "messages": [
                { "role": "system", "content": "You are the task prosecution layer." },
                { "role": "user", "content": "Hello" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("Task accepted.")))
        .expect(1)
        .mount(&server)
        .await;

    let reply = backend(&server).complete(&request()).await.unwrap();
    assert_eq!(reply, "Task accepted.");
}

#[tokio::test]
async fn server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request()).await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Status {
            status: 500,
            body: "upstream exploded".into(),
        }
    );
}

#[tokio::test]
async fn auth_failure_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request()).await.unwrap_err();
    assert!(matches!(err, BackendError::Status { status: 401, .. }));
}

#[tokio::test]
async fn malformed_json_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request()).await.unwrap_err();
    assert!(matches!(err, BackendError::MalformedResponse(_)));
}

#[tokio::test]
async fn empty_choices_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })),
        )
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request()).await.unwrap_err();
    assert_eq!(
        err,
        BackendError::MalformedResponse("response has no choices".into())
    );
}

#[tokio::test]
async fn error_inside_success_response_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": { "code": 402, "message": "Insufficient credits" }
        })))
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request()).await.unwrap_err();
    assert_eq!(
        err,
        BackendError::Status {
            status: 402,
            body: "Insufficient credits".into(),
        }
    );
}

#[tokio::test]
async fn custom_headers_are_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("HTTP-Referer", "https://example.org/ace"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("ok")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = mock_config(&server.uri());
    config
        .headers
        .insert("HTTP-Referer".into(), "https://example.org/ace".into());
    let backend = OpenRouterBackend::with_api_key(config, "sk-mock-key").unwrap();

    assert_eq!(backend.complete(&request()).await.unwrap(), "ok");
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let config = mock_config("http://127.0.0.1:9");
    let backend = OpenRouterBackend::with_api_key(config, "sk-mock-key").unwrap();

    let err = backend.complete(&request()).await.unwrap_err();
    assert!(matches!(err, BackendError::Network(_)));
}
