//! Integration tests for the backoff-retrying NLU client
//!
//! Runs the client against a wiremock chat-completions endpoint:
//! - 5xx and timeouts are retried with doubling delays
//! - Other 4xx responses are not retried
//! - Exhausted retries report the attempt count
//! - Replies are parsed from fenced blocks, embedded objects or raw text

use serde_json::{json, Value};
use std::time::{Duration, Instant};
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use sdk::ParamMap;
use taskpilot_engine::config::NluConfig;
use taskpilot_engine::nlu::{NluClient, NluError, RetryingClient};
use taskpilot_engine::secrets::SecretString;

const COMPLETIONS: &str = "/v1/chat/completions";

fn client_for(server: &MockServer, timeout_secs: f64, retry_delay_ms: u64) -> RetryingClient {
    let config = NluConfig {
        endpoint: format!("{}{}", server.uri(), COMPLETIONS),
        timeout_secs,
        retry_count: 3,
        retry_delay_ms,
        ..NluConfig::default()
    };
    RetryingClient::new(&config, SecretString::new("io-v2-test-key"))
        .unwrap()
        .with_system_prompt("You are the orchestrator")
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

#[tokio::test]
async fn test_retries_5xx_then_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply(r#"{"intent": "query_data", "plan": []}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 10);
    let result = client.call("Show project 42", None).await.unwrap();

    assert_eq!(result, json!({"intent": "query_data", "plan": []}));
}

#[tokio::test]
async fn test_timeouts_retried_with_doubling_delay() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply("{}").set_delay(Duration::from_millis(600)))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply(r#"{"a": 1}"#))
        .mount(&server)
        .await;

    let client = client_for(&server, 0.2, 100);
    let start = Instant::now();
    let result = client.call("slow request", None).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(result, json!({"a": 1}));
    // Two timed-out attempts (0.2s each) plus delays of D and 2D (0.1s + 0.2s).
    // The timeout is per attempt, so the whole call is not bounded by it.
    assert!(elapsed >= Duration::from_millis(700), "elapsed {:?}", elapsed);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_4xx_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such model"))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 10);
    let err = client.call("anything", None).await.unwrap_err();

    assert_eq!(
        err,
        NluError::Upstream {
            status: 404,
            attempts: 1,
            body: "no such model".to_string()
        }
    );
}

#[tokio::test]
async fn test_exhausted_retries_report_attempts() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 5);
    let err = client.call("anything", None).await.unwrap_err();

    assert!(matches!(
        err,
        NluError::Upstream {
            status: 503,
            attempts: 3,
            ..
        }
    ));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_connection_failure_reports_attempts() {
    // Bind then drop a listener so the port is closed
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = NluConfig {
        endpoint: format!("http://127.0.0.1:{}{}", port, COMPLETIONS),
        timeout_secs: 2.0,
        retry_count: 3,
        retry_delay_ms: 5,
        ..NluConfig::default()
    };
    let client = RetryingClient::new(&config, SecretString::new("k")).unwrap();

    let err = client.call("anything", None).await.unwrap_err();
    assert!(matches!(err, NluError::Connection { attempts: 3, .. }), "{:?}", err);
}

#[tokio::test]
async fn test_error_body_is_scrubbed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("invalid key io-v2-abcdefghijklmnopqrstuvwxyz0123"),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 5);
    let err = client.call("anything", None).await.unwrap_err();

    let text = err.to_string();
    assert!(text.contains("[REDACTED]"));
    assert!(!text.contains("abcdefghijklmnopqrstuvwxyz0123"));
}

#[tokio::test]
async fn test_request_shape_and_context_message() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .and(header("authorization", "Bearer io-v2-test-key"))
        .respond_with(reply(r#"{"status": "success"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 5);
    let mut context = ParamMap::new();
    context.insert("workspace_id".into(), json!(3));
    client.call("Perform action: list", Some(&context)).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(body["model"], NluConfig::default().model);
    assert_eq!(body["max_tokens"], 2000);
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[0]["content"], "You are the orchestrator");
    assert_eq!(messages[1]["role"], "user");
    assert_eq!(messages[1]["content"], "Perform action: list");
    assert_eq!(messages[2]["role"], "assistant");
    assert_eq!(messages[2]["content"], r#"{"workspace_id":3}"#);
}

#[tokio::test]
async fn test_reply_extraction() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply("```json\n{\"a\":1}\n```"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply("Sure! Here it is: {\"a\":1} hope that helps"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply("No structure here"))
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 5);
    assert_eq!(client.call("1", None).await.unwrap(), json!({"a": 1}));
    assert_eq!(client.call("2", None).await.unwrap(), json!({"a": 1}));
    assert_eq!(
        client.call("3", None).await.unwrap(),
        json!({"response": "No structure here"})
    );
}

#[tokio::test]
async fn test_empty_reply_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(COMPLETIONS))
        .respond_with(reply("   "))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, 5.0, 5);
    assert_eq!(
        client.call("anything", None).await.unwrap_err(),
        NluError::EmptyReply
    );
}
