use emblem_app::config::ClassifierConfig;
use emblem_app::services::{Classifier, GeminiClassifier, ServiceErrorKind};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn classifier(server: &MockServer) -> GeminiClassifier {
    let config = ClassifierConfig {
        model: "gemini-2.5-flash".to_string(),
        api_base: server.uri(),
        requests_per_minute: 600,
        timeout_secs: 5,
    };
    GeminiClassifier::new(&config, "test-key").expect("classifier")
}

fn answer(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] }
        }]
    })
}

#[tokio::test]
async fn successful_answer_is_sanitized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(
            r#"{"name": "Cloud Run!", "description": "Serverless container runtime"}"#,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let result = classifier(&server).classify(b"\x89PNG").await.unwrap();
    assert_eq!(result.suggested_key, "cloudrun");
    assert_eq!(result.description, "Serverless container runtime");
}

#[tokio::test]
async fn request_carries_inline_png_and_json_mime() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer(r#"{"name": "vm"}"#)))
        .mount(&server)
        .await;

    classifier(&server).classify(b"abc").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let part = &body["contents"][0]["parts"][0]["inline_data"];
    assert_eq!(part["mime_type"], "image/png");
    assert_eq!(part["data"], "YWJj");
    assert_eq!(
        body["generationConfig"]["responseMimeType"],
        "application/json"
    );
}

#[tokio::test]
async fn too_many_requests_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let err = classifier(&server).classify(b"png").await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Transient);
}

#[tokio::test]
async fn resource_exhausted_status_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "code": 503, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED" }
        })))
        .mount(&server)
        .await;

    let err = classifier(&server).classify(b"png").await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Transient);
}

#[tokio::test]
async fn invalid_argument_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": { "code": 400, "message": "Unsupported image", "status": "INVALID_ARGUMENT" }
        })))
        .mount(&server)
        .await;

    let err = classifier(&server).classify(b"png").await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Terminal);
    assert!(err.message.contains("Unsupported image"));
}

#[tokio::test]
async fn prose_answer_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(answer("It is probably a database.")),
        )
        .mount(&server)
        .await;

    let err = classifier(&server).classify(b"png").await.unwrap_err();
    assert_eq!(err.kind, ServiceErrorKind::Terminal);
}
