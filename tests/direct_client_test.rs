//! Direct client tests against a mock vendor endpoint.

use imagen::{AspectRatio, DirectClient, GenerationRequest, ImageTransport, TransportMode};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GENERATE_PATH: &str = "/gemini/v1beta/models/imagen-4.0-fast-generate-001:generateImages";

fn client(server: &MockServer) -> DirectClient {
    DirectClient::builder()
        .api_key("sk-test")
        .endpoint(format!("{}{}", server.uri(), GENERATE_PATH))
        .build()
        .unwrap()
}

fn strings(sources: Vec<imagen::ImageSource>) -> Vec<String> {
    sources.into_iter().map(|s| s.into_string()).collect()
}

#[tokio::test]
async fn test_sends_bearer_key_and_camel_case_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("Authorization", "Bearer sk-test"))
        .and(header("Content-Type", "application/json"))
        .and(body_json(json!({
            "prompt": "A red fox",
            "numberOfImages": 2,
            "aspectRatio": "9:16",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "generated_images": [{"image": {"image_bytes": "AAA"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = GenerationRequest::new("A red fox")
        .with_aspect_ratio(AspectRatio::Portrait)
        .with_count(2);
    let direct = client(&server);
    assert_eq!(direct.mode(), TransportMode::Direct);

    let sources = direct.request_images(&request).await.unwrap();
    assert_eq!(strings(sources), vec!["data:image/png;base64,AAA"]);
}

#[tokio::test]
async fn test_generated_images_bytes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "generated_images": [{"image": {"image_bytes": "BBB"}}]
        })))
        .mount(&server)
        .await;

    let sources = client(&server)
        .request_images(&GenerationRequest::new("a cat"))
        .await
        .unwrap();
    assert_eq!(strings(sources), vec!["data:image/png;base64,BBB"]);
}

#[tokio::test]
async fn test_falls_back_to_generic_shapes() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "images": [
                {"image": {"image_bytes": "AAA", "b64": "ignored"}},
                {"url": "https://cdn.example/b.png"},
                {"image": {"b64": "CCC"}},
                "DDD",
                {"image": {"image_bytes": ""}},
            ]
        })))
        .mount(&server)
        .await;

    let sources = client(&server)
        .request_images(&GenerationRequest::new("a cat"))
        .await
        .unwrap();
    assert_eq!(
        strings(sources),
        vec![
            "data:image/png;base64,AAA",
            "https://cdn.example/b.png",
            "data:image/png;base64,CCC",
            "data:image/png;base64,DDD",
        ]
    );
}

#[tokio::test]
async fn test_unrecognized_response_is_empty_not_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "predictions": [{"bytesBase64Encoded": "AAA"}]
        })))
        .mount(&server)
        .await;

    let sources = client(&server)
        .request_images(&GenerationRequest::new("a cat"))
        .await
        .unwrap();
    assert!(sources.is_empty());
}

#[tokio::test]
async fn test_error_status_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
        .mount(&server)
        .await;

    let err = client(&server)
        .request_images(&GenerationRequest::new("a cat"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(500));
    assert!(err.to_string().contains("oops"));
}

#[tokio::test]
async fn test_unauthorized_is_transport_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let err = client(&server)
        .request_images(&GenerationRequest::new("a cat"))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(401));
    assert!(err.to_string().contains("invalid api key"));
}
