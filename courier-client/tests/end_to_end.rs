//! End-to-end scenarios against a real HTTP server through the
//! reqwest-backed transport.

use std::time::Duration;

use courier::{CachePolicy, Client, ClientError, Method, RequestDescriptor};
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq, serde::Deserialize)]
struct TestModel {
    code: u16,
    description: String,
}

fn descriptor(base: &str, route: &str, policy: CachePolicy) -> RequestDescriptor {
    RequestDescriptor::builder(Method::GET, format!("{base}{route}"))
        .header("accept", "application/json")
        .cache_policy(policy)
        .build()
        .unwrap()
}

#[tokio::test]
async fn get_200_decodes_the_typed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/200"))
        .and(header("accept", "application/json"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"code": 200, "description": "OK"})),
        )
        .mount(&server)
        .await;

    let client = Client::default();
    let response = client
        .request(descriptor(&server.uri(), "/200", CachePolicy::NetworkOnly))
        .validate()
        .decoded::<TestModel>()
        .await;

    assert_eq!(response.status_code(), Some(200));
    assert!(!response.from_cache);
    assert_eq!(response.result.unwrap().code, 200);
}

#[tokio::test]
async fn cached_replay_never_hits_the_server_twice() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"code": 200, "description": "OK"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::default();
    let descriptor = descriptor(&server.uri(), "/feed", CachePolicy::PreferCache);

    let first = client
        .request(descriptor.clone())
        .decoded::<TestModel>()
        .await;
    assert!(first.is_success());

    let second = client.request(descriptor).decoded::<TestModel>().await;
    assert!(second.from_cache);
    assert_eq!(second.result.unwrap().code, 200);

    // the mock's expect(1) is verified when the server drops
}

#[tokio::test]
async fn get_500_with_validation_surfaces_the_error_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/500"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            serde_json::json!({"code": 500, "description": "Internal Server Error"}),
        ))
        .mount(&server)
        .await;

    let client = Client::default();
    let response = client
        .request(descriptor(&server.uri(), "/500", CachePolicy::NetworkOnly))
        .validate()
        .decoded_with_error_body::<TestModel>()
        .await;

    let error = response.result.unwrap_err();
    let failure = error.as_validation().expect("validation failure");
    assert_eq!(failure.status, Some(500));

    let error_model: TestModel = failure.error_body_as().unwrap();
    assert_eq!(error_model.description, "Internal Server Error");
}

#[tokio::test]
async fn cancelling_a_slow_request_yields_a_single_cancelled_result() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("too late")
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let client = Client::default();
    let request = client.request(descriptor(&server.uri(), "/slow", CachePolicy::NetworkOnly));
    let handle = request.handle();
    let pending = tokio::spawn(request.bytes());

    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.cancel();

    let response = pending.await.unwrap();
    assert!(matches!(response.result, Err(ClientError::Cancelled)));
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn json_bodies_are_encoded_on_the_wire() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .and(body_json(serde_json::json!({"item": "widget", "quantity": 5})))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(serde_json::json!({"code": 201, "description": "Created"})),
        )
        .mount(&server)
        .await;

    let client = Client::default();
    let descriptor = RequestDescriptor::builder(Method::POST, format!("{}/orders", server.uri()))
        .json(&serde_json::json!({"item": "widget", "quantity": 5}))
        .build()
        .unwrap();

    let response = client
        .request(descriptor)
        .validate()
        .decoded::<TestModel>()
        .await;

    assert_eq!(response.status_code(), Some(201));
    assert_eq!(response.result.unwrap().code, 201);
}

#[tokio::test]
async fn validation_failure_without_error_decode_keeps_the_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/404"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nothing here"))
        .mount(&server)
        .await;

    let client = Client::default();
    let response = client
        .request(descriptor(&server.uri(), "/404", CachePolicy::NetworkOnly))
        .validate()
        .text()
        .await;

    let error = response.result.unwrap_err();
    let failure = error.as_validation().expect("validation failure");
    assert_eq!(failure.status, Some(404));
    assert!(failure.error_body.is_none());
    assert_eq!(response.body.unwrap(), "nothing here");
}
