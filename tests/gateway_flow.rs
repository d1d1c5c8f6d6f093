//! End-to-end tests: HTTP client → gateway → in-memory broker → microservice.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use serde_json::{json, Value};

use queue_gateway::service::ServiceReply;
use queue_gateway::{BoxError, GatewayResponse, Microservice, Next, Request, ResponseSink};

mod common;

const USERS: &str = r#"
[[microservices]]
name = "users"

[[routes]]
path = "/users/:id?"
microservice = "users"
"#;

#[tokio::test]
async fn test_round_trip_through_echo_service() {
    let gw = common::start_gateway(USERS, |_| {}).await;
    gw.spawn_echo("users");

    let response = common::client()
        .get(gw.url("/users/42?verbose=1&tag=a&tag=b"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["microservice"], "users");
    assert_eq!(body["method"], "GET");
    assert_eq!(body["path"], "/users/42");
    assert_eq!(body["query"], json!({"verbose": "1", "tag": ["a", "b"]}));
    assert_eq!(gw.handle.pending_count(), 0);
}

#[tokio::test]
async fn test_json_body_is_forwarded() {
    let gw = common::start_gateway(USERS, |_| {}).await;
    gw.spawn_echo("users");

    let response = common::client()
        .post(gw.url("/users"))
        .json(&json!({"name": "ada"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["method"], "POST");
    assert_eq!(body["body"], json!({"name": "ada"}));
}

#[tokio::test]
async fn test_backend_status_and_headers_reach_client() {
    let gw = common::start_gateway(USERS, |_| {}).await;

    let mut service = Microservice::new(gw.binding("users"));
    service.routes().get(
        "/users/:id",
        |req: Request, mut res: ServiceReply, _next: Next<ServiceReply>| async move {
            let mut headers = HeaderMap::new();
            if let Ok(value) = req.param("id").unwrap_or_default().parse() {
                headers.insert("x-user-id", value);
            }
            res.write_head(StatusCode::CREATED, headers);
            res.end(Bytes::from_static(b"created")).await
        },
    );
    gw.spawn_service(service);

    let response = common::client().get(gw.url("/users/7")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-user-id"], "7");
    assert_eq!(response.text().await.unwrap(), "created");
}

async fn tag_session(
    mut req: Request,
    res: GatewayResponse,
    next: Next<GatewayResponse>,
) -> Result<(), BoxError> {
    req.session.insert("user".into(), json!("u-1"));
    next.run(req, res).await
}

#[tokio::test]
async fn test_gateway_middleware_sees_params_and_session() {
    let gw = common::start_gateway(
        r#"
        [[microservices]]
        name = "users"
        "#,
        |gateway| {
            gateway
                .routes()
                .use_middleware(tag_session)
                .get(
                    "/hello/:name",
                    |req: Request, res: GatewayResponse, _next: Next<GatewayResponse>| async move {
                        let text = format!("hello {}", req.param("name").unwrap_or("?"));
                        res.send(StatusCode::OK, Bytes::from(text)).await
                    },
                )
                .all(
                    "/users/*",
                    |req: Request, res: GatewayResponse, _next: Next<GatewayResponse>| async move {
                        res.delegate(&req, "users").await.map(|_| ()).map_err(BoxError::from)
                    },
                );
        },
    )
    .await;
    gw.spawn_echo("users");

    let client = common::client();
    let hello = client.get(gw.url("/Hello/ada/")).send().await.unwrap();
    assert_eq!(hello.text().await.unwrap(), "hello ada");

    let body: Value = client
        .delete(gw.url("/users/7/posts"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["method"], "DELETE");
    assert_eq!(body["session"], json!({"user": "u-1"}));
}

#[tokio::test]
async fn test_unmatched_request_is_empty_404() {
    let gw = common::start_gateway(USERS, |_| {}).await;

    let response = common::client().get(gw.url("/orders/1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.text().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_microservice_is_500_without_publish() {
    let gw = common::start_gateway(USERS, |gateway| {
        gateway.routes().get(
            "/ghost",
            |req: Request, res: GatewayResponse, _next: Next<GatewayResponse>| async move {
                res.delegate(&req, "ghost").await.map(|_| ()).map_err(BoxError::from)
            },
        );
    })
    .await;

    let response = common::client().get(gw.url("/ghost")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.text().await.unwrap(), "Microservice ghost not found");
    assert_eq!(gw.broker.published_count("ghost.requests"), 0);
    assert_eq!(gw.handle.pending_count(), 0);
}

#[tokio::test]
async fn test_invalid_json_body_is_400() {
    let gw = common::start_gateway(USERS, |_| {}).await;

    let response = common::client()
        .post(gw.url("/users"))
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gw.broker.published_count("users.requests"), 0);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let config = format!("{}\n[listener]\nmax_body_bytes = 16\n", USERS);
    let gw = common::start_gateway(&config, |_| {}).await;

    let response = common::client()
        .post(gw.url("/users"))
        .body(format!("\"{}\"", "x".repeat(64)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_silent_backend_times_out_with_504() {
    let config = format!(
        "{}\n[gateway]\npending_timeout_secs = 1\nsweep_interval_ms = 50\n",
        USERS
    );
    let gw = common::start_gateway(&config, |_| {}).await;

    let response = common::client().get(gw.url("/users/1")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(gw.broker.published_count("users.requests"), 1);
    assert_eq!(gw.handle.pending_count(), 0);
}

#[tokio::test]
async fn test_shutdown_answers_pending_with_503() {
    let config = format!("{}\n[gateway]\npending_timeout_secs = 0\n", USERS);
    let gw = common::start_gateway(&config, |_| {}).await;

    let client = common::client();
    let url = gw.url("/users/1");
    let request = tokio::spawn(async move { client.get(url).send().await.unwrap() });

    let handle = gw.handle.clone();
    common::wait_for(|| handle.pending_count() == 1).await;
    gw.shutdown.trigger();

    let response = request.await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_lifecycle_events_fire() {
    let ready = Arc::new(AtomicBool::new(false));
    let listening = Arc::new(AtomicBool::new(false));
    let (ready_flag, listening_flag) = (Arc::clone(&ready), Arc::clone(&listening));

    let _gw = common::start_gateway(USERS, move |gateway| {
        gateway
            .routes()
            .on("consumers:ready", move |_| ready_flag.store(true, Ordering::SeqCst))
            .on("listening", move |args| {
                assert!(args[0].as_str().unwrap().starts_with("127.0.0.1:"));
                listening_flag.store(true, Ordering::SeqCst);
            });
    })
    .await;

    common::wait_for(|| listening.load(Ordering::SeqCst)).await;
    assert!(ready.load(Ordering::SeqCst));
}
