//! HTTP surface driven through the router without binding a socket.

#[path = "test_utils/mod.rs"]
mod test_utils;

use ats_sync::auth::TENANT_HEADER;
use ats_sync::server::create_app;
use ats_sync::webhook_verification::sign;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use serde_json::{Value, json};
use test_utils::{OPERATOR_TOKEN, TestContext, WEBHOOK_SECRET};
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

async fn send(ctx: &TestContext, request: Request<Body>) -> Response {
    create_app(ctx.state.clone()).oneshot(request).await.unwrap()
}

fn operator(method: &str, uri: &str, tenant: Uuid, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
        .header(TENANT_HEADER, tenant.to_string());
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn json_body(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_and_root_are_public() {
    let ctx = TestContext::new().await.unwrap();

    let response = send(&ctx, Request::get("/healthz").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&ctx, Request::get("/").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(json_body(response).await["service"], "ats-sync");
}

#[tokio::test]
async fn operator_routes_require_token_and_tenant() {
    let ctx = TestContext::new().await.unwrap();

    let response = send(&ctx, Request::get("/providers").body(Body::empty()).unwrap()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &ctx,
        Request::get("/providers")
            .header(header::AUTHORIZATION, format!("Bearer {OPERATOR_TOKEN}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/problem+json"
    );
}

#[tokio::test]
async fn providers_list_reports_capabilities_and_connection() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();

    let response = send(
        &ctx,
        operator(
            "PUT",
            "/integrations/greenhouse/api-key",
            tenant,
            Some(json!({ "apiKey": "gh-key" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let connected = json_body(response).await;
    assert_eq!(connected["status"], "connected");
    assert_eq!(connected["authKind"], "api_key");

    let response = send(&ctx, operator("GET", "/providers", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 6);

    let greenhouse = providers.iter().find(|p| p["name"] == "greenhouse").unwrap();
    assert_eq!(greenhouse["connected"], true);
    assert_eq!(greenhouse["capabilities"]["candidateSync"], "write");
    let whatsapp = providers.iter().find(|p| p["name"] == "whatsapp").unwrap();
    assert_eq!(whatsapp["connected"], false);
}

#[tokio::test]
async fn api_key_is_refused_for_oauth_providers() {
    let ctx = TestContext::new().await.unwrap();
    let response = send(
        &ctx,
        operator(
            "PUT",
            "/integrations/hubspot/api-key",
            Uuid::new_v4(),
            Some(json!({ "apiKey": "hs-key" })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disconnect_twice_reports_not_connected() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();
    ctx.credentials()
        .save_api_key(tenant, "bamboohr", "bh-key".into(), None)
        .await
        .unwrap();

    let response = send(&ctx, operator("DELETE", "/integrations/bamboohr", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&ctx, operator("DELETE", "/integrations/bamboohr", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_CONNECTED");
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let ctx = TestContext::new().await.unwrap();
    let response = send(
        &ctx,
        operator("GET", "/integrations/taleo/status", Uuid::new_v4(), None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sync_triggers_are_throttled_per_tenant() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();
    let body = json!({
        "provider": "greenhouse",
        "event": "created",
        "candidate": { "id": "cand-1", "first_name": "Ada", "last_name": "Lovelace" }
    });

    // The test configuration allows three triggers per minute.
    for _ in 0..3 {
        let response = send(
            &ctx,
            operator("POST", "/sync/candidates/cand-1", tenant, Some(body.clone())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let results = json_body(response).await;
        assert_eq!(results["results"][0]["result"]["outcome"], "not_connected");
    }

    let response = send(
        &ctx,
        operator("POST", "/sync/candidates/cand-1", tenant, Some(body.clone())),
    )
    .await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = response
        .headers()
        .get(header::RETRY_AFTER)
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));

    // Another tenant is unaffected.
    let response = send(
        &ctx,
        operator("POST", "/sync/candidates/cand-1", Uuid::new_v4(), Some(body)),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn snapshot_id_must_match_the_path() {
    let ctx = TestContext::new().await.unwrap();
    let response = send(
        &ctx,
        operator(
            "POST",
            "/sync/candidates/cand-1",
            Uuid::new_v4(),
            Some(json!({
                "event": "updated",
                "candidate": { "id": "cand-2", "first_name": "Ada", "last_name": "Lovelace" }
            })),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn signed_webhook_is_logged_and_visible_to_operators() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();
    let payload = json!({
        "action": "candidate_hired",
        "payload": { "application": { "id": 991 } }
    })
    .to_string();
    let signature = sign(payload.as_bytes(), WEBHOOK_SECRET).unwrap();

    let response = send(
        &ctx,
        Request::post(format!("/webhooks/greenhouse/{tenant}"))
            .header("Signature", signature)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.clone()))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = json_body(response).await;
    assert_eq!(accepted["status"], "accepted");

    let response = send(&ctx, operator("GET", "/integrations/greenhouse/logs", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let logs = json_body(response).await;
    let entry = &logs["logs"][0];
    assert_eq!(entry["id"], accepted["logId"]);
    assert_eq!(entry["direction"], "inbound");
    assert_eq!(entry["eventType"], "candidate_hired");
    assert_eq!(entry["entityId"], "991");
    assert_eq!(entry["status"], "success");

    let response = send(&ctx, operator("GET", "/integrations/greenhouse/status", tenant, None)).await;
    let status = json_body(response).await;
    assert_eq!(status["connected"], false);
    // Receipts are visible in the log but do not count as sync attempts.
    assert_eq!(status["stats24h"]["total"], 0);
    assert_eq!(status["stats24h"]["successRate"], 0);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();

    let response = send(
        &ctx,
        Request::post(format!("/webhooks/lever/{tenant}"))
            .header("X-Lever-Signature", "00".repeat(32))
            .body(Body::from(r#"{"event":"candidateStageChange"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &ctx,
        Request::post(format!("/webhooks/lever/{tenant}"))
            .body(Body::from(r#"{"event":"candidateStageChange"}"#))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // BambooHR does not deliver webhooks at all.
    let response = send(
        &ctx,
        Request::post(format!("/webhooks/bamboohr/{tenant}"))
            .body(Body::from("{}"))
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(
        ctx.state
            .logs
            .list_recent(tenant, "lever", None, 10)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn jobs_are_pulled_from_connected_providers() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();
    ctx.credentials()
        .save_api_key(tenant, "greenhouse", "gh-key".into(), None)
        .await
        .unwrap();
    Mock::given(method("GET"))
        .and(path("/jobs"))
        .and(query_param("status", "open"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 11, "name": "Backend Engineer" },
            { "id": 12, "name": "Designer" }
        ])))
        .expect(1)
        .mount(&ctx.server)
        .await;

    let response = send(&ctx, operator("GET", "/integrations/greenhouse/jobs", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let jobs = body["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], "11");
    assert_eq!(jobs[0]["raw"]["name"], "Backend Engineer");

    // Lever pulls jobs but is not connected for this tenant.
    let response = send(&ctx, operator("GET", "/integrations/lever/jobs", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["code"], "NOT_CONNECTED");

    // BambooHR has no job sync at all.
    let response = send(&ctx, operator("GET", "/integrations/bamboohr/jobs", tenant, None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn log_query_limits_are_validated() {
    let ctx = TestContext::new().await.unwrap();
    let tenant = Uuid::new_v4();

    let response = send(
        &ctx,
        operator("GET", "/integrations/lever/logs?limit=0", tenant, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &ctx,
        operator("GET", "/integrations/lever/errors?hours=1000", tenant, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &ctx,
        operator("GET", "/integrations/lever/errors?limit=5&hours=48", tenant, None),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(json_body(response).await["errors"].as_array().unwrap().is_empty());
}
