//! Workspace-level HTTP surface tests (SPEC §6, §8 seed scenarios).
//!
//! Drives the real `axum::Router` (the same one `transcriptord` binds in
//! production) over `tower::ServiceExt::oneshot`, wired onto the in-memory
//! store doubles instead of Postgres/Redis so the suite needs no external
//! services. Engine-level behaviour (dispatcher races, recovery, TTL expiry)
//! is covered in `transcriptord-engine`'s own tests; this suite's job is the
//! HTTP boundary itself: auth extraction, status codes, multipart/JSON
//! (de)serialisation, and the SSE framing.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use transcriptord_cache::{EphemeralStore, InMemoryEphemeralStore};
use transcriptord_core::{AuthProvider, InMemoryAuthProvider, LoginContext, RunnerId, UserId};
use transcriptord_daemon::{routes, AppContext, Config};
use transcriptord_storage::{DurableStore, InMemoryDurableStore};

const OWNER_TOKEN: &str = "owner-session-token";
const OWNER_ID: i64 = 7;
const OTHER_TOKEN: &str = "other-session-token";
const OTHER_ID: i64 = 8;

struct TestApp {
    router: Router,
    durable: Arc<dyn DurableStore>,
    ephemeral: Arc<dyn EphemeralStore>,
}

fn login(id: i64) -> LoginContext {
    LoginContext {
        id: UserId::new(id),
        email: format!("user{id}@example.invalid"),
        is_admin: false,
    }
}

fn build_app() -> TestApp {
    let durable: Arc<dyn DurableStore> = Arc::new(InMemoryDurableStore::new(10 * 1024 * 1024));
    let ephemeral: Arc<dyn EphemeralStore> = Arc::new(InMemoryEphemeralStore::new());
    let auth: Arc<dyn AuthProvider> = Arc::new(
        InMemoryAuthProvider::new()
            .with_user(OWNER_TOKEN, login(OWNER_ID))
            .with_user(OTHER_TOKEN, login(OTHER_ID)),
    );
    let ctx = AppContext::open_for_test(Config::for_test(), durable.clone(), ephemeral.clone(), auth);
    TestApp {
        router: routes::router(ctx),
        durable,
        ephemeral,
    }
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("router call");
    let status = response.status();
    let bytes = response.into_body().collect().await.expect("collect body").to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

fn multipart_body(boundary: &str, file_name: &str, content_type: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"audio\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

fn submit_job_request(token: &str, file_name: &str, content_type: &str, audio: &[u8]) -> Request<Body> {
    let boundary = "transcriptord-test-boundary";
    Request::builder()
        .method("POST")
        .uri("/jobs/submit_job")
        .header("authorization", bearer(token))
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(multipart_body(boundary, file_name, content_type, audio)))
        .expect("build submit_job request")
}

fn register_runner_request(token: &str, priority: i64) -> Request<Body> {
    let body = json!({
        "token": token,
        "name": "gpu-1",
        "version": "1.0",
        "git_hash": "deadbeef",
        "source_url": "https://example.invalid/runner",
        "priority": priority,
    });
    Request::builder()
        .method("POST")
        .uri("/runners/register")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("build register request")
}

fn runner_request(method: &str, uri: &str, runner_id: RunnerId, session_token: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-runner-id", runner_id.get().to_string())
        .header("x-session-token", session_token)
        .body(body)
        .expect("build runner request")
}

async fn register_runner(app: &TestApp, priority: i64) -> (RunnerId, String) {
    let raw_token = "runner-credential-raw";
    // Seeds the durable identity the way `PgDurableStore` would after an
    // operator accredits a runner (SPEC §4.4, §6 "Runner-token bytes");
    // the HTTP layer never hashes tokens itself.
    app.durable
        .create_runner_identity(&transcriptord_engine::token::hash_token(raw_token))
        .await
        .expect("create runner identity");

    let (status, body) = send(&app.router, register_runner_request(raw_token, priority)).await;
    assert_eq!(status, StatusCode::OK, "register response: {body:?}");
    let runner_id = RunnerId::new(body["id"].as_i64().expect("id"));
    let session_token = body["session_token"].as_str().expect("session_token").to_string();
    (runner_id, session_token)
}

// SPEC §8 seed scenario 1 + 2, over HTTP.
#[tokio::test]
async fn submit_then_register_assigns_the_job_over_http() {
    let app = build_app();

    let (status, body) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 1024])).await;
    assert_eq!(status, StatusCode::OK, "submit_job response: {body:?}");
    let job_id = body["job_id"].as_i64().expect("job_id");
    assert!(app
        .ephemeral
        .queue_contains_job(transcriptord_core::JobId::new(job_id))
        .await
        .expect("queue_contains_job"));

    let (runner_id, _session_token) = register_runner(&app, 100).await;

    let runner = app
        .ephemeral
        .get_online_runner(runner_id)
        .await
        .expect("get_online_runner")
        .expect("runner online");
    assert_eq!(runner.assigned_job_id, Some(transcriptord_core::JobId::new(job_id)));
}

#[tokio::test]
async fn submit_job_rejects_non_audio_content_type_over_http() {
    let app = build_app();
    let (status, body) = send(&app.router, submit_job_request(OWNER_TOKEN, "notes.txt", "text/plain", b"hi")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body:?}");
}

#[tokio::test]
async fn submit_job_requires_bearer_auth() {
    let app = build_app();
    let boundary = "b";
    let request = Request::builder()
        .method("POST")
        .uri("/jobs/submit_job")
        .header("content-type", format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(multipart_body(boundary, "clip.wav", "audio/wav", &[0u8; 8])))
        .expect("build request");
    let (status, _) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registering_an_unknown_runner_credential_is_unauthorized() {
    let app = build_app();
    let (status, _) = send(&app.router, register_runner_request("never-created", 0)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// SPEC §8 seed scenario 3 + 4, over HTTP: heartbeat progress, abort signal,
// failed finalisation, runner freed back to idle.
#[tokio::test]
async fn heartbeat_abort_and_submit_result_round_trip_over_http() {
    let app = build_app();
    let (status, body) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 1024])).await;
    assert_eq!(status, StatusCode::OK);
    let job_id = body["job_id"].as_i64().expect("job_id");

    let (runner_id, session_token) = register_runner(&app, 50).await;

    let (status, body) = send(
        &app.router,
        runner_request(
            "POST",
            "/runners/heartbeat",
            runner_id,
            &session_token,
            Body::from(serde_json::to_vec(&json!({ "progress": 33.5 })).unwrap()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abort"], json!(false));
    assert_eq!(body["job_assigned"], json!(true));

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/jobs/abort")
            .header("authorization", bearer(OWNER_TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json!({ "job_id": job_id })).unwrap()))
            .expect("build abort request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        runner_request(
            "POST",
            "/runners/heartbeat",
            runner_id,
            &session_token,
            Body::from(serde_json::to_vec(&json!({ "progress": 33.5 })).unwrap()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["abort"], json!(true));
    assert_eq!(body["job_assigned"], json!(true));

    let (status, _) = send(
        &app.router,
        runner_request(
            "POST",
            "/runners/submit_job_result",
            runner_id,
            &session_token,
            Body::from(serde_json::to_vec(&json!({ "outcome": "failure", "error_msg": "aborted" })).unwrap()),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("GET")
            .uri(format!("/jobs/info?job_id={job_id}"))
            .header("authorization", bearer(OWNER_TOKEN))
            .body(Body::empty())
            .expect("build info request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_msg"], json!("aborted"));
    assert!(body["audio_handle"].is_null());

    let runner = app
        .ephemeral
        .get_online_runner(runner_id)
        .await
        .expect("get_online_runner")
        .expect("runner back online");
    assert!(runner.assigned_job_id.is_none());
}

#[tokio::test]
async fn abort_by_non_owner_is_forbidden_over_http() {
    let app = build_app();
    let (_, body) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 8])).await;
    let job_id = body["job_id"].as_i64().expect("job_id");

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("POST")
            .uri("/jobs/abort")
            .header("authorization", bearer(OTHER_TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json!({ "job_id": job_id })).unwrap()))
            .expect("build abort request"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn delete_of_unfinished_job_is_rejected_over_http() {
    let app = build_app();
    let (_, body) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 8])).await;
    let job_id = body["job_id"].as_i64().expect("job_id");

    let (status, _) = send(
        &app.router,
        Request::builder()
            .method("DELETE")
            .uri("/jobs/delete")
            .header("authorization", bearer(OWNER_TOKEN))
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json!({ "job_ids": [job_id] })).unwrap()))
            .expect("build delete request"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn count_reflects_submitted_jobs_over_http() {
    let app = build_app();
    for _ in 0..3 {
        let (status, _) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 8])).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app.router,
        Request::builder()
            .method("GET")
            .uri("/jobs/count")
            .header("authorization", bearer(OWNER_TOKEN))
            .body(Body::empty())
            .expect("build count request"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], json!(3));

    // A different user's jobs don't leak into this count.
    let (status, _) = send(&app.router, submit_job_request(OTHER_TOKEN, "clip.wav", "audio/wav", &[0u8; 8])).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(
        &app.router,
        Request::builder()
            .method("GET")
            .uri("/jobs/count")
            .header("authorization", bearer(OWNER_TOKEN))
            .body(Body::empty())
            .expect("build count request"),
    )
    .await;
    assert_eq!(body["count"], json!(3));
}

// SPEC §4.6, §6: the SSE stream delivers `job_created` in the wire format
// `event: <kind>\ndata: <job id>\n\n` to a subscriber that connected first.
#[tokio::test]
async fn events_stream_delivers_job_created_frame() {
    let app = build_app();
    let router_for_stream = app.router.clone();

    let stream_request = Request::builder()
        .method("GET")
        .uri("/jobs/events")
        .header("authorization", bearer(OWNER_TOKEN))
        .body(Body::empty())
        .expect("build events request");

    let response = router_for_stream
        .oneshot(stream_request)
        .await
        .expect("open event stream");
    assert_eq!(response.status(), StatusCode::OK);
    let mut body = response.into_body();

    // Give the subscription time to register before publishing, then submit
    // a job on the same router/state to trigger `job_created`.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let (status, _) = send(&app.router, submit_job_request(OWNER_TOKEN, "clip.wav", "audio/wav", &[0u8; 8])).await;
    assert_eq!(status, StatusCode::OK);

    let frame = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let Some(frame) = body.frame().await else {
                panic!("event stream ended before a data frame arrived");
            };
            let frame = frame.expect("frame");
            if let Some(data) = frame.data_ref() {
                return data.clone();
            }
        }
    })
    .await
    .expect("timed out waiting for an SSE frame");

    let text = String::from_utf8(frame.to_vec()).expect("utf8 frame");
    assert!(text.contains("event: job_created"), "frame was: {text:?}");
    assert!(text.contains("data:"), "frame was: {text:?}");
}
