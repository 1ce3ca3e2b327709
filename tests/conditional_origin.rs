use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use studycache::cache::{CacheConfig, CacheStore, Clock, EntryOptions, ManualClock};
use studycache::conditional::etag_for;
use studycache::infra::http::{PublicState, build_public_router};
use studycache_api_types::CacheType;
use time::macros::datetime;
use tower::ServiceExt;

const LAST_MODIFIED: &str = "Wed, 01 Apr 2026 12:00:00 GMT";

fn origin() -> (Router, Arc<CacheStore>) {
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(datetime!(2026-04-01 12:00 UTC)));
    let store = Arc::new(CacheStore::with_clock(&CacheConfig::default(), clock));
    store
        .set(
            "simulado:trf3:1",
            CacheType::Simulado,
            json!({"titulo": "TRF3 #1", "questoes": 40}),
            Duration::from_secs(600),
            EntryOptions::default(),
        )
        .expect("seed entry");
    store
        .set(
            "plano:semana",
            CacheType::StudyPlan,
            json!({"dias": 5}),
            Duration::from_secs(600),
            EntryOptions::default().scoped("u-7"),
        )
        .expect("seed scoped entry");
    (build_public_router(PublicState::new(store.clone())), store)
}

async fn get(router: &Router, uri: &str, headers: &[(&str, &str)]) -> Response {
    let mut builder = Request::builder().uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let request = builder.body(Body::empty()).expect("request should build");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

fn header_text<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

async fn body_bytes(response: Response) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
        .to_vec()
}

#[tokio::test]
async fn serves_live_entry_with_validators() {
    let (router, _) = origin();

    let response = get(&router, "/api/v1/cache/SIMULADO/simulado:trf3:1", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let expected_etag = etag_for(&json!({"titulo": "TRF3 #1", "questoes": 40}));
    assert_eq!(header_text(&response, header::ETAG), Some(expected_etag.as_str()));
    assert_eq!(header_text(&response, header::LAST_MODIFIED), Some(LAST_MODIFIED));

    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(body["questoes"], json!(40));
}

#[tokio::test]
async fn matching_if_none_match_yields_empty_304() {
    let (router, _) = origin();
    let first = get(&router, "/api/v1/cache/SIMULADO/simulado:trf3:1", &[]).await;
    let etag = header_text(&first, header::ETAG)
        .expect("etag present")
        .to_string();

    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[("if-none-match", etag.as_str())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(header_text(&response, header::ETAG), Some(etag.as_str()));
    assert!(body_bytes(response).await.is_empty());

    let weak = format!("\"other\", W/{etag}");
    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[("if-none-match", weak.as_str())],
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn stale_etag_wins_over_matching_date() {
    let (router, _) = origin();

    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[
            ("if-none-match", "\"stale\""),
            ("if-modified-since", LAST_MODIFIED),
        ],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn if_modified_since_is_honored_without_an_etag() {
    let (router, _) = origin();

    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[("if-modified-since", LAST_MODIFIED)],
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[("if-modified-since", "Tue, 31 Mar 2026 12:00:00 GMT")],
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn scoped_entries_need_their_owner() {
    let (router, _) = origin();

    let response = get(&router, "/api/v1/cache/STUDY_PLAN/plano:semana?usuarioId=u-7", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = get(&router, "/api/v1/cache/STUDY_PLAN/plano:semana", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn miss_and_unknown_type_are_errors() {
    let (router, store) = origin();

    let response = get(&router, "/api/v1/cache/QUERY/nothing-here", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(body["code"], json!("not_found"));

    let response = get(&router, "/api/v1/cache/BOGUS/simulado:trf3:1", &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    store
        .invalidate("simulado:trf3:1")
        .expect("invalidate should succeed");
    let response = get(&router, "/api/v1/cache/SIMULADO/simulado:trf3:1", &[]).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn correlation_id_round_trips_and_health_answers() {
    let (router, _) = origin();

    let response = get(
        &router,
        "/api/v1/cache/SIMULADO/simulado:trf3:1",
        &[("x-correlation-id", "corr-9")],
    )
    .await;
    assert_eq!(
        response
            .headers()
            .get("x-correlation-id")
            .and_then(|v| v.to_str().ok()),
        Some("corr-9")
    );

    let response = get(&router, "/health", &[]).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.headers().contains_key("x-correlation-id"));
}

#[tokio::test]
async fn keys_with_slashes_are_served() {
    let (router, store) = origin();
    store
        .set(
            "simulado/trf3/2",
            CacheType::Simulado,
            json!({"titulo": "TRF3 #2"}),
            Duration::from_secs(600),
            EntryOptions::default(),
        )
        .expect("seed nested key");

    let response = get(&router, "/api/v1/cache/SIMULADO/simulado/trf3/2", &[]).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&body_bytes(response).await).expect("json body");
    assert_eq!(body["titulo"], json!("TRF3 #2"));
}
