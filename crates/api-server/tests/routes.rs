use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use messenger_api::{router, AppState};
use messenger_automation::InboundPipeline;
use messenger_broadcast::{BroadcastRunner, CampaignService, UtilitySender};
use messenger_channels::webhook::{sign, SIGNATURE_HEADER};
use messenger_channels::{PayloadBuilder, RecordingSender};
use messenger_core::clock::{Clock, ManualClock};
use messenger_core::config::{AutomationConfig, BroadcastConfig, SchedulerConfig};
use messenger_core::memory::MemoryStore;
use messenger_core::rule::{Action, ActionKind, MatchOperator, MatchType, Rule, Trigger};
use messenger_core::store::Repositories;
use messenger_core::types::{Contact, LogStatus, Page};
use messenger_policy::{ComplianceGuard, TemplateRegistry};
use messenger_scheduler::{ActionDispatcher, ExecutionScheduler};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

const SECRET: &str = "app-secret";
const VERIFY_TOKEN: &str = "verify-me";

struct TestApp {
    app: Router,
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
    clock: Arc<ManualClock>,
}

fn test_app() -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let sender = Arc::new(RecordingSender::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let repos = Repositories::from_store(store.clone());
    let dispatcher = Arc::new(ActionDispatcher::new(
        sender.clone(),
        store.clone(),
        PayloadBuilder::default(),
        clock.clone(),
    ));
    let scheduler = Arc::new(ExecutionScheduler::new(
        repos.clone(),
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
        SchedulerConfig::default(),
    ));
    let pipeline = InboundPipeline::new(
        repos.clone(),
        scheduler.clone(),
        dispatcher.clone(),
        clock.clone(),
        &AutomationConfig::default(),
        SECRET,
    );
    let guard = Arc::new(ComplianceGuard::new(Arc::new(TemplateRegistry::new())));

    store.insert_page(Page {
        id: "page-1".into(),
        workspace_id: Uuid::nil(),
        name: "Loja".into(),
        access_token: "token".into(),
        active: true,
        default_rule_id: None,
    });

    let state = AppState {
        pipeline: Arc::new(pipeline),
        scheduler,
        broadcasts: Arc::new(BroadcastRunner::new(
            repos.clone(),
            dispatcher.clone(),
            clock.clone(),
            BroadcastConfig::default(),
        )),
        campaigns: Arc::new(CampaignService::new(repos.clone(), clock.clone())),
        utility: Arc::new(UtilitySender::new(repos, guard, dispatcher, clock.clone())),
        verify_token: VERIFY_TOKEN.into(),
        node_id: "test-node".into(),
        start_time: Instant::now(),
    };
    TestApp {
        app: router(state),
        store,
        sender,
        clock,
    }
}

async fn call(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn health_reports_node() {
    let t = test_app();
    let (status, body) = call(&t.app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["node_id"], "test-node");

    let (status, _) = call(&t.app, get("/live")).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn subscription_handshake_checks_token() {
    let t = test_app();
    let ok = t
        .app
        .clone()
        .oneshot(get(&format!(
            "/webhook?hub.mode=subscribe&hub.verify_token={VERIFY_TOKEN}&hub.challenge=abc123"
        )))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(ok.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"abc123");

    let (status, _) = call(
        &t.app,
        get("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=abc123"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn signed_delivery_runs_rules_and_unsigned_is_rejected() {
    let t = test_app();
    t.store
        .insert_rule(Rule {
            id: Uuid::new_v4(),
            workspace_id: Uuid::nil(),
            name: "preço".into(),
            active: true,
            priority: 1,
            cooldown_secs: 0,
            match_type: MatchType::Contains,
            match_operator: MatchOperator::Any,
            keywords: vec!["preço".into()],
            case_sensitive: false,
            normalize_accents: true,
            trigger: Trigger::AnyMessage,
            page_ids: vec![],
            actions: vec![Action {
                delay_ms: 0,
                kind: ActionKind::Text {
                    text: "A partir de R$10".into(),
                    buttons: vec![],
                },
            }],
            flow: None,
            created_at: t.clock.now(),
        })
        .unwrap();

    let raw = json!({
        "object": "page",
        "entry": [{
            "id": "page-1",
            "messaging": [{
                "sender": {"id": "user-1"},
                "recipient": {"id": "page-1"},
                "message": {"mid": "mid.1", "text": "qual o preco?"}
            }]
        }]
    })
    .to_string();

    let unsigned = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from(raw.clone()))
        .unwrap();
    let (status, body) = call(&t.app, unsigned).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "webhook_rejected");
    assert!(t.store.logs().iter().any(|l| l.status == LogStatus::Error));
    assert_eq!(t.sender.sent_count(), 0);

    let signed = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(SIGNATURE_HEADER, sign(raw.as_bytes(), SECRET).unwrap())
        .body(Body::from(raw))
        .unwrap();
    let (status, body) = call(&t.app, signed).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["matched"], 1);
    assert_eq!(t.sender.sent_count(), 1);
}

#[tokio::test]
async fn malformed_signed_delivery_is_bad_request() {
    let t = test_app();
    let raw = b"{not json";
    let req = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header(SIGNATURE_HEADER, sign(raw, SECRET).unwrap())
        .body(Body::from(raw.to_vec()))
        .unwrap();
    let (status, _) = call(&t.app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn wake_for_unknown_execution_is_a_no_op() {
    let t = test_app();
    let id = Uuid::new_v4();
    let (status, body) = call(&t.app, post_json("/scheduler/wake", json!({"executionId": id}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "not_found");
    assert_eq!(body["executionId"], id.to_string());

    let (status, body) = call(&t.app, post_json("/scheduler/sweep", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[tokio::test]
async fn campaign_lifecycle_over_http() {
    let t = test_app();
    t.store.insert_contact(Contact {
        last_interaction_at: Some(t.clock.now() - Duration::hours(1)),
        ..Contact::new("page-1", "user-1", t.clock.now() - Duration::days(3))
    });

    let request = json!({
        "name": "Aviso",
        "pageId": "page-1",
        "audienceType": "ALL",
        "sendMode": "IMMEDIATE",
        "policyMode": "24H_ONLY",
        "messageType": "TEXT",
        "payload": {"text": "Horário estendido hoje"}
    });
    let (status, campaign) = call(&t.app, post_json("/campaigns", request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(campaign["status"], "SCHEDULED");
    let id = campaign["id"].as_str().unwrap().to_string();

    let (status, report) = call(&t.app, post_json("/broadcast/run", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["processedCount"], 1);

    let (status, campaign) = call(&t.app, get(&format!("/campaigns/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(campaign["status"], "COMPLETED");
    assert_eq!(campaign["counters"]["sent"], 1);

    let (status, rows) = call(&t.app, get(&format!("/campaigns/{id}/recipients"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rows[0]["status"], "SENT");

    let mut two_pages = request;
    two_pages["pageIds"] = json!(["page-1", "page-2"]);
    let (status, body) = call(&t.app, post_json("/campaigns", two_pages)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");

    let (status, _) = call(&t.app, get(&format!("/campaigns/{}", Uuid::new_v4()))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn utility_send_surfaces_compliance_code() {
    let t = test_app();
    t.store.insert_contact(Contact {
        last_interaction_at: Some(t.clock.now() - Duration::hours(30)),
        ..Contact::new("page-1", "user-1", t.clock.now() - Duration::days(3))
    });

    let (status, body) = call(
        &t.app,
        post_json(
            "/v2/utility/send",
            json!({"pageId": "page-1", "userId": "user-1", "text": "oi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "missing_template");
    assert_eq!(t.sender.sent_count(), 0);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let t = test_app();
    let (status, doc) = call(&t.app, get("/api-docs/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(doc["paths"]["/scheduler/wake"].is_object());
    assert!(doc["paths"]["/v2/utility/send"].is_object());
}
