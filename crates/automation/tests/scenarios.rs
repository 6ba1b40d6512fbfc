use std::sync::Arc;

use chrono::{Duration, Utc};
use messenger_automation::{FlowOutcome, InboundPipeline};
use messenger_channels::webhook::sign;
use messenger_channels::{PayloadBuilder, RecordingSender};
use messenger_core::clock::{Clock, ManualClock};
use messenger_core::config::{AutomationConfig, SchedulerConfig};
use messenger_core::memory::MemoryStore;
use messenger_core::rule::{
    Action, ActionKind, Condition, ExpectedInput, Flow, MatchOperator, MatchType, Rule, Step,
    Trigger,
};
use messenger_core::store::{CheckpointStore, Repositories};
use messenger_core::types::{LogStatus, Page};
use messenger_scheduler::{
    ActionDispatcher, ExecutionScheduler, ResumeOutcome, RunOutcome, RunRequest,
};
use serde_json::json;
use uuid::Uuid;

const SECRET: &str = "app-secret";

struct Harness {
    store: Arc<MemoryStore>,
    sender: Arc<RecordingSender>,
    clock: Arc<ManualClock>,
    scheduler: Arc<ExecutionScheduler>,
    pipeline: InboundPipeline,
    page: Page,
}

fn harness() -> Harness {
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
        repos,
        scheduler.clone(),
        dispatcher,
        clock.clone(),
        &AutomationConfig::default(),
        SECRET,
    );
    let page = Page {
        id: "page-1".into(),
        workspace_id: Uuid::new_v4(),
        name: "Loja".into(),
        access_token: "token".into(),
        active: true,
        default_rule_id: None,
    };
    store.insert_page(page.clone());
    Harness {
        store,
        sender,
        clock,
        scheduler,
        pipeline,
        page,
    }
}

fn text_action(text: &str, delay_ms: u64) -> Action {
    Action {
        delay_ms,
        kind: ActionKind::Text {
            text: text.into(),
            buttons: vec![],
        },
    }
}

fn base_rule(h: &Harness, name: &str, keywords: &[&str], actions: Vec<Action>) -> Rule {
    Rule {
        id: Uuid::new_v4(),
        workspace_id: h.page.workspace_id,
        name: name.into(),
        active: true,
        priority: 1,
        cooldown_secs: 0,
        match_type: MatchType::Contains,
        match_operator: MatchOperator::Any,
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        case_sensitive: false,
        normalize_accents: true,
        trigger: Trigger::AnyMessage,
        page_ids: vec![],
        actions,
        flow: None,
        created_at: h.clock.now(),
    }
}

async fn send_dm(h: &Harness, mid: &str, text: &str) {
    let raw = serde_json::to_vec(&json!({
        "object": "page",
        "entry": [{
            "id": h.page.id,
            "messaging": [{
                "sender": {"id": "user-1"},
                "recipient": {"id": h.page.id},
                "message": {"mid": mid, "text": text}
            }]
        }]
    }))
    .unwrap();
    let sig = sign(&raw, SECRET);
    h.pipeline.handle_webhook(&raw, sig.as_deref()).await.unwrap();
}

fn sent_texts(h: &Harness) -> Vec<String> {
    h.sender
        .sent()
        .iter()
        .filter_map(|m| m.message.message["text"].as_str().map(str::to_string))
        .collect()
}

#[tokio::test]
async fn price_question_is_answered_immediately() {
    let h = harness();
    let rule = base_rule(
        &h,
        "preços",
        &["preço", "valor"],
        vec![text_action("Nossos preços começam em R$10", 0)],
    );
    h.store.insert_rule(rule.clone()).unwrap();

    send_dm(&h, "mid.1", "qual o preço?").await;

    assert_eq!(sent_texts(&h), vec!["Nossos preços começam em R$10"]);
    let sent = h
        .store
        .logs()
        .into_iter()
        .find(|l| l.status == LogStatus::Sent)
        .unwrap();
    assert_eq!(sent.rule_id, Some(rule.id));
    assert_eq!(h.store.checkpoint_count(), 0);
}

#[tokio::test]
async fn delayed_sequence_pauses_and_resumes_exactly_once() {
    let h = harness();
    let rule = base_rule(
        &h,
        "sequence",
        &[],
        vec![text_action("first", 0), text_action("second", 5000)],
    );
    h.store.insert_rule(rule.clone()).unwrap();
    send_dm(&h, "mid.1", "oi").await;
    assert_eq!(sent_texts(&h), vec!["first"]);

    let execution_id = h
        .store
        .logs()
        .iter()
        .find(|l| l.status == LogStatus::Sent)
        .and_then(|l| l.execution_id)
        .unwrap();
    let checkpoint = h
        .scheduler
        .checkpoints()
        .load(execution_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(checkpoint.resume_index, 1);
    assert_eq!(checkpoint.wake_at, h.clock.now() + Duration::milliseconds(5000));

    h.clock.advance(Duration::seconds(2));
    let early = h.scheduler.resume(execution_id).await.unwrap();
    assert!(matches!(early, ResumeOutcome::TooEarly { .. }));
    assert_eq!(sent_texts(&h), vec!["first"]);

    h.clock.advance(Duration::seconds(3));
    let resumed = h.scheduler.resume(execution_id).await.unwrap();
    assert!(matches!(
        resumed,
        ResumeOutcome::Resumed(RunOutcome::Done { sent: 1, .. })
    ));
    assert_eq!(sent_texts(&h), vec!["first", "second"]);

    // Late duplicate wake after completion is a no-op.
    let again = h.scheduler.resume(execution_id).await.unwrap();
    assert_eq!(again, ResumeOutcome::NotFound);
    assert_eq!(h.sender.sent_count(), 2);
}

#[tokio::test]
async fn sweep_picks_up_what_push_missed() {
    let h = harness();
    let rule = base_rule(
        &h,
        "sequence",
        &[],
        vec![text_action("a", 1000), text_action("b", 0), text_action("c", 1000)],
    );
    h.store.insert_rule(rule.clone()).unwrap();
    let contact = messenger_core::types::Contact {
        last_interaction_at: Some(h.clock.now()),
        ..messenger_core::types::Contact::new(&h.page.id, "user-1", h.clock.now())
    };
    h.store.insert_contact(contact.clone());

    let outcome = h
        .scheduler
        .run(RunRequest::start(rule, h.page.clone(), contact))
        .await
        .unwrap();
    assert!(matches!(outcome, RunOutcome::Paused { resume_index: 0, .. }));

    h.clock.advance(Duration::seconds(1));
    let report = h.scheduler.sweep().await.unwrap();
    assert_eq!(report.count, 1);
    assert_eq!(sent_texts(&h), vec!["a", "b"]);

    h.clock.advance(Duration::seconds(1));
    h.scheduler.sweep().await.unwrap();
    assert_eq!(sent_texts(&h), vec!["a", "b", "c"]);
    assert_eq!(h.store.checkpoint_count(), 0);
}

#[tokio::test]
async fn expired_flow_session_falls_through_to_matching() {
    let h = harness();
    let mut quiz = base_rule(&h, "quiz", &["quiz"], vec![]);
    quiz.flow = Some(Flow {
        enabled: true,
        steps: vec![Step {
            id: "q1".into(),
            prompt: "Pick 1 or 2".into(),
            expected_input: ExpectedInput::Number,
            conditions: vec![Condition {
                value: "*".into(),
                actions: vec![text_action("thanks", 0)],
                next_step_id: None,
            }],
            fallback_message: None,
            expiration_secs: Some(60),
        }],
    });
    h.store.insert_rule(quiz).unwrap();
    let mut catch_all = base_rule(&h, "catch-all", &[], vec![text_action("menu", 0)]);
    catch_all.priority = 0;
    h.store.insert_rule(catch_all).unwrap();

    send_dm(&h, "mid.1", "quiz").await;
    assert_eq!(sent_texts(&h), vec!["Pick 1 or 2"]);

    h.clock.advance(Duration::seconds(61));
    send_dm(&h, "mid.2", "2").await;
    // The answer is not taken by the expired step; the catch-all handles it.
    assert_eq!(sent_texts(&h), vec!["Pick 1 or 2", "menu"]);

    let outcome = h
        .pipeline
        .flows()
        .handle_inbound(&h.page, "user-1", "2", None)
        .await
        .unwrap();
    assert_eq!(outcome, FlowOutcome::NoSession);
}

#[tokio::test]
async fn jump_postback_starts_named_rule_and_leaves_flow() {
    let h = harness();
    let mut quiz = base_rule(&h, "quiz", &["quiz"], vec![]);
    quiz.flow = Some(Flow {
        enabled: true,
        steps: vec![Step {
            id: "q1".into(),
            prompt: "Pick 1 or 2".into(),
            expected_input: ExpectedInput::Number,
            conditions: vec![],
            fallback_message: None,
            expiration_secs: None,
        }],
    });
    h.store.insert_rule(quiz).unwrap();
    let target = base_rule(&h, "horários", &["never"], vec![text_action("9h às 18h", 0)]);
    h.store.insert_rule(target).unwrap();

    send_dm(&h, "mid.1", "quiz").await;
    send_dm(&h, "mid.2", "JUMP_TO_RULE:horários").await;

    assert_eq!(sent_texts(&h), vec!["Pick 1 or 2", "9h às 18h"]);
    let session = h
        .pipeline
        .flows()
        .handle_inbound(&h.page, "user-1", "1", None)
        .await
        .unwrap();
    assert_eq!(session, FlowOutcome::NoSession);
}
