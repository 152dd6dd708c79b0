//! End-to-end tests for the advisor pipeline without a database:
//! model reply → classifier → confirmation gate → dispatcher → memory store.

use std::sync::Arc;

use serde_json::json;
use steward_core::action::dispatch::{self, ActionContext, NOT_AUTHENTICATED};
use steward_core::action::history::ActionHistory;
use steward_core::action::normalize::normalize_theme;
use steward_core::action::{ActionType, AgentAction};
use steward_core::advisor::{Advisor, TranscriptEntry};
use steward_core::cognition::classifier::{Interpretation, classify};
use steward_core::config::StewardCfg;
use steward_core::io::output::{self, ToastReceiver};
use steward_core::platform::LocalPlatform;
use steward_core::session::{Session, local_user};
use steward_core::store::{HostedStore, MemoryStore};
use steward_core::types::Theme;
use steward_llm::provider::{LlmProvider, ScriptedProvider};

struct World {
    store: Arc<MemoryStore>,
    session: Arc<Session>,
    toasts: ToastReceiver,
    ctx: Option<ActionContext>,
    _dir: tempfile::TempDir,
}

fn world(signed_in: bool) -> World {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    let session = Arc::new(Session::new());
    if signed_in {
        session.sign_in(local_user("me@example.com"));
    }
    let (tx, rx) = output::channel(32);
    let ctx = ActionContext::new(
        store.clone(),
        session.clone(),
        Arc::new(LocalPlatform::new(dir.path())),
        tx,
        ActionHistory::new(20),
    );
    World { store, session, toasts: rx, ctx: Some(ctx), _dir: dir }
}

fn advisor(w: &mut World, provider: Arc<ScriptedProvider>) -> Advisor {
    let ctx = w.ctx.take().unwrap();
    Advisor::new(provider as Arc<dyn LlmProvider>, ctx, StewardCfg::default())
}

fn create_call_mom() -> AgentAction {
    let params = json!({"title": "Call mom", "dueDate": "2025-06-27"});
    AgentAction::new(ActionType::CreateTask, params.as_object().unwrap().clone())
}

fn gated_delete_reply(title: &str) -> String {
    json!({
        "type": "action",
        "message": "I can remove that.",
        "action": {
            "actionType": "DELETE_TASK",
            "parameters": {"title": title},
            "confirmationRequired": true,
            "confirmationMessage": format!("Delete \"{title}\"?")
        }
    })
    .to_string()
}

#[test]
fn text_without_braces_passes_through() {
    for raw in ["Sure, happy to help.", "Type \"yes\" to continue", "line one\nline two", "  "] {
        assert_eq!(classify(raw), Interpretation::Text(raw.to_owned()));
    }
}

#[test]
fn action_json_keeps_its_action_type() {
    let raw = json!({"type": "action", "action": {"actionType": "UPDATE_SETTINGS", "parameters": {"language": "en"}}});
    match classify(&raw.to_string()) {
        Interpretation::Action(env) => assert_eq!(env.action.action_type, ActionType::UpdateSettings),
        other => panic!("expected action, got {other:?}"),
    }
}

#[test]
fn theme_normalization_table() {
    let cases = [
        ("please switch to NIGHT mode", Theme::Dark, true),
        ("go light", Theme::Light, true),
        ("use system default", Theme::System, true),
        ("purple", Theme::Dark, false),
    ];
    for (input, theme, recognized) in cases {
        let choice = normalize_theme(input);
        assert_eq!((choice.theme, choice.recognized), (theme, recognized), "{input}");
    }
}

#[tokio::test]
async fn unauthenticated_dispatch_attempts_no_write() {
    let mut w = world(false);
    let mut ctx = w.ctx.take().unwrap();
    let result = dispatch::dispatch(&mut ctx, &create_call_mom()).await;
    assert!(!result.success);
    assert_eq!(result.message, NOT_AUTHENTICATED);
    assert_eq!(w.store.write_count(), 0);
}

#[tokio::test]
async fn duplicate_dispatch_creates_duplicate_records() {
    let mut w = world(true);
    let mut ctx = w.ctx.take().unwrap();
    let first = dispatch::dispatch(&mut ctx, &create_call_mom()).await;
    let second = dispatch::dispatch(&mut ctx, &create_call_mom()).await;
    assert!(first.success && second.success);

    let user = w.session.current_user().unwrap();
    let tasks = w.store.list_tasks(user.id).await.unwrap();
    assert_eq!(tasks.len(), 2);
    assert_ne!(tasks[0].id, tasks[1].id);
    assert_eq!(ctx.history().total_recorded(), 2);
    assert_eq!(w.toasts.try_recv().unwrap().message, "Task \"Call mom\" created");
}

#[tokio::test]
async fn gated_action_waits_and_cancel_writes_nothing() {
    let mut w = world(true);
    let user = w.session.current_user().unwrap();
    let provider = Arc::new(ScriptedProvider::new().reply(gated_delete_reply("Laundry")));
    let advisor = advisor(&mut w, provider);

    let added = advisor.submit("delete laundry").await.unwrap();
    assert!(matches!(added.last(), Some(TranscriptEntry::Confirmation { prompt }) if prompt == "Delete \"Laundry\"?"));
    assert!(advisor.pending().await.is_some());
    assert_eq!(w.store.write_count(), 0);

    let before = advisor.transcript().await.len();
    let added = advisor.cancel().await.unwrap();
    assert_eq!(added.len(), 1);
    assert!(matches!(&added[0], TranscriptEntry::Notice { text } if text.starts_with("Cancelled")));
    assert_eq!(advisor.transcript().await.len(), before + 1);
    assert_eq!(w.store.write_count(), 0);
    assert!(w.store.list_tasks(user.id).await.unwrap().is_empty());
    assert!(advisor.pending().await.is_none());
}

#[tokio::test]
async fn gated_action_runs_only_after_confirm() {
    let mut w = world(true);
    let user = w.session.current_user().unwrap();
    let seeded = w
        .store
        .insert_task(
            user.id,
            steward_core::action::normalize::normalize_task(
                json!({"title": "Laundry"}).as_object().unwrap(),
                chrono::Local::now().date_naive(),
            )
            .unwrap(),
        )
        .await
        .unwrap();
    let provider = Arc::new(ScriptedProvider::new().reply(gated_delete_reply("laundry")));
    let advisor = advisor(&mut w, provider);

    advisor.submit("delete laundry").await.unwrap();
    assert_eq!(w.store.list_tasks(user.id).await.unwrap().len(), 1);

    let added = advisor.confirm().await.unwrap();
    match &added[..] {
        [TranscriptEntry::ActionResult { action_type, result }] => {
            assert_eq!(action_type, "DELETE_TASK");
            assert!(result.success, "{result:?}");
            assert_eq!(result.data.as_ref().unwrap()["id"], seeded.id.to_string());
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(w.store.list_tasks(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn new_gated_action_supersedes_pending_one() {
    let mut w = world(true);
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(gated_delete_reply("A"))
            .reply(gated_delete_reply("B")),
    );
    let advisor = advisor(&mut w, provider);

    advisor.submit("delete A").await.unwrap();
    let added = advisor.submit("actually delete B").await.unwrap();
    assert!(added.iter().any(|e| matches!(e, TranscriptEntry::Notice { .. })));
    let pending = advisor.pending().await.unwrap();
    assert_eq!(pending.parameters["title"], "B");
    assert_eq!(w.store.write_count(), 0);
}

#[tokio::test]
async fn ungated_action_dispatches_and_feeds_next_prompt() {
    let mut w = world(true);
    let create = json!({
        "type": "action",
        "message": "Added it.",
        "action": {"actionType": "createTask", "parameters": {"name": "Call mom", "priority": "HIGH"}}
    });
    let provider = Arc::new(
        ScriptedProvider::new()
            .reply(create.to_string())
            .reply("You have one open task."),
    );
    let advisor = advisor(&mut w, provider.clone());

    let added = advisor.submit("remind me to call mom").await.unwrap();
    assert!(matches!(&added[1], TranscriptEntry::Assistant { text } if text == "Added it."));
    assert!(matches!(&added[2], TranscriptEntry::ActionResult { result, .. } if result.success));

    advisor.submit("what's on my plate?").await.unwrap();
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    let system = &requests[1].messages[0].content;
    assert!(system.contains("- Call mom [high]"), "{system}");
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.content, "what's on my plate?");
}

#[tokio::test]
async fn unknown_action_type_surfaces_as_failure() {
    let mut w = world(true);
    let reply = json!({"type": "action", "action": {"actionType": "ORDER_PIZZA", "parameters": {}}});
    let provider = Arc::new(ScriptedProvider::new().reply(reply.to_string()));
    let advisor = advisor(&mut w, provider);

    let added = advisor.submit("pizza please").await.unwrap();
    match added.last() {
        Some(TranscriptEntry::ActionResult { result, .. }) => {
            assert!(!result.success);
            assert_eq!(result.message, "Unknown action type: ORDER_PIZZA");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn signed_out_turn_reports_not_authenticated() {
    let mut w = world(false);
    let reply = json!({"type": "action", "action": {"actionType": "CREATE_TASK", "parameters": {"title": "Call mom"}}});
    let provider = Arc::new(ScriptedProvider::new().reply(reply.to_string()));
    let advisor = advisor(&mut w, provider);

    let added = advisor.submit("add call mom").await.unwrap();
    assert!(matches!(
        added.last(),
        Some(TranscriptEntry::ActionResult { result, .. }) if result.message == NOT_AUTHENTICATED
    ));
    assert_eq!(w.store.write_count(), 0);
}
