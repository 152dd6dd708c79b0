//! The advisor turn loop: prompt the model, classify the reply, and route
//! actions through the confirmation gate into the dispatcher.

pub mod transcript;

use chrono::Local;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use steward_llm::provider::LlmProvider;
use tokio::sync::Mutex;

use crate::action::dispatch::{self, ActionContext};
use crate::action::gate::{ConfirmationGate, GateDecision, cancellation_notice};
use crate::action::history::HistoryEntry;
use crate::action::{ActionResult, AgentAction};
use crate::cognition::classifier::{self, Interpretation};
use crate::cognition::prompt;
use crate::config::StewardCfg;
use crate::insight;
use crate::types::User;

pub use transcript::{TRANSCRIPT_KEY, Transcript, TranscriptEntry};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdvisorError {
    #[error("a request is already in flight")]
    Busy,
    #[error("no action is waiting for confirmation")]
    NothingPending,
}

struct AdvisorState {
    ctx: ActionContext,
    gate: ConfirmationGate,
    transcript: Transcript,
}

/// Clears the busy flag when the turn ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// One conversation with the advisor. At most one turn runs at a time; a
/// second `submit` while a turn is in flight is rejected, not queued.
pub struct Advisor {
    provider: Arc<dyn LlmProvider>,
    cfg: StewardCfg,
    busy: AtomicBool,
    state: Mutex<AdvisorState>,
}

impl Advisor {
    pub fn new(provider: Arc<dyn LlmProvider>, ctx: ActionContext, cfg: StewardCfg) -> Self {
        let transcript = Transcript::load(ctx.platform.storage(), cfg.transcript_cache_cap);
        if !transcript.is_empty() {
            tracing::info!(entries = transcript.len(), "advisor transcript restored");
        }
        Self {
            provider,
            cfg,
            busy: AtomicBool::new(false),
            state: Mutex::new(AdvisorState {
                ctx,
                gate: ConfirmationGate::new(),
                transcript,
            }),
        }
    }

    fn begin(&self) -> Result<BusyGuard<'_>, AdvisorError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| BusyGuard(&self.busy))
            .map_err(|_| AdvisorError::Busy)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Run one turn. Returns the transcript entries it added.
    pub async fn submit(&self, input: &str) -> Result<Vec<TranscriptEntry>, AdvisorError> {
        let _busy = self.begin()?;
        let mut st = self.state.lock().await;
        let today = Local::now().date_naive();

        let user_context = match st.ctx.session.current_user() {
            Some(user) => user_context(&st.ctx, &user, today).await,
            None => String::new(),
        };
        let history = st.transcript.context(self.cfg.context_turns);
        let messages = prompt::build_messages(input, &history, &user_context, today);

        let mut added = vec![TranscriptEntry::User { text: input.to_owned() }];
        let interpretation = match prompt::generate(self.provider.as_ref(), messages, &self.cfg).await {
            Ok(raw) => classifier::classify(&raw),
            Err(e) => {
                tracing::warn!(error = %e, provider = self.provider.name(), "advisor generation failed");
                Interpretation::processing_error()
            }
        };
        tracing::info!(kind = interpretation.kind(), "advisor turn");

        match interpretation {
            Interpretation::Text(text) => added.push(TranscriptEntry::Assistant { text }),
            Interpretation::Advice(advice) => added.push(TranscriptEntry::Advice { advice }),
            Interpretation::Action(envelope) => {
                if let Some(text) = envelope.message.filter(|m| !m.trim().is_empty()) {
                    added.push(TranscriptEntry::Assistant { text });
                }
                match st.gate.offer(envelope.action) {
                    GateDecision::Dispatch(action) => {
                        let result = dispatch::dispatch(&mut st.ctx, &action).await;
                        added.push(result_entry(&action, result));
                    }
                    GateDecision::Held { prompt, superseded } => {
                        if let Some(old) = superseded {
                            added.push(TranscriptEntry::Notice { text: cancellation_notice(&old) });
                        }
                        added.push(TranscriptEntry::Confirmation { prompt });
                    }
                }
            }
        }

        self.append(&mut st, &added);
        Ok(added)
    }

    /// Dispatch the action waiting on the gate.
    pub async fn confirm(&self) -> Result<Vec<TranscriptEntry>, AdvisorError> {
        let _busy = self.begin()?;
        let mut st = self.state.lock().await;
        let action = st.gate.confirm().ok_or(AdvisorError::NothingPending)?;
        let result = dispatch::dispatch(&mut st.ctx, &action).await;
        let added = vec![result_entry(&action, result)];
        self.append(&mut st, &added);
        Ok(added)
    }

    /// Discard the action waiting on the gate. Nothing is written.
    pub async fn cancel(&self) -> Result<Vec<TranscriptEntry>, AdvisorError> {
        let _busy = self.begin()?;
        let mut st = self.state.lock().await;
        let text = st.gate.cancel().ok_or(AdvisorError::NothingPending)?;
        let added = vec![TranscriptEntry::Notice { text }];
        self.append(&mut st, &added);
        Ok(added)
    }

    pub async fn pending(&self) -> Option<AgentAction> {
        self.state.lock().await.gate.pending().cloned()
    }

    pub async fn transcript(&self) -> Vec<TranscriptEntry> {
        self.state.lock().await.transcript.entries().cloned().collect()
    }

    pub async fn recent_actions(&self, limit: usize) -> Vec<HistoryEntry> {
        let st = self.state.lock().await;
        st.ctx.history().recent(limit).into_iter().cloned().collect()
    }

    pub async fn clear_transcript(&self) {
        let mut st = self.state.lock().await;
        st.transcript.clear();
        if let Err(e) = st.transcript.save(st.ctx.platform.storage()) {
            tracing::warn!(error = %e, "failed to clear cached transcript");
        }
    }

    fn append(&self, st: &mut AdvisorState, added: &[TranscriptEntry]) {
        for entry in added {
            st.transcript.push(entry.clone());
        }
        if let Err(e) = st.transcript.save(st.ctx.platform.storage()) {
            tracing::warn!(error = %e, "failed to cache transcript");
        }
    }
}

fn result_entry(action: &AgentAction, result: ActionResult) -> TranscriptEntry {
    TranscriptEntry::ActionResult {
        action_type: action.action_type.to_string(),
        result,
    }
}

/// Prompt summary of the user's data. Read failures only cost context.
async fn user_context(ctx: &ActionContext, user: &User, today: chrono::NaiveDate) -> String {
    let store = &ctx.store;
    let fetched = async {
        let tasks = store.list_tasks(user.id).await?;
        let habits = store.list_habits(user.id).await?;
        let entries = store.list_habit_entries(user.id).await?;
        let diary = store.list_diary_entries(user.id).await?;
        Ok::<_, crate::store::StoreError>((tasks, habits, entries, diary))
    };
    match fetched.await {
        Ok((tasks, habits, entries, diary)) => {
            let insights = insight::insights(&habits, &entries, today);
            prompt::summarize_user_context(&tasks, &insights, &diary)
        }
        Err(e) => {
            tracing::warn!(error = %e, "user context unavailable");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::history::ActionHistory;
    use crate::io::output;
    use crate::platform::LocalPlatform;
    use crate::session::{Session, local_user};
    use crate::store::MemoryStore;
    use steward_llm::provider::{MockProvider, ScriptedProvider};

    fn advisor_with(provider: Arc<dyn LlmProvider>, dir: &std::path::Path) -> (Advisor, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let session = Arc::new(Session::signed_in(local_user("me@example.com")));
        let (tx, _rx) = output::channel(8);
        let ctx = ActionContext::new(
            store.clone(),
            session,
            Arc::new(LocalPlatform::new(dir)),
            tx,
            ActionHistory::new(10),
        );
        (Advisor::new(provider, ctx, StewardCfg::default()), store)
    }

    #[tokio::test]
    async fn busy_flag_rejects_second_turn() {
        let dir = tempfile::tempdir().unwrap();
        let (advisor, _) = advisor_with(Arc::new(MockProvider::new("hi")), dir.path());
        let guard = advisor.begin().unwrap();
        assert!(advisor.is_busy());
        assert_eq!(advisor.submit("hello").await.unwrap_err(), AdvisorError::Busy);
        drop(guard);
        assert!(!advisor.is_busy());
        assert!(advisor.submit("hello").await.is_ok());
    }

    #[tokio::test]
    async fn generation_failure_yields_processing_error_card() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::new().fail("boom"));
        let (advisor, _) = advisor_with(provider, dir.path());
        let added = advisor.submit("help").await.unwrap();
        match &added[1] {
            TranscriptEntry::Advice { advice } => assert_eq!(advice.title, "Processing Error"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transcript_is_cached_and_restored() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (advisor, _) = advisor_with(Arc::new(MockProvider::new("Hello!")), dir.path());
            advisor.submit("hi").await.unwrap();
        }
        let (advisor, _) = advisor_with(Arc::new(MockProvider::new("again")), dir.path());
        let restored = advisor.transcript().await;
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[1], TranscriptEntry::Assistant { text: "Hello!".into() });
    }

    #[tokio::test]
    async fn confirm_without_pending_action() {
        let dir = tempfile::tempdir().unwrap();
        let (advisor, _) = advisor_with(Arc::new(MockProvider::new("hi")), dir.path());
        assert_eq!(advisor.confirm().await.unwrap_err(), AdvisorError::NothingPending);
        assert_eq!(advisor.cancel().await.unwrap_err(), AdvisorError::NothingPending);
        assert!(!advisor.is_busy());
    }
}
