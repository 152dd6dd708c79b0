use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use steward_llm::provider::ChatMessage;

use crate::action::ActionResult;
use crate::platform::{LocalStorage, PlatformError};
use crate::types::Advice;

/// Local-storage key holding the cached conversation.
pub const TRANSCRIPT_KEY: &str = "advisor.transcript";

/// One rendered item in the advisor conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    User { text: String },
    Assistant { text: String },
    Advice { advice: Advice },
    ActionResult { action_type: String, result: ActionResult },
    /// An action is waiting on the confirmation gate.
    Confirmation { prompt: String },
    Notice { text: String },
}

impl TranscriptEntry {
    /// How this entry reads back to the model as conversation context.
    fn as_chat_message(&self) -> ChatMessage {
        match self {
            Self::User { text } => ChatMessage::user(text.clone()),
            Self::Assistant { text } | Self::Notice { text } => ChatMessage::assistant(text.clone()),
            Self::Advice { advice } => ChatMessage::assistant(format!("{}: {}", advice.title, advice.content)),
            Self::ActionResult { action_type, result } => {
                let outcome = if result.success { "succeeded" } else { "failed" };
                ChatMessage::assistant(format!("[{action_type} {outcome}] {}", result.message))
            }
            Self::Confirmation { prompt } => ChatMessage::assistant(prompt.clone()),
        }
    }
}

/// Bounded conversation log. Oldest entries drop once `cap` is reached.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: VecDeque<TranscriptEntry>,
    cap: usize,
}

impl Transcript {
    pub fn new(cap: usize) -> Self {
        Self { entries: VecDeque::new(), cap }
    }

    /// Restore from local storage. Missing or unreadable data gives an empty
    /// transcript.
    pub fn load(storage: &LocalStorage, cap: usize) -> Self {
        let mut transcript = Self::new(cap);
        let Some(raw) = storage.get(TRANSCRIPT_KEY) else {
            return transcript;
        };
        match serde_json::from_value::<Vec<TranscriptEntry>>(raw) {
            Ok(entries) => entries.into_iter().for_each(|e| transcript.push(e)),
            Err(e) => tracing::warn!(error = %e, "cached transcript unreadable, starting fresh"),
        }
        transcript
    }

    pub fn save(&self, storage: &LocalStorage) -> Result<(), PlatformError> {
        let entries: Vec<&TranscriptEntry> = self.entries.iter().collect();
        storage.set(TRANSCRIPT_KEY, serde_json::to_value(entries)?)
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        if self.cap == 0 {
            return;
        }
        if self.entries.len() >= self.cap {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &TranscriptEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// The last `turns` entries as chat messages, oldest first.
    pub fn context(&self, turns: usize) -> Vec<ChatMessage> {
        let skip = self.entries.len().saturating_sub(turns);
        self.entries.iter().skip(skip).map(TranscriptEntry::as_chat_message).collect()
    }
}
