use super::AgentAction;

/// What the caller should do with an offered action.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    /// No confirmation needed, dispatch now.
    Dispatch(AgentAction),
    /// Held until `confirm`/`cancel`. `superseded` is a previously pending
    /// action that the new one replaced; it counts as cancelled.
    Held {
        prompt: String,
        superseded: Option<AgentAction>,
    },
}

/// Holds at most one action awaiting explicit user approval. There is no
/// expiry: a held action stays pending until confirmed, cancelled or replaced.
#[derive(Debug, Default)]
pub struct ConfirmationGate {
    pending: Option<AgentAction>,
}

impl ConfirmationGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, action: AgentAction) -> GateDecision {
        if !action.confirmation_required {
            return GateDecision::Dispatch(action);
        }
        let prompt = action.confirmation_prompt();
        let superseded = self.pending.replace(action);
        if let Some(old) = &superseded {
            tracing::info!(action = %old.action_type, "pending action superseded");
        }
        tracing::debug!(prompt = %prompt, "action held for confirmation");
        GateDecision::Held { prompt, superseded }
    }

    /// Release the pending action for dispatch.
    pub fn confirm(&mut self) -> Option<AgentAction> {
        let action = self.pending.take();
        if let Some(a) = &action {
            tracing::info!(action = %a.action_type, "pending action confirmed");
        }
        action
    }

    /// Drop the pending action. Returns the cancellation notice to show, if
    /// there was anything to cancel.
    pub fn cancel(&mut self) -> Option<String> {
        let action = self.pending.take()?;
        tracing::info!(action = %action.action_type, "pending action cancelled");
        Some(cancellation_notice(&action))
    }

    pub fn pending(&self) -> Option<&AgentAction> {
        self.pending.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

pub fn cancellation_notice(action: &AgentAction) -> String {
    format!("Cancelled: {} was not carried out.", action.action_type)
}
