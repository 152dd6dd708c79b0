use chrono::NaiveDate;
use steward_llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmError, LlmProvider};

use crate::action::ActionType;
use crate::config::StewardCfg;
use crate::insight::HabitInsight;
use crate::types::{DiaryEntry, Task, TaskStatus};

/// System prompt sections, joined with double newlines to form the final prompt.
const PROMPT_SECTIONS: &[&str] = &[
    // Persona
    "You are Steward, a calm and practical life-management advisor. \
    You help the user organise tasks, build habits, keep a diary and look after their family.",
    // Reply contract
    "Reply in one of three forms. \
    For small talk or quick answers, reply with plain text only. \
    For guidance, reply with a single JSON object: \
    {\"type\":\"advice\",\"title\":string,\"content\":string,\"category\":string,\"priority\":\"low\"|\"medium\"|\"high\",\"actionItems\":[string],\"ruleAlignment\":1|2|3}. \
    To change the user's data or the app, reply with a single JSON object: \
    {\"type\":\"action\",\"message\":string,\"action\":{\"actionType\":ACTION,\"parameters\":{...},\"confirmationRequired\":boolean,\"confirmationMessage\":string}}. \
    Never mix prose and JSON in one reply.",
    // Confirmation
    "Set confirmationRequired to true for anything destructive (deleting a task or a family member) \
    and whenever the request is ambiguous. The confirmationMessage is shown to the user verbatim.",
    // Grounding
    "Only refer to tasks, habits and diary entries listed in the user context. \
    Never claim an action has been carried out; the app reports the outcome itself.",
];

/// One line per action type with the parameters it understands.
fn action_catalogue() -> String {
    let mut lines = vec!["## Actions".to_string()];
    for t in ActionType::ALL {
        let params = match t {
            ActionType::CreateTask => {
                "title, description, dueDate (YYYY-MM-DD), dueTime (HH:MM), priority, category, ruleAlignment"
            }
            ActionType::UpdateTask => "taskId or title, newTitle, status (pending|in_progress|completed), dueDate, priority",
            ActionType::DeleteTask => "taskId or title",
            ActionType::CreateHabit => "title, description, frequency (daily|weekly|monthly), targetCount, topic, priority",
            ActionType::ChangeTheme => "theme (dark|light|system)",
            ActionType::UpdateProfile => "fullName, bio, timezone",
            ActionType::DeleteFamilyMember => "memberId or name",
            ActionType::UpdateFamilyStatus => "memberId or name, status, message",
            ActionType::Navigate => "page (dashboard|tasks|habits|diary|contacts|family|advisor|settings|profile)",
            ActionType::ExportData => "none",
            ActionType::CreateDiaryEntry => "content, title, mood, tags, date",
            ActionType::UpdateSettings => "theme and any preference keys",
            ActionType::Unknown(_) => continue,
        };
        lines.push(format!("- {}: {}", t.as_str(), params));
    }
    lines.join("\n")
}

pub fn build_system_prompt(user_context: &str, today: NaiveDate) -> String {
    let mut prompt = PROMPT_SECTIONS.join("\n\n");
    prompt.push_str("\n\n");
    prompt.push_str(&action_catalogue());
    prompt.push_str(&format!("\n\nToday is {}.", today.format("%A, %Y-%m-%d")));
    if !user_context.is_empty() {
        prompt.push_str("\n\n## User context\n");
        prompt.push_str(user_context);
    }
    prompt
}

/// Build the message list for an advisor call: system prompt, prior turns,
/// then the new input.
pub fn build_messages(
    input: &str,
    context: &[ChatMessage],
    user_context: &str,
    today: NaiveDate,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(context.len() + 2);
    messages.push(ChatMessage::system(build_system_prompt(user_context, today)));
    messages.extend(context.iter().cloned());
    messages.push(ChatMessage::user(input));
    messages
}

/// Compact summary of the user's data for the system prompt.
pub fn summarize_user_context(tasks: &[Task], habits: &[HabitInsight], diary: &[DiaryEntry]) -> String {
    let mut sections = Vec::new();

    let open: Vec<&Task> = tasks.iter().filter(|t| t.status != TaskStatus::Completed).collect();
    if !open.is_empty() {
        let mut s = format!("Open tasks ({}):", open.len());
        for t in open.iter().take(10) {
            s.push_str(&format!("\n- {} [{}]", t.title, t.priority.as_db_str()));
            if let Some(due) = t.due_date {
                s.push_str(&format!(" due {due}"));
            }
        }
        sections.push(s);
    }

    if !habits.is_empty() {
        let mut s = "Habits:".to_string();
        for h in habits.iter().take(10) {
            s.push_str(&format!(
                "\n- {}: streak {} (best {}), {:.0}% over 30 days",
                h.title,
                h.current_streak,
                h.longest_streak,
                h.completion_rate * 100.0
            ));
        }
        sections.push(s);
    }

    let mut recent: Vec<&DiaryEntry> = diary.iter().collect();
    recent.sort_by(|a, b| b.entry_date.cmp(&a.entry_date));
    let moods: Vec<String> = recent
        .iter()
        .take(5)
        .filter_map(|d| d.mood.as_ref().map(|m| format!("{} {}", d.entry_date, m)))
        .collect();
    if !moods.is_empty() {
        sections.push(format!("Recent moods: {}", moods.join(", ")));
    }

    sections.join("\n\n")
}

/// Run one advisor completion and return the raw reply text.
pub async fn generate<P: LlmProvider + ?Sized>(
    provider: &P,
    messages: Vec<ChatMessage>,
    cfg: &StewardCfg,
) -> Result<String, LlmError> {
    let request = CompletionRequest {
        messages,
        max_tokens: cfg.llm_max_tokens,
        temperature: cfg.llm_temperature,
    };
    let response = provider.complete(request).await?;
    match response.finish_reason {
        FinishReason::Blocked => return Err(LlmError::Blocked("empty or withheld reply".into())),
        FinishReason::MaxTokens => {
            tracing::warn!(output_tokens = response.output_tokens, "advisor reply truncated at token limit");
        }
        FinishReason::Stop => {}
    }
    tracing::debug!(
        provider = provider.name(),
        input_tokens = response.input_tokens,
        output_tokens = response.output_tokens,
        "advisor completion"
    );
    Ok(response.content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewTask, Priority, RuleAlignment};
    use steward_llm::provider::{MockProvider, Role};
    use uuid::Uuid;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 27).unwrap()
    }

    fn task(title: &str, status: TaskStatus) -> Task {
        Task::from_new(
            Uuid::new_v4(),
            NewTask {
                title: title.into(),
                description: String::new(),
                category: "General".into(),
                due_date: Some(today()),
                due_time: None,
                priority: Priority::High,
                rule_alignment: RuleAlignment::DEFAULT,
                status,
            },
        )
    }

    #[test]
    fn system_prompt_lists_every_action() {
        let prompt = build_system_prompt("", today());
        for t in ActionType::ALL {
            assert!(prompt.contains(t.as_str()), "{t} missing");
        }
        assert!(prompt.contains("Friday, 2025-06-27"));
        assert!(!prompt.contains("## User context"));
    }

    #[test]
    fn messages_order() {
        let context = vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")];
        let msgs = build_messages("add a task", &context, "Open tasks (1):", today());
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("## User context\nOpen tasks (1):"));
        assert_eq!(msgs[3].content, "add a task");
    }

    #[test]
    fn summary_skips_completed_tasks() {
        let tasks = vec![task("Pay rent", TaskStatus::Pending), task("Old", TaskStatus::Completed)];
        let summary = summarize_user_context(&tasks, &[], &[]);
        assert!(summary.contains("Open tasks (1):\n- Pay rent [high] due 2025-06-27"));
        assert!(!summary.contains("Old"));
        assert_eq!(summarize_user_context(&[], &[], &[]), "");
    }

    #[tokio::test]
    async fn generate_returns_reply_text() {
        let provider = MockProvider::new("plain reply");
        let out = generate(&provider, vec![ChatMessage::user("hi")], &StewardCfg::default())
            .await
            .unwrap();
        assert_eq!(out, "plain reply");
    }
}
