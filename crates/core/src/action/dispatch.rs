//! Performs the one effect an action names against the hosted store or the
//! local platform, and reports the outcome as an [`ActionResult`].

use chrono::{Local, NaiveDate, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use uuid::Uuid;

use super::history::ActionHistory;
use super::normalize::{self, NormalizeError, Params, TargetRef};
use super::{ActionResult, ActionType, AgentAction};
use crate::io::output::{self, Toast, ToastSender};
use crate::platform::{Platform, PlatformError};
use crate::session::Session;
use crate::store::{HostedStore, StoreError};
use crate::types::{SettingsPatch, Theme, User};

pub const NOT_AUTHENTICATED: &str = "User not authenticated";

/// Everything a dispatch may touch. Passed explicitly; there is no global
/// dispatcher state.
pub struct ActionContext {
    pub store: Arc<dyn HostedStore>,
    pub session: Arc<Session>,
    pub platform: Arc<dyn Platform>,
    toasts: ToastSender,
    history: ActionHistory,
}

impl ActionContext {
    pub fn new(
        store: Arc<dyn HostedStore>,
        session: Arc<Session>,
        platform: Arc<dyn Platform>,
        toasts: ToastSender,
        history: ActionHistory,
    ) -> Self {
        Self { store, session, platform, toasts, history }
    }

    pub fn history(&self) -> &ActionHistory {
        &self.history
    }
}

#[derive(Debug, thiserror::Error)]
enum EffectError {
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("no {kind} matching {target}")]
    NoMatch { kind: &'static str, target: String },
    #[error("no fields to update")]
    EmptyUpdate,
}

/// Run one action. Never fails: every problem becomes a failed result, a
/// toast and a history entry.
pub async fn dispatch(ctx: &mut ActionContext, action: &AgentAction) -> ActionResult {
    let result = match &action.action_type {
        ActionType::Unknown(raw) => ActionResult::failure(format!("Unknown action type: {raw}")),
        known => match ctx.session.current_user() {
            None => ActionResult::failure(NOT_AUTHENTICATED),
            Some(user) => {
                tracing::info!(action = %known, user_id = %user.id, "dispatching action");
                match execute(ctx, &user, action).await {
                    Ok(result) => result,
                    Err(e) => {
                        tracing::warn!(action = %known, error = %e, "action failed");
                        ActionResult::failure_with(format!("Failed to {}: {e}", verb(known)), e.to_string())
                    }
                }
            }
        },
    };

    if result.success {
        output::notify(&ctx.toasts, Toast::success(&result.message));
    } else {
        tracing::debug!(action = %action.action_type, message = %result.message, "dispatch unsuccessful");
        output::notify(&ctx.toasts, Toast::error(&result.message));
    }
    ctx.history.record(action, result.success, &result.message);
    result
}

async fn execute(ctx: &ActionContext, user: &User, action: &AgentAction) -> Result<ActionResult, EffectError> {
    let params = &action.parameters;
    let today = Local::now().date_naive();
    match &action.action_type {
        ActionType::CreateTask => create_task(ctx, user, params, today).await,
        ActionType::UpdateTask => update_task(ctx, user, params, today).await,
        ActionType::DeleteTask => delete_task(ctx, user, params).await,
        ActionType::CreateHabit => create_habit(ctx, user, params).await,
        ActionType::ChangeTheme => change_theme(ctx, user, params).await,
        ActionType::UpdateProfile => update_profile(ctx, user, params).await,
        ActionType::DeleteFamilyMember => delete_family_member(ctx, user, params).await,
        ActionType::UpdateFamilyStatus => update_family_status(ctx, user, params).await,
        ActionType::Navigate => navigate(ctx, params),
        ActionType::ExportData => export_data(ctx, user, today).await,
        ActionType::CreateDiaryEntry => create_diary_entry(ctx, user, params, today).await,
        ActionType::UpdateSettings => update_settings(ctx, user, params).await,
        ActionType::Unknown(raw) => Ok(ActionResult::failure(format!("Unknown action type: {raw}"))),
    }
}

fn verb(t: &ActionType) -> &str {
    match t {
        ActionType::CreateTask => "create task",
        ActionType::UpdateTask => "update task",
        ActionType::DeleteTask => "delete task",
        ActionType::CreateHabit => "create habit",
        ActionType::ChangeTheme => "change theme",
        ActionType::UpdateProfile => "update profile",
        ActionType::DeleteFamilyMember => "delete family member",
        ActionType::UpdateFamilyStatus => "update family status",
        ActionType::Navigate => "navigate",
        ActionType::ExportData => "export data",
        ActionType::CreateDiaryEntry => "create diary entry",
        ActionType::UpdateSettings => "update settings",
        ActionType::Unknown(raw) => raw.as_str(),
    }
}

fn describe(target: &TargetRef) -> String {
    match target {
        TargetRef::Id(id) => id.to_string(),
        TargetRef::Name(name) => format!("\"{name}\""),
    }
}

// ── tasks ───────────────────────────────────────────────────────

async fn create_task(
    ctx: &ActionContext,
    user: &User,
    params: &Params,
    today: NaiveDate,
) -> Result<ActionResult, EffectError> {
    let new = normalize::normalize_task(params, today)?;
    let task = ctx.store.insert_task(user.id, new).await?;
    let message = format!("Task \"{}\" created", task.title);
    Ok(ActionResult::ok_with(message, serde_json::to_value(&task)?))
}

async fn find_task_id(ctx: &ActionContext, user: &User, target: &TargetRef) -> Result<(Uuid, String), EffectError> {
    ctx.store
        .list_tasks(user.id)
        .await?
        .into_iter()
        .find(|t| target.matches(t.id, &t.title))
        .map(|t| (t.id, t.title))
        .ok_or_else(|| EffectError::NoMatch { kind: "task", target: describe(target) })
}

async fn update_task(
    ctx: &ActionContext,
    user: &User,
    params: &Params,
    today: NaiveDate,
) -> Result<ActionResult, EffectError> {
    let (target, patch) = normalize::normalize_task_update(params, today)?;
    if patch.is_empty() {
        return Err(EffectError::EmptyUpdate);
    }
    let (id, _) = find_task_id(ctx, user, &target).await?;
    let task = ctx.store.update_task(user.id, id, &patch).await?;
    let message = format!("Task \"{}\" updated", task.title);
    Ok(ActionResult::ok_with(message, serde_json::to_value(&task)?))
}

async fn delete_task(ctx: &ActionContext, user: &User, params: &Params) -> Result<ActionResult, EffectError> {
    let target = normalize::task_target(params)?;
    let (id, title) = find_task_id(ctx, user, &target).await?;
    ctx.store.delete_task(user.id, id).await?;
    Ok(ActionResult::ok_with(format!("Task \"{title}\" deleted"), json!({ "id": id })))
}

// ── habits, diary ───────────────────────────────────────────────

async fn create_habit(ctx: &ActionContext, user: &User, params: &Params) -> Result<ActionResult, EffectError> {
    let new = normalize::normalize_habit(params)?;
    let habit = ctx.store.insert_habit(user.id, new).await?;
    let message = format!("Habit \"{}\" created", habit.title);
    Ok(ActionResult::ok_with(message, serde_json::to_value(&habit)?))
}

async fn create_diary_entry(
    ctx: &ActionContext,
    user: &User,
    params: &Params,
    today: NaiveDate,
) -> Result<ActionResult, EffectError> {
    let new = normalize::normalize_diary(params, today)?;
    let entry = ctx.store.insert_diary_entry(user.id, new).await?;
    let message = format!("Diary entry for {} saved", entry.entry_date);
    Ok(ActionResult::ok_with(message, serde_json::to_value(&entry)?))
}

// ── profile, settings, theme ────────────────────────────────────

async fn update_profile(ctx: &ActionContext, user: &User, params: &Params) -> Result<ActionResult, EffectError> {
    let patch = normalize::normalize_profile(params);
    if patch.is_empty() {
        return Err(EffectError::EmptyUpdate);
    }
    let profile = ctx.store.upsert_profile(user.id, &patch).await?;
    Ok(ActionResult::ok_with("Profile updated", serde_json::to_value(&profile)?))
}

/// Platform side of a theme change. Runs only once the settings row holds it.
fn show_theme(ctx: &ActionContext, theme: Theme) -> Result<(), EffectError> {
    ctx.platform.apply_theme(theme)?;
    ctx.platform
        .storage()
        .set(crate::platform::THEME_KEY, Value::from(theme.as_str()))?;
    Ok(())
}

async fn change_theme(ctx: &ActionContext, user: &User, params: &Params) -> Result<ActionResult, EffectError> {
    let choice = normalize::theme_from_params(params);
    let patch = SettingsPatch { theme: Some(choice.theme), ..Default::default() };
    ctx.store.upsert_settings(user.id, &patch).await?;
    show_theme(ctx, choice.theme)?;

    let message = if choice.recognized {
        format!("Theme changed to {}", choice.theme.as_str())
    } else {
        format!("Theme not recognized, changed to {}", choice.theme.as_str())
    };
    Ok(ActionResult::ok_with(
        message,
        json!({ "theme": choice.theme.as_str(), "recognized": choice.recognized }),
    ))
}

async fn update_settings(ctx: &ActionContext, user: &User, params: &Params) -> Result<ActionResult, EffectError> {
    let patch = normalize::normalize_settings(params);
    if patch.is_empty() {
        return Err(EffectError::EmptyUpdate);
    }
    let settings = ctx.store.upsert_settings(user.id, &patch).await?;
    if let Some(theme) = patch.theme {
        show_theme(ctx, theme)?;
    }
    Ok(ActionResult::ok_with("Settings updated", serde_json::to_value(&settings)?))
}

// ── family ──────────────────────────────────────────────────────

async fn find_member(ctx: &ActionContext, user: &User, target: &TargetRef) -> Result<(Uuid, String), EffectError> {
    ctx.store
        .list_family_members(user.id)
        .await?
        .into_iter()
        .find(|m| target.matches(m.id, &m.name))
        .map(|m| (m.id, m.name))
        .ok_or_else(|| EffectError::NoMatch { kind: "family member", target: describe(target) })
}

async fn delete_family_member(
    ctx: &ActionContext,
    user: &User,
    params: &Params,
) -> Result<ActionResult, EffectError> {
    let target = normalize::family_member_target(params)?;
    let (id, name) = find_member(ctx, user, &target).await?;
    ctx.store.delete_family_member(user.id, id).await?;
    Ok(ActionResult::ok_with(format!("{name} removed from family"), json!({ "id": id })))
}

async fn update_family_status(
    ctx: &ActionContext,
    user: &User,
    params: &Params,
) -> Result<ActionResult, EffectError> {
    let update = normalize::normalize_family_status(params)?;
    let (id, name) = find_member(ctx, user, &update.member).await?;
    let row = ctx
        .store
        .insert_family_status(user.id, id, &update.status, update.message.as_deref())
        .await?;
    let message = format!("{name}'s status set to {}", row.status);
    Ok(ActionResult::ok_with(message, serde_json::to_value(&row)?))
}

// ── platform-only effects ───────────────────────────────────────

fn navigate(ctx: &ActionContext, params: &Params) -> Result<ActionResult, EffectError> {
    let route = normalize::normalize_route(params)?;
    ctx.platform.navigate(&route)?;
    Ok(ActionResult::ok_with(format!("Navigating to {route}"), json!({ "route": route })))
}

pub fn export_file_name(day: NaiveDate) -> String {
    format!("life-data-export-{}.json", day.format("%Y-%m-%d"))
}

/// Gather every table the user owns into one JSON document and hand it to
/// the platform as a download.
async fn export_data(ctx: &ActionContext, user: &User, today: NaiveDate) -> Result<ActionResult, EffectError> {
    let store = &ctx.store;
    let tasks = store.list_tasks(user.id).await?;
    let habits = store.list_habits(user.id).await?;
    let habit_entries = store.list_habit_entries(user.id).await?;
    let diary = store.list_diary_entries(user.id).await?;
    let contacts = store.list_contacts(user.id).await?;
    let family = store.list_family_members(user.id).await?;
    let profile = store.fetch_profile(user.id).await?;
    let settings = store.fetch_settings(user.id).await?;

    let records = tasks.len() + habits.len() + habit_entries.len() + diary.len() + contacts.len() + family.len();
    let document = json!({
        "exportedAt": Utc::now().to_rfc3339(),
        "user": { "id": user.id, "email": user.email },
        "profile": profile,
        "settings": settings,
        "tasks": tasks,
        "habits": habits,
        "habitEntries": habit_entries,
        "diaryEntries": diary,
        "contacts": contacts,
        "familyMembers": family,
    });

    let filename = export_file_name(today);
    let path = ctx
        .platform
        .download(&filename, serde_json::to_vec_pretty(&document)?)
        .await?;
    tracing::info!(path = %path.display(), records, "data exported");
    Ok(ActionResult::ok_with(
        format!("Exported {records} records to {filename}"),
        json!({ "path": path.display().to_string(), "records": records }),
    ))
}
