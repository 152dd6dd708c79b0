//! Map loosely-named model parameters onto canonical record shapes.
//!
//! The model is inconsistent about field names (`title` vs `name`, `dueDate`
//! vs `date`) and casing, so every reader here tries a list of aliases and
//! falls back to a default instead of failing.

use chrono::{DateTime, Duration, NaiveDate};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{
    Frequency, NewDiaryEntry, NewHabit, NewTask, Priority, ProfilePatch, RuleAlignment,
    SettingsPatch, TaskPatch, TaskStatus, Theme,
};

pub type Params = Map<String, Value>;

pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("missing required field: {0}")]
    Missing(&'static str),
    #[error("unknown destination: {0}")]
    UnknownRoute(String),
}

/// Reference to an existing record, by id or by (case-insensitive) name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetRef {
    Id(Uuid),
    Name(String),
}

impl TargetRef {
    pub fn matches(&self, id: Uuid, name: &str) -> bool {
        match self {
            Self::Id(want) => *want == id,
            Self::Name(want) => want.eq_ignore_ascii_case(name.trim()),
        }
    }
}

/// Result of fuzzy theme matching. `recognized == false` means the input
/// matched no keyword and `theme` is the fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeChoice {
    pub theme: Theme,
    pub recognized: bool,
}

const DARK_WORDS: [&str; 3] = ["dark", "night", "black"];
const LIGHT_WORDS: [&str; 3] = ["light", "bright", "white"];
const SYSTEM_WORDS: [&str; 3] = ["system", "auto", "default"];
const FALLBACK_THEME: Theme = Theme::Dark;

/// Keyword match, checked dark → light → system; unmatched input falls back to dark.
pub fn normalize_theme(raw: &str) -> ThemeChoice {
    let lower = raw.to_lowercase();
    let hit = |words: &[&str]| words.iter().any(|w| lower.contains(w));
    let theme = if hit(&DARK_WORDS) {
        Some(Theme::Dark)
    } else if hit(&LIGHT_WORDS) {
        Some(Theme::Light)
    } else if hit(&SYSTEM_WORDS) {
        Some(Theme::System)
    } else {
        None
    };
    match theme {
        Some(theme) => ThemeChoice { theme, recognized: true },
        None => {
            tracing::warn!(input = raw, fallback = FALLBACK_THEME.as_str(), "unrecognized theme, using fallback");
            ThemeChoice { theme: FALLBACK_THEME, recognized: false }
        }
    }
}

pub fn theme_from_params(params: &Params) -> ThemeChoice {
    let raw = first_str(params, &["theme", "mode", "value", "colorScheme", "color_scheme"])
        .unwrap_or_default();
    normalize_theme(&raw)
}

pub fn normalize_task(params: &Params, today: NaiveDate) -> Result<NewTask, NormalizeError> {
    let title = first_str(params, TITLE_KEYS).ok_or(NormalizeError::Missing("title"))?;
    Ok(NewTask {
        title,
        description: first_str(params, DESCRIPTION_KEYS).unwrap_or_default(),
        category: first_str(params, CATEGORY_KEYS).unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        due_date: first_date(params, DATE_KEYS, today),
        due_time: first_str(params, TIME_KEYS),
        priority: priority(params).unwrap_or_default(),
        rule_alignment: rule_alignment(params).unwrap_or_default(),
        status: first_str(params, &["status", "state"])
            .and_then(|s| TaskStatus::parse_loose(&s))
            .unwrap_or_default(),
    })
}

/// Target plus field changes for `UPDATE_TASK`.
///
/// When the model identifies the task by title and also supplies `newTitle`,
/// the title is a lookup key, not a change.
pub fn normalize_task_update(
    params: &Params,
    today: NaiveDate,
) -> Result<(TargetRef, TaskPatch), NormalizeError> {
    let target = target_ref(params, &["taskId", "task_id", "id"], TITLE_KEYS)
        .ok_or(NormalizeError::Missing("task id or title"))?;

    let mut status = first_str(params, &["status", "state"]).and_then(|s| TaskStatus::parse_loose(&s));
    if status.is_none() && first_bool(params, &["completed", "done"]) == Some(true) {
        status = Some(TaskStatus::Completed);
    }

    let patch = TaskPatch {
        title: first_str(params, &["newTitle", "new_title", "rename"]),
        description: first_str(params, DESCRIPTION_KEYS),
        category: first_str(params, CATEGORY_KEYS),
        due_date: first_date(params, DATE_KEYS, today),
        due_time: first_str(params, TIME_KEYS),
        priority: priority(params),
        rule_alignment: rule_alignment(params),
        status,
    };
    Ok((target, patch))
}

pub fn task_target(params: &Params) -> Result<TargetRef, NormalizeError> {
    target_ref(params, &["taskId", "task_id", "id"], TITLE_KEYS)
        .ok_or(NormalizeError::Missing("task id or title"))
}

pub fn normalize_habit(params: &Params) -> Result<NewHabit, NormalizeError> {
    let title = first_str(params, TITLE_KEYS).ok_or(NormalizeError::Missing("title"))?;
    Ok(NewHabit {
        title,
        description: first_str(params, DESCRIPTION_KEYS).unwrap_or_default(),
        topic: first_str(params, CATEGORY_KEYS).unwrap_or_else(|| DEFAULT_CATEGORY.into()),
        frequency: first_str(params, &["frequency", "schedule", "repeat"])
            .and_then(|s| Frequency::parse_loose(&s))
            .unwrap_or_default(),
        target_count: first_i64(params, &["targetCount", "target_count", "target", "times"])
            .map(|n| n.clamp(1, 100) as u32)
            .unwrap_or(1),
        priority: priority(params).unwrap_or_default(),
        rule_alignment: rule_alignment(params).unwrap_or_default(),
    })
}

pub fn normalize_profile(params: &Params) -> ProfilePatch {
    ProfilePatch {
        full_name: first_str(params, &["fullName", "full_name", "name", "displayName", "display_name"]),
        bio: first_str(params, &["bio", "about", "description"]),
        timezone: first_str(params, &["timezone", "timeZone", "tz"]),
    }
}

pub fn normalize_diary(params: &Params, today: NaiveDate) -> Result<NewDiaryEntry, NormalizeError> {
    let content = first_str(params, &["content", "text", "entry", "body", "note"])
        .ok_or(NormalizeError::Missing("content"))?;
    let entry_date = first_date(params, &["date", "entryDate", "entry_date"], today).unwrap_or(today);
    let title = first_str(params, TITLE_KEYS).unwrap_or_else(|| format!("Entry for {entry_date}"));
    let tags = match params.get("tags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(|t| t.trim().to_owned())
            .filter(|t| !t.is_empty())
            .collect(),
        _ => vec![],
    };
    Ok(NewDiaryEntry {
        title,
        content,
        mood: first_str(params, &["mood", "feeling"]),
        tags,
        entry_date,
    })
}

/// `theme` is pulled out and normalized; every other key becomes a preference.
pub fn normalize_settings(params: &Params) -> SettingsPatch {
    let mut patch = SettingsPatch::default();
    for (key, value) in params {
        match key.as_str() {
            "theme" | "mode" => {
                if let Some(raw) = value.as_str() {
                    patch.theme = Some(normalize_theme(raw).theme);
                }
            }
            _ => {
                patch.preferences.insert(camel_to_snake(key), value.clone());
            }
        }
    }
    patch
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyStatusUpdate {
    pub member: TargetRef,
    pub status: String,
    pub message: Option<String>,
}

pub fn family_member_target(params: &Params) -> Result<TargetRef, NormalizeError> {
    target_ref(
        params,
        &["memberId", "member_id", "familyMemberId", "id"],
        &["name", "memberName", "member_name", "member"],
    )
    .ok_or(NormalizeError::Missing("family member id or name"))
}

pub fn normalize_family_status(params: &Params) -> Result<FamilyStatusUpdate, NormalizeError> {
    let member = family_member_target(params)?;
    let status = first_str(params, &["status", "state"])
        .map(|s| s.to_lowercase())
        .ok_or(NormalizeError::Missing("status"))?;
    Ok(FamilyStatusUpdate {
        member,
        status,
        message: first_str(params, &["message", "note", "details"]),
    })
}

const ROUTES: [(&str, &str); 9] = [
    ("dashboard", "/dashboard"),
    ("tasks", "/tasks"),
    ("habits", "/habits"),
    ("diary", "/diary"),
    ("contacts", "/contacts"),
    ("family", "/family"),
    ("advisor", "/advisor"),
    ("settings", "/settings"),
    ("profile", "/profile"),
];

/// Page name ("Habits", "my diary", "/tasks") → route path.
pub fn normalize_route(params: &Params) -> Result<String, NormalizeError> {
    let raw = first_str(params, &["page", "route", "path", "destination", "to", "target"])
        .ok_or(NormalizeError::Missing("page"))?;
    let lower = raw.to_lowercase();
    let key = lower.trim_start_matches('/');
    let key = match key {
        "home" | "" => "dashboard",
        "journal" => "diary",
        "ai" | "chat" => "advisor",
        other => other,
    };
    ROUTES
        .iter()
        .find(|(name, _)| key == *name || key.trim_end_matches('s') == name.trim_end_matches('s'))
        .or_else(|| ROUTES.iter().find(|(name, _)| key.contains(name)))
        .map(|(_, route)| (*route).to_owned())
        .ok_or(NormalizeError::UnknownRoute(raw))
}

/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, `today`, `tomorrow`, `yesterday`.
pub fn parse_date(raw: &str, today: NaiveDate) -> Option<NaiveDate> {
    let raw = raw.trim();
    match raw.to_lowercase().as_str() {
        "today" => return Some(today),
        "tomorrow" => return Some(today + Duration::days(1)),
        "yesterday" => return Some(today - Duration::days(1)),
        _ => {}
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
        .or_else(|| raw.get(..10).and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok()))
}

// ── field readers ───────────────────────────────────────────────

const TITLE_KEYS: &[&str] = &["title", "name", "task", "taskName", "task_name", "habit", "habitName"];
const DESCRIPTION_KEYS: &[&str] = &["description", "details", "notes", "desc"];
const CATEGORY_KEYS: &[&str] = &["category", "topic", "area", "lifeArea"];
const DATE_KEYS: &[&str] = &["dueDate", "due_date", "date", "deadline", "due"];
const TIME_KEYS: &[&str] = &["dueTime", "due_time", "time"];

fn lookup<'a>(params: &'a Params, key: &str) -> Option<&'a Value> {
    params.get(key).or_else(|| {
        params
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn first_str(params: &Params, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| match lookup(params, k)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_owned()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn first_i64(params: &Params, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| match lookup(params, k)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn first_bool(params: &Params, keys: &[&str]) -> Option<bool> {
    keys.iter().find_map(|k| match lookup(params, k)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    })
}

fn first_date(params: &Params, keys: &[&str], today: NaiveDate) -> Option<NaiveDate> {
    let raw = first_str(params, keys)?;
    let parsed = parse_date(&raw, today);
    if parsed.is_none() {
        tracing::debug!(input = %raw, "dropping unparseable date");
    }
    parsed
}

fn priority(params: &Params) -> Option<Priority> {
    first_str(params, &["priority", "importance"]).and_then(|s| Priority::parse_loose(&s))
}

fn rule_alignment(params: &Params) -> Option<RuleAlignment> {
    first_i64(params, &["ruleAlignment", "rule_alignment", "rule", "alignment"])
        .map(RuleAlignment::clamped)
}

fn target_ref(params: &Params, id_keys: &[&str], name_keys: &[&str]) -> Option<TargetRef> {
    if let Some(id) = first_str(params, id_keys).and_then(|s| Uuid::parse_str(&s).ok()) {
        return Some(TargetRef::Id(id));
    }
    first_str(params, name_keys).map(TargetRef::Name)
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(v: Value) -> Params {
        v.as_object().cloned().unwrap()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 26).unwrap()
    }

    #[test]
    fn theme_keywords() {
        assert_eq!(normalize_theme("please switch to NIGHT mode").theme, Theme::Dark);
        assert_eq!(normalize_theme("go light").theme, Theme::Light);
        assert_eq!(normalize_theme("use system default").theme, Theme::System);
        assert_eq!(normalize_theme("Bright please").theme, Theme::Light);
        assert_eq!(normalize_theme("auto").theme, Theme::System);
    }

    #[test]
    fn unrecognized_theme_falls_back_to_dark_and_is_flagged() {
        let choice = normalize_theme("purple");
        assert_eq!(choice.theme, Theme::Dark);
        assert!(!choice.recognized);
        assert!(normalize_theme("dark").recognized);
    }

    #[test]
    fn theme_reads_alias_keys() {
        assert_eq!(theme_from_params(&params(json!({"mode": "light"}))).theme, Theme::Light);
        assert!(!theme_from_params(&params(json!({}))).recognized);
    }

    #[test]
    fn task_defaults_applied() {
        let task = normalize_task(&params(json!({"title": "Call mom", "dueDate": "2025-06-27"})), today()).unwrap();
        assert_eq!(task.title, "Call mom");
        assert_eq!(task.category, "General");
        assert_eq!(task.priority, Priority::Medium);
        assert_eq!(task.rule_alignment.get(), 2);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2025, 6, 27));
    }

    #[test]
    fn task_aliases_and_casing() {
        let task = normalize_task(
            &params(json!({
                "Name": "Pay rent",
                "date": "tomorrow",
                "topic": "Finance",
                "priority": "URGENT",
                "rule": "5",
                "time": "09:30"
            })),
            today(),
        )
        .unwrap();
        assert_eq!(task.title, "Pay rent");
        assert_eq!(task.category, "Finance");
        assert_eq!(task.due_date, NaiveDate::from_ymd_opt(2025, 6, 27));
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.rule_alignment.get(), 3);
        assert_eq!(task.due_time.as_deref(), Some("09:30"));
    }

    #[test]
    fn task_without_title_is_rejected() {
        let err = normalize_task(&params(json!({"dueDate": "2025-06-27"})), today()).unwrap_err();
        assert_eq!(err, NormalizeError::Missing("title"));
    }

    #[test]
    fn bad_dates_are_dropped() {
        let task = normalize_task(&params(json!({"title": "x", "dueDate": "next-ish"})), today()).unwrap();
        assert_eq!(task.due_date, None);
        assert_eq!(parse_date("2025-07-01T10:00:00Z", today()), NaiveDate::from_ymd_opt(2025, 7, 1));
    }

    #[test]
    fn task_update_by_title_with_completion_flag() {
        let (target, patch) =
            normalize_task_update(&params(json!({"title": "Call mom", "completed": true})), today()).unwrap();
        assert_eq!(target, TargetRef::Name("Call mom".into()));
        assert_eq!(patch.status, Some(TaskStatus::Completed));
        assert_eq!(patch.title, None);
    }

    #[test]
    fn task_update_by_id() {
        let id = Uuid::new_v4();
        let (target, patch) =
            normalize_task_update(&params(json!({"taskId": id.to_string(), "priority": "low"})), today()).unwrap();
        assert_eq!(target, TargetRef::Id(id));
        assert_eq!(patch.priority, Some(Priority::Low));
    }

    #[test]
    fn habit_defaults() {
        let habit = normalize_habit(&params(json!({"habitName": "Meditate", "frequency": "every day"}))).unwrap();
        assert_eq!(habit.title, "Meditate");
        assert_eq!(habit.topic, "General");
        assert_eq!(habit.frequency, Frequency::Daily);
        assert_eq!(habit.target_count, 1);
    }

    #[test]
    fn diary_tags_from_string() {
        let entry = normalize_diary(
            &params(json!({"text": "Great run today", "tags": "health, running", "mood": "happy"})),
            today(),
        )
        .unwrap();
        assert_eq!(entry.entry_date, today());
        assert_eq!(entry.tags, vec!["health", "running"]);
        assert_eq!(entry.title, "Entry for 2025-06-26");
    }

    #[test]
    fn settings_split_theme_from_preferences() {
        let patch = normalize_settings(&params(json!({"theme": "night", "weekStart": "monday"})));
        assert_eq!(patch.theme, Some(Theme::Dark));
        assert_eq!(patch.preferences["week_start"], "monday");
    }

    #[test]
    fn routes() {
        assert_eq!(normalize_route(&params(json!({"page": "Habits"}))).unwrap(), "/habits");
        assert_eq!(normalize_route(&params(json!({"route": "/task"}))).unwrap(), "/tasks");
        assert_eq!(normalize_route(&params(json!({"destination": "my diary"}))).unwrap(), "/diary");
        assert_eq!(normalize_route(&params(json!({"page": "home"}))).unwrap(), "/dashboard");
        assert!(matches!(
            normalize_route(&params(json!({"page": "casino"}))),
            Err(NormalizeError::UnknownRoute(_))
        ));
    }

    #[test]
    fn family_status_requires_status() {
        let update = normalize_family_status(&params(json!({"name": "Dad", "status": "Safe"}))).unwrap();
        assert_eq!(update.member, TargetRef::Name("Dad".into()));
        assert_eq!(update.status, "safe");
        assert!(normalize_family_status(&params(json!({"name": "Dad"}))).is_err());
    }

    #[test]
    fn target_name_match_is_case_insensitive() {
        let t = TargetRef::Name("call MOM".into());
        assert!(t.matches(Uuid::new_v4(), " Call mom "));
    }
}
