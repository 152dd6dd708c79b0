use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;

/// The signed-in account. Identity is owned by the hosted auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
}

// ── Enumerations ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Lenient parse used on model output ("HIGH", "urgent", "p1"...).
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "low" | "minor" | "p3" => Some(Self::Low),
            "medium" | "normal" | "moderate" | "p2" => Some(Self::Medium),
            "high" | "urgent" | "important" | "critical" | "p1" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn parse_loose(raw: &str) -> Option<Self> {
        let norm = raw.trim().to_lowercase().replace(['-', ' '], "_");
        match norm.as_str() {
            "pending" | "todo" | "to_do" | "open" | "not_started" => Some(Self::Pending),
            "in_progress" | "started" | "doing" | "active" => Some(Self::InProgress),
            "completed" | "complete" | "done" | "finished" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn parse_loose(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "daily" | "day" | "every day" | "everyday" => Some(Self::Daily),
            "weekly" | "week" | "every week" => Some(Self::Weekly),
            "monthly" | "month" | "every month" => Some(Self::Monthly),
            _ => None,
        }
    }

    pub fn as_db_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Dark,
    Light,
    System,
}

impl Theme {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dark => "dark",
            Self::Light => "light",
            Self::System => "system",
        }
    }
}

/// "Rule alignment" tag attached to tasks and habits, always within 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleAlignment(u8);

impl RuleAlignment {
    pub const DEFAULT: Self = Self(2);

    /// Clamp an arbitrary integer into the 1..=3 range.
    pub fn clamped(v: i64) -> Self {
        Self(v.clamp(1, 3) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for RuleAlignment {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ── Records ─────────────────────────────────────────────────────

/// Normalized task fields, ready to be written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub priority: Priority,
    pub rule_alignment: RuleAlignment,
    pub status: TaskStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub category: String,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub priority: Priority,
    pub rule_alignment: RuleAlignment,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn from_new(user_id: UserId, new: NewTask) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            category: new.category,
            due_date: new.due_date,
            due_time: new.due_time,
            priority: new.priority,
            rule_alignment: new.rule_alignment,
            status: new.status,
            created_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(v) = &patch.title {
            self.title = v.clone();
        }
        if let Some(v) = &patch.description {
            self.description = v.clone();
        }
        if let Some(v) = &patch.category {
            self.category = v.clone();
        }
        if let Some(v) = patch.due_date {
            self.due_date = Some(v);
        }
        if let Some(v) = &patch.due_time {
            self.due_time = Some(v.clone());
        }
        if let Some(v) = patch.priority {
            self.priority = v;
        }
        if let Some(v) = patch.rule_alignment {
            self.rule_alignment = v;
        }
        if let Some(v) = patch.status {
            self.status = v;
        }
    }
}

/// Partial task update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub due_time: Option<String>,
    pub priority: Option<Priority>,
    pub rule_alignment: Option<RuleAlignment>,
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHabit {
    pub title: String,
    pub description: String,
    pub topic: String,
    pub frequency: Frequency,
    pub target_count: u32,
    pub priority: Priority,
    pub rule_alignment: RuleAlignment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub description: String,
    pub topic: String,
    pub frequency: Frequency,
    pub target_count: u32,
    pub priority: Priority,
    pub rule_alignment: RuleAlignment,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Habit {
    pub fn from_new(user_id: UserId, new: NewHabit) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            description: new.description,
            topic: new.topic,
            frequency: new.frequency,
            target_count: new.target_count,
            priority: new.priority,
            rule_alignment: new.rule_alignment,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitEntry {
    pub habit_id: Uuid,
    pub date: NaiveDate,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDiaryEntry {
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub entry_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiaryEntry {
    pub id: Uuid,
    pub user_id: UserId,
    pub title: String,
    pub content: String,
    pub mood: Option<String>,
    pub tags: Vec<String>,
    pub entry_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl DiaryEntry {
    pub fn from_new(user_id: UserId, new: NewDiaryEntry) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: new.title,
            content: new.content,
            mood: new.mood,
            tags: new.tags,
            entry_date: new.entry_date,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: UserId,
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn empty(user_id: UserId) -> Self {
        Self {
            user_id,
            full_name: None,
            bio: None,
            timezone: None,
            updated_at: Utc::now(),
        }
    }

    pub fn apply(&mut self, patch: &ProfilePatch) {
        if let Some(v) = &patch.full_name {
            self.full_name = Some(v.clone());
        }
        if let Some(v) = &patch.bio {
            self.bio = Some(v.clone());
        }
        if let Some(v) = &patch.timezone {
            self.timezone = Some(v.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub full_name: Option<String>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

impl ProfilePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub user_id: UserId,
    pub theme: Theme,
    /// Free-form preference bag (notifications, language, week start...).
    pub preferences: serde_json::Map<String, serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

impl Settings {
    pub fn defaults(user_id: UserId) -> Self {
        Self {
            user_id,
            theme: Theme::default(),
            preferences: serde_json::Map::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Partial settings update. Preference keys are merged, not replaced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsPatch {
    pub theme: Option<Theme>,
    pub preferences: serde_json::Map<String, serde_json::Value>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.theme.is_none() && self.preferences.is_empty()
    }
}

impl Settings {
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(theme) = patch.theme {
            self.theme = theme;
        }
        for (k, v) in &patch.preferences {
            self.preferences.insert(k.clone(), v.clone());
        }
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyMember {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub relationship: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilyStatus {
    pub id: Uuid,
    pub member_id: Uuid,
    pub status: String,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: Uuid,
    pub user_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    /// Parent contact in the user's relationship hierarchy.
    pub parent_id: Option<Uuid>,
}

// ── Advisor output ──────────────────────────────────────────────

/// Informational card produced by the advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advice {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub action_items: Vec<String>,
    #[serde(default)]
    pub rule_alignment: Option<RuleAlignment>,
}

fn default_category() -> String {
    "General".into()
}

impl Advice {
    /// Static card shown when the generating call itself fails.
    pub fn processing_error() -> Self {
        Self {
            title: "Processing Error".into(),
            content: "I ran into a problem while working on that. Please try again in a moment."
                .into(),
            category: "System".into(),
            priority: Priority::Low,
            action_items: vec![],
            rule_alignment: None,
        }
    }
}
