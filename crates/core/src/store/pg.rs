use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::{HostedStore, StoreError};
use crate::types::{
    Contact, DiaryEntry, FamilyMember, FamilyStatus, Frequency, Habit, HabitEntry, NewDiaryEntry,
    NewHabit, NewTask, Priority, Profile, ProfilePatch, RuleAlignment, Settings, SettingsPatch,
    Task, TaskPatch, TaskStatus, Theme, UserId,
};

/// Postgres-backed hosted store. Schema lives in `migrations/`.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// ── Row types ──────────────────────────────────────────────────

const TASK_COLUMNS: &str =
    "id, user_id, title, description, category, due_date, due_time, priority, rule_alignment, status, created_at";

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: String,
    category: String,
    due_date: Option<NaiveDate>,
    due_time: Option<String>,
    priority: String,
    rule_alignment: i16,
    status: String,
    created_at: DateTime<Utc>,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            category: row.category,
            due_date: row.due_date,
            due_time: row.due_time,
            priority: Priority::parse_loose(&row.priority).unwrap_or_default(),
            rule_alignment: RuleAlignment::clamped(row.rule_alignment.into()),
            status: TaskStatus::parse_loose(&row.status).unwrap_or_default(),
            created_at: row.created_at,
        }
    }
}

const HABIT_COLUMNS: &str =
    "id, user_id, title, description, topic, frequency, target_count, priority, rule_alignment, is_active, created_at";

#[derive(sqlx::FromRow)]
struct HabitRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: String,
    topic: String,
    frequency: String,
    target_count: i32,
    priority: String,
    rule_alignment: i16,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<HabitRow> for Habit {
    fn from(row: HabitRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            description: row.description,
            topic: row.topic,
            frequency: Frequency::parse_loose(&row.frequency).unwrap_or_default(),
            target_count: row.target_count.max(1) as u32,
            priority: Priority::parse_loose(&row.priority).unwrap_or_default(),
            rule_alignment: RuleAlignment::clamped(row.rule_alignment.into()),
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

const DIARY_COLUMNS: &str = "id, user_id, title, content, mood, tags, entry_date, created_at";

#[derive(sqlx::FromRow)]
struct DiaryRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    content: String,
    mood: Option<String>,
    tags: Vec<String>,
    entry_date: NaiveDate,
    created_at: DateTime<Utc>,
}

impl From<DiaryRow> for DiaryEntry {
    fn from(row: DiaryRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            content: row.content,
            mood: row.mood,
            tags: row.tags,
            entry_date: row.entry_date,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProfileRow {
    user_id: Uuid,
    full_name: Option<String>,
    bio: Option<String>,
    timezone: Option<String>,
    updated_at: DateTime<Utc>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: row.user_id,
            full_name: row.full_name,
            bio: row.bio,
            timezone: row.timezone,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SettingsRow {
    user_id: Uuid,
    theme: String,
    preferences: serde_json::Value,
    updated_at: DateTime<Utc>,
}

fn theme_from_db(s: &str) -> Theme {
    match s {
        "light" => Theme::Light,
        "system" => Theme::System,
        _ => Theme::Dark,
    }
}

impl From<SettingsRow> for Settings {
    fn from(row: SettingsRow) -> Self {
        let preferences = match row.preferences {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            user_id: row.user_id,
            theme: theme_from_db(&row.theme),
            preferences,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct FamilyMemberRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    relationship: Option<String>,
}

#[derive(sqlx::FromRow)]
struct FamilyStatusRow {
    id: Uuid,
    member_id: Uuid,
    status: String,
    message: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    user_id: Uuid,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    parent_id: Option<Uuid>,
}

#[async_trait::async_trait]
impl HostedStore for PgStore {
    async fn insert_task(&self, user: UserId, task: NewTask) -> Result<Task, StoreError> {
        let row: TaskRow = sqlx::query_as(&format!(
            "INSERT INTO tasks (id, user_id, title, description, category, due_date, due_time, priority, rule_alignment, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now())
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(&task.title)
        .bind(&task.description)
        .bind(&task.category)
        .bind(task.due_date)
        .bind(&task.due_time)
        .bind(task.priority.as_db_str())
        .bind(i16::from(task.rule_alignment.get()))
        .bind(task.status.as_db_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_tasks(&self, user: UserId) -> Result<Vec<Task>, StoreError> {
        let rows: Vec<TaskRow> = sqlx::query_as(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE user_id = $1 ORDER BY created_at, id"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn update_task(&self, user: UserId, id: Uuid, patch: &TaskPatch) -> Result<Task, StoreError> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "UPDATE tasks SET
                title = COALESCE($3, title),
                description = COALESCE($4, description),
                category = COALESCE($5, category),
                due_date = COALESCE($6, due_date),
                due_time = COALESCE($7, due_time),
                priority = COALESCE($8, priority),
                rule_alignment = COALESCE($9, rule_alignment),
                status = COALESCE($10, status)
             WHERE id = $1 AND user_id = $2
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(user)
        .bind(&patch.title)
        .bind(&patch.description)
        .bind(&patch.category)
        .bind(patch.due_date)
        .bind(&patch.due_time)
        .bind(patch.priority.map(Priority::as_db_str))
        .bind(patch.rule_alignment.map(|r| i16::from(r.get())))
        .bind(patch.status.map(TaskStatus::as_db_str))
        .fetch_optional(&self.pool)
        .await?;
        row.map(Into::into).ok_or(StoreError::NotFound("task"))
    }

    async fn delete_task(&self, user: UserId, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    async fn insert_habit(&self, user: UserId, habit: NewHabit) -> Result<Habit, StoreError> {
        let row: HabitRow = sqlx::query_as(&format!(
            "INSERT INTO habits (id, user_id, title, description, topic, frequency, target_count, priority, rule_alignment, is_active, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, now())
             RETURNING {HABIT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(&habit.title)
        .bind(&habit.description)
        .bind(&habit.topic)
        .bind(habit.frequency.as_db_str())
        .bind(habit.target_count as i32)
        .bind(habit.priority.as_db_str())
        .bind(i16::from(habit.rule_alignment.get()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_habits(&self, user: UserId) -> Result<Vec<Habit>, StoreError> {
        let rows: Vec<HabitRow> = sqlx::query_as(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = $1 ORDER BY created_at"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_habit_entries(&self, user: UserId) -> Result<Vec<HabitEntry>, StoreError> {
        let rows: Vec<(Uuid, NaiveDate, bool)> = sqlx::query_as(
            "SELECT e.habit_id, e.entry_date, e.completed
             FROM habit_entries e JOIN habits h ON h.id = e.habit_id
             WHERE h.user_id = $1 ORDER BY e.entry_date",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(habit_id, date, completed)| HabitEntry { habit_id, date, completed })
            .collect())
    }

    async fn insert_diary_entry(&self, user: UserId, entry: NewDiaryEntry) -> Result<DiaryEntry, StoreError> {
        let row: DiaryRow = sqlx::query_as(&format!(
            "INSERT INTO diary_entries (id, user_id, title, content, mood, tags, entry_date, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, now())
             RETURNING {DIARY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user)
        .bind(&entry.title)
        .bind(&entry.content)
        .bind(&entry.mood)
        .bind(&entry.tags)
        .bind(entry.entry_date)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_diary_entries(&self, user: UserId) -> Result<Vec<DiaryEntry>, StoreError> {
        let rows: Vec<DiaryRow> = sqlx::query_as(&format!(
            "SELECT {DIARY_COLUMNS} FROM diary_entries WHERE user_id = $1 ORDER BY entry_date DESC"
        ))
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError> {
        let row: Option<ProfileRow> = sqlx::query_as(
            "SELECT user_id, full_name, bio, timezone, updated_at FROM user_profiles WHERE user_id = $1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_profile(&self, user: UserId, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let row: ProfileRow = sqlx::query_as(
            "INSERT INTO user_profiles (user_id, full_name, bio, timezone, updated_at)
             VALUES ($1, $2, $3, $4, now())
             ON CONFLICT (user_id) DO UPDATE SET
                full_name = COALESCE(EXCLUDED.full_name, user_profiles.full_name),
                bio = COALESCE(EXCLUDED.bio, user_profiles.bio),
                timezone = COALESCE(EXCLUDED.timezone, user_profiles.timezone),
                updated_at = now()
             RETURNING user_id, full_name, bio, timezone, updated_at",
        )
        .bind(user)
        .bind(&patch.full_name)
        .bind(&patch.bio)
        .bind(&patch.timezone)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn fetch_settings(&self, user: UserId) -> Result<Option<Settings>, StoreError> {
        let row: Option<SettingsRow> = sqlx::query_as(
            "SELECT user_id, theme, preferences, updated_at FROM user_settings WHERE user_id = $1",
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn upsert_settings(&self, user: UserId, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let row: SettingsRow = sqlx::query_as(
            "INSERT INTO user_settings (user_id, theme, preferences, updated_at)
             VALUES ($1, COALESCE($2, 'dark'), $3, now())
             ON CONFLICT (user_id) DO UPDATE SET
                theme = COALESCE($2, user_settings.theme),
                preferences = user_settings.preferences || EXCLUDED.preferences,
                updated_at = now()
             RETURNING user_id, theme, preferences, updated_at",
        )
        .bind(user)
        .bind(patch.theme.map(Theme::as_str))
        .bind(serde_json::Value::Object(patch.preferences.clone()))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn list_family_members(&self, user: UserId) -> Result<Vec<FamilyMember>, StoreError> {
        let rows: Vec<FamilyMemberRow> = sqlx::query_as(
            "SELECT id, user_id, name, relationship FROM family_members WHERE user_id = $1 ORDER BY name",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| FamilyMember { id: r.id, user_id: r.user_id, name: r.name, relationship: r.relationship })
            .collect())
    }

    async fn delete_family_member(&self, user: UserId, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM family_members WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("family member"));
        }
        Ok(())
    }

    async fn insert_family_status(
        &self,
        user: UserId,
        member_id: Uuid,
        status: &str,
        message: Option<&str>,
    ) -> Result<FamilyStatus, StoreError> {
        // Ownership check and insert in one statement: no row means the member
        // does not belong to this user.
        let row: Option<FamilyStatusRow> = sqlx::query_as(
            "INSERT INTO family_member_status (id, member_id, status, message, created_at)
             SELECT $1, m.id, $3, $4, now() FROM family_members m
             WHERE m.id = $2 AND m.user_id = $5
             RETURNING id, member_id, status, message, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(member_id)
        .bind(status)
        .bind(message)
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| FamilyStatus {
            id: r.id,
            member_id: r.member_id,
            status: r.status,
            message: r.message,
            created_at: r.created_at,
        })
        .ok_or(StoreError::NotFound("family member"))
    }

    async fn list_contacts(&self, user: UserId) -> Result<Vec<Contact>, StoreError> {
        let rows: Vec<ContactRow> = sqlx::query_as(
            "SELECT id, user_id, name, email, phone, parent_id FROM contacts WHERE user_id = $1 ORDER BY name",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| Contact {
                id: r.id,
                user_id: r.user_id,
                name: r.name,
                email: r.email,
                phone: r.phone,
                parent_id: r.parent_id,
            })
            .collect())
    }
}
