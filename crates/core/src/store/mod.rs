//! Hosted backend tables.
//!
//! The application treats the backend as a black box: authenticate, read or
//! write one row, interpret an error as failure. Uniqueness and foreign keys
//! are the backend's business.

pub mod memory;
pub mod pg;

use uuid::Uuid;

use crate::types::{
    Contact, DiaryEntry, FamilyMember, FamilyStatus, Habit, HabitEntry, NewDiaryEntry, NewHabit,
    NewTask, Profile, ProfilePatch, Settings, SettingsPatch, Task, TaskPatch, UserId,
};

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait::async_trait]
pub trait HostedStore: Send + Sync {
    async fn insert_task(&self, user: UserId, task: NewTask) -> Result<Task, StoreError>;
    /// Oldest first. Title lookups resolve to the first match.
    async fn list_tasks(&self, user: UserId) -> Result<Vec<Task>, StoreError>;
    async fn update_task(&self, user: UserId, id: Uuid, patch: &TaskPatch) -> Result<Task, StoreError>;
    async fn delete_task(&self, user: UserId, id: Uuid) -> Result<(), StoreError>;

    async fn insert_habit(&self, user: UserId, habit: NewHabit) -> Result<Habit, StoreError>;
    async fn list_habits(&self, user: UserId) -> Result<Vec<Habit>, StoreError>;
    async fn list_habit_entries(&self, user: UserId) -> Result<Vec<HabitEntry>, StoreError>;

    async fn insert_diary_entry(&self, user: UserId, entry: NewDiaryEntry) -> Result<DiaryEntry, StoreError>;
    async fn list_diary_entries(&self, user: UserId) -> Result<Vec<DiaryEntry>, StoreError>;

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError>;
    async fn upsert_profile(&self, user: UserId, patch: &ProfilePatch) -> Result<Profile, StoreError>;

    async fn fetch_settings(&self, user: UserId) -> Result<Option<Settings>, StoreError>;
    async fn upsert_settings(&self, user: UserId, patch: &SettingsPatch) -> Result<Settings, StoreError>;

    async fn list_family_members(&self, user: UserId) -> Result<Vec<FamilyMember>, StoreError>;
    async fn delete_family_member(&self, user: UserId, id: Uuid) -> Result<(), StoreError>;
    async fn insert_family_status(
        &self,
        user: UserId,
        member_id: Uuid,
        status: &str,
        message: Option<&str>,
    ) -> Result<FamilyStatus, StoreError>;

    async fn list_contacts(&self, user: UserId) -> Result<Vec<Contact>, StoreError>;
}
