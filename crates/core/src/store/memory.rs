use chrono::Utc;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use super::{HostedStore, StoreError};
use crate::types::{
    Contact, DiaryEntry, FamilyMember, FamilyStatus, Habit, HabitEntry, NewDiaryEntry, NewHabit,
    NewTask, Profile, ProfilePatch, Settings, SettingsPatch, Task, TaskPatch, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    tasks: Vec<Task>,
    habits: Vec<Habit>,
    habit_entries: Vec<HabitEntry>,
    diary: Vec<DiaryEntry>,
    profiles: Vec<Profile>,
    settings: Vec<Settings>,
    family: Vec<FamilyMember>,
    family_status: Vec<FamilyStatus>,
    contacts: Vec<Contact>,
    writes: usize,
    fail_writes: Option<String>,
}

/// In-process store used for ephemeral sessions (no `DATABASE_URL`) and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))
    }

    /// Lock for a mutating call: honours injected failures and counts writes.
    fn lock_for_write(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        let mut t = self.lock()?;
        if let Some(msg) = &t.fail_writes {
            return Err(StoreError::Unavailable(msg.clone()));
        }
        t.writes += 1;
        Ok(t)
    }

    /// Number of mutating calls that reached the tables so far.
    pub fn write_count(&self) -> usize {
        self.lock().map(|t| t.writes).unwrap_or(0)
    }

    /// Make every subsequent write fail with `message` (`None` clears it).
    pub fn set_write_failure(&self, message: Option<&str>) {
        if let Ok(mut t) = self.lock() {
            t.fail_writes = message.map(str::to_owned);
        }
    }

    // Seeding helpers for rows the dispatcher never creates itself.

    pub fn seed_family_member(&self, user: UserId, name: &str, relationship: Option<&str>) -> FamilyMember {
        let member = FamilyMember {
            id: Uuid::new_v4(),
            user_id: user,
            name: name.to_owned(),
            relationship: relationship.map(str::to_owned),
        };
        if let Ok(mut t) = self.lock() {
            t.family.push(member.clone());
        }
        member
    }

    pub fn seed_habit_entry(&self, entry: HabitEntry) {
        if let Ok(mut t) = self.lock() {
            t.habit_entries.push(entry);
        }
    }

    pub fn seed_contact(&self, contact: Contact) {
        if let Ok(mut t) = self.lock() {
            t.contacts.push(contact);
        }
    }

    pub fn family_statuses(&self, member_id: Uuid) -> Vec<FamilyStatus> {
        self.lock()
            .map(|t| t.family_status.iter().filter(|s| s.member_id == member_id).cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl HostedStore for MemoryStore {
    async fn insert_task(&self, user: UserId, task: NewTask) -> Result<Task, StoreError> {
        let mut t = self.lock_for_write()?;
        let task = Task::from_new(user, task);
        t.tasks.push(task.clone());
        Ok(task)
    }

    async fn list_tasks(&self, user: UserId) -> Result<Vec<Task>, StoreError> {
        let t = self.lock()?;
        Ok(t.tasks.iter().filter(|x| x.user_id == user).cloned().collect())
    }

    async fn update_task(&self, user: UserId, id: Uuid, patch: &TaskPatch) -> Result<Task, StoreError> {
        let mut t = self.lock_for_write()?;
        let task = t
            .tasks
            .iter_mut()
            .find(|x| x.id == id && x.user_id == user)
            .ok_or(StoreError::NotFound("task"))?;
        task.apply(patch);
        Ok(task.clone())
    }

    async fn delete_task(&self, user: UserId, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.lock_for_write()?;
        let before = t.tasks.len();
        t.tasks.retain(|x| !(x.id == id && x.user_id == user));
        if t.tasks.len() == before {
            return Err(StoreError::NotFound("task"));
        }
        Ok(())
    }

    async fn insert_habit(&self, user: UserId, habit: NewHabit) -> Result<Habit, StoreError> {
        let mut t = self.lock_for_write()?;
        let habit = Habit::from_new(user, habit);
        t.habits.push(habit.clone());
        Ok(habit)
    }

    async fn list_habits(&self, user: UserId) -> Result<Vec<Habit>, StoreError> {
        let t = self.lock()?;
        Ok(t.habits.iter().filter(|x| x.user_id == user).cloned().collect())
    }

    async fn list_habit_entries(&self, user: UserId) -> Result<Vec<HabitEntry>, StoreError> {
        let t = self.lock()?;
        let owned: Vec<Uuid> = t.habits.iter().filter(|h| h.user_id == user).map(|h| h.id).collect();
        Ok(t.habit_entries.iter().filter(|e| owned.contains(&e.habit_id)).cloned().collect())
    }

    async fn insert_diary_entry(&self, user: UserId, entry: NewDiaryEntry) -> Result<DiaryEntry, StoreError> {
        let mut t = self.lock_for_write()?;
        let entry = DiaryEntry::from_new(user, entry);
        t.diary.push(entry.clone());
        Ok(entry)
    }

    async fn list_diary_entries(&self, user: UserId) -> Result<Vec<DiaryEntry>, StoreError> {
        let t = self.lock()?;
        Ok(t.diary.iter().filter(|x| x.user_id == user).cloned().collect())
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Option<Profile>, StoreError> {
        let t = self.lock()?;
        Ok(t.profiles.iter().find(|p| p.user_id == user).cloned())
    }

    async fn upsert_profile(&self, user: UserId, patch: &ProfilePatch) -> Result<Profile, StoreError> {
        let mut t = self.lock_for_write()?;
        if let Some(existing) = t.profiles.iter_mut().find(|p| p.user_id == user) {
            existing.apply(patch);
            return Ok(existing.clone());
        }
        let mut profile = Profile::empty(user);
        profile.apply(patch);
        t.profiles.push(profile.clone());
        Ok(profile)
    }

    async fn fetch_settings(&self, user: UserId) -> Result<Option<Settings>, StoreError> {
        let t = self.lock()?;
        Ok(t.settings.iter().find(|s| s.user_id == user).cloned())
    }

    async fn upsert_settings(&self, user: UserId, patch: &SettingsPatch) -> Result<Settings, StoreError> {
        let mut t = self.lock_for_write()?;
        if let Some(existing) = t.settings.iter_mut().find(|s| s.user_id == user) {
            existing.apply(patch);
            return Ok(existing.clone());
        }
        let mut settings = Settings::defaults(user);
        settings.apply(patch);
        t.settings.push(settings.clone());
        Ok(settings)
    }

    async fn list_family_members(&self, user: UserId) -> Result<Vec<FamilyMember>, StoreError> {
        let t = self.lock()?;
        Ok(t.family.iter().filter(|m| m.user_id == user).cloned().collect())
    }

    async fn delete_family_member(&self, user: UserId, id: Uuid) -> Result<(), StoreError> {
        let mut t = self.lock_for_write()?;
        let before = t.family.len();
        t.family.retain(|m| !(m.id == id && m.user_id == user));
        if t.family.len() == before {
            return Err(StoreError::NotFound("family member"));
        }
        t.family_status.retain(|s| s.member_id != id);
        Ok(())
    }

    async fn insert_family_status(
        &self,
        user: UserId,
        member_id: Uuid,
        status: &str,
        message: Option<&str>,
    ) -> Result<FamilyStatus, StoreError> {
        let mut t = self.lock_for_write()?;
        if !t.family.iter().any(|m| m.id == member_id && m.user_id == user) {
            return Err(StoreError::NotFound("family member"));
        }
        let row = FamilyStatus {
            id: Uuid::new_v4(),
            member_id,
            status: status.to_owned(),
            message: message.map(str::to_owned),
            created_at: Utc::now(),
        };
        t.family_status.push(row.clone());
        Ok(row)
    }

    async fn list_contacts(&self, user: UserId) -> Result<Vec<Contact>, StoreError> {
        let t = self.lock()?;
        Ok(t.contacts.iter().filter(|c| c.user_id == user).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, RuleAlignment, TaskStatus};

    fn new_task(title: &str) -> NewTask {
        NewTask {
            title: title.into(),
            description: String::new(),
            category: "General".into(),
            due_date: None,
            due_time: None,
            priority: Priority::Medium,
            rule_alignment: RuleAlignment::DEFAULT,
            status: TaskStatus::Pending,
        }
    }

    #[tokio::test]
    async fn tasks_are_scoped_per_user() {
        let store = MemoryStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert_task(alice, new_task("a")).await.unwrap();
        store.insert_task(bob, new_task("b")).await.unwrap();
        assert_eq!(store.list_tasks(alice).await.unwrap().len(), 1);
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn delete_of_other_users_task_is_not_found() {
        let store = MemoryStore::new();
        let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let task = store.insert_task(alice, new_task("a")).await.unwrap();
        let err = store.delete_task(bob, task.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound("task")));
    }

    #[tokio::test]
    async fn injected_failure_blocks_writes() {
        let store = MemoryStore::new();
        store.set_write_failure(Some("connection reset"));
        let err = store.insert_task(Uuid::new_v4(), new_task("a")).await.unwrap_err();
        assert_eq!(err.to_string(), "store unavailable: connection reset");
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn settings_upsert_creates_then_merges() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let mut patch = SettingsPatch::default();
        patch.preferences.insert("language".into(), "en".into());
        store.upsert_settings(user, &patch).await.unwrap();

        let mut patch = SettingsPatch::default();
        patch.preferences.insert("notifications".into(), false.into());
        let merged = store.upsert_settings(user, &patch).await.unwrap();
        assert_eq!(merged.preferences.len(), 2);
    }

    #[tokio::test]
    async fn family_status_requires_owned_member() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let dad = store.seed_family_member(user, "Dad", Some("father"));
        store.insert_family_status(user, dad.id, "safe", None).await.unwrap();
        assert_eq!(store.family_statuses(dad.id).len(), 1);

        let err = store
            .insert_family_status(Uuid::new_v4(), dad.id, "safe", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
