use std::sync::RwLock;
use uuid::Uuid;

use crate::types::User;

/// Namespace for deriving stable user ids from e-mail addresses when no
/// hosted auth service is attached. uuid5(NAMESPACE_URL, "steward-local-user").
const LOCAL_USER_NS: Uuid = Uuid::from_bytes([
    0x3f, 0x1d, 0x72, 0x0a, 0x9c, 0x44, 0x5e, 0x0b,
    0x8e, 0x61, 0x2b, 0xd7, 0x0c, 0x35, 0xa9, 0x14,
]);

/// Current authentication state. Actions look the user up here on every
/// dispatch; nothing caches the id elsewhere.
#[derive(Debug, Default)]
pub struct Session {
    user: RwLock<Option<User>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signed_in(user: User) -> Self {
        Self { user: RwLock::new(Some(user)) }
    }

    pub fn sign_in(&self, user: User) {
        tracing::info!(user_id = %user.id, "session signed in");
        if let Ok(mut slot) = self.user.write() {
            *slot = Some(user);
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut slot) = self.user.write() {
            if slot.take().is_some() {
                tracing::info!("session signed out");
            }
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.read().ok().and_then(|u| u.clone())
    }
}

/// Local account for an e-mail address. The same address always maps to the
/// same id, so ephemeral and database-backed runs agree on ownership.
pub fn local_user(email: &str) -> User {
    let email = email.trim().to_lowercase();
    User {
        id: Uuid::new_v5(&LOCAL_USER_NS, email.as_bytes()),
        email,
    }
}
