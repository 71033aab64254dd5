//! Logged-in user directory — connection id → username.
//!
//! Usernames are unique at any instant; login is an atomic
//! check-and-insert, which is why this is a locked map rather than a
//! concurrent one (contains-value plus insert cannot be made atomic
//! otherwise).

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: Mutex<HashMap<u64, String>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `username` for connection `id`.
    ///
    /// Returns false if the username is already taken by any connection
    /// (including this one); the directory is unchanged in that case.
    pub fn login(&self, id: u64, username: &str) -> bool {
        let mut users = self.users.lock().expect("user directory poisoned");
        if users.values().any(|existing| existing == username) {
            return false;
        }
        users.insert(id, username.to_string());
        tracing::info!(id, username, "user logged in");
        true
    }

    /// Remove connection `id`, freeing its username. Idempotent.
    pub fn logout(&self, id: u64) -> Option<String> {
        let username = self
            .users
            .lock()
            .expect("user directory poisoned")
            .remove(&id);
        if let Some(username) = &username {
            tracing::info!(id, username = %username, "user logged out");
        }
        username
    }

    /// Snapshot of the logged-in connection ids, for broadcast fan-out.
    pub fn ids(&self) -> Vec<u64> {
        self.users
            .lock()
            .expect("user directory poisoned")
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.lock().expect("user directory poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
