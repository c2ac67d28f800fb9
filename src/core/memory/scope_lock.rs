use super::memory_types::Scope;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard};

/// Keyed lock entries that exist only while someone holds or waits on them.
struct LockTable<L> {
    entries: Mutex<HashMap<String, Arc<L>>>,
}

impl<L> Default for LockTable<L> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: Default> LockTable<L> {
    fn checkout(&self, key: &str) -> Arc<L> {
        Arc::clone(self.entries().entry(key.to_string()).or_default())
    }

    fn release(&self, key: &str) {
        let mut entries = self.entries();
        // Only the map's own reference left: nobody holds or waits.
        if entries
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            entries.remove(key);
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Arc<L>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Advisory locks serializing read-check-write sequences.
///
/// Two levels: every scoped writer holds its user's lock shared plus the
/// scope's own mutex; a user-wide writer holds the user's lock exclusively,
/// so it excludes every scope of that user, agent scopes included.
#[derive(Default)]
pub(crate) struct ScopeLocks {
    users: LockTable<tokio::sync::RwLock<()>>,
    scopes: LockTable<tokio::sync::Mutex<()>>,
}

enum UserHold {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

pub(crate) struct ScopeGuard<'a> {
    locks: &'a ScopeLocks,
    user: String,
    scope_key: Option<String>,
    scope: Option<OwnedMutexGuard<()>>,
    hold: Option<UserHold>,
}

impl ScopeLocks {
    /// Serialize against writers of the same scope and user-wide writers.
    pub(crate) async fn acquire(&self, scope: &Scope) -> ScopeGuard<'_> {
        let user = self.users.checkout(&scope.user_id).read_owned().await;
        let key = scope.lock_key();
        let guard = self.scopes.checkout(&key).lock_owned().await;
        ScopeGuard {
            locks: self,
            user: scope.user_id.clone(),
            scope_key: Some(key),
            scope: Some(guard),
            hold: Some(UserHold::Shared(user)),
        }
    }

    /// Exclusive over every scope of `user_id`.
    pub(crate) async fn acquire_user(&self, user_id: &str) -> ScopeGuard<'_> {
        let user = self.users.checkout(user_id).write_owned().await;
        ScopeGuard {
            locks: self,
            user: user_id.to_string(),
            scope_key: None,
            scope: None,
            hold: Some(UserHold::Exclusive(user)),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.users.entries().len() + self.scopes.entries().len()
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        drop(self.scope.take());
        drop(self.hold.take());
        if let Some(key) = &self.scope_key {
            self.locks.scopes.release(key);
        }
        self.locks.users.release(&self.user);
    }
}
