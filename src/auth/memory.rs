use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use super::{
    repo::{StoreError, UniqueField, UserStore},
    repo_types::{PasswordField, User, UserRecord},
};

/// In-process store with the same uniqueness semantics as the `users` table.
/// Check and write happen under one lock, so concurrent inserts of the same
/// username or email serialize and only the first wins.
#[derive(Default)]
pub struct MemoryUserStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    next_id: i64,
    users: BTreeMap<i64, User>,
}

impl Inner {
    fn check_unique(&self, record: &UserRecord, skip_id: Option<i64>) -> Result<(), StoreError> {
        for u in self.users.values().filter(|u| Some(u.id) != skip_id) {
            if record.username.is_some() && u.username == record.username {
                return Err(StoreError::Conflict(UniqueField::Username));
            }
            if u.email == record.email {
                return Err(StoreError::Conflict(UniqueField::Email));
            }
        }
        Ok(())
    }
}

impl MemoryUserStore {
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Backend(anyhow::anyhow!("user store lock poisoned")))
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("user store lock").users.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn insert(&self, record: &UserRecord) -> Result<User, StoreError> {
        let mut inner = self.lock()?;
        inner.check_unique(record, None)?;
        inner.next_id += 1;
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: inner.next_id,
            username: record.username.clone(),
            email: record.email.clone(),
            password: PasswordField::Hashed(record.password_hash.clone()),
            role: record.role,
            created_at: now,
            updated_at: now,
        };
        inner.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update(&self, id: i64, record: &UserRecord) -> Result<User, StoreError> {
        let mut inner = self.lock()?;
        inner.check_unique(record, Some(id))?;
        let user = inner.users.get_mut(&id).ok_or(StoreError::NotFound)?;
        user.username = record.username.clone();
        user.email = record.email.clone();
        user.password = PasswordField::Hashed(record.password_hash.clone());
        user.role = record.role;
        user.updated_at = OffsetDateTime::now_utc();
        Ok(user.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        self.lock()?
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.lock()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self
            .lock()?
            .users
            .values()
            .find(|u| u.username.as_deref() == Some(username))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::Role;

    fn record(username: &str, email: &str) -> UserRecord {
        UserRecord {
            username: Some(username.into()),
            email: email.into(),
            password_hash: "$argon2id$stub".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn assigns_increasing_ids() {
        let store = MemoryUserStore::default();
        let a = store.insert(&record("alice", "a@x.io")).await.unwrap();
        let b = store.insert(&record("bob", "b@x.io")).await.unwrap();
        assert!(b.id > a.id);
        assert_eq!(a.created_at, a.updated_at);
    }

    #[tokio::test]
    async fn rejects_duplicate_username() {
        let store = MemoryUserStore::default();
        store.insert(&record("alice", "a@x.io")).await.unwrap();
        let err = store.insert(&record("alice", "other@x.io")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Username)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn missing_usernames_do_not_collide() {
        let store = MemoryUserStore::default();
        let mut a = record("x", "a@x.io");
        a.username = None;
        let mut b = record("y", "b@x.io");
        b.username = None;
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn update_may_keep_own_email() {
        let store = MemoryUserStore::default();
        let a = store.insert(&record("alice", "a@x.io")).await.unwrap();
        store.insert(&record("bob", "b@x.io")).await.unwrap();

        let mut same = record("alice", "a@x.io");
        same.role = Role::Admin;
        assert_eq!(store.update(a.id, &same).await.unwrap().role, Role::Admin);

        let taken = record("alice", "b@x.io");
        let err = store.update(a.id, &taken).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(UniqueField::Email)));
    }
}
