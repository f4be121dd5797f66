use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    credentials::hash_if_changed,
    password::PasswordHasher,
    repo_types::{NewUser, User, UserRecord, UserRow},
};

/// Column covered by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
}

impl UniqueField {
    pub fn as_str(self) -> &'static str {
        match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
        }
    }
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} already taken")]
    Conflict(UniqueField),
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

/// Raw persistence for users. Implementations must enforce username/email
/// uniqueness themselves; callers go through [`Users`] so the hashing hook
/// always runs first.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn insert(&self, record: &UserRecord) -> Result<User, StoreError>;
    /// Writes all columns and refreshes `updated_at`.
    async fn update(&self, id: i64, record: &UserRecord) -> Result<User, StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;
}

/// User repository. The only way to persist a user.
#[derive(Clone)]
pub struct Users {
    store: Arc<dyn UserStore>,
    hasher: PasswordHasher,
}

impl Users {
    pub fn new(store: Arc<dyn UserStore>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Create a new user with hashed password.
    pub async fn create(&self, mut user: NewUser) -> Result<User, StoreError> {
        hash_if_changed(&mut user, &self.hasher)?;
        let record = UserRecord::try_from(&user)?;
        let created = self.store.insert(&record).await?;
        debug!(user_id = created.id, "user inserted");
        Ok(created)
    }

    /// Persist changes to an existing user, hashing a newly set password.
    pub async fn save(&self, user: &mut User) -> Result<(), StoreError> {
        hash_if_changed(user, &self.hasher)?;
        let record = UserRecord::try_from(&*user)?;
        *user = self.store.update(user.id, &record).await?;
        debug!(user_id = user.id, "user updated");
        Ok(())
    }

    /// Compensating removal of a user created earlier in the same request.
    pub async fn discard(&self, id: i64) -> Result<(), StoreError> {
        warn!(user_id = id, "discarding user");
        self.store.delete(id).await
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        self.store.find_by_id(id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.store.find_by_email(email).await
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.store.find_by_username(username).await
    }
}

/// Postgres-backed store. Uniqueness comes from the `UNIQUE` constraints in
/// `migrations/0001_create_users.sql`.
#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_one(&self, sql: &str, value: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(value)
            .fetch_optional(&self.db)
            .await
            .map_err(map_db_error)?;
        row.map(User::try_from).transpose().map_err(StoreError::from)
    }
}

const USER_COLUMNS: &str = "id, username, email, password_hash, role, created_at, updated_at";

#[async_trait]
impl UserStore for PgUserStore {
    async fn insert(&self, record: &UserRecord) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            INSERT INTO users (username, email, password_hash, role)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&record.username)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(map_db_error)?;
        Ok(User::try_from(row)?)
    }

    async fn update(&self, id: i64, record: &UserRecord) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            r#"
            UPDATE users
               SET username = $2, email = $3, password_hash = $4, role = $5, updated_at = now()
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&record.username)
        .bind(&record.email)
        .bind(&record.password_hash)
        .bind(record.role.as_str())
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?
        .ok_or(StoreError::NotFound)?;
        Ok(User::try_from(row)?)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .map_err(map_db_error)?;
        if res.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_db_error)?;
        row.map(User::try_from).transpose().map_err(StoreError::from)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.find_one(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"), email)
            .await
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.find_one(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"),
            username,
        )
        .await
    }
}

/// Field guarded by a named `users` unique constraint.
fn unique_field(constraint: &str) -> Option<UniqueField> {
    match constraint {
        "users_username_key" => Some(UniqueField::Username),
        "users_email_key" => Some(UniqueField::Email),
        _ => None,
    }
}

fn map_db_error(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            if let Some(field) = db.constraint().and_then(unique_field) {
                return StoreError::Conflict(field);
            }
        }
    }
    StoreError::Backend(anyhow::Error::new(e).context("users query"))
}
