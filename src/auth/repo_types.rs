use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Account role. Stored as its variant name in `users.role`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Role {
    Spectator,
    #[default]
    User,
    Editor,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Spectator => "Spectator",
            Role::User => "User",
            Role::Editor => "Editor",
            Role::Admin => "Admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Spectator" => Ok(Role::Spectator),
            "User" => Ok(Role::User),
            "Editor" => Ok(Role::Editor),
            "Admin" => Ok(Role::Admin),
            other => anyhow::bail!("unknown role {other:?}"),
        }
    }
}

/// Password column of a user entity.
///
/// `Changed` holds plaintext that was set since the last persist and has not
/// been hashed yet; it is the dirty state the hashing hook looks for.
#[derive(Clone, PartialEq, Eq)]
pub enum PasswordField {
    Hashed(String),
    Changed(String),
}

impl PasswordField {
    pub fn is_dirty(&self) -> bool {
        matches!(self, PasswordField::Changed(_))
    }

    /// The stored hash, or `None` while a plaintext change is pending.
    pub fn hash(&self) -> Option<&str> {
        match self {
            PasswordField::Hashed(h) => Some(h),
            PasswordField::Changed(_) => None,
        }
    }
}

impl fmt::Debug for PasswordField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PasswordField::Hashed(_) => f.write_str("Hashed(..)"),
            PasswordField::Changed(_) => f.write_str("Changed(..)"),
        }
    }
}

/// Entities carrying a password column the hashing hook applies to.
pub trait HasPassword {
    fn password_mut(&mut self) -> &mut PasswordField;
}

/// A user that has not been persisted yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: Option<String>,
    pub email: String,
    pub password: PasswordField,
    pub role: Role,
}

impl NewUser {
    pub fn new(username: Option<String>, email: String, plain_password: String, role: Role) -> Self {
        Self {
            username,
            email,
            password: PasswordField::Changed(plain_password),
            role,
        }
    }
}

impl HasPassword for NewUser {
    fn password_mut(&mut self) -> &mut PasswordField {
        &mut self.password
    }
}

/// Persisted user account. The password never serializes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    #[serde(skip_serializing)]
    pub(crate) password: PasswordField,
    pub role: Role,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl User {
    /// Current password hash; `None` while a new password awaits `save`.
    pub fn password_hash(&self) -> Option<&str> {
        self.password.hash()
    }

    pub fn set_password(&mut self, plain: impl Into<String>) {
        self.password = PasswordField::Changed(plain.into());
    }

    pub fn set_role(&mut self, role: Role) {
        self.role = role;
    }

    pub fn set_username(&mut self, username: Option<String>) {
        self.username = username;
    }

    pub fn set_email(&mut self, email: impl Into<String>) {
        self.email = email.into();
    }
}

impl HasPassword for User {
    fn password_mut(&mut self) -> &mut PasswordField {
        &mut self.password
    }
}

/// Column values handed to a storage backend. Only constructible from an
/// entity whose password is already hashed.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub username: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

impl TryFrom<&NewUser> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(u: &NewUser) -> Result<Self, Self::Error> {
        Ok(Self {
            username: u.username.clone(),
            email: u.email.clone(),
            password_hash: hashed_or_bail(&u.password)?,
            role: u.role,
        })
    }
}

impl TryFrom<&User> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(u: &User) -> Result<Self, Self::Error> {
        Ok(Self {
            username: u.username.clone(),
            email: u.email.clone(),
            password_hash: hashed_or_bail(&u.password)?,
            role: u.role,
        })
    }
}

fn hashed_or_bail(field: &PasswordField) -> anyhow::Result<String> {
    field
        .hash()
        .map(str::to_owned)
        .ok_or_else(|| anyhow::anyhow!("refusing to persist an unhashed password"))
}

/// Row of the `users` table.
#[derive(Debug, Clone, FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: Option<String>,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            username: r.username,
            email: r.email,
            password: PasswordField::Hashed(r.password_hash),
            role: r.role.parse()?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
