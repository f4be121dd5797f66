use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::{dto::RegisterRequest, repo::Users};

pub const USERNAME_MIN_LEN: usize = 3;
pub const PASSWORD_MIN_LEN: usize = 6;

/// One failed rule on one input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub rule: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, rule: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            rule,
            message: message.into(),
        }
    }
}

/// Outcome of checking a request. `Invalid` carries at most one error per
/// field: the first rule that failed.
#[derive(Debug)]
pub enum Validation<T> {
    Valid(T),
    Invalid(Vec<FieldError>),
}

/// Registration input after trimming and rule checks.
#[derive(Debug, Clone)]
pub struct RegisterPayload {
    pub username: String,
    pub email: String,
    pub password: String,
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Trimmed, non-empty value or `None`.
fn trimmed(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
}

fn required(field: &'static str) -> FieldError {
    FieldError::new(field, "required", format!("{field} is required"))
}

/// Checks a registration request. Uniqueness is pre-checked against `users`
/// here; the store still enforces it on insert.
pub async fn validate_registration(
    users: &Users,
    req: &RegisterRequest,
) -> anyhow::Result<Validation<RegisterPayload>> {
    let mut errors = Vec::new();

    let username = match trimmed(&req.username) {
        None => {
            errors.push(required("username"));
            None
        }
        Some(u) if u.chars().count() < USERNAME_MIN_LEN => {
            errors.push(FieldError::new(
                "username",
                "minLength",
                format!("username must be at least {USERNAME_MIN_LEN} characters"),
            ));
            None
        }
        Some(u) => {
            if users.find_by_username(&u).await?.is_some() {
                errors.push(FieldError::new("username", "unique", "username already taken"));
                None
            } else {
                Some(u)
            }
        }
    };

    let email = match trimmed(&req.email) {
        None => {
            errors.push(required("email"));
            None
        }
        Some(e) if !is_valid_email(&e) => {
            errors.push(FieldError::new("email", "email", "email must be a valid address"));
            None
        }
        Some(e) => {
            if users.find_by_email(&e).await?.is_some() {
                errors.push(FieldError::new("email", "unique", "email already taken"));
                None
            } else {
                Some(e)
            }
        }
    };

    let password = match trimmed(&req.password) {
        None => {
            errors.push(required("password"));
            None
        }
        Some(p) if p.chars().count() < PASSWORD_MIN_LEN => {
            errors.push(FieldError::new(
                "password",
                "minLength",
                format!("password must be at least {PASSWORD_MIN_LEN} characters"),
            ));
            None
        }
        Some(p) => {
            let confirmation = req.password_confirmation.as_deref().map(str::trim);
            if confirmation != Some(p.as_str()) {
                errors.push(FieldError::new(
                    "passwordConfirmation",
                    "confirmed",
                    "passwordConfirmation does not match password",
                ));
                None
            } else {
                Some(p)
            }
        }
    };

    match (username, email, password) {
        (Some(username), Some(email), Some(password)) if errors.is_empty() => {
            Ok(Validation::Valid(RegisterPayload {
                username,
                email,
                password,
            }))
        }
        _ => Ok(Validation::Invalid(errors)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::{
        memory::MemoryUserStore,
        password::test_hasher,
        repo_types::{NewUser, Role},
    };

    fn users() -> Users {
        Users::new(Arc::new(MemoryUserStore::default()), test_hasher())
    }

    fn req(username: &str, email: &str, password: &str, confirmation: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            password: Some(password.into()),
            password_confirmation: Some(confirmation.into()),
        }
    }

    fn fields(v: Validation<RegisterPayload>) -> Vec<(&'static str, &'static str)> {
        match v {
            Validation::Valid(p) => panic!("expected invalid, got {p:?}"),
            Validation::Invalid(errs) => errs.iter().map(|e| (e.field, e.rule)).collect(),
        }
    }

    #[tokio::test]
    async fn accepts_and_trims_valid_input() {
        let v = validate_registration(
            &users(),
            &req("  alice ", " alice@example.com ", " secret1 ", "secret1"),
        )
        .await
        .unwrap();
        let Validation::Valid(p) = v else {
            panic!("expected valid");
        };
        assert_eq!(p.username, "alice");
        assert_eq!(p.email, "alice@example.com");
        assert_eq!(p.password, "secret1");
    }

    #[tokio::test]
    async fn reports_missing_fields() {
        let empty = RegisterRequest {
            username: None,
            email: Some("   ".into()),
            password: None,
            password_confirmation: None,
        };
        let v = validate_registration(&users(), &empty).await.unwrap();
        assert_eq!(
            fields(v),
            vec![
                ("username", "required"),
                ("email", "required"),
                ("password", "required")
            ]
        );
    }

    #[tokio::test]
    async fn enforces_lengths_and_format() {
        let v = validate_registration(&users(), &req("al", "not-an-email", "12345", "12345"))
            .await
            .unwrap();
        assert_eq!(
            fields(v),
            vec![
                ("username", "minLength"),
                ("email", "email"),
                ("password", "minLength")
            ]
        );
    }

    #[tokio::test]
    async fn mismatched_confirmation_names_confirmation_field() {
        let v = validate_registration(&users(), &req("alice", "alice@example.com", "secret1", "secret2"))
            .await
            .unwrap();
        assert_eq!(fields(v), vec![("passwordConfirmation", "confirmed")]);
    }

    #[tokio::test]
    async fn confirmation_is_compared_after_trimming() {
        let v = validate_registration(&users(), &req("alice", "alice@example.com", " secret1 ", "  secret1"))
            .await
            .unwrap();
        let Validation::Valid(p) = v else {
            panic!("expected valid");
        };
        assert_eq!(p.password, "secret1");

        let v = validate_registration(&users(), &req("alice", "alice@example.com", "secret1", "secret1x "))
            .await
            .unwrap();
        assert_eq!(fields(v), vec![("passwordConfirmation", "confirmed")]);
    }

    #[tokio::test]
    async fn missing_confirmation_is_a_mismatch() {
        let mut r = req("alice", "alice@example.com", "secret1", "");
        r.password_confirmation = None;
        let v = validate_registration(&users(), &r).await.unwrap();
        assert_eq!(fields(v), vec![("passwordConfirmation", "confirmed")]);
    }

    #[tokio::test]
    async fn rejects_taken_username_and_email() {
        let users = users();
        users
            .create(NewUser::new(
                Some("alice".into()),
                "alice@example.com".into(),
                "secret1".into(),
                Role::User,
            ))
            .await
            .unwrap();
        let v = validate_registration(&users, &req("alice", "alice@example.com", "secret1", "secret1"))
            .await
            .unwrap();
        assert_eq!(fields(v), vec![("username", "unique"), ("email", "unique")]);
    }

    #[test]
    fn email_shapes() {
        assert!(is_valid_email("alice@example.com"));
        assert!(!is_valid_email("alice@example"));
        assert!(!is_valid_email("alice example.com"));
        assert!(!is_valid_email("@example.com"));
    }
}
