use serde::Serialize;
use serde_json::Value;

use super::{jwt::AccessToken, repo_types::User, validation::FieldError};

/// Request body for user registration. Fields are optional so a missing one
/// is reported as a validation error instead of a JSON rejection.
#[derive(Debug, Default)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

impl RegisterRequest {
    /// Reads the camelCase fields out of a JSON body. A field that is present
    /// but not a string fails the `string` rule; `null` counts as missing.
    pub fn from_json(body: &Value) -> Result<Self, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut field = |name: &'static str| match body.get(name) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                errors.push(FieldError::new(name, "string", format!("{name} must be a string")));
                None
            }
        };

        let req = Self {
            username: field("username"),
            email: field("email"),
            password: field("password"),
            password_confirmation: field("passwordConfirmation"),
        };

        if errors.is_empty() {
            Ok(req)
        } else {
            Err(errors)
        }
    }
}

/// Response returned after a successful registration.
#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub user: User,
    pub token: AccessToken,
}
