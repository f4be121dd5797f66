use std::time::Duration;

use tracing::{error, info, warn};

use super::{
    dto::RegisterRequest,
    error::RegisterError,
    jwt::{AccessToken, TokenIssuer},
    repo::Users,
    repo_types::{NewUser, Role, User},
    validation::{validate_registration, Validation},
};

/// Lifetime of the token handed out at registration.
pub const REGISTRATION_TOKEN_TTL: Duration = Duration::from_secs(10 * 24 * 60 * 60);

#[derive(Debug)]
pub struct Registered {
    pub user: User,
    pub token: AccessToken,
}

/// Validate, create the user, then issue its first token.
///
/// Nothing is written unless validation passes. If token issuance fails the
/// freshly created user is discarded, so a failed request never leaves an
/// account behind.
pub async fn register(
    users: &Users,
    tokens: &dyn TokenIssuer,
    req: RegisterRequest,
) -> Result<Registered, RegisterError> {
    let payload = match validate_registration(users, &req).await? {
        Validation::Valid(p) => p,
        Validation::Invalid(errors) => {
            warn!(fields = ?errors.iter().map(|e| e.field).collect::<Vec<_>>(), "registration rejected");
            return Err(RegisterError::Validation(errors));
        }
    };

    // Role is fixed here; clients cannot pick it.
    let new_user = NewUser::new(
        Some(payload.username),
        payload.email,
        payload.password,
        Role::User,
    );
    let user = match users.create(new_user).await {
        Ok(u) => u,
        Err(e) => {
            warn!(error = %e, "create user failed");
            return Err(e.into());
        }
    };

    let token = match tokens.issue(&user, REGISTRATION_TOKEN_TTL).await {
        Ok(t) => t,
        Err(e) => {
            error!(error = %e, user_id = user.id, "token issuance failed; rolling back user");
            if let Err(rollback) = users.discard(user.id).await {
                error!(error = %rollback, user_id = user.id, "rollback failed; user left orphaned");
            }
            return Err(RegisterError::TokenIssuance(e));
        }
    };

    info!(user_id = user.id, "user registered");
    Ok(Registered { user, token })
}
