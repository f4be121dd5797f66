use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, StatusCode},
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::Serialize;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{claims::Claims, repo_types::User};
use crate::{config::JwtConfig, state::AppState};

/// Bearer credential issued for one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessToken {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub token: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Validity window in seconds.
    pub expires_in: u64,
    #[serde(skip)]
    pub user_id: i64,
}

/// Issues access tokens for users. The token format is up to the
/// implementation; it only has to be accepted by [`AuthUser`].
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn issue(&self, user: &User, expires_in: Duration) -> anyhow::Result<AccessToken>;
}

/// HS256 signing and verification keys.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
        }
    }

    pub fn sign(&self, user: &User, ttl: Duration) -> anyhow::Result<AccessToken> {
        let now = OffsetDateTime::now_utc();
        let ttl_secs = i64::try_from(ttl.as_secs())?;
        let exp = now + TimeDuration::seconds(ttl_secs);
        let claims = Claims {
            sub: user.id,
            role: user.role,
            iat: now.unix_timestamp() as usize,
            exp: exp.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            jti: Uuid::new_v4(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = user.id, jti = %claims.jti, "jwt signed");
        Ok(AccessToken {
            kind: "bearer",
            token,
            expires_at: exp,
            expires_in: ttl.as_secs(),
            user_id: user.id,
        })
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        let data = decode::<Claims>(token, &self.decoding, &validation)?;
        debug!(user_id = data.claims.sub, "jwt verified");
        Ok(data.claims)
    }
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

#[async_trait]
impl TokenIssuer for JwtKeys {
    async fn issue(&self, user: &User, expires_in: Duration) -> anyhow::Result<AccessToken> {
        self.sign(user, expires_in)
    }
}

/// Extracts and validates the bearer token, returning the user ID.
pub struct AuthUser(pub i64);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let keys = JwtKeys::from_ref(state);
        let auth_header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Missing Authorization header".to_string(),
            ))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .or_else(|| auth_header.strip_prefix("bearer "))
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header".to_string(),
            ))?;

        let claims = match keys.verify(token) {
            Ok(c) => c,
            Err(_) => {
                warn!("invalid or expired token");
                return Err((
                    StatusCode::UNAUTHORIZED,
                    "Invalid or expired token".to_string(),
                ));
            }
        };

        Ok(AuthUser(claims.sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::repo_types::{PasswordField, Role};

    fn make_keys(secret: &str, issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: secret.into(),
            issuer: issuer.into(),
            audience: audience.into(),
        })
    }

    fn user(id: i64) -> User {
        User {
            id,
            username: Some("alice".into()),
            email: "alice@example.com".into(),
            password: PasswordField::Hashed("$argon2id$stub".into()),
            role: Role::User,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    const TEN_DAYS: Duration = Duration::from_secs(10 * 24 * 60 * 60);

    #[tokio::test]
    async fn issue_and_verify_access_token() {
        let keys = make_keys("dev-secret", "test-issuer", "test-aud");
        let token = keys.issue(&user(42), TEN_DAYS).await.expect("issue");
        let claims = keys.verify(&token.token).expect("verify token");
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.exp - claims.iat, TEN_DAYS.as_secs() as usize);
    }

    #[tokio::test]
    async fn token_reports_its_validity_window() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let before = OffsetDateTime::now_utc();
        let token = keys.issue(&user(1), TEN_DAYS).await.unwrap();
        assert_eq!(token.kind, "bearer");
        assert_eq!(token.expires_in, 864_000);
        assert_eq!(token.user_id, 1);
        let window = token.expires_at - before;
        assert!(window >= TimeDuration::days(10) - TimeDuration::seconds(1));
        assert!(window <= TimeDuration::days(10) + TimeDuration::seconds(5));
    }

    #[tokio::test]
    async fn each_token_is_unique() {
        let keys = make_keys("dev-secret", "iss", "aud");
        let a = keys.issue(&user(1), TEN_DAYS).await.unwrap();
        let b = keys.issue(&user(1), TEN_DAYS).await.unwrap();
        assert_ne!(a.token, b.token);
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = make_keys("same-secret", "good-iss", "good-aud");
        let bad_keys = make_keys("same-secret", "bad-iss", "bad-aud");
        let token = good_keys.issue(&user(1), TEN_DAYS).await.unwrap();
        assert!(bad_keys.verify(&token.token).is_err());
    }

    #[tokio::test]
    async fn state_keys_accept_state_issued_tokens() {
        let state = AppState::fake();
        let token = state.tokens.issue(&user(7), TEN_DAYS).await.unwrap();
        let claims = JwtKeys::from_ref(&state).verify(&token.token).unwrap();
        assert_eq!(claims.sub, 7);
        assert_eq!(claims.iss, state.config.jwt.issuer);
        assert_eq!(claims.aud, state.config.jwt.audience);
    }

    #[tokio::test]
    async fn verify_rejects_other_secret() {
        let a = make_keys("secret-a", "iss", "aud");
        let b = make_keys("secret-b", "iss", "aud");
        let token = a.issue(&user(1), TEN_DAYS).await.unwrap();
        assert!(b.verify(&token.token).is_err());
    }
}
