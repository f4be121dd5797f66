use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::repo_types::Role;

/// JWT payload of an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,    // user ID
    pub role: Role,  // role at issue time, informational only
    pub iat: usize,  // issued at (unix timestamp)
    pub exp: usize,  // expires at (unix timestamp)
    pub iss: String, // issuer
    pub aud: String, // audience
    pub jti: Uuid,   // token ID
}
