use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Argon2id cost parameters used for new password hashes.
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordConfig {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // argon2 crate defaults (OWASP minimum for Argon2id)
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET").context("JWT_SECRET is not set")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "signup".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "signup-users".into()),
        };
        let defaults = PasswordConfig::default();
        let password = PasswordConfig {
            memory_kib: env_u32("ARGON2_MEMORY_KIB").unwrap_or(defaults.memory_kib),
            iterations: env_u32("ARGON2_ITERATIONS").unwrap_or(defaults.iterations),
            parallelism: env_u32("ARGON2_PARALLELISM").unwrap_or(defaults.parallelism),
        };
        Ok(Self {
            database_url,
            jwt,
            password,
        })
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse::<u32>().ok())
}
