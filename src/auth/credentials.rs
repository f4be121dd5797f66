use tracing::debug;

use super::{
    password::PasswordHasher,
    repo_types::{HasPassword, PasswordField},
};

/// Pre-persist hook: hashes the password column if it changed since the last
/// save. An already-hashed value is left untouched.
///
/// Every create/update path in [`super::repo::Users`] calls this before the
/// write reaches a store.
pub fn hash_if_changed<E: HasPassword>(entity: &mut E, hasher: &PasswordHasher) -> anyhow::Result<()> {
    let field = entity.password_mut();
    if let PasswordField::Changed(plain) = &*field {
        let hash = hasher.hash(plain)?;
        *field = PasswordField::Hashed(hash);
        debug!("password hashed before save");
    }
    Ok(())
}
