//! Credential store: registration, password verification and profile/role mutation.

use crate::{
    error::AppError,
    models::{Credential, NewCredential, ProfileChanges, Role, User},
    password::{self, PasswordHasher},
    repository::RepositoryState,
};
use uuid::Uuid;

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;

/// Trims and lower-cases an email and checks its basic shape (`local@domain.tld`).
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(email)
    } else {
        Err(AppError::validation("email", "must be a valid email address"))
    }
}

/// Handles are 3–30 characters of ASCII letters, digits and underscores.
pub fn validate_username(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    let len = name.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return Err(AppError::validation(
            "username",
            format!("must be between {USERNAME_MIN} and {USERNAME_MAX} characters"),
        ));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::validation(
            "username",
            "may only contain letters, digits and underscores",
        ));
    }
    Ok(name.to_string())
}

#[derive(Clone)]
pub struct CredentialService {
    repo: RepositoryState,
    hasher: PasswordHasher,
}

impl CredentialService {
    pub fn new(repo: RepositoryState, hasher: PasswordHasher) -> Self {
        Self { repo, hasher }
    }

    /// register
    ///
    /// Creates a credential with a freshly salted hash. `admin` is never self-assignable;
    /// admins are made through [`CredentialService::set_role`].
    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
        role: Role,
        photo: Option<String>,
    ) -> Result<Credential, AppError> {
        let username = validate_username(username)?;
        let email = normalize_email(email)?;
        password::validate_strength(password)?;
        if role == Role::Admin {
            return Err(AppError::validation("role", "must be 'reader' or 'author'"));
        }

        let password_hash = self.hasher.hash(password).await?;
        let credential = self
            .repo
            .insert_user(NewCredential {
                username,
                email,
                password_hash,
                role,
                photo,
            })
            .await?;

        tracing::info!(user_id = %credential.id, role = %credential.role, "user registered");
        Ok(credential)
    }

    /// verify_password
    ///
    /// Unknown email and wrong password produce the same error after the same amount of
    /// hashing work.
    pub async fn verify_password(&self, email: &str, password: &str) -> Result<Credential, AppError> {
        let email = email.trim().to_lowercase();

        let Some(credential) = self.repo.find_user_by_email(&email).await? else {
            self.hasher.verify_decoy(password).await?;
            tracing::info!("login rejected");
            return Err(AppError::Authentication);
        };

        if self.hasher.verify(password, &credential.password_hash).await? {
            Ok(credential)
        } else {
            tracing::info!("login rejected");
            Err(AppError::Authentication)
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Credential, AppError> {
        self.repo
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    pub async fn list(&self) -> Result<Vec<User>, AppError> {
        Ok(self
            .repo
            .list_users()
            .await?
            .into_iter()
            .map(User::from)
            .collect())
    }

    /// update_profile
    ///
    /// Handle, email and photo only. Uniqueness is re-checked by the store.
    pub async fn update_profile(
        &self,
        id: Uuid,
        username: Option<&str>,
        email: Option<&str>,
        photo: Option<String>,
    ) -> Result<Credential, AppError> {
        let changes = ProfileChanges {
            username: username.map(validate_username).transpose()?,
            email: email.map(normalize_email).transpose()?,
            photo,
        };
        self.repo
            .update_profile(id, changes)
            .await?
            .ok_or_else(|| AppError::not_found("user", id))
    }

    /// set_role
    ///
    /// The only path that changes a role. Callers must already hold the admin role; an admin
    /// cannot demote themselves.
    pub async fn set_role(&self, acting_admin: Uuid, target: Uuid, role: Role) -> Result<Credential, AppError> {
        if acting_admin == target && role != Role::Admin {
            return Err(AppError::Conflict("admins cannot demote themselves".to_string()));
        }
        let updated = self
            .repo
            .set_role(target, role)
            .await?
            .ok_or_else(|| AppError::not_found("user", target))?;
        tracing::warn!(admin_id = %acting_admin, user_id = %target, role = %role, "role changed");
        Ok(updated)
    }

    /// Deletes a credential and, by cascade, everything it owns.
    pub async fn delete(&self, acting_admin: Uuid, target: Uuid) -> Result<(), AppError> {
        if acting_admin == target {
            return Err(AppError::Conflict("admins cannot delete themselves".to_string()));
        }
        if !self.repo.delete_user(target).await? {
            return Err(AppError::not_found("user", target));
        }
        tracing::warn!(admin_id = %acting_admin, user_id = %target, "user deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email("  Alice@Example.COM ").unwrap(), "alice@example.com");
        assert!(normalize_email("alice").is_err());
        assert!(normalize_email("alice@localhost").is_err());
        assert!(normalize_email("a@b@c.com").is_err());
        assert!(normalize_email("@example.com").is_err());
    }

    #[test]
    fn username_rules() {
        assert_eq!(validate_username(" alice_1 ").unwrap(), "alice_1");
        assert!(validate_username("al").is_err());
        assert!(validate_username("alice smith").is_err());
        assert!(validate_username(&"a".repeat(31)).is_err());
    }
}
