//! Password reset flow.
//!
//! Per credential: `NoTicket -> Requested -> {Consumed | Expired}`. A ticket is a random
//! 256-bit secret; only its SHA-256 digest is stored, the plaintext goes straight to the
//! mailer. Expiry is checked lazily when a ticket is consumed.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    error::AppError,
    mailer::{MailerState, ResetMail},
    models::ResetTicket,
    password::{self, PasswordHasher},
    repository::RepositoryState,
};

/// 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes)
}

/// The stored form of a secret.
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

#[derive(Clone)]
pub struct PasswordResetFlow {
    repo: RepositoryState,
    hasher: PasswordHasher,
    mailer: MailerState,
    ttl: Duration,
    reset_url_base: String,
}

impl PasswordResetFlow {
    pub fn new(
        repo: RepositoryState,
        hasher: PasswordHasher,
        mailer: MailerState,
        ttl: Duration,
        reset_url_base: &str,
    ) -> Self {
        Self {
            repo,
            hasher,
            mailer,
            ttl,
            reset_url_base: reset_url_base.trim_end_matches('/').to_string(),
        }
    }

    pub async fn request_reset(&self, email: &str) -> Result<(), AppError> {
        self.request_reset_at(email, Utc::now()).await
    }

    /// request_reset_at
    ///
    /// Succeeds whether or not the email is registered. For a known email it replaces any
    /// open ticket and hands the plaintext to the mailer; a delivery failure is logged and
    /// otherwise invisible to the caller.
    pub async fn request_reset_at(&self, email: &str, now: DateTime<Utc>) -> Result<(), AppError> {
        let email = email.trim().to_lowercase();
        let Some(credential) = self.repo.find_user_by_email(&email).await? else {
            tracing::debug!("reset requested for unknown email");
            return Ok(());
        };

        let secret = generate_secret();
        let ticket = ResetTicket {
            id: Uuid::new_v4(),
            user_id: credential.id,
            token_hash: hash_secret(&secret),
            issued_at: now,
            expires_at: now + self.ttl,
            consumed_at: None,
        };
        self.repo.replace_reset_ticket(ticket).await?;
        tracing::info!(user_id = %credential.id, "reset ticket issued");

        let mail = ResetMail {
            to: credential.email,
            username: credential.username,
            link: format!("{}/{}", self.reset_url_base, secret),
            secret,
        };
        if let Err(e) = self.mailer.send_reset(mail).await {
            tracing::error!(user_id = %credential.id, "reset mail delivery failed: {}", e);
        }
        Ok(())
    }

    pub async fn consume_reset(&self, secret: &str, new_password: &str) -> Result<(), AppError> {
        self.consume_reset_at(secret, new_password, Utc::now()).await
    }

    /// consume_reset_at
    ///
    /// The new password is hashed first; the store then claims the ticket and swaps the
    /// hash in one atomic step. Unknown, expired and already used secrets are the same
    /// [`AppError::Authentication`].
    pub async fn consume_reset_at(
        &self,
        secret: &str,
        new_password: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        password::validate_strength(new_password)?;
        let new_hash = self.hasher.hash(new_password).await?;

        match self
            .repo
            .consume_reset_ticket(&hash_secret(secret.trim()), &new_hash, now)
            .await?
        {
            Some(user_id) => {
                tracing::info!(user_id = %user_id, "password reset completed");
                Ok(())
            }
            None => {
                tracing::info!("reset ticket rejected");
                Err(AppError::Authentication)
            }
        }
    }
}
