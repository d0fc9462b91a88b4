use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{Credential, Role},
};

/// Claims
///
/// The payload signed into every session token (HS256). `exp` and `iat` are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Subject: the credential id.
    pub sub: Uuid,
    /// Role at the time of issuance. Trusted only after the signature verifies.
    pub role: Role,
    /// Absolute expiry.
    pub exp: i64,
    /// Issued at.
    pub iat: i64,
}

/// The identity and role proven by a valid session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub role: Role,
}

/// SessionIssuer
///
/// Mints and verifies stateless session tokens. There is no server-side session table:
/// logout is the client discarding its token, and a leaked token stays valid until `exp`.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a token for `credential` valid for the configured TTL from now.
    pub fn issue(&self, credential: &Credential) -> Result<String, AppError> {
        self.issue_at(credential.id, credential.role, Utc::now())
    }

    pub fn issue_at(&self, id: Uuid, role: Role, now: DateTime<Utc>) -> Result<String, AppError> {
        let claims = Claims {
            sub: id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("failed to sign session token: {e}")))
    }

    /// Verifies a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Principal, AppError> {
        self.verify_at(token, Utc::now())
    }

    /// verify_at
    ///
    /// Checks the signature with the library and the expiry against `now` here, so the
    /// clock is explicit. Malformed, forged and expired tokens all collapse into
    /// [`AppError::Authentication`].
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Principal, AppError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!("session token rejected: {:?}", e.kind());
            AppError::Authentication
        })?;

        if now.timestamp() >= data.claims.exp {
            tracing::debug!("session token rejected: expired");
            return Err(AppError::Authentication);
        }

        Ok(Principal {
            id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> SessionIssuer {
        SessionIssuer::new("unit-test-secret", Duration::hours(1))
    }

    #[test]
    fn round_trip_carries_identity_and_role() {
        let issuer = issuer();
        let id = Uuid::new_v4();
        let now = Utc::now();
        let token = issuer.issue_at(id, Role::Author, now).unwrap();

        let principal = issuer.verify_at(&token, now + Duration::minutes(59)).unwrap();
        assert_eq!(principal, Principal { id, role: Role::Author });
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = issuer();
        let now = Utc::now();
        let token = issuer.issue_at(Uuid::new_v4(), Role::Reader, now).unwrap();

        let err = issuer.verify_at(&token, now + Duration::hours(2)).unwrap_err();
        assert!(matches!(err, AppError::Authentication));
        // Exactly at expiry is already too late.
        assert!(issuer.verify_at(&token, now + Duration::hours(1)).is_err());
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let now = Utc::now();
        let forged = SessionIssuer::new("other-secret", Duration::hours(1))
            .issue_at(Uuid::new_v4(), Role::Admin, now)
            .unwrap();
        assert!(matches!(
            issuer().verify_at(&forged, now),
            Err(AppError::Authentication)
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(matches!(
            issuer().verify("not.a.token"),
            Err(AppError::Authentication)
        ));
        assert!(matches!(issuer().verify(""), Err(AppError::Authentication)));
    }
}
