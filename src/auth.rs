use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::Role,
    session::{Principal, SessionIssuer},
};

/// guard
///
/// The access control gate in front of every protected operation:
/// 1. verify the session token (propagating [`AppError::Authentication`]),
/// 2. if `required` is non-empty, require the verified role to be one of them
///    ([`AppError::Authorization`] otherwise),
/// 3. hand back the verified identity.
///
/// Pure: no I/O, no state.
pub fn guard(issuer: &SessionIssuer, token: &str, required: &[Role]) -> Result<AuthUser, AppError> {
    let Principal { id, role } = issuer.verify(token)?;
    let user = AuthUser { id, role };
    user.require(required)?;
    Ok(user)
}

/// AuthUser
///
/// The resolved identity of an authenticated request, as proven by its session token.
/// Handlers use it to attribute actions and to run role and ownership checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: Role,
}

impl AuthUser {
    /// Exact-match membership against an allow-list. An empty list admits every role.
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.is_empty() || allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::forbidden(format!(
                "role '{}' may not perform this action",
                self.role
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Passes when the caller is `owner`, or an admin.
    pub fn require_owner_or_admin(&self, owner: Uuid) -> Result<(), AppError> {
        if self.id == owner || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("only the owner or an admin may do this"))
        }
    }
}

/// Pulls the raw token out of an `Authorization: Bearer <token>` header.
pub fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AppError::Authentication)
}

/// AuthUser Extractor Implementation
///
/// Runs [`guard`] with no role requirement, so any handler taking an `AuthUser` argument is
/// authenticated before its body runs. Role requirements are applied explicitly inside each
/// handler with [`AuthUser::require`].
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionIssuer: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let issuer = SessionIssuer::from_ref(state);
        let token = bearer_token(parts)?;
        guard(&issuer, token, &[])
    }
}
