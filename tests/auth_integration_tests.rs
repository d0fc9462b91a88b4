use axum::{
    extract::FromRequestParts,
    http::{Request, header, request::Parts},
};
use chrono::{Duration, Utc};
use inkwell::{
    AppConfig, AppError, AppState,
    auth::{AuthUser, guard},
    mailer::{MailerState, RecordingMailer},
    models::Role,
    password::PasswordHasher,
    repository::{MemoryRepository, RepositoryState},
    services::{CredentialService, PasswordResetFlow},
    session::SessionIssuer,
};
use std::sync::Arc;
use uuid::Uuid;

// --- Helpers ---

fn test_state() -> AppState {
    AppState::new(
        AppConfig::default(),
        Arc::new(MemoryRepository::new()) as RepositoryState,
        Arc::new(RecordingMailer::new()) as MailerState,
    )
    .expect("state")
}

fn parts_with_auth(value: Option<&str>) -> Parts {
    let mut builder = Request::builder().uri("/user/logout");
    if let Some(value) = value {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(()).unwrap().into_parts().0
}

struct ResetFixture {
    credentials: CredentialService,
    flow: PasswordResetFlow,
    mailer: RecordingMailer,
}

fn reset_fixture(mailer: RecordingMailer) -> ResetFixture {
    let config = AppConfig::default();
    let repo = Arc::new(MemoryRepository::new()) as RepositoryState;
    let hasher = PasswordHasher::new(&config.argon2).unwrap();
    ResetFixture {
        credentials: CredentialService::new(repo.clone(), hasher.clone()),
        flow: PasswordResetFlow::new(
            repo,
            hasher,
            Arc::new(mailer.clone()) as MailerState,
            Duration::minutes(15),
            "https://blog.test/reset/",
        ),
        mailer,
    }
}

// --- AuthUser Extractor ---

#[tokio::test]
async fn test_extractor_accepts_bearer_token() {
    let state = test_state();
    let id = Uuid::new_v4();
    let token = state.sessions.issue_at(id, Role::Author, Utc::now()).unwrap();

    let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
    let user = AuthUser::from_request_parts(&mut parts, &state).await.unwrap();

    assert_eq!(user.id, id);
    assert_eq!(user.role, Role::Author);
}

#[tokio::test]
async fn test_extractor_rejects_missing_or_foreign_schemes() {
    let state = test_state();

    for header_value in [None, Some("Basic dXNlcjpwYXNz"), Some("Bearer "), Some("Bearer junk")] {
        let mut parts = parts_with_auth(header_value);
        let err = AuthUser::from_request_parts(&mut parts, &state)
            .await
            .unwrap_err();
        assert!(
            matches!(err, AppError::Authentication),
            "expected authentication failure for {header_value:?}"
        );
    }
}

#[tokio::test]
async fn test_extractor_rejects_tokens_signed_with_another_secret() {
    let state = test_state();
    let foreign = SessionIssuer::new("some-other-secret", Duration::hours(1));
    let token = foreign
        .issue_at(Uuid::new_v4(), Role::Admin, Utc::now())
        .unwrap();

    let mut parts = parts_with_auth(Some(&format!("Bearer {token}")));
    let err = AuthUser::from_request_parts(&mut parts, &state)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));
}

// --- Session Expiry & Guard ---

#[test]
fn test_one_hour_session_is_rejected_two_hours_later() {
    let issuer = SessionIssuer::new("expiry-secret", Duration::hours(1));
    let issued = Utc::now();
    let token = issuer.issue_at(Uuid::new_v4(), Role::Reader, issued).unwrap();

    assert!(issuer.verify_at(&token, issued + Duration::minutes(59)).is_ok());
    let err = issuer
        .verify_at(&token, issued + Duration::hours(2))
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));
}

#[test]
fn test_guard_role_allow_lists() {
    let issuer = SessionIssuer::new("guard-secret", Duration::hours(1));
    let author = issuer
        .issue_at(Uuid::new_v4(), Role::Author, Utc::now())
        .unwrap();

    assert!(guard(&issuer, &author, &[Role::Author, Role::Admin]).is_ok());
    assert!(matches!(
        guard(&issuer, &author, &[Role::Admin]),
        Err(AppError::Authorization(_))
    ));
}

// --- Credential Verification ---

#[tokio::test]
async fn test_registered_password_is_the_only_one_accepted() {
    let fx = reset_fixture(RecordingMailer::new());
    let created = fx
        .credentials
        .register("alice", "alice@example.com", "s3cret-pass", Role::Reader, None)
        .await
        .unwrap();
    assert_ne!(created.password_hash, "s3cret-pass");

    let ok = fx
        .credentials
        .verify_password("alice@example.com", "s3cret-pass")
        .await
        .unwrap();
    assert_eq!(ok.id, created.id);

    for wrong in ["s3cret-pasS", "", "s3cret-pass "] {
        let err = fx
            .credentials
            .verify_password("alice@example.com", wrong)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Authentication));
    }
}

// --- Password Reset Flow ---

#[tokio::test]
async fn test_expired_ticket_is_rejected_even_if_unused() {
    let fx = reset_fixture(RecordingMailer::new());
    fx.credentials
        .register("alice", "alice@example.com", "s3cret-pass", Role::Reader, None)
        .await
        .unwrap();

    let issued = Utc::now() - Duration::minutes(16);
    fx.flow
        .request_reset_at("alice@example.com", issued)
        .await
        .unwrap();
    let secret = fx.mailer.last_secret_for("alice@example.com").unwrap();

    let err = fx
        .flow
        .consume_reset_at(&secret, "n3w-password", Utc::now())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    // The old password still works.
    assert!(
        fx.credentials
            .verify_password("alice@example.com", "s3cret-pass")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_ticket_is_usable_until_expiry_and_only_once() {
    let fx = reset_fixture(RecordingMailer::new());
    fx.credentials
        .register("alice", "alice@example.com", "s3cret-pass", Role::Reader, None)
        .await
        .unwrap();

    let issued = Utc::now();
    fx.flow
        .request_reset_at("alice@example.com", issued)
        .await
        .unwrap();
    let mail = fx.mailer.sent().pop().unwrap();
    assert_eq!(mail.link, format!("https://blog.test/reset/{}", mail.secret));

    let just_before = issued + Duration::minutes(14);
    fx.flow
        .consume_reset_at(&mail.secret, "n3w-password", just_before)
        .await
        .unwrap();

    let err = fx
        .flow
        .consume_reset_at(&mail.secret, "0ther-password", just_before)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Authentication));

    assert!(
        fx.credentials
            .verify_password("alice@example.com", "n3w-password")
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_weak_new_password_keeps_the_ticket() {
    let fx = reset_fixture(RecordingMailer::new());
    fx.credentials
        .register("alice", "alice@example.com", "s3cret-pass", Role::Reader, None)
        .await
        .unwrap();
    fx.flow.request_reset("alice@example.com").await.unwrap();
    let secret = fx.mailer.last_secret_for("alice@example.com").unwrap();

    let err = fx.flow.consume_reset(&secret, "short").await.unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));

    fx.flow.consume_reset(&secret, "long-enough-1").await.unwrap();
}

#[tokio::test]
async fn test_mail_failure_is_not_reported_to_the_caller() {
    let fx = reset_fixture(RecordingMailer::new_failing());
    fx.credentials
        .register("alice", "alice@example.com", "s3cret-pass", Role::Reader, None)
        .await
        .unwrap();

    assert!(fx.flow.request_reset("alice@example.com").await.is_ok());
    assert!(fx.flow.request_reset("nobody@example.com").await.is_ok());
    assert!(fx.mailer.sent().is_empty());
}
