use axum::{http::StatusCode, response::IntoResponse};
use chrono::Utc;
use inkwell::{
    AppError,
    error::StoreError,
    models::{AuthResponse, AuthorStats, BlogPage, RegisterRequest, Role, User},
};
use serde_json::{Value, json};
use uuid::Uuid;

fn sample_user() -> User {
    User {
        id: Uuid::new_v4(),
        username: "alice".to_string(),
        email: "alice@example.com".to_string(),
        role: Role::Author,
        photo: None,
        created_at: Utc::now(),
    }
}

async fn body_json(err: AppError) -> (StatusCode, Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// --- Payload Shapes ---

#[test]
fn test_roles_serialize_lowercase() {
    assert_eq!(serde_json::to_value(Role::Admin).unwrap(), json!("admin"));
    let role: Role = serde_json::from_value(json!("author")).unwrap();
    assert_eq!(role, Role::Author);
    assert!(serde_json::from_value::<Role>(json!("Author")).is_err());
    assert_eq!("reader".parse::<Role>().unwrap(), Role::Reader);
}

#[test]
fn test_register_request_role_defaults_to_none() {
    let req: RegisterRequest = serde_json::from_value(json!({
        "username": "bob",
        "email": "bob@example.com",
        "password": "hunter22a"
    }))
    .unwrap();
    assert_eq!(req.role, None);
    assert_eq!(req.role.unwrap_or_default(), Role::Reader);
}

#[test]
fn test_auth_response_is_flat() {
    let user = sample_user();
    let value = serde_json::to_value(AuthResponse {
        user: user.clone(),
        token: "t0k3n".to_string(),
    })
    .unwrap();

    assert_eq!(value["id"], json!(user.id));
    assert_eq!(value["username"], "alice");
    assert_eq!(value["role"], "author");
    assert_eq!(value["token"], "t0k3n");
    assert!(value.get("user").is_none());
}

#[test]
fn test_dashboard_payloads_use_camel_case() {
    let stats = serde_json::to_value(AuthorStats {
        total_blogs: 1,
        total_views: 2,
        total_likes: 3,
        total_comments: 4,
    })
    .unwrap();
    assert_eq!(
        stats,
        json!({ "totalBlogs": 1, "totalViews": 2, "totalLikes": 3, "totalComments": 4 })
    );

    let page = serde_json::to_value(BlogPage {
        blogs: vec![],
        total_blogs: 0,
        page: 1,
        total_pages: 0,
    })
    .unwrap();
    assert!(page.get("totalBlogs").is_some());
    assert!(page.get("totalPages").is_some());
}

// --- Error Envelope ---

#[tokio::test]
async fn test_validation_error_names_the_field() {
    let (status, body) = body_json(AppError::validation("email", "must be a valid email address")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["kind"], "validation");
    assert_eq!(body["error"]["field"], "email");
}

#[tokio::test]
async fn test_store_details_never_reach_the_client() {
    let err: AppError = StoreError::Database("relation \"users\" does not exist".to_string()).into();
    let (status, body) = body_json(err).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.to_string().contains("relation"));
    assert!(body["error"].get("field").is_none());
}

#[tokio::test]
async fn test_statuses_per_kind() {
    let cases = [
        (AppError::Authentication, StatusCode::UNAUTHORIZED, "authentication"),
        (AppError::forbidden("no"), StatusCode::FORBIDDEN, "authorization"),
        (
            StoreError::UniqueViolation("posts_slug_key".to_string()).into(),
            StatusCode::CONFLICT,
            "conflict",
        ),
        (AppError::not_found("blog", "x"), StatusCode::NOT_FOUND, "not_found"),
    ];
    for (err, expected_status, expected_kind) in cases {
        let (status, body) = body_json(err).await;
        assert_eq!(status, expected_status);
        assert_eq!(body["error"]["kind"], expected_kind);
    }
}
