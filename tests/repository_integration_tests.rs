//! Postgres-backed repository tests. They need a live database:
//! `DATABASE_URL=postgres://... cargo test -- --ignored`

use chrono::{Duration, Utc};
use inkwell::{
    error::StoreError,
    models::{NewCredential, NewPost, PostChanges, ProfileChanges, ResetTicket, Role},
    repository::{CommentStore, PostStore, PostgresRepository, ResetTicketStore, UserStore},
};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::test;
use uuid::Uuid;

// --- Test Context and Setup ---

struct DbTestContext {
    repo: PostgresRepository,
    pool: PgPool,
}

impl DbTestContext {
    async fn setup() -> Self {
        dotenv::dotenv().ok();

        let db_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set to run integration tests");
        let pool = PgPool::connect(&db_url)
            .await
            .expect("Failed to connect to database for integration tests.");

        let repo = PostgresRepository::new(pool.clone());
        repo.migrate().await.expect("Failed to run database migrations.");
        DbTestContext { repo, pool }
    }
}

// --- Test Data Helpers ---

/// Names are suffixed so tests can share one database.
fn unique(prefix: &str) -> String {
    format!("{prefix}_{}", &Uuid::new_v4().simple().to_string()[..8])
}

async fn create_user(repo: &PostgresRepository, role: Role) -> inkwell::models::Credential {
    let name = unique("user");
    repo.insert_user(NewCredential {
        email: format!("{name}@example.com"),
        username: name,
        password_hash: "hash".to_string(),
        role,
        photo: None,
    })
    .await
    .expect("Failed to create test user")
}

async fn create_post(repo: &PostgresRepository, author_id: Uuid) -> inkwell::models::Post {
    let slug = unique("post");
    repo.insert_post(NewPost {
        author_id,
        title: slug.clone(),
        slug,
        body: "body".to_string(),
        category: "tech".to_string(),
        image: None,
    })
    .await
    .expect("Failed to create test post")
}

// --- Tests ---

#[test]
#[ignore]
async fn test_unique_constraints_map_to_unique_violation() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Reader).await;

    let err = ctx
        .repo
        .insert_user(NewCredential {
            username: unique("other"),
            email: alice.email.clone(),
            password_hash: "hash".to_string(),
            role: Role::Reader,
            photo: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(ref c) if c == "users_email_key"));

    let post = create_post(&ctx.repo, alice.id).await;
    let other = create_post(&ctx.repo, alice.id).await;
    let err = ctx
        .repo
        .update_post(
            other.id,
            PostChanges {
                slug: Some(post.slug.clone()),
                ..PostChanges::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(ref c) if c == "posts_slug_key"));
}

#[test]
#[ignore]
async fn test_profile_update_leaves_unset_fields() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Reader).await;

    let updated = ctx
        .repo
        .update_profile(
            alice.id,
            ProfileChanges {
                photo: Some("https://img/a.png".to_string()),
                ..ProfileChanges::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.username, alice.username);
    assert_eq!(updated.photo.as_deref(), Some("https://img/a.png"));

    let promoted = ctx.repo.set_role(alice.id, Role::Author).await.unwrap().unwrap();
    assert_eq!(promoted.role, Role::Author);
}

#[test]
#[ignore]
async fn test_reset_ticket_replacement_and_single_use() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Reader).await;
    let now = Utc::now();
    let ticket = |hash: String, expires_in: Duration| ResetTicket {
        id: Uuid::new_v4(),
        user_id: alice.id,
        token_hash: hash,
        issued_at: now,
        expires_at: now + expires_in,
        consumed_at: None,
    };

    let first = unique("first");
    let second = unique("second");
    ctx.repo
        .replace_reset_ticket(ticket(first.clone(), Duration::minutes(15)))
        .await
        .unwrap();
    ctx.repo
        .replace_reset_ticket(ticket(second.clone(), Duration::minutes(15)))
        .await
        .unwrap();

    assert_eq!(ctx.repo.consume_reset_ticket(&first, "x", now).await.unwrap(), None);
    assert_eq!(
        ctx.repo.consume_reset_ticket(&second, "new-hash", now).await.unwrap(),
        Some(alice.id)
    );
    assert_eq!(ctx.repo.consume_reset_ticket(&second, "again", now).await.unwrap(), None);

    let stored = ctx.repo.find_user_by_id(alice.id).await.unwrap().unwrap();
    assert_eq!(stored.password_hash, "new-hash");

    let expired = unique("expired");
    ctx.repo
        .replace_reset_ticket(ticket(expired.clone(), Duration::minutes(-1)))
        .await
        .unwrap();
    assert_eq!(ctx.repo.consume_reset_ticket(&expired, "y", now).await.unwrap(), None);
}

#[test]
#[ignore]
async fn test_concurrent_increments_and_toggles() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Author).await;
    let bob = create_user(&ctx.repo, Role::Reader).await;
    let post = create_post(&ctx.repo, alice.id).await;
    let repo = Arc::new(ctx.repo);

    let post_id = post.id;
    let handles: Vec<_> = (0..50)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.increment_views(post_id).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let bob_id = bob.id;
    let toggles: Vec<_> = (0..10)
        .map(|_| {
            let repo = repo.clone();
            tokio::spawn(async move { repo.toggle_like(post_id, bob_id).await })
        })
        .collect();
    for handle in toggles {
        handle.await.unwrap().unwrap();
    }

    let stored = repo.find_post_by_id(post_id).await.unwrap().unwrap();
    assert_eq!(stored.views, 50);
    assert!(stored.likes.is_empty());
}

#[test]
#[ignore]
async fn test_comments_join_and_cascade() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Author).await;
    let bob = create_user(&ctx.repo, Role::Reader).await;
    let post = create_post(&ctx.repo, alice.id).await;

    let first = ctx
        .repo
        .insert_comment(post.id, bob.id, "first")
        .await
        .unwrap()
        .unwrap();
    ctx.repo.insert_comment(post.id, bob.id, "second").await.unwrap();
    assert_eq!(first.author_username.as_deref(), Some(bob.username.as_str()));
    assert!(ctx.repo.insert_comment(Uuid::new_v4(), bob.id, "x").await.unwrap().is_none());

    let listed = ctx.repo.comments_for_post(post.id).await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].content, "first");
    let newest_first = ctx.repo.comments_for_posts(&[post.id]).await.unwrap();
    assert_eq!(newest_first[0].content, "second");

    let with_ids = ctx.repo.find_post_by_id(post.id).await.unwrap().unwrap();
    assert_eq!(with_ids.comments.len(), 2);

    assert!(ctx.repo.delete_user(bob.id).await.unwrap());
    assert!(ctx.repo.comments_for_post(post.id).await.unwrap().is_empty());
}

#[test]
#[ignore]
async fn test_writes_from_a_deleted_user_hit_the_user_foreign_key() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Author).await;
    let bob = create_user(&ctx.repo, Role::Reader).await;
    let post = create_post(&ctx.repo, alice.id).await;
    assert!(ctx.repo.delete_user(bob.id).await.unwrap());

    let err = ctx.repo.toggle_like(post.id, bob.id).await.unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(ref c) if c == "post_likes_user_id_fkey"));
    let err = ctx.repo.insert_comment(post.id, bob.id, "ghost").await.unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(ref c) if c == "comments_user_id_fkey"));

    let stored = ctx.repo.find_post_by_id(post.id).await.unwrap().unwrap();
    assert!(stored.likes.is_empty());
    assert!(stored.comments.is_empty());
}

#[test]
#[ignore]
async fn test_replacing_a_ticket_prunes_spent_ones() {
    let ctx = DbTestContext::setup().await;
    let alice = create_user(&ctx.repo, Role::Reader).await;
    let now = Utc::now();
    let spent = unique("spent");
    ctx.repo
        .replace_reset_ticket(ResetTicket {
            id: Uuid::new_v4(),
            user_id: alice.id,
            token_hash: spent.clone(),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
        })
        .await
        .unwrap();
    ctx.repo.consume_reset_ticket(&spent, "h", now).await.unwrap();

    ctx.repo
        .replace_reset_ticket(ResetTicket {
            id: Uuid::new_v4(),
            user_id: alice.id,
            token_hash: unique("fresh"),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
        })
        .await
        .unwrap();

    let remaining: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM reset_tickets WHERE user_id = $1")
            .bind(alice.id)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(remaining, 1);
}
