use super::{CommentStore, LikeToggle, PostStore, ResetTicketStore, UserStore};
use crate::{
    error::StoreError,
    models::{
        Comment, Credential, NewCredential, NewPost, Post, PostChanges, ProfileChanges,
        ResetTicket, Role,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, query_builder::QueryBuilder};
use uuid::Uuid;

/// Column list shared by every user query.
const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, photo, created_at, updated_at";

/// Post projection: the like set and the comment sequence are folded into arrays so a
/// single row carries the whole engagement state.
const POST_SELECT: &str = r#"
    SELECT
        p.id, p.author_id, p.slug, p.title, p.body, p.category, p.image, p.views,
        ARRAY(SELECT l.user_id FROM post_likes l WHERE l.post_id = p.id ORDER BY l.created_at) AS likes,
        ARRAY(SELECT c.id FROM comments c WHERE c.post_id = p.id ORDER BY c.id) AS comments,
        p.created_at, p.updated_at
    FROM posts p
"#;

/// Comment projection joined with the commenter's handle and photo.
const COMMENT_SELECT: &str = r#"
    SELECT
        c.id, c.post_id, c.user_id, c.content, c.created_at,
        u.username AS author_username, u.photo AS author_photo
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id
"#;

/// Raw `users` row. `role` is TEXT in the database and parsed on the way out.
#[derive(FromRow)]
struct CredentialRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    photo: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CredentialRow> for Credential {
    type Error = StoreError;

    fn try_from(row: CredentialRow) -> Result<Self, Self::Error> {
        let role: Role = row.role.parse().map_err(StoreError::Database)?;
        Ok(Credential {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            photo: row.photo,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_credential(row: Option<CredentialRow>) -> Result<Option<Credential>, StoreError> {
    row.map(Credential::try_from).transpose()
}

fn into_credentials(rows: Vec<CredentialRow>) -> Result<Vec<Credential>, StoreError> {
    rows.into_iter().map(Credential::try_from).collect()
}

/// PostgresRepository
///
/// The production implementation of every store trait, backed by PostgreSQL. Each mutation
/// is either a single statement or a single transaction holding a row lock on the document
/// it changes, so concurrent requests cannot lose updates.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Creates a new repository instance using the initialized connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the schema in `migrations/`.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[async_trait]
impl UserStore for PostgresRepository {
    async fn insert_user(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let sql = format!(
            "INSERT INTO users (id, username, email, password_hash, role, photo, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW()) RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(Uuid::new_v4())
            .bind(&new.username)
            .bind(&new.email)
            .bind(&new.password_hash)
            .bind(new.role.as_str())
            .bind(&new.photo)
            .fetch_one(&self.pool)
            .await?;
        row.try_into()
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        into_credential(row)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        into_credential(row)
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Credential>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        into_credentials(rows)
    }

    async fn list_users(&self) -> Result<Vec<Credential>, StoreError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, CredentialRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        into_credentials(rows)
    }

    /// update_profile
    ///
    /// Uses `COALESCE` so only the provided fields change; the unique constraints on
    /// `username` and `email` re-check uniqueness in the same statement.
    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Credential>, StoreError> {
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                photo = COALESCE($4, photo),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .bind(changes.username)
            .bind(changes.email)
            .bind(changes.photo)
            .fetch_optional(&self.pool)
            .await?;
        into_credential(row)
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Credential>, StoreError> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1 RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CredentialRow>(&sql)
            .bind(id)
            .bind(role.as_str())
            .fetch_optional(&self.pool)
            .await?;
        into_credential(row)
    }

    /// delete_user
    ///
    /// Dependent rows go through `ON DELETE CASCADE` on their foreign keys.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl ResetTicketStore for PostgresRepository {
    /// replace_reset_ticket
    ///
    /// Locks the owner's row first so two concurrent requests for the same user serialize;
    /// the partial unique index on open tickets backs this up. A vanished owner surfaces as
    /// the `user_id` foreign key violation.
    async fn replace_reset_ticket(&self, ticket: ResetTicket) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(ticket.user_id)
            .fetch_optional(&mut *tx)
            .await?;

        // The user's previous tickets go, and so does every spent or expired one.
        sqlx::query(
            "DELETE FROM reset_tickets \
             WHERE user_id = $1 OR consumed_at IS NOT NULL OR expires_at <= $2",
        )
        .bind(ticket.user_id)
        .bind(ticket.issued_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO reset_tickets (id, user_id, token_hash, issued_at, expires_at, consumed_at) \
             VALUES ($1, $2, $3, $4, $5, NULL)",
        )
        .bind(ticket.id)
        .bind(ticket.user_id)
        .bind(&ticket.token_hash)
        .bind(ticket.issued_at)
        .bind(ticket.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// consume_reset_ticket
    ///
    /// The conditional `UPDATE ... WHERE consumed_at IS NULL AND expires_at > now` claims the
    /// ticket; a concurrent consumer blocks on the row lock and then matches zero rows.
    /// The password change commits in the same transaction or not at all.
    async fn consume_reset_ticket(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE reset_tickets
            SET consumed_at = $2
            WHERE token_hash = $1 AND consumed_at IS NULL AND expires_at > $2
            RETURNING user_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            return Ok(None);
        };

        let updated = sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
            .bind(user_id)
            .bind(new_password_hash)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        if updated.rows_affected() == 0 {
            // Owner vanished mid-flight; dropping `tx` rolls the claim back.
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(user_id))
    }
}

#[async_trait]
impl PostStore for PostgresRepository {
    async fn insert_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO posts (id, author_id, slug, title, body, category, image, views, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, NOW(), NOW())",
        )
        .bind(id)
        .bind(new.author_id)
        .bind(&new.slug)
        .bind(&new.title)
        .bind(&new.body)
        .bind(&new.category)
        .bind(&new.image)
        .execute(&self.pool)
        .await?;

        self.find_post_by_id(id)
            .await?
            .ok_or_else(|| StoreError::Database(format!("post {id} missing after insert")))
    }

    async fn find_post_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        let sql = format!("{POST_SELECT} WHERE p.id = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError> {
        let sql = format!("{POST_SELECT} WHERE p.slug = $1");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// list_posts
    ///
    /// Optional category filter built with `QueryBuilder` so every value stays a bind
    /// parameter.
    async fn list_posts(
        &self,
        category: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), StoreError> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(POST_SELECT);
        if let Some(c) = category {
            builder.push(" WHERE p.category = ");
            builder.push_bind(c);
        }
        builder.push(" ORDER BY p.created_at DESC, p.id DESC LIMIT ");
        builder.push_bind(limit);
        builder.push(" OFFSET ");
        builder.push_bind(offset);
        let posts = builder
            .build_query_as::<Post>()
            .fetch_all(&self.pool)
            .await?;

        let mut counter: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM posts p");
        if let Some(c) = category {
            counter.push(" WHERE p.category = ");
            counter.push_bind(c);
        }
        let total: i64 = counter
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        Ok((posts, total))
    }

    async fn posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let sql = format!("{POST_SELECT} WHERE p.author_id = $1 ORDER BY p.created_at DESC, p.id DESC");
        Ok(sqlx::query_as::<_, Post>(&sql)
            .bind(author_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Option<Post>, StoreError> {
        let res = sqlx::query(
            r#"
            UPDATE posts
            SET slug = COALESCE($2, slug),
                title = COALESCE($3, title),
                body = COALESCE($4, body),
                category = COALESCE($5, category),
                image = COALESCE($6, image),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(changes.slug)
        .bind(changes.title)
        .bind(changes.body)
        .bind(changes.category)
        .bind(changes.image)
        .execute(&self.pool)
        .await?;

        if res.rows_affected() == 0 {
            return Ok(None);
        }
        self.find_post_by_id(id).await
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        Ok(
            sqlx::query_scalar("UPDATE posts SET views = views + 1 WHERE id = $1 RETURNING views")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// toggle_like
    ///
    /// `SELECT ... FOR UPDATE` on the post serializes every toggle against that post, so the
    /// membership check and the insert/delete act as one step. A deleted liker fails the
    /// `post_likes_user_id_fkey` check and comes back as `StoreError::MissingReference`.
    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<LikeToggle>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM posts WHERE id = $1 FOR UPDATE")
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Ok(None);
        }

        let removed = sqlx::query("DELETE FROM post_likes WHERE post_id = $1 AND user_id = $2")
            .bind(post_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
            > 0;

        if !removed {
            sqlx::query("INSERT INTO post_likes (post_id, user_id, created_at) VALUES ($1, $2, NOW())")
                .bind(post_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_likes WHERE post_id = $1")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(LikeToggle {
            liked: !removed,
            likes: usize::try_from(likes).unwrap_or_default(),
        }))
    }
}

#[async_trait]
impl CommentStore for PostgresRepository {
    /// insert_comment
    ///
    /// Inserts and joins with `users` in one CTE; the `WHERE EXISTS` makes a concurrently
    /// deleted post yield no row instead of a foreign-key error. A deleted commenter still
    /// trips `comments_user_id_fkey`.
    async fn insert_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Option<Comment>, StoreError> {
        Ok(sqlx::query_as::<_, Comment>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (post_id, user_id, content, created_at)
                SELECT $1, $2, $3, NOW()
                WHERE EXISTS (SELECT 1 FROM posts WHERE id = $1)
                RETURNING id, post_id, user_id, content, created_at
            )
            SELECT i.id, i.post_id, i.user_id, i.content, i.created_at,
                   u.username AS author_username, u.photo AS author_photo
            FROM inserted i LEFT JOIN users u ON u.id = i.user_id
            "#,
        )
        .bind(post_id)
        .bind(user_id)
        .bind(content)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, StoreError> {
        let sql = format!("{COMMENT_SELECT} WHERE c.id = $1");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        let sql = format!("{COMMENT_SELECT} WHERE c.post_id = $1 ORDER BY c.id ASC");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>, StoreError> {
        let sql = format!("{COMMENT_SELECT} WHERE c.post_id = ANY($1) ORDER BY c.id DESC");
        Ok(sqlx::query_as::<_, Comment>(&sql)
            .bind(post_ids)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, StoreError> {
        let res = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }
}
