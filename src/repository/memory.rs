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
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard},
};
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredComment {
    id: i64,
    post_id: Uuid,
    user_id: Uuid,
    content: String,
    created_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryState {
    users: HashMap<Uuid, Credential>,
    tickets: Vec<ResetTicket>,
    // Insertion order doubles as creation order.
    posts: Vec<Post>,
    comments: BTreeMap<i64, StoredComment>,
    next_comment_id: i64,
}

impl MemoryState {
    fn post_mut(&mut self, id: Uuid) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == id)
    }

    fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> bool {
        self.posts
            .iter()
            .any(|p| p.slug == slug && Some(p.id) != except)
    }

    fn joined(&self, c: &StoredComment) -> Comment {
        let author = self.users.get(&c.user_id);
        Comment {
            id: c.id,
            post_id: c.post_id,
            user_id: c.user_id,
            content: c.content.clone(),
            created_at: c.created_at,
            author_username: author.map(|u| u.username.clone()),
            author_photo: author.and_then(|u| u.photo.clone()),
        }
    }

    fn remove_post(&mut self, id: Uuid) -> bool {
        let before = self.posts.len();
        self.posts.retain(|p| p.id != id);
        self.comments.retain(|_, c| c.post_id != id);
        self.posts.len() != before
    }
}

/// MemoryRepository
///
/// An in-process implementation of every store trait. All state sits behind one mutex and
/// each trait method holds it for exactly one critical section, which gives the same
/// all-or-nothing behaviour as the single-statement Postgres queries. Used for local runs
/// without `DATABASE_URL` and as the repository double in tests.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }
}

#[async_trait]
impl UserStore for MemoryRepository {
    async fn insert_user(&self, new: NewCredential) -> Result<Credential, StoreError> {
        let mut state = self.state()?;
        if state.users.values().any(|u| u.username == new.username) {
            return Err(StoreError::UniqueViolation("users_username_key".into()));
        }
        if state.users.values().any(|u| u.email == new.email) {
            return Err(StoreError::UniqueViolation("users_email_key".into()));
        }

        let now = Utc::now();
        let credential = Credential {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email,
            password_hash: new.password_hash,
            role: new.role,
            photo: new.photo,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<Credential>, StoreError> {
        Ok(self.state()?.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .state()?
            .users
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn find_users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Credential>, StoreError> {
        let state = self.state()?;
        Ok(ids.iter().filter_map(|id| state.users.get(id).cloned()).collect())
    }

    async fn list_users(&self) -> Result<Vec<Credential>, StoreError> {
        let mut users: Vec<Credential> = self.state()?.users.values().cloned().collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn update_profile(
        &self,
        id: Uuid,
        changes: ProfileChanges,
    ) -> Result<Option<Credential>, StoreError> {
        let mut state = self.state()?;
        if let Some(name) = &changes.username {
            if state.users.values().any(|u| u.id != id && &u.username == name) {
                return Err(StoreError::UniqueViolation("users_username_key".into()));
            }
        }
        if let Some(email) = &changes.email {
            if state.users.values().any(|u| u.id != id && &u.email == email) {
                return Err(StoreError::UniqueViolation("users_email_key".into()));
            }
        }

        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.username {
            user.username = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(photo) = changes.photo {
            user.photo = Some(photo);
        }
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<Option<Credential>, StoreError> {
        let mut state = self.state()?;
        Ok(state.users.get_mut(&id).map(|user| {
            user.role = role;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        if state.users.remove(&id).is_none() {
            return Ok(false);
        }

        state.tickets.retain(|t| t.user_id != id);
        let owned: Vec<Uuid> = state
            .posts
            .iter()
            .filter(|p| p.author_id == id)
            .map(|p| p.id)
            .collect();
        for post_id in owned {
            state.remove_post(post_id);
        }

        let dropped: Vec<i64> = state
            .comments
            .values()
            .filter(|c| c.user_id == id)
            .map(|c| c.id)
            .collect();
        state.comments.retain(|_, c| c.user_id != id);
        for post in state.posts.iter_mut() {
            post.likes.retain(|u| *u != id);
            post.comments.retain(|c| !dropped.contains(c));
        }
        Ok(true)
    }
}

#[async_trait]
impl ResetTicketStore for MemoryRepository {
    async fn replace_reset_ticket(&self, ticket: ResetTicket) -> Result<(), StoreError> {
        let mut state = self.state()?;
        // Drops the user's previous tickets along with every spent or expired one.
        let now = ticket.issued_at;
        state
            .tickets
            .retain(|t| t.user_id != ticket.user_id && t.is_usable_at(now));
        state.tickets.push(ticket);
        Ok(())
    }

    async fn consume_reset_ticket(
        &self,
        token_hash: &str,
        new_password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut state = self.state()?;

        let Some(idx) = state
            .tickets
            .iter()
            .position(|t| t.token_hash == token_hash && t.is_usable_at(now))
        else {
            return Ok(None);
        };
        let user_id = state.tickets[idx].user_id;

        let Some(user) = state.users.get_mut(&user_id) else {
            return Ok(None);
        };
        user.password_hash = new_password_hash.to_string();
        user.updated_at = now;
        state.tickets[idx].consumed_at = Some(now);

        Ok(Some(user_id))
    }
}

#[async_trait]
impl PostStore for MemoryRepository {
    async fn insert_post(&self, new: NewPost) -> Result<Post, StoreError> {
        let mut state = self.state()?;
        if state.slug_taken(&new.slug, None) {
            return Err(StoreError::UniqueViolation("posts_slug_key".into()));
        }
        if !state.users.contains_key(&new.author_id) {
            return Err(StoreError::MissingReference("posts_author_id_fkey".into()));
        }

        let now = Utc::now();
        let post = Post {
            id: Uuid::new_v4(),
            author_id: new.author_id,
            slug: new.slug,
            title: new.title,
            body: new.body,
            category: new.category,
            image: new.image,
            views: 0,
            likes: Vec::new(),
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.posts.push(post.clone());
        Ok(post)
    }

    async fn find_post_by_id(&self, id: Uuid) -> Result<Option<Post>, StoreError> {
        Ok(self.state()?.posts.iter().find(|p| p.id == id).cloned())
    }

    async fn find_post_by_slug(&self, slug: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.state()?.posts.iter().find(|p| p.slug == slug).cloned())
    }

    async fn list_posts(
        &self,
        category: Option<&str>,
        offset: i64,
        limit: i64,
    ) -> Result<(Vec<Post>, i64), StoreError> {
        let state = self.state()?;
        let matching: Vec<&Post> = state
            .posts
            .iter()
            .rev()
            .filter(|p| category.is_none_or(|c| p.category == c))
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or_default())
            .take(usize::try_from(limit).unwrap_or_default())
            .cloned()
            .collect();
        Ok((page, total))
    }

    async fn posts_by_author(&self, author_id: Uuid) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .state()?
            .posts
            .iter()
            .rev()
            .filter(|p| p.author_id == author_id)
            .cloned()
            .collect())
    }

    async fn update_post(
        &self,
        id: Uuid,
        changes: PostChanges,
    ) -> Result<Option<Post>, StoreError> {
        let mut state = self.state()?;
        if let Some(slug) = &changes.slug {
            if state.slug_taken(slug, Some(id)) {
                return Err(StoreError::UniqueViolation("posts_slug_key".into()));
            }
        }

        let Some(post) = state.post_mut(id) else {
            return Ok(None);
        };
        if let Some(slug) = changes.slug {
            post.slug = slug;
        }
        if let Some(title) = changes.title {
            post.title = title;
        }
        if let Some(body) = changes.body {
            post.body = body;
        }
        if let Some(category) = changes.category {
            post.category = category;
        }
        if let Some(image) = changes.image {
            post.image = Some(image);
        }
        post.updated_at = Utc::now();
        Ok(Some(post.clone()))
    }

    async fn delete_post(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state()?.remove_post(id))
    }

    async fn increment_views(&self, id: Uuid) -> Result<Option<i64>, StoreError> {
        let mut state = self.state()?;
        Ok(state.post_mut(id).map(|post| {
            post.views += 1;
            post.views
        }))
    }

    async fn toggle_like(
        &self,
        post_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<LikeToggle>, StoreError> {
        let mut state = self.state()?;
        let user_exists = state.users.contains_key(&user_id);
        let Some(post) = state.post_mut(post_id) else {
            return Ok(None);
        };
        if !user_exists {
            return Err(StoreError::MissingReference("post_likes_user_id_fkey".into()));
        }

        let liked = match post.likes.iter().position(|u| *u == user_id) {
            Some(idx) => {
                post.likes.remove(idx);
                false
            }
            None => {
                post.likes.push(user_id);
                true
            }
        };
        Ok(Some(LikeToggle {
            liked,
            likes: post.likes.len(),
        }))
    }
}

#[async_trait]
impl CommentStore for MemoryRepository {
    async fn insert_comment(
        &self,
        post_id: Uuid,
        user_id: Uuid,
        content: &str,
    ) -> Result<Option<Comment>, StoreError> {
        let mut state = self.state()?;
        if state.post_mut(post_id).is_none() {
            return Ok(None);
        }
        if !state.users.contains_key(&user_id) {
            return Err(StoreError::MissingReference("comments_user_id_fkey".into()));
        }

        state.next_comment_id += 1;
        let stored = StoredComment {
            id: state.next_comment_id,
            post_id,
            user_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        if let Some(post) = state.post_mut(post_id) {
            post.comments.push(stored.id);
        }
        let comment = state.joined(&stored);
        state.comments.insert(stored.id, stored);
        Ok(Some(comment))
    }

    async fn find_comment(&self, id: i64) -> Result<Option<Comment>, StoreError> {
        let state = self.state()?;
        Ok(state.comments.get(&id).map(|c| state.joined(c)))
    }

    async fn comments_for_post(&self, post_id: Uuid) -> Result<Vec<Comment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .comments
            .values()
            .filter(|c| c.post_id == post_id)
            .map(|c| state.joined(c))
            .collect())
    }

    async fn comments_for_posts(&self, post_ids: &[Uuid]) -> Result<Vec<Comment>, StoreError> {
        let state = self.state()?;
        Ok(state
            .comments
            .values()
            .rev()
            .filter(|c| post_ids.contains(&c.post_id))
            .map(|c| state.joined(c))
            .collect())
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let Some(removed) = state.comments.remove(&id) else {
            return Ok(false);
        };
        if let Some(post) = state.post_mut(removed.post_id) {
            post.comments.retain(|c| *c != id);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn new_user(name: &str) -> NewCredential {
        NewCredential {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
            role: Role::Author,
            photo: None,
        }
    }

    fn new_post(author_id: Uuid, slug: &str) -> NewPost {
        NewPost {
            author_id,
            slug: slug.to_string(),
            title: slug.to_string(),
            body: "body".to_string(),
            category: "Technology".to_string(),
            image: None,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_unique_violation() {
        let repo = MemoryRepository::new();
        repo.insert_user(new_user("alice")).await.unwrap();

        let mut dup = new_user("alice2");
        dup.email = "alice@example.com".to_string();
        let err = repo.insert_user(dup).await.unwrap_err();
        assert!(matches!(err, StoreError::UniqueViolation(c) if c.contains("email")));
    }

    #[tokio::test]
    async fn replacing_a_ticket_invalidates_the_previous_one() {
        let repo = MemoryRepository::new();
        let user = repo.insert_user(new_user("alice")).await.unwrap();
        let now = Utc::now();
        let ticket = |hash: &str| ResetTicket {
            id: Uuid::new_v4(),
            user_id: user.id,
            token_hash: hash.to_string(),
            issued_at: now,
            expires_at: now + Duration::minutes(15),
            consumed_at: None,
        };

        repo.replace_reset_ticket(ticket("first")).await.unwrap();
        repo.replace_reset_ticket(ticket("second")).await.unwrap();

        assert_eq!(repo.consume_reset_ticket("first", "x", now).await.unwrap(), None);
        assert_eq!(
            repo.consume_reset_ticket("second", "new-hash", now).await.unwrap(),
            Some(user.id)
        );
        let stored = repo.find_user_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[tokio::test]
    async fn replacing_a_ticket_prunes_spent_and_expired_ones() {
        let repo = MemoryRepository::new();
        let alice = repo.insert_user(new_user("alice")).await.unwrap();
        let bob = repo.insert_user(new_user("bob")).await.unwrap();
        let carol = repo.insert_user(new_user("carol")).await.unwrap();
        let now = Utc::now();
        let ticket = |user_id: Uuid, hash: &str, issued_at: DateTime<Utc>| ResetTicket {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash.to_string(),
            issued_at,
            expires_at: issued_at + Duration::minutes(15),
            consumed_at: None,
        };
        let hashes = |repo: &MemoryRepository| -> Vec<String> {
            repo.state()
                .unwrap()
                .tickets
                .iter()
                .map(|t| t.token_hash.clone())
                .collect()
        };

        repo.replace_reset_ticket(ticket(bob.id, "stale", now - Duration::hours(1)))
            .await
            .unwrap();
        repo.replace_reset_ticket(ticket(carol.id, "open", now)).await.unwrap();
        assert_eq!(hashes(&repo), vec!["open"]);

        repo.replace_reset_ticket(ticket(alice.id, "spent", now)).await.unwrap();
        repo.consume_reset_ticket("spent", "h", now).await.unwrap();
        repo.replace_reset_ticket(ticket(alice.id, "fresh", now)).await.unwrap();
        assert_eq!(hashes(&repo), vec!["open", "fresh"]);
    }

    #[tokio::test]
    async fn writes_from_a_deleted_user_are_rejected() {
        let repo = MemoryRepository::new();
        let alice = repo.insert_user(new_user("alice")).await.unwrap();
        let bob = repo.insert_user(new_user("bob")).await.unwrap();
        let post = repo.insert_post(new_post(alice.id, "kept")).await.unwrap();
        repo.delete_user(bob.id).await.unwrap();

        let err = repo.toggle_like(post.id, bob.id).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(c) if c.contains("user_id")));
        let err = repo.insert_comment(post.id, bob.id, "ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(c) if c.contains("user_id")));
        let err = repo.insert_post(new_post(bob.id, "ghost-post")).await.unwrap_err();
        assert!(matches!(err, StoreError::MissingReference(_)));

        // A missing post still reads as "no such post".
        assert!(repo.toggle_like(Uuid::new_v4(), bob.id).await.unwrap().is_none());

        let post = repo.find_post_by_id(post.id).await.unwrap().unwrap();
        assert!(post.likes.is_empty());
        assert!(post.comments.is_empty());
    }

    #[tokio::test]
    async fn deleting_a_user_cascades() {
        let repo = MemoryRepository::new();
        let alice = repo.insert_user(new_user("alice")).await.unwrap();
        let bob = repo.insert_user(new_user("bob")).await.unwrap();
        let alices = repo.insert_post(new_post(alice.id, "alices")).await.unwrap();
        let bobs = repo.insert_post(new_post(bob.id, "bobs")).await.unwrap();

        repo.toggle_like(bobs.id, alice.id).await.unwrap();
        repo.insert_comment(bobs.id, alice.id, "hi").await.unwrap();
        repo.insert_comment(alices.id, bob.id, "hey").await.unwrap();

        assert!(repo.delete_user(alice.id).await.unwrap());

        assert!(repo.find_post_by_id(alices.id).await.unwrap().is_none());
        let bobs = repo.find_post_by_id(bobs.id).await.unwrap().unwrap();
        assert!(bobs.likes.is_empty());
        assert!(bobs.comments.is_empty());
        assert!(repo.comments_for_posts(&[alices.id]).await.unwrap().is_empty());
    }
}
