//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.

use crate::actor::{ActorKey, UserActor};
use crate::models::{CollaboratorRecord, Comment, NewComment, NewThread, Tag, Thread};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence contract for threads, comments, tags and collaborators.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AnnotationStore: Send + Sync {
    // Thread Operations
    async fn threads_for_url(&self, page_url: &str) -> anyhow::Result<Vec<Thread>>;
    async fn get_thread(&self, id: i64) -> anyhow::Result<Option<Thread>>;
    async fn insert_thread(&self, thread: NewThread) -> anyhow::Result<Thread>;
    async fn close_thread(&self, id: i64) -> anyhow::Result<()>;
    /// Removes tags, then comments, then the thread row.
    async fn delete_thread_cascade(&self, id: i64) -> anyhow::Result<()>;
    async fn touch_thread(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()>;

    // Comment Operations
    /// Non-deleted comments, oldest first.
    async fn comments_for_thread(&self, thread_id: i64) -> anyhow::Result<Vec<Comment>>;
    async fn latest_comment(&self, thread_id: i64) -> anyhow::Result<Option<Comment>>;
    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment>;
    async fn insert_tag(&self, tag: Tag) -> anyhow::Result<()>;
    async fn tags_for_comment(&self, comment_id: i64) -> anyhow::Result<Vec<ActorKey>>;

    /// Threads a collaborator created or was tagged in.
    async fn collaborator_thread_ids(&self, collaborator_id: i64) -> anyhow::Result<Vec<i64>>;

    // Collaborator Operations
    async fn get_collaborator(&self, id: i64) -> anyhow::Result<Option<CollaboratorRecord>>;
    async fn find_collaborator_by_ciphertext(
        &self,
        email_encrypted: &str,
    ) -> anyhow::Result<Option<CollaboratorRecord>>;
    /// Newest first; every row when `limit` is `None`.
    async fn list_collaborators(
        &self,
        limit: Option<usize>,
    ) -> anyhow::Result<Vec<CollaboratorRecord>>;
    async fn insert_collaborator(
        &self,
        email_encrypted: &str,
        display_name: &str,
    ) -> anyhow::Result<CollaboratorRecord>;
    async fn touch_collaborator(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()>;

    // Maintenance
    async fn purge_threads_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
    async fn purge_collaborators_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64>;
}

/// Read access to the host site's registered accounts.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<UserActor>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserActor>>;
    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<UserActor>>;
    /// Case-insensitive substring match on display name.
    async fn search_display_name(&self, fragment: &str) -> anyhow::Result<Vec<UserActor>>;
    /// Case-insensitive substring match on email, login or display name.
    async fn search(&self, term: &str, limit: usize) -> anyhow::Result<Vec<UserActor>>;
}

/// Reversible encryption for collaborator emails at rest.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait EmailCipher: Send + Sync {
    /// Returns standard base64 of a fresh nonce followed by the ciphertext.
    fn encrypt(&self, email: &str) -> anyhow::Result<String>;
    /// `None` for anything that does not decrypt under the current key.
    fn decrypt(&self, encrypted: &str) -> Option<String>;
}

/// Outbound email delivery.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

/// Pending in-app notes for registered users.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait NotificationInbox: Send + Sync {
    async fn push(&self, user_id: i64, note: &str) -> anyhow::Result<()>;
    /// Returns every pending note and clears the list.
    async fn drain(&self, user_id: i64) -> anyhow::Result<Vec<String>>;
}

/// Primary-user authentication owned by the host site.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait PrimaryAuth: Send + Sync {
    /// Resolves a bearer credential to a user id.
    async fn authenticate(&self, bearer: &str) -> anyhow::Result<Option<i64>>;
    /// Anti-forgery token clients attach to every mutating call.
    fn issue_nonce(&self, user_id: i64) -> String;
    fn verify_nonce(&self, user_id: i64, nonce: &str) -> bool;
}
