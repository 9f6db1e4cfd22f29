//! # Domain Models
//!
//! Persisted entities (threads, comments, tags, collaborators) and the JSON
//! shapes returned to clients. Ids are store-assigned integers.

use crate::actor::{ActorKey, ActorView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A discussion anchored to one page element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: i64,
    /// Canonical page URL the thread belongs to
    pub page_url: String,
    /// CSS selector produced by the selector engine when the thread was created
    pub selector: String,
    pub is_closed: bool,
    pub created_by: ActorKey,
    pub created_at: DateTime<Utc>,
    /// Bumped on every comment; drives view-all ordering and cleanup
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewThread {
    pub page_url: String,
    pub selector: String,
    pub created_by: ActorKey,
}

/// A single comment. Bodies are stored with mentions encoded as `tag://` tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    pub author: ActorKey,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    pub author: ActorKey,
    pub body: String,
}

/// Join row created for every mention a comment resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub comment_id: i64,
    pub target: ActorKey,
}

/// Collaborator row as stored. The email is only held encrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollaboratorRecord {
    pub id: i64,
    /// Standard base64 of nonce + AES-GCM ciphertext
    pub email_encrypted: String,
    pub display_name: String,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ── Wire shapes ─────────────────────────────────────────────────────────────

/// One entry of the thread list for a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub id: i64,
    pub page_url: String,
    pub selector: String,
    pub is_closed: bool,
    pub created_by: ActorKey,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Plain-text preview of the newest comment, at most 180 characters including the trailing `…`
    #[serde(default)]
    pub last_comment_excerpt: String,
    /// Display name of the newest comment's author, empty when unknown
    #[serde(default)]
    pub last_comment_author: String,
}

impl ThreadSummary {
    pub fn bare(thread: &Thread) -> Self {
        Self {
            id: thread.id,
            page_url: thread.page_url.clone(),
            selector: thread.selector.clone(),
            is_closed: thread.is_closed,
            created_by: thread.created_by,
            created_at: thread.created_at,
            last_activity: thread.last_activity,
            last_comment_excerpt: String::new(),
            last_comment_author: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentView {
    pub id: i64,
    pub thread_id: i64,
    pub parent_id: Option<i64>,
    /// Raw body, tokens intact; clients expand them against `tags`
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub user: Option<ActorView>,
    #[serde(default)]
    pub tags: Vec<ActorView>,
}

/// One autocomplete suggestion. Collaborator ids are prefixed `c_`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonMatch {
    #[serde(rename = "ID")]
    pub id: String,
    pub login: String,
    pub display: String,
    pub email: String,
    pub is_collaborator: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Created {
    pub id: i64,
}

/// What the maintenance sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub threads: u64,
    pub collaborators: u64,
}

// ── Request bodies ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadQuery {
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateThreadRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub selector: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentQuery {
    #[serde(default)]
    pub thread_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostCommentRequest {
    #[serde(default)]
    pub thread_id: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    /// Page the comment was written on; used to build notification links
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub term: String,
}
