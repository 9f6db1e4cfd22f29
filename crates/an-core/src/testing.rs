//! In-memory port implementations for tests.
//!
//! Enabled for this crate's own tests and for dependents through the
//! `testing` feature.

use crate::actor::{email_local_part, ActorKey, ActorRef, CollaboratorActor, UserActor};
use crate::directory::People;
use crate::models::{CollaboratorRecord, Comment, NewComment, NewThread, Tag, Thread};
use crate::service::{AnnotationService, ServiceConfig};
use crate::session::SessionSigner;
use crate::traits::{AnnotationStore, EmailCipher, Mailer, NotificationInbox, UserDirectory};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub const TEST_SECRET: &str = "test-server-secret";

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct StoreState {
    threads: Vec<Thread>,
    comments: Vec<Comment>,
    tags: Vec<Tag>,
    collaborators: Vec<CollaboratorRecord>,
    next_id: i64,
}

impl StoreState {
    fn next(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn collaborator_count(&self) -> usize {
        lock(&self.state).collaborators.len()
    }

    pub fn comment_count(&self) -> usize {
        lock(&self.state).comments.len()
    }

    pub fn tags(&self) -> Vec<Tag> {
        lock(&self.state).tags.clone()
    }

    pub fn thread(&self, id: i64) -> Option<Thread> {
        lock(&self.state).threads.iter().find(|t| t.id == id).cloned()
    }

    pub fn comments(&self) -> Vec<Comment> {
        lock(&self.state).comments.clone()
    }

    pub fn set_thread_activity(&self, id: i64, at: DateTime<Utc>) {
        if let Some(t) = lock(&self.state).threads.iter_mut().find(|t| t.id == id) {
            t.last_activity = at;
        }
    }

    pub fn set_collaborator_activity(&self, id: i64, at: DateTime<Utc>) {
        if let Some(c) = lock(&self.state).collaborators.iter_mut().find(|c| c.id == id) {
            c.last_activity = at;
        }
    }

    pub fn seed_collaborator(&self, email_encrypted: &str, display_name: &str) -> CollaboratorRecord {
        let mut state = lock(&self.state);
        let now = Utc::now();
        let record = CollaboratorRecord {
            id: state.next(),
            email_encrypted: email_encrypted.to_string(),
            display_name: display_name.to_string(),
            last_activity: now,
            created_at: now,
        };
        state.collaborators.push(record.clone());
        record
    }
}

#[async_trait]
impl AnnotationStore for MemoryStore {
    async fn threads_for_url(&self, page_url: &str) -> anyhow::Result<Vec<Thread>> {
        Ok(lock(&self.state)
            .threads
            .iter()
            .filter(|t| t.page_url == page_url)
            .cloned()
            .collect())
    }

    async fn get_thread(&self, id: i64) -> anyhow::Result<Option<Thread>> {
        Ok(self.thread(id))
    }

    async fn insert_thread(&self, thread: NewThread) -> anyhow::Result<Thread> {
        let mut state = lock(&self.state);
        let now = Utc::now();
        let row = Thread {
            id: state.next(),
            page_url: thread.page_url,
            selector: thread.selector,
            is_closed: false,
            created_by: thread.created_by,
            created_at: now,
            last_activity: now,
        };
        state.threads.push(row.clone());
        Ok(row)
    }

    async fn close_thread(&self, id: i64) -> anyhow::Result<()> {
        if let Some(t) = lock(&self.state).threads.iter_mut().find(|t| t.id == id) {
            t.is_closed = true;
        }
        Ok(())
    }

    async fn delete_thread_cascade(&self, id: i64) -> anyhow::Result<()> {
        let mut state = lock(&self.state);
        let comment_ids: Vec<i64> = state
            .comments
            .iter()
            .filter(|c| c.thread_id == id)
            .map(|c| c.id)
            .collect();
        state.tags.retain(|t| !comment_ids.contains(&t.comment_id));
        state.comments.retain(|c| c.thread_id != id);
        state.threads.retain(|t| t.id != id);
        Ok(())
    }

    async fn touch_thread(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.set_thread_activity(id, at);
        Ok(())
    }

    async fn comments_for_thread(&self, thread_id: i64) -> anyhow::Result<Vec<Comment>> {
        let mut rows: Vec<Comment> = lock(&self.state)
            .comments
            .iter()
            .filter(|c| c.thread_id == thread_id && !c.is_deleted)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.created_at, c.id));
        Ok(rows)
    }

    async fn latest_comment(&self, thread_id: i64) -> anyhow::Result<Option<Comment>> {
        Ok(self.comments_for_thread(thread_id).await?.pop())
    }

    async fn insert_comment(&self, comment: NewComment) -> anyhow::Result<Comment> {
        let mut state = lock(&self.state);
        let row = Comment {
            id: state.next(),
            thread_id: comment.thread_id,
            parent_id: comment.parent_id,
            author: comment.author,
            body: comment.body,
            created_at: Utc::now(),
            is_deleted: false,
        };
        state.comments.push(row.clone());
        Ok(row)
    }

    async fn insert_tag(&self, tag: Tag) -> anyhow::Result<()> {
        lock(&self.state).tags.push(tag);
        Ok(())
    }

    async fn tags_for_comment(&self, comment_id: i64) -> anyhow::Result<Vec<ActorKey>> {
        Ok(lock(&self.state)
            .tags
            .iter()
            .filter(|t| t.comment_id == comment_id)
            .map(|t| t.target)
            .collect())
    }

    async fn collaborator_thread_ids(&self, collaborator_id: i64) -> anyhow::Result<Vec<i64>> {
        let key = ActorKey::collaborator(collaborator_id);
        let state = lock(&self.state);
        let mut ids: Vec<i64> = state
            .threads
            .iter()
            .filter(|t| t.created_by == key)
            .map(|t| t.id)
            .collect();
        for tag in state.tags.iter().filter(|t| t.target == key) {
            if let Some(c) = state.comments.iter().find(|c| c.id == tag.comment_id) {
                ids.push(c.thread_id);
            }
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    async fn get_collaborator(&self, id: i64) -> anyhow::Result<Option<CollaboratorRecord>> {
        Ok(lock(&self.state).collaborators.iter().find(|c| c.id == id).cloned())
    }

    async fn find_collaborator_by_ciphertext(
        &self,
        email_encrypted: &str,
    ) -> anyhow::Result<Option<CollaboratorRecord>> {
        Ok(lock(&self.state)
            .collaborators
            .iter()
            .find(|c| c.email_encrypted == email_encrypted)
            .cloned())
    }

    async fn list_collaborators(&self, limit: Option<usize>) -> anyhow::Result<Vec<CollaboratorRecord>> {
        let mut rows = lock(&self.state).collaborators.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn insert_collaborator(
        &self,
        email_encrypted: &str,
        display_name: &str,
    ) -> anyhow::Result<CollaboratorRecord> {
        Ok(self.seed_collaborator(email_encrypted, display_name))
    }

    async fn touch_collaborator(&self, id: i64, at: DateTime<Utc>) -> anyhow::Result<()> {
        self.set_collaborator_activity(id, at);
        Ok(())
    }

    async fn purge_threads_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let stale: Vec<i64> = lock(&self.state)
            .threads
            .iter()
            .filter(|t| t.last_activity < cutoff)
            .map(|t| t.id)
            .collect();
        for id in &stale {
            self.delete_thread_cascade(*id).await?;
        }
        Ok(stale.len() as u64)
    }

    async fn purge_collaborators_inactive_since(&self, cutoff: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut state = lock(&self.state);
        let before = state.collaborators.len();
        state.collaborators.retain(|c| c.last_activity >= cutoff);
        Ok((before - state.collaborators.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryUsers {
    users: Mutex<Vec<UserActor>>,
}

impl MemoryUsers {
    pub fn insert(&self, user: UserActor) {
        lock(&self.users).push(user);
    }
}

#[async_trait]
impl UserDirectory for MemoryUsers {
    async fn get_user(&self, id: i64) -> anyhow::Result<Option<UserActor>> {
        Ok(lock(&self.users).iter().find(|u| u.id == id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<UserActor>> {
        Ok(lock(&self.users)
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_login(&self, login: &str) -> anyhow::Result<Option<UserActor>> {
        Ok(lock(&self.users)
            .iter()
            .find(|u| u.login.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn search_display_name(&self, fragment: &str) -> anyhow::Result<Vec<UserActor>> {
        let needle = fragment.to_lowercase();
        Ok(lock(&self.users)
            .iter()
            .filter(|u| u.display_name.to_lowercase().contains(&needle))
            .cloned()
            .collect())
    }

    async fn search(&self, term: &str, limit: usize) -> anyhow::Result<Vec<UserActor>> {
        let needle = term.to_lowercase();
        Ok(lock(&self.users)
            .iter()
            .filter(|u| {
                u.email.to_lowercase().contains(&needle)
                    || u.login.to_lowercase().contains(&needle)
                    || u.display_name.to_lowercase().contains(&needle)
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Reversible stand-in for real encryption: base64 of `<counter>:<email>`.
/// Each call yields a different ciphertext, like a random nonce would.
#[derive(Default)]
pub struct TestCipher {
    counter: AtomicU64,
}

impl EmailCipher for TestCipher {
    fn encrypt(&self, email: &str) -> anyhow::Result<String> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Ok(STANDARD.encode(format!("{n}:{email}")))
    }

    fn decrypt(&self, encrypted: &str) -> Option<String> {
        let bytes = STANDARD.decode(encrypted).ok()?;
        let text = String::from_utf8(bytes).ok()?;
        text.split_once(':').map(|(_, email)| email.to_string())
    }
}

#[derive(Default)]
pub struct MemoryInbox {
    notes: Mutex<HashMap<i64, Vec<String>>>,
}

#[async_trait]
impl NotificationInbox for MemoryInbox {
    async fn push(&self, user_id: i64, note: &str) -> anyhow::Result<()> {
        lock(&self.notes).entry(user_id).or_default().push(note.to_string());
        Ok(())
    }

    async fn drain(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        Ok(lock(&self.notes).remove(&user_id).unwrap_or_default())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
}

impl RecordingMailer {
    pub fn sent(&self) -> Vec<SentMail> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        lock(&self.sent).push(SentMail {
            to: to.to_string(),
            subject: subject.to_string(),
            body: html_body.to_string(),
        });
        Ok(())
    }
}

/// All in-memory ports wired together.
#[derive(Clone, Default)]
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub users: Arc<MemoryUsers>,
    pub cipher: Arc<TestCipher>,
    pub inbox: Arc<MemoryInbox>,
    pub mailer: Arc<RecordingMailer>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn people(&self) -> People<'_> {
        People::new(self.store.as_ref(), self.users.as_ref(), self.cipher.as_ref())
    }

    pub fn add_user(&self, id: i64, display_name: &str, email: &str, login: &str, is_admin: bool) -> ActorRef {
        let user = UserActor {
            id,
            display_name: display_name.to_string(),
            email: email.to_string(),
            login: login.to_string(),
            is_admin,
        };
        self.users.insert(user.clone());
        ActorRef::User(user)
    }

    pub fn add_collaborator(&self, email: &str) -> ActorRef {
        let encrypted = self.cipher.encrypt(email).unwrap_or_default();
        let name = email_local_part(email);
        let record = self.store.seed_collaborator(&encrypted, name);
        ActorRef::Collaborator(CollaboratorActor {
            id: record.id,
            display_name: record.display_name,
            email: email.to_string(),
        })
    }

    pub fn service(&self, config: ServiceConfig) -> AnnotationService {
        AnnotationService::new(
            self.store.clone(),
            self.users.clone(),
            self.cipher.clone(),
            self.mailer.clone(),
            self.inbox.clone(),
            SessionSigner::new(TEST_SECRET, 7),
            config,
        )
    }
}
