//! # AnnotationService
//!
//! The boundary operations: listing, creating, closing and deleting threads,
//! listing and posting comments, people search, collaborator sessions,
//! notification drain and the maintenance sweep. Transport adapters only
//! decode requests, build a [`RequestContext`] and call in here.

use crate::access::{can_participate, ensure_can_close, ensure_can_delete};
use crate::actor::{ActorKey, ActorRef, ActorView, Identity};
use crate::context::RequestContext;
use crate::directory::People;
use crate::error::{AppError, Result, THREAD_CLOSED};
use crate::invite::{decode_invite_token, thread_share_url};
use crate::mention::{encode_mentions, excerpt, expand_tokens, normalize_comment_body, token_keys, EXCERPT_WIDTH};
use crate::models::{
    CleanupReport, CommentView, Created, CreateThreadRequest, NewComment, NewThread, PersonMatch,
    PostCommentRequest, Tag, Thread, ThreadSummary,
};
use crate::notify::Notifier;
use crate::resolver::ActorResolver;
use crate::session::{Session, SessionSigner};
use crate::traits::{AnnotationStore, EmailCipher, Mailer, NotificationInbox, UserDirectory};
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const USER_SEARCH_LIMIT: usize = 10;
const COLLABORATOR_SCAN_LIMIT: usize = 200;
const COLLABORATOR_MATCH_LIMIT: usize = 20;

/// Behaviour switches the service reads on every call.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub site_name: String,
    /// Fallback link target when a comment arrives without a page URL
    pub site_base_url: String,
    pub allow_outside_collaborators: bool,
    pub search_max_results: usize,
    pub auto_delete_enabled: bool,
    /// Clamped to 1..=60 when the sweep runs
    pub auto_delete_months: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            site_name: "Annotator".into(),
            site_base_url: "http://localhost:8080/".into(),
            allow_outside_collaborators: true,
            search_max_results: 10,
            auto_delete_enabled: true,
            auto_delete_months: 12,
        }
    }
}

pub struct AnnotationService {
    store: Arc<dyn AnnotationStore>,
    users: Arc<dyn UserDirectory>,
    cipher: Arc<dyn EmailCipher>,
    mailer: Arc<dyn Mailer>,
    inbox: Arc<dyn NotificationInbox>,
    sessions: SessionSigner,
    config: ServiceConfig,
}

fn require_actor(ctx: &RequestContext) -> Result<&ActorRef> {
    ctx.actor()
        .ok_or_else(|| AppError::Forbidden("no active actor".into()))
}

impl AnnotationService {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        users: Arc<dyn UserDirectory>,
        cipher: Arc<dyn EmailCipher>,
        mailer: Arc<dyn Mailer>,
        inbox: Arc<dyn NotificationInbox>,
        sessions: SessionSigner,
        config: ServiceConfig,
    ) -> Self {
        Self {
            store,
            users,
            cipher,
            mailer,
            inbox,
            sessions,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionSigner {
        &self.sessions
    }

    fn people(&self) -> People<'_> {
        People::new(self.store.as_ref(), self.users.as_ref(), self.cipher.as_ref())
    }

    // ── Threads ─────────────────────────────────────────────────────────────

    #[instrument(skip(self, ctx))]
    pub async fn list_threads(&self, ctx: &RequestContext, page_url: &str) -> Result<Vec<ThreadSummary>> {
        let actor = require_actor(ctx)?;
        let page_url = page_url.trim();
        if page_url.is_empty() {
            return Ok(Vec::new());
        }

        let threads = self.store.threads_for_url(page_url).await?;
        let mut out = Vec::with_capacity(threads.len());
        for thread in threads {
            if !can_participate(&ctx.grants, self.store.as_ref(), Some(actor), thread.id).await? {
                continue;
            }
            out.push(self.summarize(&thread).await?);
        }
        debug!(count = out.len(), "listed threads");
        Ok(out)
    }

    async fn summarize(&self, thread: &Thread) -> Result<ThreadSummary> {
        let mut summary = ThreadSummary::bare(thread);
        let Some(latest) = self.store.latest_comment(thread.id).await? else {
            return Ok(summary);
        };
        let people = self.people();
        let mut views: HashMap<ActorKey, ActorView> = HashMap::new();
        for key in token_keys(&latest.body) {
            if let Some(view) = people.view(key).await? {
                views.insert(key, view);
            }
        }
        let expanded = expand_tokens(&latest.body, |key| views.get(&key).cloned());
        summary.last_comment_excerpt = excerpt(&expanded, EXCERPT_WIDTH);
        if let Some(author) = people.view(latest.author).await? {
            summary.last_comment_author = author.display_name;
        }
        Ok(summary)
    }

    #[instrument(skip_all, fields(page_url = %request.url))]
    pub async fn create_thread(&self, ctx: &RequestContext, request: CreateThreadRequest) -> Result<Created> {
        let page_url = request.url.trim();
        let selector = request.selector.trim();
        if page_url.is_empty() || selector.is_empty() {
            return Err(AppError::Validation("url and selector are required".into()));
        }
        let actor = require_actor(ctx)?;

        let thread = self
            .store
            .insert_thread(NewThread {
                page_url: page_url.to_string(),
                selector: selector.to_string(),
                created_by: actor.key(),
            })
            .await?;
        if let ActorRef::Collaborator(c) = actor {
            ctx.grants.register(self.store.as_ref(), c.id, thread.id).await?;
        }
        info!(thread_id = thread.id, actor = %actor.key(), "thread created");
        Ok(Created { id: thread.id })
    }

    /// Idempotent: closing a closed thread succeeds.
    pub async fn close_thread(&self, ctx: &RequestContext, thread_id: i64) -> Result<()> {
        ensure_can_close(ctx.actor())?;
        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", thread_id))?;
        if !thread.is_closed {
            self.store.close_thread(thread_id).await?;
            info!(thread_id, "thread closed");
        }
        Ok(())
    }

    pub async fn delete_thread(&self, ctx: &RequestContext, thread_id: i64) -> Result<()> {
        ensure_can_close(ctx.actor())?;
        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", thread_id))?;
        ensure_can_delete(ctx.actor(), &thread)?;
        self.store.delete_thread_cascade(thread_id).await?;
        info!(thread_id, "thread deleted");
        Ok(())
    }

    // ── Comments ────────────────────────────────────────────────────────────

    /// Ordered comments with author and tags. Threads outside a collaborator's
    /// grant set read as empty.
    pub async fn list_comments(&self, ctx: &RequestContext, thread_id: i64) -> Result<Vec<CommentView>> {
        let actor = require_actor(ctx)?;
        if thread_id <= 0 {
            return Ok(Vec::new());
        }
        if !can_participate(&ctx.grants, self.store.as_ref(), Some(actor), thread_id).await? {
            return Ok(Vec::new());
        }

        let people = self.people();
        let mut views: HashMap<ActorKey, Option<ActorView>> = HashMap::new();
        let mut out = Vec::new();
        for comment in self.store.comments_for_thread(thread_id).await? {
            let mut keys = vec![comment.author];
            let tag_keys = self.store.tags_for_comment(comment.id).await?;
            keys.extend(tag_keys.iter().copied());
            for key in keys {
                if !views.contains_key(&key) {
                    views.insert(key, people.view(key).await?);
                }
            }
            let lookup = |key: &ActorKey| views.get(key).cloned().flatten();
            out.push(CommentView {
                id: comment.id,
                thread_id: comment.thread_id,
                parent_id: comment.parent_id,
                user: lookup(&comment.author),
                tags: tag_keys.iter().filter_map(lookup).collect(),
                body: comment.body,
                created_at: comment.created_at,
            });
        }
        Ok(out)
    }

    #[instrument(skip_all, fields(thread_id = request.thread_id))]
    pub async fn post_comment(&self, ctx: &RequestContext, request: PostCommentRequest) -> Result<Created> {
        let content = normalize_comment_body(&request.content);
        if request.thread_id <= 0 || content.is_empty() {
            return Err(AppError::Validation("thread_id and content are required".into()));
        }
        let actor = require_actor(ctx)?;
        let thread_id = request.thread_id;
        // Collaborators learn nothing about threads outside their grants.
        if !can_participate(&ctx.grants, self.store.as_ref(), Some(actor), thread_id).await? {
            return Err(AppError::Forbidden("thread not accessible".into()));
        }
        let thread = self
            .store
            .get_thread(thread_id)
            .await?
            .ok_or_else(|| AppError::not_found("Thread", thread_id))?;
        if thread.is_closed {
            return Err(AppError::Conflict(THREAD_CLOSED.into()));
        }

        let people = self.people();
        let resolver = ActorResolver::new(people, Some(actor), self.config.allow_outside_collaborators);
        let encoded = encode_mentions(&content, &resolver).await?;

        let comment = self
            .store
            .insert_comment(NewComment {
                thread_id,
                parent_id: request.parent_id.filter(|id| *id > 0),
                author: actor.key(),
                body: encoded.body,
            })
            .await?;

        let base = if request.url.trim().is_empty() {
            self.config.site_base_url.as_str()
        } else {
            request.url.trim()
        };
        let thread_link = thread_share_url(base, thread_id);
        let notifier = Notifier {
            inbox: self.inbox.as_ref(),
            mailer: self.mailer.as_ref(),
            site_name: &self.config.site_name,
            allow_outside: self.config.allow_outside_collaborators,
        };
        for target in &encoded.tagged {
            self.store
                .insert_tag(Tag {
                    comment_id: comment.id,
                    target: target.key(),
                })
                .await?;
            let ciphertext = match target {
                ActorRef::Collaborator(c) => {
                    ctx.grants.register(self.store.as_ref(), c.id, thread_id).await?;
                    self.store.get_collaborator(c.id).await?.map(|r| r.email_encrypted)
                }
                ActorRef::User(_) => None,
            };
            notifier
                .tagged(target, Some(actor), &thread_link, ciphertext.as_deref())
                .await;
        }

        self.store.touch_thread(thread_id, Utc::now()).await?;
        info!(comment_id = comment.id, tags = encoded.tagged.len(), "comment posted");
        Ok(Created { id: comment.id })
    }

    // ── People ──────────────────────────────────────────────────────────────

    /// Users first, then collaborators, deduplicated by email then login.
    pub async fn search_people(&self, ctx: &RequestContext, term: &str) -> Result<Vec<PersonMatch>> {
        require_actor(ctx)?;
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<PersonMatch> = self
            .users
            .search(term, USER_SEARCH_LIMIT)
            .await?
            .into_iter()
            .map(|u| PersonMatch {
                id: u.id.to_string(),
                login: u.login,
                display: u.display_name,
                email: u.email,
                is_collaborator: false,
            })
            .collect();

        let needle = term.to_lowercase();
        let people = self.people();
        let mut collaborator_hits = 0;
        for record in self.store.list_collaborators(Some(COLLABORATOR_SCAN_LIMIT)).await? {
            let actor = people.collaborator_actor(&record);
            if actor.email.is_empty() {
                continue;
            }
            let haystack = format!("{} {}", actor.display_name, actor.email).to_lowercase();
            if !haystack.contains(&needle) {
                continue;
            }
            candidates.push(PersonMatch {
                id: format!("c_{}", actor.id),
                login: String::new(),
                display: actor.display_name,
                email: actor.email,
                is_collaborator: true,
            });
            collaborator_hits += 1;
            if collaborator_hits >= COLLABORATOR_MATCH_LIMIT {
                break;
            }
        }

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for candidate in candidates {
            let key = if !candidate.email.is_empty() {
                candidate.email.to_lowercase()
            } else {
                candidate.login.to_lowercase()
            };
            if !key.is_empty() && !seen.insert(key) {
                continue;
            }
            out.push(candidate);
            if out.len() >= self.config.search_max_results {
                break;
            }
        }
        Ok(out)
    }

    pub async fn user_actor(&self, user_id: i64) -> Result<Option<ActorRef>> {
        Ok(self.users.get_user(user_id).await?.map(ActorRef::User))
    }

    // ── Collaborator sessions ───────────────────────────────────────────────

    /// Actor behind a session cookie. Invalid, expired or orphaned sessions
    /// resolve to nobody. A valid one bumps the collaborator's activity.
    pub async fn session_actor(&self, cookie_value: &str, now: DateTime<Utc>) -> Result<Option<ActorRef>> {
        if !self.config.allow_outside_collaborators {
            return Ok(None);
        }
        let session = match self.sessions.verify(cookie_value, now) {
            Ok(session) => session,
            Err(err) => {
                debug!(error = %err, "ignoring collaborator session");
                return Ok(None);
            }
        };
        let Some(collaborator) = self.people().collaborator(session.collaborator_id).await? else {
            return Ok(None);
        };
        if let Err(err) = self.store.touch_collaborator(collaborator.id, now).await {
            warn!(collaborator_id = collaborator.id, error = %err, "failed to touch collaborator activity");
        }
        Ok(Some(ActorRef::Collaborator(collaborator)))
    }

    /// Exchanges an invite token for a signed session value.
    pub async fn establish_session(&self, invite_token: &str, now: DateTime<Utc>) -> Result<Option<(String, Session)>> {
        if !self.config.allow_outside_collaborators {
            return Ok(None);
        }
        let Some(ciphertext) = decode_invite_token(invite_token) else {
            return Ok(None);
        };
        let Some(record) = self.store.find_collaborator_by_ciphertext(&ciphertext).await? else {
            debug!("invite token matched no collaborator");
            return Ok(None);
        };
        let issued = self.sessions.issue(record.id, now);
        if issued.is_some() {
            info!(collaborator_id = record.id, "collaborator session established");
        }
        Ok(issued)
    }

    // ── Notifications & maintenance ─────────────────────────────────────────

    pub async fn drain_notifications(&self, ctx: &RequestContext) -> Result<Vec<String>> {
        match ctx.actor() {
            Some(ActorRef::User(user)) => Ok(self.inbox.drain(user.id).await?),
            _ => Ok(Vec::new()),
        }
    }

    /// Removes threads and collaborators idle for `auto_delete_months × 30` days.
    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        if !self.config.auto_delete_enabled {
            return Ok(CleanupReport::default());
        }
        let months = i64::from(self.config.auto_delete_months.clamp(1, 60));
        let cutoff = now - Duration::days(months * 30);
        let report = CleanupReport {
            threads: self.store.purge_threads_inactive_since(cutoff).await?,
            collaborators: self.store.purge_collaborators_inactive_since(cutoff).await?,
        };
        info!(threads = report.threads, collaborators = report.collaborators, %cutoff, "cleanup finished");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invite::encode_invite_token;
    use crate::testing::Fixture;

    const PAGE: &str = "https://example.org/post";

    struct World {
        fx: Fixture,
        service: AnnotationService,
        ana: ActorRef,
        admin: ActorRef,
    }

    fn world() -> World {
        let fx = Fixture::new();
        let ana = fx.add_user(1, "Ana Lee", "ana@example.org", "ana", false);
        let admin = fx.add_user(2, "Site Admin", "admin@example.org", "admin", true);
        let service = fx.service(ServiceConfig::default());
        World { fx, service, ana, admin }
    }

    fn as_actor(actor: &ActorRef) -> RequestContext {
        RequestContext::for_actor(actor.clone())
    }

    async fn new_thread(w: &World, by: &ActorRef) -> i64 {
        w.service
            .create_thread(
                &as_actor(by),
                CreateThreadRequest {
                    url: PAGE.into(),
                    selector: "#intro".into(),
                },
            )
            .await
            .unwrap()
            .id
    }

    fn comment(thread_id: i64, content: &str) -> PostCommentRequest {
        PostCommentRequest {
            thread_id,
            content: content.into(),
            parent_id: None,
            url: PAGE.into(),
        }
    }

    #[tokio::test]
    async fn anonymous_posting_is_forbidden_and_writes_nothing() {
        let w = world();
        let id = new_thread(&w, &w.ana).await;
        let err = w
            .service
            .post_comment(&RequestContext::anonymous(), comment(id, "hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        assert_eq!(w.fx.store.comment_count(), 0);
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        let w = world();
        let ctx = as_actor(&w.ana);
        let err = w
            .service
            .create_thread(&ctx, CreateThreadRequest { url: PAGE.into(), selector: " ".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        let err = w.service.post_comment(&ctx, comment(1, "<p></p>")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn mention_creates_tag_note_and_email() {
        let w = world();
        let id = new_thread(&w, &w.admin).await;
        w.service
            .post_comment(&as_actor(&w.admin), comment(id, "please check @ana"))
            .await
            .unwrap();

        let stored = w.fx.store.comments();
        assert_eq!(stored[0].body, "please check tag://u1");
        assert_eq!(w.fx.store.tags()[0].target, ActorKey::user(1));

        let notes = w.service.drain_notifications(&as_actor(&w.ana)).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].contains("Site Admin"));
        assert!(notes[0].contains("annotate-id="));
        assert!(w.service.drain_notifications(&as_actor(&w.ana)).await.unwrap().is_empty());

        let mail = w.fx.mailer.sent();
        assert_eq!(mail.len(), 1);
        assert_eq!(mail[0].to, "ana@example.org");
    }

    #[tokio::test]
    async fn collaborator_sees_only_granted_threads() {
        let w = world();
        let guest = w.fx.add_collaborator("guest@outside.io");
        let hidden = new_thread(&w, &w.ana).await;
        let shared = new_thread(&w, &w.ana).await;
        w.service
            .post_comment(&as_actor(&w.ana), comment(shared, "@guest@outside.io have a look"))
            .await
            .unwrap();

        let ctx = as_actor(&guest);
        let listed: Vec<i64> = w.service.list_threads(&ctx, PAGE).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(listed, vec![shared]);
        assert!(w.service.list_comments(&ctx, hidden).await.unwrap().is_empty());
        let err = w.service.post_comment(&ctx, comment(hidden, "let me in")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
        // Same answer whether or not the thread exists.
        let err = w.service.post_comment(&ctx, comment(9_999, "probe")).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let mail = w.fx.mailer.sent();
        assert!(mail[0].body.contains("annotate-collab="));
    }

    #[tokio::test]
    async fn grant_is_visible_within_the_same_request() {
        let w = world();
        let guest = w.fx.add_collaborator("guest@outside.io");
        let ctx = as_actor(&guest);
        let id = w
            .service
            .create_thread(&ctx, CreateThreadRequest { url: PAGE.into(), selector: "p".into() })
            .await
            .unwrap()
            .id;
        assert!(ctx.grants.can_access(w.fx.store.as_ref(), guest.id(), id).await.unwrap());
        w.service.post_comment(&ctx, comment(id, "first")).await.unwrap();
    }

    #[tokio::test]
    async fn collaborator_mentions_never_invite_new_collaborators() {
        let w = world();
        let guest = w.fx.add_collaborator("guest@outside.io");
        let ctx = as_actor(&guest);
        let id = w
            .service
            .create_thread(&ctx, CreateThreadRequest { url: PAGE.into(), selector: "p".into() })
            .await
            .unwrap()
            .id;
        w.service.post_comment(&ctx, comment(id, "cc @friend@elsewhere.io")).await.unwrap();
        assert_eq!(w.fx.store.collaborator_count(), 1);
        assert!(w.fx.store.comments()[0].body.contains("@friend@elsewhere.io"));
    }

    #[tokio::test]
    async fn delete_requires_close_unless_admin() {
        let w = world();
        let id = new_thread(&w, &w.ana).await;
        let err = w.service.delete_thread(&as_actor(&w.ana), id).await.unwrap_err();
        assert_eq!(err, AppError::Conflict("must_close".into()));

        w.service.close_thread(&as_actor(&w.ana), id).await.unwrap();
        w.service.close_thread(&as_actor(&w.ana), id).await.unwrap();
        w.service.delete_thread(&as_actor(&w.ana), id).await.unwrap();
        assert!(w.fx.store.thread(id).is_none());

        let open = new_thread(&w, &w.ana).await;
        w.service.delete_thread(&as_actor(&w.admin), open).await.unwrap();
        let err = w.service.delete_thread(&as_actor(&w.admin), open).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(..)));
    }

    #[tokio::test]
    async fn closed_threads_reject_comments() {
        let w = world();
        let id = new_thread(&w, &w.ana).await;
        w.service.close_thread(&as_actor(&w.ana), id).await.unwrap();
        let err = w.service.post_comment(&as_actor(&w.ana), comment(id, "late")).await.unwrap_err();
        assert_eq!(err, AppError::Conflict("thread_closed".into()));
    }

    #[tokio::test]
    async fn listing_carries_excerpt_and_author() {
        let w = world();
        let id = new_thread(&w, &w.ana).await;
        w.service
            .post_comment(&as_actor(&w.admin), comment(id, "thanks @ana, fixed"))
            .await
            .unwrap();
        let listed = w.service.list_threads(&as_actor(&w.ana), PAGE).await.unwrap();
        assert_eq!(listed[0].last_comment_excerpt, "thanks @ana, fixed");
        assert_eq!(listed[0].last_comment_author, "Site Admin");
        assert!(w.service.list_threads(&as_actor(&w.ana), "").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn comments_carry_author_and_tags() {
        let w = world();
        let id = new_thread(&w, &w.ana).await;
        w.service.post_comment(&as_actor(&w.ana), comment(id, "@admin ping")).await.unwrap();
        let comments = w.service.list_comments(&as_actor(&w.ana), id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].user.as_ref().unwrap().display_name, "Ana Lee");
        assert_eq!(comments[0].tags[0].user_login, "admin");
    }

    #[tokio::test]
    async fn search_merges_and_dedupes() {
        let w = world();
        w.fx.add_collaborator("ana@example.org");
        w.fx.add_collaborator("anabel@outside.io");
        let found = w.service.search_people(&as_actor(&w.ana), "ana").await.unwrap();
        let ids: Vec<&str> = found.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(found.len(), 2);
        assert_eq!(ids[0], "1");
        assert!(ids[1].starts_with("c_"));
        assert!(found[1].is_collaborator);
    }

    #[tokio::test]
    async fn invite_token_establishes_a_session() {
        let w = world();
        let guest = w.fx.add_collaborator("guest@outside.io");
        let record = w.fx.store.get_collaborator(guest.id()).await.unwrap().unwrap();
        let token = encode_invite_token(&record.email_encrypted).unwrap();

        let now = Utc::now();
        let (cookie, session) = w.service.establish_session(&token, now).await.unwrap().unwrap();
        assert_eq!(session.collaborator_id, guest.id());
        let actor = w.service.session_actor(&cookie, now).await.unwrap().unwrap();
        assert_eq!(actor.key(), guest.key());

        assert!(w.service.establish_session("bogus", now).await.unwrap().is_none());
        assert!(w.service.session_actor("bogus", now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_ignored_when_outside_collaboration_disabled() {
        let fx = Fixture::new();
        let guest = fx.add_collaborator("guest@outside.io");
        let service = fx.service(ServiceConfig {
            allow_outside_collaborators: false,
            ..ServiceConfig::default()
        });
        let (cookie, _) = service.sessions().issue(guest.id(), Utc::now()).unwrap();
        assert!(service.session_actor(&cookie, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_purges_idle_threads_and_collaborators() {
        let w = world();
        let stale = new_thread(&w, &w.ana).await;
        let fresh = new_thread(&w, &w.ana).await;
        let guest = w.fx.add_collaborator("guest@outside.io");
        let now = Utc::now();
        w.fx.store.set_thread_activity(stale, now - Duration::days(400));
        w.fx.store.set_collaborator_activity(guest.id(), now - Duration::days(400));

        let report = w.service.cleanup(now).await.unwrap();
        assert_eq!(report, CleanupReport { threads: 1, collaborators: 1 });
        assert!(w.fx.store.thread(stale).is_none());
        assert!(w.fx.store.thread(fresh).is_some());
    }
}
