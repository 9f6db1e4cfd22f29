//! # Access Control
//!
//! Registered users see every thread. A collaborator only sees threads in their
//! grant set: threads they created plus threads where a comment tags them.
//! Grants are derived from the store once per request and then extended in
//! place, so a grant added mid-request is visible to later reads at once.

use crate::actor::{ActorRef, Identity};
use crate::error::{AppError, Result, MUST_CLOSE};
use crate::models::Thread;
use crate::traits::AnnotationStore;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Request-scoped cache of collaborator grant sets, keyed by collaborator id.
#[derive(Debug, Clone, Default)]
pub struct GrantCache {
    inner: Arc<DashMap<i64, HashSet<i64>>>,
}

impl GrantCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Thread ids the collaborator may access, loading them on first use.
    pub async fn grants(&self, store: &dyn AnnotationStore, collaborator_id: i64) -> anyhow::Result<HashSet<i64>> {
        if let Some(cached) = self.inner.get(&collaborator_id) {
            return Ok(cached.clone());
        }
        let loaded: HashSet<i64> = store
            .collaborator_thread_ids(collaborator_id)
            .await?
            .into_iter()
            .filter(|id| *id > 0)
            .collect();
        debug!(collaborator_id, grants = loaded.len(), "loaded collaborator grants");
        let mut entry = self.inner.entry(collaborator_id).or_default();
        entry.extend(loaded);
        Ok(entry.clone())
    }

    pub async fn can_access(
        &self,
        store: &dyn AnnotationStore,
        collaborator_id: i64,
        thread_id: i64,
    ) -> anyhow::Result<bool> {
        if collaborator_id <= 0 || thread_id <= 0 {
            return Ok(false);
        }
        Ok(self.grants(store, collaborator_id).await?.contains(&thread_id))
    }

    /// Adds a thread to the cached grant set.
    pub async fn register(
        &self,
        store: &dyn AnnotationStore,
        collaborator_id: i64,
        thread_id: i64,
    ) -> anyhow::Result<()> {
        if collaborator_id <= 0 || thread_id <= 0 {
            return Ok(());
        }
        self.grants(store, collaborator_id).await?;
        self.inner.entry(collaborator_id).or_default().insert(thread_id);
        Ok(())
    }
}

/// Whether `actor` may read or post to `thread_id`. Anonymous requests never can.
pub async fn can_participate(
    grants: &GrantCache,
    store: &dyn AnnotationStore,
    actor: Option<&ActorRef>,
    thread_id: i64,
) -> anyhow::Result<bool> {
    match actor {
        None => Ok(false),
        Some(ActorRef::User(_)) => Ok(true),
        Some(ActorRef::Collaborator(c)) => grants.can_access(store, c.id, thread_id).await,
    }
}

/// Closing is reserved to registered users.
pub fn ensure_can_close(actor: Option<&ActorRef>) -> Result<()> {
    match actor {
        Some(ActorRef::User(_)) => Ok(()),
        _ => Err(AppError::Forbidden("closing requires a registered user".into())),
    }
}

/// Administrators may delete anything; a creator only once the thread is closed.
pub fn ensure_can_delete(actor: Option<&ActorRef>, thread: &Thread) -> Result<()> {
    let actor = match actor {
        Some(actor) if !actor.is_collaborator() => actor,
        _ => return Err(AppError::Forbidden("deleting requires a registered user".into())),
    };
    if actor.is_admin() {
        return Ok(());
    }
    if thread.created_by != actor.key() {
        return Err(AppError::Forbidden("only the creator may delete this thread".into()));
    }
    if !thread.is_closed {
        return Err(AppError::Conflict(MUST_CLOSE.into()));
    }
    Ok(())
}
