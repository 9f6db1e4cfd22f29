//! Per-request context.
//!
//! Carries the resolved actor and the request's grant cache into every
//! service call instead of any process-global "current actor".

use crate::access::GrantCache;
use crate::actor::ActorRef;

#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub actor: Option<ActorRef>,
    pub grants: GrantCache,
}

impl RequestContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn for_actor(actor: ActorRef) -> Self {
        Self {
            actor: Some(actor),
            grants: GrantCache::new(),
        }
    }

    pub fn actor(&self) -> Option<&ActorRef> {
        self.actor.as_ref()
    }

    pub fn is_collaborator(&self) -> bool {
        self.actor.as_ref().is_some_and(ActorRef::is_collaborator)
    }
}
