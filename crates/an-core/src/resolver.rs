//! # Actor Resolver
//!
//! Turns the text after an `@` into a concrete actor. Order of attempts:
//! registered user by email, collaborator by email (found or created), user by
//! exact login, then the first user whose display name contains the text.

use crate::actor::ActorRef;
use crate::directory::People;
use crate::mention::MentionResolver;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+'\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("static email pattern")
});

pub fn looks_like_email(token: &str) -> bool {
    EMAIL_RE.is_match(token)
}

/// Strict login form: letters, digits, space and `_ . - @`.
pub fn sanitize_login(token: &str) -> String {
    token
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '.' | '-' | '@'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Resolver bound to one request: who is asking and whether outside
/// collaborators may be invited.
pub struct ActorResolver<'a> {
    people: People<'a>,
    requester: Option<&'a ActorRef>,
    allow_outside: bool,
}

impl<'a> ActorResolver<'a> {
    pub fn new(people: People<'a>, requester: Option<&'a ActorRef>, allow_outside: bool) -> Self {
        Self {
            people,
            requester,
            allow_outside,
        }
    }

    pub async fn resolve_token(&self, token: &str) -> anyhow::Result<Option<ActorRef>> {
        let token = token.trim();
        if token.is_empty() {
            return Ok(None);
        }

        if looks_like_email(token) {
            if let Some(user) = self.people.users.find_by_email(token).await? {
                return Ok(Some(ActorRef::User(user)));
            }
            let requester_is_collaborator = self.requester.is_some_and(ActorRef::is_collaborator);
            if !requester_is_collaborator && self.allow_outside {
                let record = self.people.find_or_create_collaborator(token).await?;
                return Ok(Some(ActorRef::Collaborator(self.people.collaborator_actor(&record))));
            }
            debug!(requester_is_collaborator, "email mention left unresolved");
        }

        let login = sanitize_login(token);
        if !login.is_empty() {
            if let Some(user) = self.people.users.find_by_login(&login).await? {
                return Ok(Some(ActorRef::User(user)));
            }
        }

        Ok(self
            .people
            .users
            .search_display_name(token)
            .await?
            .into_iter()
            .next()
            .map(ActorRef::User))
    }
}

#[async_trait]
impl MentionResolver for ActorResolver<'_> {
    async fn resolve(&self, token: &str) -> anyhow::Result<Option<ActorRef>> {
        self.resolve_token(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorKind, Identity};
    use crate::testing::Fixture;

    #[test]
    fn email_shape() {
        assert!(looks_like_email("ana@example.org"));
        assert!(looks_like_email("a.b+c@mail.example.co"));
        assert!(!looks_like_email("ana"));
        assert!(!looks_like_email("ana@localhost"));
    }

    #[test]
    fn login_sanitizing_drops_punctuation() {
        assert_eq!(sanitize_login("ana!"), "ana");
        assert_eq!(sanitize_login("j.doe-2"), "j.doe-2");
    }

    #[tokio::test]
    async fn registered_email_wins_over_collaborator() {
        let fx = Fixture::new();
        let ana = fx.add_user(1, "Ana Lee", "ana@example.org", "ana", false);
        let resolver = ActorResolver::new(fx.people(), Some(&ana), true);
        let found = resolver.resolve_token("ANA@example.org").await.unwrap().unwrap();
        assert_eq!(found.kind(), ActorKind::User);
        assert_eq!(fx.store.collaborator_count(), 0);
    }

    #[tokio::test]
    async fn unknown_email_creates_collaborator_once() {
        let fx = Fixture::new();
        let ana = fx.add_user(1, "Ana Lee", "ana@example.org", "ana", false);
        let resolver = ActorResolver::new(fx.people(), Some(&ana), true);
        let first = resolver.resolve_token("guest@outside.io").await.unwrap().unwrap();
        let second = resolver.resolve_token("guest@outside.io").await.unwrap().unwrap();
        assert!(first.is_collaborator());
        assert_eq!(first.key(), second.key());
        assert_eq!(first.display_name(), "guest");
        assert_eq!(fx.store.collaborator_count(), 1);
    }

    #[tokio::test]
    async fn collaborators_cannot_invite_collaborators() {
        let fx = Fixture::new();
        let guest = fx.add_collaborator("guest@outside.io");
        let resolver = ActorResolver::new(fx.people(), Some(&guest), true);
        assert!(resolver.resolve_token("other@outside.io").await.unwrap().is_none());
        assert_eq!(fx.store.collaborator_count(), 1);
    }

    #[tokio::test]
    async fn invites_disabled_yields_nothing() {
        let fx = Fixture::new();
        let ana = fx.add_user(1, "Ana Lee", "ana@example.org", "ana", false);
        let resolver = ActorResolver::new(fx.people(), Some(&ana), false);
        assert!(resolver.resolve_token("guest@outside.io").await.unwrap().is_none());
        assert_eq!(fx.store.collaborator_count(), 0);
    }

    #[tokio::test]
    async fn falls_back_to_login_then_display_name() {
        let fx = Fixture::new();
        fx.add_user(1, "Ana Lee", "ana@example.org", "ana", false);
        fx.add_user(2, "Bruno Diaz", "bruno@example.org", "bdiaz", false);
        let resolver = ActorResolver::new(fx.people(), None, true);
        assert_eq!(resolver.resolve_token("ana").await.unwrap().unwrap().id(), 1);
        assert_eq!(resolver.resolve_token("Bruno").await.unwrap().unwrap().id(), 2);
        assert!(resolver.resolve_token("zed").await.unwrap().is_none());
    }
}
