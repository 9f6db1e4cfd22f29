//! # Actors
//!
//! Who is acting on a request, and who a mention points at. Registered users and
//! external collaborators only share an identity space through [`ActorKey`],
//! which pairs the numeric id with the kind: user 7 and collaborator 7 are
//! different people.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminates the two actor variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Collaborator,
}

impl ActorKind {
    /// Single-letter discriminator used inside `tag://` tokens.
    pub fn flag(self) -> char {
        match self {
            ActorKind::User => 'u',
            ActorKind::Collaborator => 'c',
        }
    }

    pub fn from_flag(flag: char) -> Option<Self> {
        match flag.to_ascii_lowercase() {
            'u' => Some(ActorKind::User),
            'c' => Some(ActorKind::Collaborator),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActorKind::User => "user",
            ActorKind::Collaborator => "collaborator",
        }
    }
}

/// Stable identity of an actor: equality needs both kind and id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorKey {
    pub kind: ActorKind,
    pub id: i64,
}

impl ActorKey {
    pub fn user(id: i64) -> Self {
        Self { kind: ActorKind::User, id }
    }

    pub fn collaborator(id: i64) -> Self {
        Self { kind: ActorKind::Collaborator, id }
    }

    pub fn is_collaborator(&self) -> bool {
        self.kind == ActorKind::Collaborator
    }

    /// The opaque token stored in comment bodies, e.g. `tag://c12`.
    pub fn tag_token(&self) -> String {
        format!("tag://{}{}", self.kind.flag(), self.id)
    }
}

impl fmt::Display for ActorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

/// Capabilities every actor variant exposes.
pub trait Identity {
    fn id(&self) -> i64;
    fn kind(&self) -> ActorKind;
    fn display_name(&self) -> &str;
    fn email(&self) -> &str;

    fn key(&self) -> ActorKey {
        ActorKey {
            kind: self.kind(),
            id: self.id(),
        }
    }
}

/// A registered account on the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActor {
    pub id: i64,
    pub display_name: String,
    pub email: String,
    pub login: String,
    /// Administrators may close or delete any thread.
    pub is_admin: bool,
}

/// An outside participant known only by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollaboratorActor {
    pub id: i64,
    pub display_name: String,
    pub email: String,
}

impl Identity for UserActor {
    fn id(&self) -> i64 {
        self.id
    }
    fn kind(&self) -> ActorKind {
        ActorKind::User
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn email(&self) -> &str {
        &self.email
    }
}

impl Identity for CollaboratorActor {
    fn id(&self) -> i64 {
        self.id
    }
    fn kind(&self) -> ActorKind {
        ActorKind::Collaborator
    }
    fn display_name(&self) -> &str {
        &self.display_name
    }
    fn email(&self) -> &str {
        &self.email
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActorRef {
    User(UserActor),
    Collaborator(CollaboratorActor),
}

impl ActorRef {
    pub fn is_collaborator(&self) -> bool {
        matches!(self, ActorRef::Collaborator(_))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, ActorRef::User(u) if u.is_admin)
    }

    pub fn as_user(&self) -> Option<&UserActor> {
        match self {
            ActorRef::User(u) => Some(u),
            ActorRef::Collaborator(_) => None,
        }
    }

    /// Login handle; collaborators have none.
    pub fn login(&self) -> &str {
        match self {
            ActorRef::User(u) => &u.login,
            ActorRef::Collaborator(_) => "",
        }
    }

    fn inner(&self) -> &dyn Identity {
        match self {
            ActorRef::User(u) => u,
            ActorRef::Collaborator(c) => c,
        }
    }
}

impl Identity for ActorRef {
    fn id(&self) -> i64 {
        self.inner().id()
    }
    fn kind(&self) -> ActorKind {
        self.inner().kind()
    }
    fn display_name(&self) -> &str {
        self.inner().display_name()
    }
    fn email(&self) -> &str {
        self.inner().email()
    }
}

impl From<UserActor> for ActorRef {
    fn from(user: UserActor) -> Self {
        ActorRef::User(user)
    }
}

impl From<CollaboratorActor> for ActorRef {
    fn from(collaborator: CollaboratorActor) -> Self {
        ActorRef::Collaborator(collaborator)
    }
}

/// Part of an address before the `@`, or the whole string when there is none.
pub fn email_local_part(email: &str) -> &str {
    match email.split_once('@') {
        Some((local, _)) if !local.is_empty() => local,
        _ => email,
    }
}

/// Actor shape returned to clients alongside comments and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorView {
    #[serde(rename = "ID")]
    pub id: i64,
    pub display_name: String,
    pub user_email: String,
    pub user_login: String,
    pub is_collaborator: bool,
    #[serde(rename = "type")]
    pub kind: ActorKind,
}

impl ActorView {
    pub fn key(&self) -> ActorKey {
        ActorKey {
            kind: self.kind,
            id: self.id,
        }
    }
}

impl From<&ActorRef> for ActorView {
    fn from(actor: &ActorRef) -> Self {
        let display_name = if actor.display_name().is_empty() {
            actor.email().to_string()
        } else {
            actor.display_name().to_string()
        };
        Self {
            id: actor.id(),
            display_name,
            user_email: actor.email().to_string(),
            user_login: actor.login().to_string(),
            is_collaborator: actor.is_collaborator(),
            kind: actor.kind(),
        }
    }
}
