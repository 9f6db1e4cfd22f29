//! # People Directory
//!
//! One lookup surface over registered users and collaborators. Collaborator
//! emails are only stored encrypted, so finding one by email means decrypting
//! candidates.

use crate::actor::{email_local_part, ActorKey, ActorKind, ActorRef, ActorView, CollaboratorActor};
use crate::models::CollaboratorRecord;
use crate::traits::{AnnotationStore, EmailCipher, UserDirectory};
use tracing::debug;

#[derive(Clone, Copy)]
pub struct People<'a> {
    pub store: &'a dyn AnnotationStore,
    pub users: &'a dyn UserDirectory,
    pub cipher: &'a dyn EmailCipher,
}

impl<'a> People<'a> {
    pub fn new(
        store: &'a dyn AnnotationStore,
        users: &'a dyn UserDirectory,
        cipher: &'a dyn EmailCipher,
    ) -> Self {
        Self { store, users, cipher }
    }

    /// Decrypts the email and fills a blank display name with its local part.
    pub fn collaborator_actor(&self, record: &CollaboratorRecord) -> CollaboratorActor {
        let email = self.cipher.decrypt(&record.email_encrypted).unwrap_or_default();
        let display_name = if record.display_name.trim().is_empty() {
            email_local_part(&email).to_string()
        } else {
            record.display_name.clone()
        };
        CollaboratorActor {
            id: record.id,
            display_name,
            email,
        }
    }

    pub async fn collaborator(&self, id: i64) -> anyhow::Result<Option<CollaboratorActor>> {
        Ok(self
            .store
            .get_collaborator(id)
            .await?
            .map(|record| self.collaborator_actor(&record)))
    }

    pub async fn load(&self, key: ActorKey) -> anyhow::Result<Option<ActorRef>> {
        Ok(match key.kind {
            ActorKind::User => self.users.get_user(key.id).await?.map(ActorRef::User),
            ActorKind::Collaborator => self.collaborator(key.id).await?.map(ActorRef::Collaborator),
        })
    }

    pub async fn view(&self, key: ActorKey) -> anyhow::Result<Option<ActorView>> {
        Ok(self.load(key).await?.as_ref().map(ActorView::from))
    }

    pub async fn collaborator_by_email(&self, email: &str) -> anyhow::Result<Option<CollaboratorRecord>> {
        let target = email.trim().to_lowercase();
        if target.is_empty() {
            return Ok(None);
        }
        for record in self.store.list_collaborators(None).await? {
            match self.cipher.decrypt(&record.email_encrypted) {
                Some(plain) if plain.to_lowercase() == target => return Ok(Some(record)),
                Some(_) => {}
                None => debug!(collaborator_id = record.id, "skipping undecryptable collaborator email"),
            }
        }
        Ok(None)
    }

    /// Returns the collaborator owning `email`, creating one when none exists.
    pub async fn find_or_create_collaborator(&self, email: &str) -> anyhow::Result<CollaboratorRecord> {
        if let Some(existing) = self.collaborator_by_email(email).await? {
            return Ok(existing);
        }
        let encrypted = self.cipher.encrypt(email)?;
        let record = self
            .store
            .insert_collaborator(&encrypted, email_local_part(email))
            .await?;
        debug!(collaborator_id = record.id, "created collaborator");
        Ok(record)
    }
}
