//! # Tag notifications
//!
//! Sent once per distinct actor a new comment tags. Registered users get an
//! in-app note; anyone with an email gets a message linking to the thread.
//! Collaborator links carry their personal invite token.
//! Delivery failures are logged and never fail the comment.

use crate::actor::{ActorRef, Identity};
use crate::invite::{encode_invite_token, with_query_param, INVITE_PARAM};
use crate::traits::{Mailer, NotificationInbox};
use askama::Template;
use tracing::{debug, warn};

#[derive(Template)]
#[template(path = "tag_email.html")]
struct TagEmail<'a> {
    tagger: &'a str,
    link: &'a str,
    personal_link: bool,
}

pub struct Notifier<'a> {
    pub inbox: &'a dyn NotificationInbox,
    pub mailer: &'a dyn Mailer,
    pub site_name: &'a str,
    pub allow_outside: bool,
}

fn tagger_name(tagger: Option<&ActorRef>) -> String {
    match tagger {
        Some(actor) if !actor.display_name().is_empty() => actor.display_name().to_string(),
        Some(actor) if !actor.login().is_empty() => actor.login().to_string(),
        _ => "Someone".to_string(),
    }
}

impl Notifier<'_> {
    /// `collaborator_ciphertext` is the stored email ciphertext when `target`
    /// is a collaborator; it becomes the invite token on the link.
    pub async fn tagged(
        &self,
        target: &ActorRef,
        tagger: Option<&ActorRef>,
        thread_link: &str,
        collaborator_ciphertext: Option<&str>,
    ) {
        if thread_link.is_empty() {
            return;
        }
        let name = tagger_name(tagger);

        if let ActorRef::User(user) = target {
            let note = format!("You were tagged in a note by {name}: {thread_link}");
            if let Err(err) = self.inbox.push(user.id, &note).await {
                warn!(user_id = user.id, error = %err, "failed to queue tag note");
            }
        }

        let email = target.email().trim();
        if email.is_empty() {
            return;
        }

        let mut link = thread_link.to_string();
        let mut personal_link = false;
        if target.is_collaborator() {
            if !self.allow_outside {
                debug!(collaborator_id = target.id(), "outside collaborators disabled, no email");
                return;
            }
            if let Some(token) = collaborator_ciphertext.and_then(encode_invite_token) {
                link = with_query_param(&link, INVITE_PARAM, &token);
                personal_link = true;
            }
        }

        let body = match (TagEmail {
            tagger: &name,
            link: &link,
            personal_link,
        })
        .render()
        {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to render tag email");
                return;
            }
        };
        let subject = format!("{name} tagged you in a note on {}", self.site_name);
        if let Err(err) = self.mailer.send(email, &subject, &body).await {
            warn!(actor = %target.key(), error = %err, "failed to send tag email");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{CollaboratorActor, UserActor};
    use crate::traits::{MockMailer, MockNotificationInbox};
    use base64::{engine::general_purpose::STANDARD, Engine};

    fn ana() -> ActorRef {
        ActorRef::User(UserActor {
            id: 1,
            display_name: "Ana Lee".into(),
            email: "ana@example.org".into(),
            login: "ana".into(),
            is_admin: false,
        })
    }

    #[tokio::test]
    async fn user_gets_note_and_plain_link() {
        let mut inbox = MockNotificationInbox::new();
        inbox
            .expect_push()
            .withf(|id, note| *id == 1 && note.contains("by Someone") && note.ends_with("https://x.org/?annotate-id=4"))
            .times(1)
            .returning(|_, _| Ok(()));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|to, subject, body| {
                to == "ana@example.org"
                    && subject == "Someone tagged you in a note on Site"
                    && body.contains("https://x.org/?annotate-id=4")
                    && !body.contains("do not share")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let notifier = Notifier {
            inbox: &inbox,
            mailer: &mailer,
            site_name: "Site",
            allow_outside: true,
        };
        notifier.tagged(&ana(), None, "https://x.org/?annotate-id=4", None).await;
    }

    #[tokio::test]
    async fn collaborator_link_carries_invite_token() {
        let inbox = MockNotificationInbox::new();
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|_, _, body| body.contains("annotate-collab=") && body.contains("do not share"))
            .times(1)
            .returning(|_, _, _| Ok(()));
        let guest = ActorRef::Collaborator(CollaboratorActor {
            id: 3,
            display_name: "guest".into(),
            email: "guest@outside.io".into(),
        });
        let notifier = Notifier {
            inbox: &inbox,
            mailer: &mailer,
            site_name: "Site",
            allow_outside: true,
        };
        let ciphertext = STANDARD.encode(b"opaque-bytes");
        notifier
            .tagged(&guest, Some(&ana()), "https://x.org/?annotate-id=4", Some(&ciphertext))
            .await;
    }

    #[tokio::test]
    async fn mail_failure_is_swallowed() {
        let mut inbox = MockNotificationInbox::new();
        inbox.expect_push().returning(|_, _| Ok(()));
        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .returning(|_, _, _| Err(anyhow::anyhow!("smtp down")));
        let notifier = Notifier {
            inbox: &inbox,
            mailer: &mailer,
            site_name: "Site",
            allow_outside: true,
        };
        notifier.tagged(&ana(), None, "https://x.org/", None).await;
    }
}
