//! Effect runner: drives an [`InteractionMachine`] against a document, an
//! [`AnnotationApi`] and whatever draws the page.

use crate::api::{fetch_threads_for_page, AnnotationApi};
use crate::dom::DomTree;
use crate::interaction::{Action, Effect, Event, InteractionMachine, Viewer};
use std::collections::VecDeque;
use tracing::debug;

/// Host side of the page: renders visual effects and reports what it shows.
pub trait PageSurface<N> {
    /// Apply a non-network effect (badges, panel, composer, alerts, reload).
    fn apply(&mut self, effect: &Effect<N>);
    /// Badge numbers currently present in the page.
    fn rendered_badge_numbers(&self) -> Vec<usize>;
}

pub struct Runner<'a, D: DomTree, A, S> {
    dom: &'a D,
    api: A,
    surface: S,
    machine: InteractionMachine<D::Node>,
}

impl<'a, D, A, S> Runner<'a, D, A, S>
where
    D: DomTree,
    A: AnnotationApi,
    S: PageSurface<D::Node>,
{
    pub fn new(dom: &'a D, api: A, surface: S, viewer: Viewer, page_url: &str) -> Self {
        Self {
            dom,
            api,
            surface,
            machine: InteractionMachine::new(viewer, page_url),
        }
    }

    pub fn machine(&self) -> &InteractionMachine<D::Node> {
        &self.machine
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Runs the startup events for this page.
    pub async fn start(&mut self, prefers_enabled: bool) {
        for event in self.machine.startup_events(prefers_enabled) {
            self.dispatch(event).await;
        }
    }

    /// Handles `event` and every completion it leads to.
    pub async fn dispatch(&mut self, event: Event<D::Node>) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            self.machine
                .observe_rendered_badges(self.surface.rendered_badge_numbers());
            for effect in self.machine.handle(self.dom, event) {
                if let Some(next) = self.perform(effect).await {
                    queue.push_back(next);
                }
            }
        }
    }

    async fn perform(&mut self, effect: Effect<D::Node>) -> Option<Event<D::Node>> {
        let page_url = self.machine.page_url().to_string();
        match effect {
            Effect::LoadThreads => {
                let list = fetch_threads_for_page(&self.api, &page_url).await;
                Some(Event::ThreadsLoaded(list))
            }
            Effect::LoadComments(thread_id) => match self.api.comments(thread_id).await {
                Ok(comments) => Some(Event::CommentsLoaded { thread_id, comments }),
                Err(err) => {
                    debug!(thread_id, error = %err, "comment fetch failed");
                    Some(Event::CommentsLoaded {
                        thread_id,
                        comments: Vec::new(),
                    })
                }
            },
            Effect::CreateThread { selector } => Some(
                match self.api.create_thread(&page_url, &selector).await {
                    Ok(id) => Event::ThreadCreated { id },
                    Err(err) => failed(Action::CreateThread, err.code()),
                },
            ),
            Effect::PostComment { thread_id, content } => Some(
                match self.api.post_comment(thread_id, &content, &page_url).await {
                    Ok(_) => Event::CommentPosted { thread_id },
                    Err(err) => failed(Action::PostComment, err.code()),
                },
            ),
            Effect::CloseThread(thread_id) => Some(match self.api.close_thread(thread_id).await {
                Ok(()) => Event::ThreadClosed(thread_id),
                Err(err) => failed(Action::CloseThread, err.code()),
            }),
            Effect::DeleteThread(thread_id) => Some(match self.api.delete_thread(thread_id).await {
                Ok(()) => Event::ThreadDeleted(thread_id),
                Err(err) => failed(Action::DeleteThread, err.code()),
            }),
            Effect::SearchPeople(term) => match self.api.search_people(&term).await {
                Ok(matches) => Some(Event::SuggestionsLoaded { term, matches }),
                Err(err) => {
                    debug!(error = %err, "people search failed");
                    Some(Event::SuggestionsLoaded {
                        term,
                        matches: Vec::new(),
                    })
                }
            },
            Effect::Disconnect => Some(match self.api.disconnect().await {
                Ok(()) => Event::Disconnected,
                Err(err) => failed(Action::Disconnect, err.code()),
            }),
            visual => {
                self.surface.apply(&visual);
                None
            }
        }
    }
}

fn failed<N>(action: Action, code: Option<&str>) -> Event<N> {
    Event::RequestFailed {
        action,
        code: code.map(str::to_string),
    }
}
