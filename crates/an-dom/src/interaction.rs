//! # Interaction State Machine
//!
//! Owns everything the page script used to keep in loose closures: the current
//! mode, the draft, the composer, confirmations, autocomplete and the panel
//! hide timer. The host feeds it [`Event`]s and carries out the [`Effect`]s it
//! returns, in order. Network effects come back as completion events.
//!
//! ```text
//! Idle ──create──▶ Selecting ──click element──▶ DraftOpen ──first post──▶ ThreadOpen
//!   ▲                  │                                                     │
//!   └──── Escape / cancel / outside click / right-click ◀────────────────────┘
//!                                  ViewAll ◀──back── ThreadOpen
//! ```

use crate::dom::{is_chrome, DomTree, BADGE_CLASS, THREAD_ID_ATTR};
use crate::reconcile::{
    group_for_view_all, next_badge_number, reconcile, resolve, Badge, Reconciliation, ViewAll,
};
use crate::selector::generate_selector;
use an_core::invite::{thread_id_from_url, thread_share_url};
use an_core::mention::{actor_label, render_comment_html, Label};
use an_core::{CommentView, PersonMatch, ThreadSummary};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Delay between starting the panel's close animation and hiding it.
pub const PANEL_HIDE_DELAY: Duration = Duration::from_millis(220);
/// Characters after `@` before people search kicks in.
pub const AUTOCOMPLETE_MIN_CHARS: usize = 2;

pub const MSG_WRITE_COMMENT: &str = "Please write a comment";
pub const MSG_POST_FAILED: &str = "Could not save your comment.";
pub const MSG_CLOSE_FAILED: &str = "Could not close thread.";
pub const MSG_DELETE_FAILED: &str = "Failed to delete thread.";
pub const MSG_DISCONNECT_FAILED: &str = "Could not disconnect.";

/// Who is looking at the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewer {
    /// Collaborators never see close or delete controls.
    pub is_collaborator: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode<N> {
    Idle,
    Selecting,
    DraftOpen {
        node: N,
        selector: String,
        number: usize,
    },
    ThreadOpen {
        thread_id: i64,
        selector: String,
        is_closed: bool,
        node: Option<N>,
    },
    ViewAll,
}

/// What a pointer event landed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target<N> {
    /// Panel, floating controls, autocomplete or modal.
    Chrome,
    Badge(i64),
    Element(N),
}

impl<N: Copy> Target<N> {
    pub fn classify<D: DomTree<Node = N>>(dom: &D, node: N) -> Self {
        if let Some(badge) = dom.closest(node, |d, n| d.has_class(n, BADGE_CLASS)) {
            if let Some(id) = dom.attr(badge, THREAD_ID_ATTR).and_then(|v| v.parse().ok()) {
                return Target::Badge(id);
            }
        }
        if is_chrome(dom, node) {
            Target::Chrome
        } else {
            Target::Element(node)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Escape,
    Enter { shift: bool, ctrl: bool, meta: bool },
    Tab,
    ArrowUp,
    ArrowDown,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmKind {
    Close,
    Delete,
}

/// Mutating requests the machine issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateThread,
    PostComment,
    CloseThread,
    DeleteThread,
    Disconnect,
}

impl Action {
    fn failure_message(self) -> &'static str {
        match self {
            Action::CreateThread | Action::PostComment => MSG_POST_FAILED,
            Action::CloseThread => MSG_CLOSE_FAILED,
            Action::DeleteThread => MSG_DELETE_FAILED,
            Action::Disconnect => MSG_DISCONNECT_FAILED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<N> {
    Enable,
    Disable,
    /// Open a thread once threads are loaded (share link).
    DeepLink(i64),
    CreatePressed,
    ViewAllPressed,
    CardClicked(i64),
    CancelPressed,
    BackPressed,
    PointerMove(Target<N>),
    Click(Target<N>),
    ContextMenu,
    Key(Key),
    /// Composer content changed; `caret` counts characters.
    ComposerInput { text: String, caret: usize },
    SubmitPressed,
    SuggestionClicked(usize),
    ConfirmRequested(ConfirmKind),
    ConfirmAccepted,
    ConfirmCancelled,
    DisconnectPressed,
    HideTimerFired { generation: u64 },
    // Completions
    ThreadsLoaded(Vec<ThreadSummary>),
    CommentsLoaded { thread_id: i64, comments: Vec<CommentView> },
    ThreadCreated { id: i64 },
    CommentPosted { thread_id: i64 },
    ThreadClosed(i64),
    ThreadDeleted(i64),
    SuggestionsLoaded { term: String, matches: Vec<PersonMatch> },
    RequestFailed { action: Action, code: Option<String> },
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Text inserted after the `@`: the email, else the login
    pub token: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedComment {
    pub id: i64,
    pub author: Label,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelView {
    Draft {
        selector: String,
        number: usize,
    },
    Thread {
        thread_id: i64,
        selector: String,
        is_closed: bool,
        share_url: String,
        /// Confirmable actions offered for this thread
        actions: Vec<ConfirmKind>,
    },
    ViewAll(ViewAll),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect<N> {
    // Network
    LoadThreads,
    LoadComments(i64),
    CreateThread { selector: String },
    PostComment { thread_id: i64, content: String },
    CloseThread(i64),
    DeleteThread(i64),
    SearchPeople(String),
    Disconnect,
    // Page
    RenderBadges(Vec<Badge<N>>),
    ClearBadges,
    ShowTemporaryBadge { node: N, number: usize },
    RemoveTemporaryBadge,
    Highlight(Option<N>),
    Focus { node: N, scroll: bool },
    ClearFocus,
    SetCreateMode(bool),
    SetMissingCount(usize),
    // Panel
    ShowPanel(PanelView),
    /// Start the close animation; report [`Event::HideTimerFired`] after `after`.
    HidePanel { generation: u64, after: Duration },
    FinishHidePanel,
    RenderComments { thread_id: i64, comments: Vec<RenderedComment> },
    ShowConfirm(Option<ConfirmKind>),
    ShowSuggestions { items: Vec<Suggestion>, active: Option<usize> },
    HideSuggestions,
    SetComposer { text: String, caret: usize },
    SetComposerBusy(bool),
    Alert(String),
    Reload,
}

/// Panel visibility with a generation counter: a pending hide only completes
/// if no open happened after it was scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PanelAnimator {
    visible: bool,
    generation: u64,
}

impl PanelAnimator {
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn open(&mut self) {
        self.visible = true;
        self.generation += 1;
    }

    /// Generation the hide timer must report back, or `None` when already hidden.
    pub fn close(&mut self) -> Option<u64> {
        if !self.visible {
            return None;
        }
        self.visible = false;
        self.generation += 1;
        Some(self.generation)
    }

    pub fn hide_due(&self, generation: u64) -> bool {
        !self.visible && generation == self.generation
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Composer {
    text: String,
    /// In characters
    caret: usize,
    submitting: bool,
}

impl Composer {
    fn byte_index(&self, chars: usize) -> usize {
        self.text
            .char_indices()
            .nth(chars)
            .map(|(i, _)| i)
            .unwrap_or(self.text.len())
    }

    fn insert_newline(&mut self) {
        let at = self.byte_index(self.caret);
        self.text.insert(at, '\n');
        self.caret += 1;
    }

    fn clear(&mut self) {
        self.text.clear();
        self.caret = 0;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Autocomplete {
    /// Fragment typed after the `@`
    term: Option<String>,
    /// Character index of the `@`
    at: usize,
    items: Vec<Suggestion>,
    active: Option<usize>,
}

impl Autocomplete {
    fn visible(&self) -> bool {
        !self.items.is_empty()
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// `@fragment` directly before the caret, as (index of `@`, fragment).
fn mention_fragment(text: &str, caret: usize) -> Option<(usize, String)> {
    let before: Vec<char> = text.chars().take(caret).collect();
    let at = before.iter().rposition(|c| *c == '@')?;
    let fragment: String = before[at + 1..].iter().collect();
    if fragment.chars().any(char::is_whitespace) {
        return None;
    }
    Some((at, fragment))
}

fn suggestion(person: PersonMatch) -> Option<Suggestion> {
    let token = if person.email.is_empty() {
        person.login
    } else {
        person.email
    };
    if token.is_empty() {
        return None;
    }
    let label = if !person.display.is_empty() && person.display != token {
        format!("{token} ({})", person.display)
    } else {
        token.clone()
    };
    Some(Suggestion { token, label })
}

pub struct InteractionMachine<N> {
    viewer: Viewer,
    page_url: String,
    enabled: bool,
    mode: Mode<N>,
    threads: Reconciliation<N>,
    rendered_badges: Vec<usize>,
    hovered: Option<N>,
    composer: Composer,
    autocomplete: Autocomplete,
    confirm: Option<ConfirmKind>,
    pending_action: Option<Action>,
    panel: PanelAnimator,
    pending_deep_link: Option<i64>,
}

impl<N: Copy + Eq + std::fmt::Debug> InteractionMachine<N> {
    pub fn new(viewer: Viewer, page_url: impl Into<String>) -> Self {
        Self {
            viewer,
            page_url: page_url.into(),
            enabled: false,
            mode: Mode::Idle,
            threads: Reconciliation::default(),
            rendered_badges: Vec::new(),
            hovered: None,
            composer: Composer::default(),
            autocomplete: Autocomplete::default(),
            confirm: None,
            pending_action: None,
            panel: PanelAnimator::default(),
            pending_deep_link: None,
        }
    }

    /// Events to dispatch on page load. A share link or a collaborator
    /// session turns the engine on even when the viewer switched it off.
    pub fn startup_events(&self, prefers_enabled: bool) -> Vec<Event<N>> {
        let deep_link = thread_id_from_url(&self.page_url);
        let mut events = Vec::new();
        if prefers_enabled || deep_link.is_some() || self.viewer.is_collaborator {
            events.push(Event::Enable);
        }
        if let Some(id) = deep_link {
            events.push(Event::DeepLink(id));
        }
        events
    }

    pub fn mode(&self) -> &Mode<N> {
        &self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn page_url(&self) -> &str {
        &self.page_url
    }

    pub fn threads(&self) -> &Reconciliation<N> {
        &self.threads
    }

    pub fn composer_text(&self) -> &str {
        &self.composer.text
    }

    pub fn is_submitting(&self) -> bool {
        self.composer.submitting
    }

    pub fn active_confirm(&self) -> Option<ConfirmKind> {
        self.confirm
    }

    pub fn panel_visible(&self) -> bool {
        self.panel.is_visible()
    }

    /// Badge numbers currently present in the page, as reported by the host.
    pub fn observe_rendered_badges(&mut self, numbers: Vec<usize>) {
        self.rendered_badges = numbers;
    }

    fn is_selecting(&self) -> bool {
        matches!(self.mode, Mode::Selecting | Mode::DraftOpen { .. })
    }

    pub fn handle<D: DomTree<Node = N>>(&mut self, dom: &D, event: Event<N>) -> Vec<Effect<N>> {
        let mut fx = Vec::new();
        match event {
            Event::Enable => {
                if !self.enabled {
                    self.enabled = true;
                    fx.push(Effect::LoadThreads);
                }
            }
            Event::Disable => {
                if self.enabled {
                    self.dismiss(&mut fx);
                    self.enabled = false;
                    self.threads = Reconciliation::default();
                    self.pending_deep_link = None;
                    fx.push(Effect::ClearBadges);
                    fx.push(Effect::SetMissingCount(0));
                }
            }
            Event::DeepLink(id) => {
                self.pending_deep_link = Some(id);
                if !self.enabled {
                    self.enabled = true;
                    fx.push(Effect::LoadThreads);
                } else if self.threads.thread(id).is_some() {
                    self.open_pending_deep_link(dom, &mut fx);
                }
            }
            _ if !self.enabled => {
                debug!("annotations disabled, event ignored");
            }
            Event::CreatePressed => {
                if self.composer.submitting || self.mode == Mode::Selecting {
                    return fx;
                }
                self.dismiss(&mut fx);
                self.mode = Mode::Selecting;
                fx.push(Effect::SetCreateMode(true));
            }
            Event::ViewAllPressed | Event::BackPressed => self.open_view_all(&mut fx),
            Event::CardClicked(id) => self.open_thread(dom, id, true, &mut fx),
            Event::CancelPressed => self.dismiss(&mut fx),
            Event::ContextMenu => {
                if self.is_selecting() {
                    self.dismiss(&mut fx);
                }
            }
            Event::PointerMove(target) => self.pointer_move(target, &mut fx),
            Event::Click(target) => self.click(dom, target, &mut fx),
            Event::Key(key) => self.key(key, &mut fx),
            Event::ComposerInput { text, caret } => self.composer_input(text, caret, &mut fx),
            Event::SubmitPressed => self.submit(&mut fx),
            Event::SuggestionClicked(index) => self.commit_suggestion(index, &mut fx),
            Event::ConfirmRequested(kind) => {
                if self.available_actions().contains(&kind) && self.pending_action.is_none() {
                    self.confirm = Some(kind);
                    fx.push(Effect::ShowConfirm(Some(kind)));
                }
            }
            Event::ConfirmCancelled => {
                if self.confirm.take().is_some() {
                    fx.push(Effect::ShowConfirm(None));
                }
            }
            Event::ConfirmAccepted => self.confirm_accepted(&mut fx),
            Event::DisconnectPressed => {
                if self.viewer.is_collaborator && self.pending_action.is_none() {
                    self.pending_action = Some(Action::Disconnect);
                    fx.push(Effect::Disconnect);
                }
            }
            Event::HideTimerFired { generation } => {
                if self.panel.hide_due(generation) {
                    fx.push(Effect::FinishHidePanel);
                }
            }
            Event::ThreadsLoaded(list) => self.threads_loaded(dom, list, &mut fx),
            Event::CommentsLoaded { thread_id, comments } => {
                if matches!(self.mode, Mode::ThreadOpen { thread_id: open, .. } if open == thread_id) {
                    let comments = comments.iter().map(render_comment).collect();
                    fx.push(Effect::RenderComments { thread_id, comments });
                }
            }
            Event::ThreadCreated { id } => self.thread_created(id, &mut fx),
            Event::CommentPosted { thread_id } => {
                self.composer.submitting = false;
                self.composer.clear();
                fx.push(Effect::SetComposer {
                    text: String::new(),
                    caret: 0,
                });
                fx.push(Effect::SetComposerBusy(false));
                fx.push(Effect::LoadComments(thread_id));
                fx.push(Effect::LoadThreads);
            }
            Event::ThreadClosed(id) => {
                self.pending_action = None;
                self.confirm = None;
                fx.push(Effect::ShowConfirm(None));
                if let Some(thread) = self.threads.thread_mut(id) {
                    thread.is_closed = true;
                }
                if matches!(self.mode, Mode::ThreadOpen { thread_id, .. } if thread_id == id) {
                    if let Mode::ThreadOpen { is_closed, node, .. } = &mut self.mode {
                        *is_closed = true;
                        *node = None;
                    }
                    fx.push(Effect::ClearFocus);
                    fx.push(Effect::ShowPanel(self.thread_view()));
                    fx.push(Effect::LoadComments(id));
                }
                fx.push(Effect::LoadThreads);
            }
            Event::ThreadDeleted(_) => {
                self.pending_action = None;
                self.dismiss(&mut fx);
                fx.push(Effect::LoadThreads);
            }
            Event::SuggestionsLoaded { term, matches } => {
                if self.autocomplete.term.as_deref() != Some(term.as_str()) {
                    return fx;
                }
                self.autocomplete.items = matches.into_iter().filter_map(suggestion).collect();
                self.autocomplete.active = None;
                if self.autocomplete.visible() {
                    fx.push(Effect::ShowSuggestions {
                        items: self.autocomplete.items.clone(),
                        active: None,
                    });
                } else {
                    fx.push(Effect::HideSuggestions);
                }
            }
            Event::RequestFailed { action, code } => {
                debug!(?action, code = ?code, "request failed");
                match action {
                    Action::CreateThread | Action::PostComment => {
                        self.composer.submitting = false;
                        fx.push(Effect::SetComposerBusy(false));
                    }
                    _ => self.pending_action = None,
                }
                fx.push(Effect::Alert(action.failure_message().to_string()));
            }
            Event::Disconnected => {
                self.pending_action = None;
                fx.push(Effect::Reload);
            }
        }
        fx
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    fn open_panel(&mut self, view: PanelView, fx: &mut Vec<Effect<N>>) {
        self.panel.open();
        fx.push(Effect::ShowPanel(view));
    }

    fn close_panel(&mut self, fx: &mut Vec<Effect<N>>) {
        if let Some(generation) = self.panel.close() {
            fx.push(Effect::HidePanel {
                generation,
                after: PANEL_HIDE_DELAY,
            });
        }
    }

    /// Drops the draft badge, selection and highlight without touching the panel.
    fn reset_interaction(&mut self, fx: &mut Vec<Effect<N>>) {
        if matches!(self.mode, Mode::DraftOpen { .. }) {
            fx.push(Effect::RemoveTemporaryBadge);
        }
        if self.is_selecting() {
            fx.push(Effect::SetCreateMode(false));
        }
        if self.hovered.take().is_some() {
            fx.push(Effect::Highlight(None));
        }
        if self.confirm.take().is_some() {
            fx.push(Effect::ShowConfirm(None));
        }
        if self.autocomplete.visible() {
            fx.push(Effect::HideSuggestions);
        }
        self.autocomplete.reset();
        fx.push(Effect::ClearFocus);
        self.mode = Mode::Idle;
    }

    /// Back to `Idle` with the panel closed.
    fn dismiss(&mut self, fx: &mut Vec<Effect<N>>) {
        self.reset_interaction(fx);
        self.close_panel(fx);
        if !self.composer.submitting {
            self.composer.clear();
        }
    }

    fn open_view_all(&mut self, fx: &mut Vec<Effect<N>>) {
        self.reset_interaction(fx);
        self.mode = Mode::ViewAll;
        fx.push(Effect::LoadThreads);
    }

    fn thread_view(&self) -> PanelView {
        match &self.mode {
            Mode::ThreadOpen {
                thread_id,
                selector,
                is_closed,
                ..
            } => PanelView::Thread {
                thread_id: *thread_id,
                selector: selector.clone(),
                is_closed: *is_closed,
                share_url: thread_share_url(&self.page_url, *thread_id),
                actions: self.available_actions(),
            },
            Mode::DraftOpen { selector, number, .. } => PanelView::Draft {
                selector: selector.clone(),
                number: *number,
            },
            _ => PanelView::Draft {
                selector: String::new(),
                number: 0,
            },
        }
    }

    /// Close for open threads, delete for closed ones; nothing for collaborators.
    fn available_actions(&self) -> Vec<ConfirmKind> {
        match &self.mode {
            Mode::ThreadOpen { is_closed, .. } if !self.viewer.is_collaborator => {
                if *is_closed {
                    vec![ConfirmKind::Delete]
                } else {
                    vec![ConfirmKind::Close]
                }
            }
            _ => Vec::new(),
        }
    }

    fn open_thread<D: DomTree<Node = N>>(&mut self, dom: &D, thread_id: i64, scroll: bool, fx: &mut Vec<Effect<N>>) {
        let Some(thread) = self.threads.thread(thread_id).cloned() else {
            debug!(thread_id, "thread not in cache");
            return;
        };
        self.reset_interaction(fx);
        let node = if thread.is_closed {
            None
        } else {
            self.threads
                .badge_for_thread(thread_id)
                .map(|b| b.node)
                .or_else(|| resolve(dom, &thread.selector))
        };
        self.mode = Mode::ThreadOpen {
            thread_id,
            selector: thread.selector.clone(),
            is_closed: thread.is_closed,
            node,
        };
        let view = self.thread_view();
        self.open_panel(view, fx);
        fx.push(Effect::LoadComments(thread_id));
        match node {
            Some(node) => fx.push(Effect::Focus { node, scroll }),
            None => fx.push(Effect::ClearFocus),
        }
    }

    fn begin_draft<D: DomTree<Node = N>>(&mut self, dom: &D, node: N, fx: &mut Vec<Effect<N>>) {
        if let Mode::DraftOpen { node: previous, .. } = &self.mode {
            if *previous == node {
                return;
            }
            fx.push(Effect::RemoveTemporaryBadge);
        }
        let selector = generate_selector(dom, node);
        if selector.is_empty() {
            return;
        }
        let number = next_badge_number(&self.threads, self.rendered_badges.iter().copied());
        self.mode = Mode::DraftOpen {
            node,
            selector: selector.clone(),
            number,
        };
        if self.hovered.take().is_some() {
            fx.push(Effect::Highlight(None));
        }
        fx.push(Effect::ShowTemporaryBadge { node, number });
        fx.push(Effect::Focus { node, scroll: false });
        self.open_panel(PanelView::Draft { selector, number }, fx);
    }

    fn open_pending_deep_link<D: DomTree<Node = N>>(&mut self, dom: &D, fx: &mut Vec<Effect<N>>) {
        let Some(id) = self.pending_deep_link else {
            return;
        };
        if self.threads.thread(id).is_some() {
            self.pending_deep_link = None;
            self.open_thread(dom, id, true, fx);
        }
    }

    // ── Pointer and keyboard ────────────────────────────────────────────────

    fn pointer_move(&mut self, target: Target<N>, fx: &mut Vec<Effect<N>>) {
        if !self.is_selecting() {
            if self.hovered.take().is_some() {
                fx.push(Effect::Highlight(None));
            }
            return;
        }
        let Target::Element(node) = target else {
            return;
        };
        if self.threads.badge_for_node(node).is_some() {
            if self.hovered.take().is_some() {
                fx.push(Effect::Highlight(None));
            }
            return;
        }
        if self.hovered != Some(node) {
            self.hovered = Some(node);
            fx.push(Effect::Highlight(Some(node)));
        }
    }

    fn click<D: DomTree<Node = N>>(&mut self, dom: &D, target: Target<N>, fx: &mut Vec<Effect<N>>) {
        match target {
            Target::Chrome => {}
            Target::Badge(thread_id) => {
                if !self.is_selecting() {
                    self.open_thread(dom, thread_id, false, fx);
                }
            }
            Target::Element(node) => {
                if let Some(thread_id) = self.threads.badge_for_node(node).map(|b| b.thread_id) {
                    self.open_thread(dom, thread_id, false, fx);
                } else if self.is_selecting() {
                    self.begin_draft(dom, node, fx);
                } else if self.panel.is_visible() {
                    self.dismiss(fx);
                }
            }
        }
    }

    fn key(&mut self, key: Key, fx: &mut Vec<Effect<N>>) {
        if self.autocomplete.visible() && self.autocomplete_key(key, fx) {
            return;
        }
        match key {
            Key::Escape => {
                if self.mode != Mode::Idle {
                    self.dismiss(fx);
                }
            }
            Key::Enter { shift, ctrl, meta } if self.has_composer() => {
                if shift || ctrl || meta {
                    self.composer.insert_newline();
                    fx.push(Effect::SetComposer {
                        text: self.composer.text.clone(),
                        caret: self.composer.caret,
                    });
                } else {
                    self.submit(fx);
                }
            }
            _ => {}
        }
    }

    /// Returns whether the autocomplete consumed the key.
    fn autocomplete_key(&mut self, key: Key, fx: &mut Vec<Effect<N>>) -> bool {
        let last = self.autocomplete.items.len() - 1;
        match key {
            Key::ArrowDown => {
                let next = self.autocomplete.active.map_or(0, |i| (i + 1).min(last));
                self.set_active_suggestion(next, fx);
                true
            }
            Key::ArrowUp => {
                let next = self.autocomplete.active.map_or(0, |i| i.saturating_sub(1));
                self.set_active_suggestion(next, fx);
                true
            }
            Key::Enter { .. } => match self.autocomplete.active {
                Some(index) => {
                    self.commit_suggestion(index, fx);
                    true
                }
                None => false,
            },
            Key::Tab => {
                self.commit_suggestion(self.autocomplete.active.unwrap_or(0), fx);
                true
            }
            Key::Escape => {
                self.autocomplete.items.clear();
                self.autocomplete.active = None;
                fx.push(Effect::HideSuggestions);
                true
            }
            Key::Other => false,
        }
    }

    fn set_active_suggestion(&mut self, index: usize, fx: &mut Vec<Effect<N>>) {
        self.autocomplete.active = Some(index);
        fx.push(Effect::ShowSuggestions {
            items: self.autocomplete.items.clone(),
            active: Some(index),
        });
    }

    // ── Composer ────────────────────────────────────────────────────────────

    fn has_composer(&self) -> bool {
        match &self.mode {
            Mode::DraftOpen { .. } => true,
            Mode::ThreadOpen { is_closed, .. } => !is_closed,
            _ => false,
        }
    }

    fn composer_input(&mut self, text: String, caret: usize, fx: &mut Vec<Effect<N>>) {
        self.composer.caret = caret.min(text.chars().count());
        self.composer.text = text;
        match mention_fragment(&self.composer.text, self.composer.caret) {
            Some((at, term)) if term.chars().count() >= AUTOCOMPLETE_MIN_CHARS => {
                self.autocomplete.at = at;
                if self.autocomplete.term.as_deref() != Some(term.as_str()) {
                    self.autocomplete.term = Some(term.clone());
                    fx.push(Effect::SearchPeople(term));
                }
            }
            _ => {
                if self.autocomplete.visible() {
                    fx.push(Effect::HideSuggestions);
                }
                self.autocomplete.reset();
            }
        }
    }

    fn commit_suggestion(&mut self, index: usize, fx: &mut Vec<Effect<N>>) {
        let Some(chosen) = self.autocomplete.items.get(index).cloned() else {
            return;
        };
        let term_len = self
            .autocomplete
            .term
            .as_deref()
            .map_or(0, |t| t.chars().count());
        let chars: Vec<char> = self.composer.text.chars().collect();
        let start = (self.autocomplete.at + 1).min(chars.len());
        let end = (start + term_len).min(chars.len());
        let mut text: String = chars[..start].iter().collect();
        text.push_str(&chosen.token);
        text.extend(&chars[end..]);
        self.composer.caret = start + chosen.token.chars().count();
        self.composer.text = text;
        self.autocomplete.reset();
        fx.push(Effect::SetComposer {
            text: self.composer.text.clone(),
            caret: self.composer.caret,
        });
        fx.push(Effect::HideSuggestions);
    }

    fn submit(&mut self, fx: &mut Vec<Effect<N>>) {
        if self.composer.submitting || !self.has_composer() {
            return;
        }
        let content = self.composer.text.trim().to_string();
        if content.is_empty() {
            fx.push(Effect::Alert(MSG_WRITE_COMMENT.to_string()));
            return;
        }
        if self.autocomplete.visible() {
            fx.push(Effect::HideSuggestions);
        }
        self.autocomplete.reset();
        self.composer.submitting = true;
        fx.push(Effect::SetComposerBusy(true));
        match &self.mode {
            Mode::DraftOpen { selector, .. } => fx.push(Effect::CreateThread {
                selector: selector.clone(),
            }),
            Mode::ThreadOpen { thread_id, .. } => fx.push(Effect::PostComment {
                thread_id: *thread_id,
                content,
            }),
            _ => {}
        }
    }

    fn confirm_accepted(&mut self, fx: &mut Vec<Effect<N>>) {
        let (Some(kind), Mode::ThreadOpen { thread_id, .. }) = (self.confirm, &self.mode) else {
            return;
        };
        let thread_id = *thread_id;
        if self.pending_action.is_some() {
            return;
        }
        match kind {
            ConfirmKind::Close => {
                self.pending_action = Some(Action::CloseThread);
                fx.push(Effect::CloseThread(thread_id));
            }
            ConfirmKind::Delete => {
                self.pending_action = Some(Action::DeleteThread);
                fx.push(Effect::DeleteThread(thread_id));
            }
        }
    }

    // ── Completions ─────────────────────────────────────────────────────────

    fn threads_loaded<D: DomTree<Node = N>>(&mut self, dom: &D, list: Vec<ThreadSummary>, fx: &mut Vec<Effect<N>>) {
        self.threads = reconcile(dom, list);
        fx.push(Effect::RenderBadges(self.threads.badges.clone()));
        fx.push(Effect::SetMissingCount(self.threads.missing_count));
        match &self.mode {
            Mode::DraftOpen { node, number, .. } => fx.push(Effect::ShowTemporaryBadge {
                node: *node,
                number: *number,
            }),
            Mode::ViewAll => {
                let view = group_for_view_all(dom, &self.threads.threads);
                self.open_panel(PanelView::ViewAll(view), fx);
            }
            _ => {}
        }
        self.open_pending_deep_link(dom, fx);
    }

    /// The draft got its id: reconfigure the panel in place and post the
    /// first comment. A draft cancelled while the create was in flight only
    /// releases the composer and picks the new thread up on reload.
    fn thread_created(&mut self, id: i64, fx: &mut Vec<Effect<N>>) {
        let Mode::DraftOpen { node, selector, .. } = &self.mode else {
            debug!(thread_id = id, "draft was dismissed before its thread was created");
            self.composer.submitting = false;
            if self.mode == Mode::Idle {
                self.composer.clear();
            }
            fx.push(Effect::SetComposerBusy(false));
            fx.push(Effect::LoadThreads);
            return;
        };
        let (node, selector) = (*node, selector.clone());
        fx.push(Effect::SetCreateMode(false));
        self.mode = Mode::ThreadOpen {
            thread_id: id,
            selector,
            is_closed: false,
            node: Some(node),
        };
        let view = self.thread_view();
        self.open_panel(view, fx);
        fx.push(Effect::PostComment {
            thread_id: id,
            content: self.composer.text.trim().to_string(),
        });
    }
}

fn render_comment(comment: &CommentView) -> RenderedComment {
    RenderedComment {
        id: comment.id,
        author: actor_label(comment.user.as_ref()),
        html: render_comment_html(&comment.body, &comment.tags),
        created_at: comment.created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::HtmlDocument;
    use an_core::{ActorKey, ActorKind, ActorView};
    use ego_tree::NodeId;

    const PAGE: &str = r#"<html><body>
        <h1 id="title">Title</h1>
        <p id="intro">Intro</p>
        <p id="body">Body</p>
        <aside id="annotate-panel"><button id="post">Post</button></aside>
        <span class="annotate-badge" data-annotate-thread-id="4">1</span>
    </body></html>"#;

    fn node(doc: &HtmlDocument, selector: &str) -> NodeId {
        doc.query_first(selector).unwrap().unwrap()
    }

    fn summary(id: i64, selector: &str, closed: bool) -> ThreadSummary {
        ThreadSummary {
            id,
            page_url: "https://x.org/a".into(),
            selector: selector.into(),
            is_closed: closed,
            created_by: ActorKey::user(1),
            created_at: Utc::now(),
            last_activity: Utc::now(),
            last_comment_excerpt: String::new(),
            last_comment_author: String::new(),
        }
    }

    fn machine(doc: &HtmlDocument, viewer: Viewer, threads: Vec<ThreadSummary>) -> InteractionMachine<NodeId> {
        let mut m = InteractionMachine::new(viewer, "https://x.org/a");
        m.handle(doc, Event::Enable);
        m.handle(doc, Event::ThreadsLoaded(threads));
        m
    }

    fn type_text(m: &mut InteractionMachine<NodeId>, doc: &HtmlDocument, text: &str) -> Vec<Effect<NodeId>> {
        m.handle(
            doc,
            Event::ComposerInput {
                text: text.into(),
                caret: text.chars().count(),
            },
        )
    }

    #[test]
    fn disabled_machine_ignores_input() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = InteractionMachine::new(Viewer::default(), "https://x.org/a");
        assert!(m.handle(&doc, Event::CreatePressed).is_empty());
        assert_eq!(m.mode(), &Mode::Idle);
        assert_eq!(m.handle(&doc, Event::Enable), vec![Effect::LoadThreads]);
    }

    #[test]
    fn startup_forces_enable_for_share_links() {
        let m = InteractionMachine::<NodeId>::new(Viewer::default(), "https://x.org/a?annotate-id=4");
        assert_eq!(m.startup_events(false), vec![Event::Enable, Event::DeepLink(4)]);
        let m = InteractionMachine::<NodeId>::new(Viewer { is_collaborator: true }, "https://x.org/a");
        assert_eq!(m.startup_events(false), vec![Event::Enable]);
        let m = InteractionMachine::<NodeId>::new(Viewer::default(), "https://x.org/a");
        assert!(m.startup_events(false).is_empty());
    }

    #[test]
    fn selecting_then_clicking_opens_a_draft() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        assert_eq!(m.handle(&doc, Event::CreatePressed), vec![Effect::ClearFocus, Effect::SetCreateMode(true)]);
        let intro = node(&doc, "#intro");

        let hover = m.handle(&doc, Event::PointerMove(Target::Element(intro)));
        assert_eq!(hover, vec![Effect::Highlight(Some(intro))]);

        let fx = m.handle(&doc, Event::Click(Target::Element(intro)));
        assert!(fx.contains(&Effect::ShowTemporaryBadge { node: intro, number: 2 }));
        assert!(fx.contains(&Effect::ShowPanel(PanelView::Draft {
            selector: "#intro".into(),
            number: 2
        })));
        assert!(matches!(m.mode(), Mode::DraftOpen { number: 2, .. }));
        assert!(m.panel_visible());
    }

    #[test]
    fn reselecting_moves_the_draft_badge() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), Vec::new());
        m.handle(&doc, Event::CreatePressed);
        m.handle(&doc, Event::Click(Target::Element(node(&doc, "#intro"))));
        let fx = m.handle(&doc, Event::Click(Target::Element(node(&doc, "#body"))));
        assert_eq!(fx[0], Effect::RemoveTemporaryBadge);
        assert!(matches!(m.mode(), Mode::DraftOpen { selector, .. } if selector == "#body"));
    }

    #[test]
    fn hover_skips_owned_elements() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::CreatePressed);
        let title = node(&doc, "#title");
        assert!(m.handle(&doc, Event::PointerMove(Target::Element(title))).is_empty());
        assert!(m.handle(&doc, Event::PointerMove(Target::Chrome)).is_empty());
    }

    #[test]
    fn clicking_an_owned_element_opens_its_thread() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::CreatePressed);
        let title = node(&doc, "#title");
        let fx = m.handle(&doc, Event::Click(Target::Element(title)));
        assert!(fx.contains(&Effect::SetCreateMode(false)));
        assert!(fx.contains(&Effect::LoadComments(3)));
        assert!(fx.contains(&Effect::Focus { node: title, scroll: false }));
        assert!(matches!(m.mode(), Mode::ThreadOpen { thread_id: 3, .. }));
    }

    #[test]
    fn badge_clicks_are_ignored_while_selecting() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(4, "#body", false)]);
        m.handle(&doc, Event::CreatePressed);
        let badge = Target::classify(&doc, node(&doc, ".annotate-badge"));
        assert_eq!(badge, Target::Badge(4));
        assert!(m.handle(&doc, Event::Click(badge)).is_empty());
        assert_eq!(m.mode(), &Mode::Selecting);
    }

    #[test]
    fn targets_are_classified() {
        let doc = HtmlDocument::parse(PAGE);
        assert_eq!(Target::classify(&doc, node(&doc, "#post")), Target::Chrome);
        let intro = node(&doc, "#intro");
        assert_eq!(Target::classify(&doc, intro), Target::Element(intro));
    }

    #[test]
    fn escape_right_click_and_outside_click_dismiss() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);

        m.handle(&doc, Event::CreatePressed);
        m.handle(&doc, Event::Click(Target::Element(node(&doc, "#intro"))));
        let fx = m.handle(&doc, Event::Key(Key::Escape));
        assert!(fx.contains(&Effect::RemoveTemporaryBadge));
        assert!(matches!(fx.last(), Some(Effect::HidePanel { after, .. }) if *after == PANEL_HIDE_DELAY));
        assert_eq!(m.mode(), &Mode::Idle);

        m.handle(&doc, Event::CreatePressed);
        m.handle(&doc, Event::ContextMenu);
        assert_eq!(m.mode(), &Mode::Idle);

        m.handle(&doc, Event::Click(Target::Badge(3)));
        assert!(m.panel_visible());
        assert!(m.handle(&doc, Event::Click(Target::Chrome)).is_empty());
        m.handle(&doc, Event::Click(Target::Element(node(&doc, "#body"))));
        assert_eq!(m.mode(), &Mode::Idle);
        assert!(!m.panel_visible());
    }

    #[test]
    fn context_menu_outside_selection_does_nothing() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        assert!(m.handle(&doc, Event::ContextMenu).is_empty());
        assert!(matches!(m.mode(), Mode::ThreadOpen { .. }));
    }

    #[test]
    fn reopening_cancels_pending_hide() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        let fx = m.handle(&doc, Event::Key(Key::Escape));
        let Some(Effect::HidePanel { generation, .. }) = fx.last().cloned() else {
            panic!("expected a hide");
        };
        m.handle(&doc, Event::Click(Target::Badge(3)));
        assert!(m.handle(&doc, Event::HideTimerFired { generation }).is_empty());

        let fx = m.handle(&doc, Event::Key(Key::Escape));
        let Some(Effect::HidePanel { generation, .. }) = fx.last().cloned() else {
            panic!("expected a hide");
        };
        assert_eq!(m.handle(&doc, Event::HideTimerFired { generation }), vec![Effect::FinishHidePanel]);
    }

    #[test]
    fn first_post_persists_draft_in_place() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), Vec::new());
        m.handle(&doc, Event::CreatePressed);
        m.handle(&doc, Event::Click(Target::Element(node(&doc, "#intro"))));
        type_text(&mut m, &doc, "Looks off");

        let fx = m.handle(&doc, Event::Key(Key::Enter { shift: false, ctrl: false, meta: false }));
        assert_eq!(
            fx,
            vec![Effect::SetComposerBusy(true), Effect::CreateThread { selector: "#intro".into() }]
        );
        // Outstanding request: no second submit, no new selection.
        assert!(m.handle(&doc, Event::SubmitPressed).is_empty());
        assert!(m.handle(&doc, Event::CreatePressed).is_empty());

        let fx = m.handle(&doc, Event::ThreadCreated { id: 11 });
        assert!(fx.contains(&Effect::PostComment {
            thread_id: 11,
            content: "Looks off".into()
        }));
        assert!(matches!(m.mode(), Mode::ThreadOpen { thread_id: 11, .. }));

        let fx = m.handle(&doc, Event::CommentPosted { thread_id: 11 });
        assert!(fx.contains(&Effect::LoadComments(11)));
        assert!(fx.contains(&Effect::LoadThreads));
        assert_eq!(m.composer_text(), "");
        assert!(!m.is_submitting());
    }

    fn submit_draft(m: &mut InteractionMachine<NodeId>, doc: &HtmlDocument) {
        m.handle(doc, Event::CreatePressed);
        m.handle(doc, Event::Click(Target::Element(node(doc, "#intro"))));
        type_text(m, doc, "Looks off");
        m.handle(doc, Event::SubmitPressed);
        assert!(m.is_submitting());
    }

    #[test]
    fn escape_during_create_releases_the_composer() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), Vec::new());
        submit_draft(&mut m, &doc);
        m.handle(&doc, Event::Key(Key::Escape));
        assert_eq!(m.mode(), &Mode::Idle);
        // Still outstanding: creation stays blocked.
        assert!(m.handle(&doc, Event::CreatePressed).is_empty());

        let fx = m.handle(&doc, Event::ThreadCreated { id: 11 });
        assert_eq!(fx, vec![Effect::SetComposerBusy(false), Effect::LoadThreads]);
        assert_eq!(m.mode(), &Mode::Idle);
        assert!(!m.is_submitting());
        assert_eq!(m.composer_text(), "");

        let fx = m.handle(&doc, Event::CreatePressed);
        assert!(fx.contains(&Effect::SetCreateMode(true)));
        assert_eq!(m.mode(), &Mode::Selecting);
    }

    #[test]
    fn cancel_then_failed_create_allows_a_new_draft() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), Vec::new());
        submit_draft(&mut m, &doc);
        m.handle(&doc, Event::CancelPressed);

        let fx = m.handle(
            &doc,
            Event::RequestFailed {
                action: Action::CreateThread,
                code: None,
            },
        );
        assert!(fx.contains(&Effect::SetComposerBusy(false)));
        assert!(!m.is_submitting());

        m.handle(&doc, Event::CreatePressed);
        assert_eq!(m.mode(), &Mode::Selecting);
        assert_eq!(m.composer_text(), "");
        m.handle(&doc, Event::Click(Target::Element(node(&doc, "#body"))));
        assert!(matches!(m.mode(), Mode::DraftOpen { .. }));
    }

    #[test]
    fn modified_enter_inserts_newline() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        m.handle(&doc, Event::ComposerInput { text: "ab".into(), caret: 1 });
        let fx = m.handle(&doc, Event::Key(Key::Enter { shift: true, ctrl: false, meta: false }));
        assert_eq!(fx, vec![Effect::SetComposer { text: "a\nb".into(), caret: 2 }]);
        let fx = m.handle(&doc, Event::Key(Key::Enter { shift: false, ctrl: true, meta: false }));
        assert_eq!(fx, vec![Effect::SetComposer { text: "a\n\nb".into(), caret: 3 }]);
    }

    #[test]
    fn empty_submit_alerts() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        type_text(&mut m, &doc, "   ");
        assert_eq!(
            m.handle(&doc, Event::SubmitPressed),
            vec![Effect::Alert(MSG_WRITE_COMMENT.into())]
        );
    }

    #[test]
    fn failed_post_keeps_the_text() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        type_text(&mut m, &doc, "hello");
        m.handle(&doc, Event::SubmitPressed);
        let fx = m.handle(
            &doc,
            Event::RequestFailed {
                action: Action::PostComment,
                code: Some("thread_closed".into()),
            },
        );
        assert!(fx.contains(&Effect::Alert(MSG_POST_FAILED.into())));
        assert_eq!(m.composer_text(), "hello");
        assert!(!m.is_submitting());
    }

    #[test]
    fn autocomplete_flow() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));

        assert!(type_text(&mut m, &doc, "hi @a").is_empty());
        assert_eq!(type_text(&mut m, &doc, "hi @an"), vec![Effect::SearchPeople("an".into())]);

        let matches = vec![
            PersonMatch {
                id: "1".into(),
                login: "ana".into(),
                display: "Ana Lee".into(),
                email: "ana@example.org".into(),
                is_collaborator: false,
            },
            PersonMatch {
                id: "2".into(),
                login: "andy".into(),
                display: "andy".into(),
                email: String::new(),
                is_collaborator: false,
            },
        ];
        // Stale answers are dropped.
        assert!(m
            .handle(&doc, Event::SuggestionsLoaded { term: "a".into(), matches: matches.clone() })
            .is_empty());
        let fx = m.handle(&doc, Event::SuggestionsLoaded { term: "an".into(), matches });
        let Effect::ShowSuggestions { items, active: None } = &fx[0] else {
            panic!("expected suggestions");
        };
        assert_eq!(items[0].label, "ana@example.org (Ana Lee)");
        assert_eq!(items[1].label, "andy");

        m.handle(&doc, Event::Key(Key::ArrowDown));
        m.handle(&doc, Event::Key(Key::ArrowDown));
        m.handle(&doc, Event::Key(Key::ArrowDown));
        m.handle(&doc, Event::Key(Key::ArrowUp));
        let fx = m.handle(&doc, Event::Key(Key::Enter { shift: false, ctrl: false, meta: false }));
        assert_eq!(
            fx,
            vec![
                Effect::SetComposer {
                    text: "hi @ana@example.org".into(),
                    caret: 19
                },
                Effect::HideSuggestions
            ]
        );
        assert!(!m.is_submitting());
    }

    #[test]
    fn escape_closes_autocomplete_before_panel() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        type_text(&mut m, &doc, "@bo");
        m.handle(
            &doc,
            Event::SuggestionsLoaded {
                term: "bo".into(),
                matches: vec![PersonMatch {
                    id: "c_2".into(),
                    login: String::new(),
                    display: "bob".into(),
                    email: "bob@out.io".into(),
                    is_collaborator: true,
                }],
            },
        );
        assert_eq!(m.handle(&doc, Event::Key(Key::Escape)), vec![Effect::HideSuggestions]);
        assert!(matches!(m.mode(), Mode::ThreadOpen { .. }));
    }

    #[test]
    fn tab_commits_first_suggestion() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        type_text(&mut m, &doc, "@bo");
        m.handle(
            &doc,
            Event::SuggestionsLoaded {
                term: "bo".into(),
                matches: vec![PersonMatch {
                    id: "5".into(),
                    login: "bob".into(),
                    display: String::new(),
                    email: String::new(),
                    is_collaborator: false,
                }],
            },
        );
        m.handle(&doc, Event::Key(Key::Tab));
        assert_eq!(m.composer_text(), "@bob");
    }

    #[test]
    fn close_requires_confirmation() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));

        assert!(m.handle(&doc, Event::ConfirmAccepted).is_empty());
        assert!(m.handle(&doc, Event::ConfirmRequested(ConfirmKind::Delete)).is_empty());
        assert_eq!(
            m.handle(&doc, Event::ConfirmRequested(ConfirmKind::Close)),
            vec![Effect::ShowConfirm(Some(ConfirmKind::Close))]
        );
        assert_eq!(m.handle(&doc, Event::ConfirmCancelled), vec![Effect::ShowConfirm(None)]);
        assert!(m.handle(&doc, Event::ConfirmAccepted).is_empty());

        m.handle(&doc, Event::ConfirmRequested(ConfirmKind::Close));
        assert_eq!(m.handle(&doc, Event::ConfirmAccepted), vec![Effect::CloseThread(3)]);
        assert!(m.handle(&doc, Event::ConfirmAccepted).is_empty());

        let fx = m.handle(&doc, Event::ThreadClosed(3));
        assert!(matches!(m.mode(), Mode::ThreadOpen { is_closed: true, node: None, .. }));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::ShowPanel(PanelView::Thread { actions, is_closed: true, .. }) if actions == &vec![ConfirmKind::Delete]
        )));

        m.handle(&doc, Event::ConfirmRequested(ConfirmKind::Delete));
        assert_eq!(m.handle(&doc, Event::ConfirmAccepted), vec![Effect::DeleteThread(3)]);
        let fx = m.handle(&doc, Event::ThreadDeleted(3));
        assert!(fx.contains(&Effect::LoadThreads));
        assert_eq!(m.mode(), &Mode::Idle);
    }

    #[test]
    fn collaborators_get_no_moderation() {
        let doc = HtmlDocument::parse(PAGE);
        let viewer = Viewer { is_collaborator: true };
        let mut m = machine(&doc, viewer, vec![summary(3, "#title", false)]);
        let fx = m.handle(&doc, Event::Click(Target::Badge(3)));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::ShowPanel(PanelView::Thread { actions, .. }) if actions.is_empty()
        )));
        assert!(m.handle(&doc, Event::ConfirmRequested(ConfirmKind::Close)).is_empty());
        assert_eq!(m.handle(&doc, Event::DisconnectPressed), vec![Effect::Disconnect]);
        assert_eq!(m.handle(&doc, Event::Disconnected), vec![Effect::Reload]);
    }

    #[test]
    fn view_all_and_back() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(
            &doc,
            Viewer::default(),
            vec![summary(3, "#title", false), summary(5, "#gone", false)],
        );
        assert!(m.handle(&doc, Event::ViewAllPressed).contains(&Effect::LoadThreads));
        let fx = m.handle(
            &doc,
            Event::ThreadsLoaded(vec![summary(3, "#title", false), summary(5, "#gone", false)]),
        );
        assert!(fx.contains(&Effect::SetMissingCount(1)));
        assert!(fx.iter().any(|e| matches!(e, Effect::ShowPanel(PanelView::ViewAll(v)) if v.missing_count == 1)));

        m.handle(&doc, Event::CardClicked(5));
        assert!(matches!(m.mode(), Mode::ThreadOpen { thread_id: 5, node: None, .. }));
        m.handle(&doc, Event::BackPressed);
        assert_eq!(m.mode(), &Mode::ViewAll);
    }

    #[test]
    fn deep_link_opens_after_load() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = InteractionMachine::new(Viewer::default(), "https://x.org/a?annotate-id=3");
        for event in m.startup_events(false) {
            m.handle(&doc, event);
        }
        let fx = m.handle(&doc, Event::ThreadsLoaded(vec![summary(3, "#title", false)]));
        assert!(fx.contains(&Effect::Focus {
            node: node(&doc, "#title"),
            scroll: true
        }));
        assert!(matches!(m.mode(), Mode::ThreadOpen { thread_id: 3, .. }));
    }

    #[test]
    fn disabling_clears_everything() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        let fx = m.handle(&doc, Event::Disable);
        assert!(fx.contains(&Effect::ClearBadges));
        assert!(!m.is_enabled());
        assert!(m.threads().threads.is_empty());
        assert_eq!(m.mode(), &Mode::Idle);
    }

    #[test]
    fn comments_render_with_mentions() {
        let doc = HtmlDocument::parse(PAGE);
        let mut m = machine(&doc, Viewer::default(), vec![summary(3, "#title", false)]);
        m.handle(&doc, Event::Click(Target::Badge(3)));
        let ana = ActorView {
            id: 1,
            display_name: "Ana Lee".into(),
            user_email: "ana@example.org".into(),
            user_login: "ana".into(),
            is_collaborator: false,
            kind: ActorKind::User,
        };
        let fx = m.handle(
            &doc,
            Event::CommentsLoaded {
                thread_id: 3,
                comments: vec![CommentView {
                    id: 9,
                    thread_id: 3,
                    parent_id: None,
                    body: "hey tag://u1".into(),
                    created_at: Utc::now(),
                    user: Some(ana.clone()),
                    tags: vec![ana],
                }],
            },
        );
        let Effect::RenderComments { comments, .. } = &fx[0] else {
            panic!("expected comments");
        };
        assert_eq!(comments[0].author.label, "ana");
        assert!(comments[0].html.contains("annotate-mention"));
        // Comments for another thread are ignored.
        assert!(m
            .handle(&doc, Event::CommentsLoaded { thread_id: 8, comments: Vec::new() })
            .is_empty());
    }
}
