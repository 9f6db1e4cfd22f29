//! # Thread/Badge Reconciler
//!
//! Matches the threads stored for a page against the live document. Threads are
//! ranked by id; every open thread whose selector resolves gets the next badge
//! number. Open threads that do not resolve are "missing". Closed threads never
//! get a badge and never count as missing.

use crate::dom::DomTree;
use an_core::ThreadSummary;
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Selectors longer than this are shortened on view-all cards.
const SELECTOR_LABEL_MAX: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Badge<N> {
    pub thread_id: i64,
    pub node: N,
    /// 1-based rank among resolvable open threads, by ascending id
    pub number: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation<N> {
    pub badges: Vec<Badge<N>>,
    pub missing_count: usize,
    /// Every fetched thread, sorted by id
    pub threads: Vec<ThreadSummary>,
}

impl<N> Default for Reconciliation<N> {
    fn default() -> Self {
        Self {
            badges: Vec::new(),
            missing_count: 0,
            threads: Vec::new(),
        }
    }
}

impl<N: Copy + Eq> Reconciliation<N> {
    pub fn thread(&self, id: i64) -> Option<&ThreadSummary> {
        self.threads.iter().find(|t| t.id == id)
    }

    pub fn thread_mut(&mut self, id: i64) -> Option<&mut ThreadSummary> {
        self.threads.iter_mut().find(|t| t.id == id)
    }

    /// Badge on `node`, i.e. the thread that element owns.
    pub fn badge_for_node(&self, node: N) -> Option<&Badge<N>> {
        self.badges.iter().find(|b| b.node == node)
    }

    pub fn badge_for_thread(&self, thread_id: i64) -> Option<&Badge<N>> {
        self.badges.iter().find(|b| b.thread_id == thread_id)
    }

    pub fn open_count(&self) -> usize {
        self.threads.iter().filter(|t| !t.is_closed).count()
    }
}

/// First element `selector` matches. Invalid or stale selectors resolve to
/// nothing.
pub fn resolve<D: DomTree>(dom: &D, selector: &str) -> Option<D::Node> {
    if selector.trim().is_empty() {
        return None;
    }
    match dom.query_first(selector) {
        Ok(found) => found,
        Err(err) => {
            debug!(selector, error = %err, "selector did not evaluate");
            None
        }
    }
}

pub fn reconcile<D: DomTree>(dom: &D, mut threads: Vec<ThreadSummary>) -> Reconciliation<D::Node> {
    threads.sort_by_key(|t| t.id);
    let mut badges = Vec::new();
    let mut missing_count = 0;
    for thread in &threads {
        if thread.is_closed {
            continue;
        }
        match resolve(dom, &thread.selector) {
            Some(node) => badges.push(Badge {
                thread_id: thread.id,
                node,
                number: badges.len() + 1,
            }),
            None => missing_count += 1,
        }
    }
    debug!(
        threads = threads.len(),
        badges = badges.len(),
        missing = missing_count,
        "reconciled threads"
    );
    Reconciliation {
        badges,
        missing_count,
        threads,
    }
}

/// Number for a badge that is about to be created: one above anything already
/// known, whether from the placed badges, the open threads in the cache, or
/// numbers currently rendered in the page.
pub fn next_badge_number<N: Copy + Eq>(
    current: &Reconciliation<N>,
    rendered: impl IntoIterator<Item = usize>,
) -> usize {
    let rendered_max = rendered.into_iter().max().unwrap_or(0);
    current
        .badges
        .len()
        .max(current.open_count())
        .max(rendered_max)
        + 1
}

/// Page URL with query and fragment removed.
pub fn canonical_page_url(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

/// URLs to query threads for: the canonical one, plus the exact one when it
/// differs.
pub fn probe_urls(current_url: &str) -> Vec<String> {
    let canonical = canonical_page_url(current_url);
    let mut urls = vec![canonical.clone()];
    if current_url != canonical && !current_url.is_empty() {
        urls.push(current_url.to_string());
    }
    urls
}

/// Concatenates lists, keeping the first thread seen for each id.
pub fn merge_thread_lists(lists: impl IntoIterator<Item = Vec<ThreadSummary>>) -> Vec<ThreadSummary> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|t| seen.insert(t.id))
        .collect()
}

// ── View all ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Missing,
    Open,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadCard {
    pub thread: ThreadSummary,
    pub exists: bool,
    pub selector_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewAll {
    pub total: usize,
    pub missing_count: usize,
    /// Non-empty sections only, in Missing, Open, Closed order
    pub sections: Vec<(Section, Vec<ThreadCard>)>,
}

impl ViewAll {
    pub fn section(&self, which: Section) -> &[ThreadCard] {
        self.sections
            .iter()
            .find(|(s, _)| *s == which)
            .map(|(_, cards)| cards.as_slice())
            .unwrap_or(&[])
    }
}

pub fn selector_label(selector: &str) -> String {
    if selector.chars().count() <= SELECTOR_LABEL_MAX {
        return selector.to_string();
    }
    let mut out: String = selector.chars().take(SELECTOR_LABEL_MAX - 3).collect();
    out.push('…');
    out
}

/// A thread is present when its selector resolves or it is closed; everything
/// else is missing. Each section is sorted by most recent activity.
pub fn group_for_view_all<D: DomTree>(dom: &D, threads: &[ThreadSummary]) -> ViewAll {
    let mut missing = Vec::new();
    let mut open = Vec::new();
    let mut closed = Vec::new();
    for thread in threads {
        let exists = resolve(dom, &thread.selector).is_some();
        let card = ThreadCard {
            thread: thread.clone(),
            exists,
            selector_label: selector_label(&thread.selector),
        };
        if thread.is_closed {
            closed.push(card);
        } else if exists {
            open.push(card);
        } else {
            missing.push(card);
        }
    }
    let missing_count = missing.len();
    let sections = [(Section::Missing, missing), (Section::Open, open), (Section::Closed, closed)]
        .into_iter()
        .filter(|(_, cards)| !cards.is_empty())
        .map(|(section, mut cards)| {
            cards.sort_by(|a, b| b.thread.last_activity.cmp(&a.thread.last_activity));
            (section, cards)
        })
        .collect();
    ViewAll {
        total: threads.len(),
        missing_count,
        sections,
    }
}
