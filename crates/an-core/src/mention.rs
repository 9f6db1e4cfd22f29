//! # Mention Tokens
//!
//! Comments are stored with every resolved `@mention` replaced by an opaque
//! `tag://<k><id>` token (`u` for users, `c` for collaborators). Rendering turns
//! tokens back into labels looked up at render time, so a renamed actor shows
//! the new name in old comments.
//!
//! All decode passes are single-pass: output of one pass is never rescanned.

use crate::actor::{email_local_part, ActorKey, ActorKind, ActorRef, ActorView, Identity};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};

static MENTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"@([^\s<>"'\)\(,;:]+)"#).expect("static mention pattern"));

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)tag://([a-z]?)(\d+)").expect("static token pattern"));

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static tag pattern"));

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s<"]+"#).expect("static url pattern"));

pub const EXCERPT_WIDTH: usize = 180;
const UNKNOWN_LABEL: &str = "User";

/// Looks up who a typed `@token` refers to.
#[async_trait]
pub trait MentionResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> anyhow::Result<Option<ActorRef>>;
}

/// Body ready for storage plus the distinct actors it tags, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub body: String,
    pub tagged: Vec<ActorRef>,
}

/// Replaces resolvable mentions with tokens. Unresolved mentions stay as typed.
pub async fn encode_mentions<R>(text: &str, resolver: &R) -> anyhow::Result<Encoded>
where
    R: MentionResolver + ?Sized,
{
    let mut body = String::with_capacity(text.len());
    let mut tagged: Vec<ActorRef> = Vec::new();
    let mut seen = HashSet::new();
    let mut last = 0;

    for caps in MENTION_RE.captures_iter(text) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        body.push_str(&text[last..whole.start()]);
        last = whole.end();

        match resolver.resolve(token.as_str()).await? {
            Some(actor) => {
                body.push_str(&actor.key().tag_token());
                if seen.insert(actor.key()) {
                    tagged.push(actor);
                }
            }
            None => body.push_str(whole.as_str()),
        }
    }
    body.push_str(&text[last..]);

    Ok(Encoded { body, tagged })
}

fn parse_token(caps: &Captures<'_>) -> Option<ActorKey> {
    let flag = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let id: i64 = caps.get(2)?.as_str().parse().ok()?;
    if id == 0 {
        return None;
    }
    // A token without a flag predates collaborators and always meant a user.
    let kind = match flag.chars().next() {
        Some(c) => ActorKind::from_flag(c)?,
        None => ActorKind::User,
    };
    Some(ActorKey { kind, id })
}

/// Distinct actor keys referenced by tokens in `text`.
pub fn token_keys(text: &str) -> Vec<ActorKey> {
    let mut seen = HashSet::new();
    TOKEN_RE
        .captures_iter(text)
        .filter_map(|caps| parse_token(&caps))
        .filter(|key| seen.insert(*key))
        .collect()
}

/// Text label and hover title for an actor, before any escaping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub label: String,
    pub title: String,
}

pub fn actor_label(actor: Option<&ActorView>) -> Label {
    let Some(actor) = actor else {
        return Label {
            label: UNKNOWN_LABEL.into(),
            title: String::new(),
        };
    };
    if !actor.user_email.is_empty() {
        return Label {
            label: email_local_part(&actor.user_email).to_string(),
            title: actor.user_email.clone(),
        };
    }
    let display = if actor.display_name.is_empty() {
        UNKNOWN_LABEL
    } else {
        actor.display_name.as_str()
    };
    let title = if display.contains('@') { display.to_string() } else { String::new() };
    Label {
        label: email_local_part(display).to_string(),
        title,
    }
}

/// Plain-text expansion used for excerpts and notifications: `@label`, or a bare
/// `@` when the actor no longer exists.
pub fn expand_tokens<F>(text: &str, lookup: F) -> String
where
    F: Fn(ActorKey) -> Option<ActorView>,
{
    if !text.to_ascii_lowercase().contains("tag://") {
        return text.to_string();
    }
    TOKEN_RE
        .replace_all(text, |caps: &Captures<'_>| {
            match parse_token(caps).and_then(&lookup) {
                Some(actor) => format!("@{}", actor_label(Some(&actor)).label),
                None => "@".to_string(),
            }
        })
        .into_owned()
}

fn escape(text: &str) -> String {
    html_escape::encode_double_quoted_attribute(text).into_owned()
}

fn chip(label: &str, title: &str) -> String {
    if title.is_empty() {
        format!(r#"<span class="annotate-mention">{label}</span>"#)
    } else {
        format!(r#"<span class="annotate-mention" title="{title}">{label}</span>"#)
    }
}

/// Wraps mentions in already-escaped text with chip markup.
///
/// Bodies containing tokens are expanded against `tags`; tokens for actors
/// not in `tags` collapse to `@`. Bodies without tokens are older content that
/// stored literal `@email` / `@login` text, which is matched case-insensitively
/// against the tag list instead.
pub fn highlight_mentions(escaped: &str, tags: &[ActorView]) -> String {
    if escaped.to_ascii_lowercase().contains("tag://") {
        let by_key: HashMap<ActorKey, &ActorView> = tags.iter().map(|t| (t.key(), t)).collect();
        return TOKEN_RE
            .replace_all(escaped, |caps: &Captures<'_>| {
                match parse_token(caps).and_then(|key| by_key.get(&key).copied()) {
                    Some(tag) => {
                        let label = actor_label(Some(tag));
                        chip(&format!("@{}", escape(&label.label)), &escape(&label.title))
                    }
                    None => "@".to_string(),
                }
            })
            .into_owned();
    }
    highlight_legacy(escaped, tags)
}

struct LegacyHandle<'a> {
    /// Case-insensitive, anchored at the start of the text after the `@`.
    pattern: Regex,
    tag: &'a ActorView,
    is_email: bool,
}

const CHIP_OPEN: &str = r#"<span class="annotate-mention""#;

/// Markup already in the text is copied through untouched, and nothing inside
/// an existing chip is matched again, so a second pass over the output is a
/// no-op even though chip titles carry `@email`.
fn highlight_legacy(escaped: &str, tags: &[ActorView]) -> String {
    let mut handles: Vec<(usize, LegacyHandle<'_>)> = tags
        .iter()
        .filter_map(|tag| {
            let (identifier, is_email) = if !tag.user_email.is_empty() {
                (tag.user_email.as_str(), true)
            } else if !tag.user_login.is_empty() {
                (tag.user_login.as_str(), false)
            } else {
                return None;
            };
            let needle = escape(identifier);
            let pattern = Regex::new(&format!(r"(?i)\A{}", regex::escape(&needle))).ok()?;
            Some((needle.chars().count(), LegacyHandle { pattern, tag, is_email }))
        })
        .collect();
    if handles.is_empty() {
        return escaped.to_string();
    }
    // Longest first so `@ann.lee` wins over `@ann`.
    handles.sort_by(|a, b| b.0.cmp(&a.0));

    let mut out = String::with_capacity(escaped.len());
    let mut in_chip = false;
    let mut i = 0;
    while i < escaped.len() {
        let rest = &escaped[i..];
        if rest.starts_with('<') {
            let markup_end = rest.find('>').map_or(rest.len(), |gt| gt + 1);
            let markup = &rest[..markup_end];
            if markup.starts_with(CHIP_OPEN) {
                in_chip = true;
            } else if in_chip && markup.eq_ignore_ascii_case("</span>") {
                in_chip = false;
            }
            out.push_str(markup);
            i += markup_end;
            continue;
        }
        if !in_chip && rest.starts_with('@') {
            let after = &rest[1..];
            let hit = handles.iter().find_map(|(_, h)| {
                let m = h.pattern.find(after)?;
                (h.is_email || !continues_word(&after[m.end()..])).then_some((h, m.end()))
            });
            if let Some((h, len)) = hit {
                let end = i + 1 + len;
                let display = if h.is_email {
                    format!("@{}", escape(email_local_part(&h.tag.user_email)))
                } else {
                    escaped[i..end].to_string()
                };
                let title = if h.is_email {
                    escape(&format!("@{}", h.tag.user_email))
                } else {
                    escape(&format!("@{}", h.tag.user_login))
                };
                out.push_str(&chip(&display, &title));
                i = end;
                continue;
            }
        }
        let ch_len = rest.chars().next().map_or(1, char::len_utf8);
        out.push_str(&rest[..ch_len]);
        i += ch_len;
    }
    out
}

fn continues_word(rest: &str) -> bool {
    rest.chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

/// Turns `http(s)://` runs in escaped text into links labelled by host.
pub fn linkify(escaped: &str) -> String {
    URL_RE
        .replace_all(escaped, |caps: &Captures<'_>| {
            let shown = &caps[0];
            let raw = html_escape::decode_html_entities(shown);
            let label = match url::Url::parse(&raw) {
                Ok(parsed) => {
                    let mut host = parsed.host_str().unwrap_or(&raw).to_string();
                    if let Some(port) = parsed.port() {
                        host = format!("{host}:{port}");
                    }
                    if !parsed.path().is_empty() && parsed.path() != "/" {
                        host.push_str("/…");
                    }
                    host
                }
                Err(_) => raw.to_string(),
            };
            format!(
                r#"<a href="{}" target="_blank" rel="noopener noreferrer">{}</a>"#,
                escape(&raw),
                escape(&label)
            )
        })
        .into_owned()
}

/// Full client-side rendering of a stored comment body.
pub fn render_comment_html(body: &str, tags: &[ActorView]) -> String {
    let text = body.replace("\r\n", "\n").replace('\r', "\n");
    let html = highlight_mentions(&escape(&text), tags);
    linkify(&html).replace('\n', "<br>")
}

/// Normalizes submitted text: entities decoded, markup stripped, line endings
/// unified, surrounding whitespace trimmed.
pub fn normalize_comment_body(raw: &str) -> String {
    let decoded = html_escape::decode_html_entities(raw);
    let stripped = TAG_RE.replace_all(&decoded, "");
    stripped
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Markup-free preview truncated to `width` characters, `…` included.
pub fn excerpt(text: &str, width: usize) -> String {
    let plain = TAG_RE.replace_all(text, "");
    let plain = plain.trim();
    if plain.chars().count() <= width {
        return plain.to_string();
    }
    let mut out: String = plain.chars().take(width.saturating_sub(1)).collect();
    out.push('…');
    out
}
