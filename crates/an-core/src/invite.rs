//! # Invite and share links
//!
//! Query parameters the engine reads from page URLs:
//! `annotate-id` opens a thread on load, `annotate-collab` carries a
//! collaborator invite token and is stripped by redirect once consumed.

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use url::Url;

pub const THREAD_PARAM: &str = "annotate-id";
pub const INVITE_PARAM: &str = "annotate-collab";

/// URL-safe, unpadded form of a stored email ciphertext.
pub fn encode_invite_token(email_encrypted: &str) -> Option<String> {
    let cleaned: String = email_encrypted.trim().replace(' ', "+");
    let bytes = STANDARD.decode(cleaned).ok()?;
    if bytes.is_empty() {
        return None;
    }
    Some(URL_SAFE_NO_PAD.encode(bytes))
}

/// Inverse of [`encode_invite_token`]: the ciphertext exactly as stored.
pub fn decode_invite_token(token: &str) -> Option<String> {
    let token = token.trim().trim_end_matches('=');
    if token.is_empty() {
        return None;
    }
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    Some(STANDARD.encode(bytes))
}

/// Reads a query parameter from an absolute URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Returns `url` with every occurrence of `name` removed from the query.
/// Unparseable input is returned unchanged.
pub fn strip_query_param(url: &str, name: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let kept: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(kept);
    }
    parsed.to_string()
}

/// Same as [`strip_query_param`] for an origin-relative `path?query` target.
pub fn strip_query_param_from_path(path_and_query: &str, name: &str) -> String {
    const BASE: &str = "http://localhost";
    let stripped = strip_query_param(&format!("{BASE}{path_and_query}"), name);
    stripped
        .strip_prefix(BASE)
        .map(str::to_string)
        .unwrap_or(stripped)
}

/// Replaces (or adds) `name=value` in the query of `url`.
pub fn with_query_param(url: &str, name: &str, value: &str) -> String {
    let base = strip_query_param(url, name);
    match Url::parse(&base) {
        Ok(mut parsed) => {
            parsed.query_pairs_mut().append_pair(name, value);
            parsed.to_string()
        }
        Err(_) => base,
    }
}

/// Link that opens `thread_id` on `page_url`.
pub fn thread_share_url(page_url: &str, thread_id: i64) -> String {
    with_query_param(page_url, THREAD_PARAM, &thread_id.to_string())
}

/// Thread id carried by a share link, if any.
pub fn thread_id_from_url(url: &str) -> Option<i64> {
    query_param(url, THREAD_PARAM)?
        .trim()
        .parse()
        .ok()
        .filter(|id: &i64| *id > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invite_token_is_url_safe_and_reversible() {
        let stored = STANDARD.encode([0xfbu8, 0xff, 0xbf, 0x01, 0x02]);
        assert!(stored.contains('+') || stored.contains('/'));
        let token = encode_invite_token(&stored).unwrap();
        assert!(!token.contains('+') && !token.contains('/') && !token.contains('='));
        assert_eq!(decode_invite_token(&token).unwrap(), stored);
    }

    #[test]
    fn invite_token_rejects_junk() {
        assert!(encode_invite_token("").is_none());
        assert!(decode_invite_token("   ").is_none());
        assert!(decode_invite_token("***").is_none());
    }

    #[test]
    fn share_url_round_trips_thread_id() {
        let link = thread_share_url("https://example.org/post?p=3&annotate-id=1", 12);
        assert_eq!(link, "https://example.org/post?p=3&annotate-id=12");
        assert_eq!(thread_id_from_url(&link), Some(12));
        assert_eq!(thread_id_from_url("https://example.org/post"), None);
    }

    #[test]
    fn stripping_last_param_drops_question_mark() {
        assert_eq!(
            strip_query_param("https://example.org/a?annotate-collab=xyz#top", INVITE_PARAM),
            "https://example.org/a#top"
        );
        assert_eq!(
            strip_query_param_from_path("/a?x=1&annotate-collab=xyz", INVITE_PARAM),
            "/a?x=1"
        );
    }
}
