//! Rich text facet detection for outgoing posts.
//!
//! Facets index the post text by UTF-8 byte offsets, which is what Rust string
//! indices already are.

use super::types::{ByteSlice, Facet, FacetFeature};
use super::PostClient;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static MENTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:^|[\s(])(@((?:[a-zA-Z0-9](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?\.)+[a-zA-Z](?:[a-zA-Z0-9-]*[a-zA-Z0-9])?))",
    )
    .unwrap()
});

static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|[\s(])(https?://\S+)").unwrap());

static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)(#[^\s#]+)").unwrap());

const MAX_TAG_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpanKind {
    Mention(String),
    Link(String),
    Tag(String),
}

/// A facet candidate found in text, before handle resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub kind: SpanKind,
    pub range: Range<usize>,
}

/// Find mention, link and hashtag spans in `text`, ordered by position
pub fn detect_spans(text: &str) -> Vec<Span> {
    let mut spans = Vec::new();

    for caps in MENTION.captures_iter(text) {
        if let (Some(whole), Some(handle)) = (caps.get(1), caps.get(2)) {
            spans.push(Span {
                kind: SpanKind::Mention(handle.as_str().to_lowercase()),
                range: whole.range(),
            });
        }
    }

    for caps in LINK.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let uri = trim_link(m.as_str());
            spans.push(Span {
                kind: SpanKind::Link(uri.to_string()),
                range: m.start()..m.start() + uri.len(),
            });
        }
    }

    for caps in TAG.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            let raw = m.as_str().trim_end_matches(|c: char| c.is_ascii_punctuation());
            let Some(tag) = raw.strip_prefix('#') else {
                continue;
            };
            if tag.is_empty() || tag.chars().all(|c| c.is_ascii_digit()) {
                continue;
            }
            if tag.chars().count() > MAX_TAG_CHARS {
                continue;
            }
            spans.push(Span {
                kind: SpanKind::Tag(tag.to_string()),
                range: m.start()..m.start() + raw.len(),
            });
        }
    }

    spans.sort_by_key(|s| s.range.start);
    spans
}

/// Strip trailing sentence punctuation and an unbalanced closing paren
fn trim_link(link: &str) -> &str {
    let mut trimmed = link.trim_end_matches(['.', ',', ';', ':', '!', '?', '"', '\'']);
    if trimmed.ends_with(')') && !trimmed.contains('(') {
        trimmed = &trimmed[..trimmed.len() - 1];
        trimmed = trimmed.trim_end_matches(['.', ',', ';', ':', '!', '?']);
    }
    trimmed
}

/// Detect facets in `text`, resolving mentioned handles to DIDs.
///
/// Handles that do not resolve, or whose lookup fails, get no facet.
pub async fn detect_facets(text: &str, resolver: &dyn PostClient) -> Vec<Facet> {
    let mut facets = Vec::new();

    for span in detect_spans(text) {
        let feature = match span.kind {
            SpanKind::Mention(handle) => match resolver.resolve_handle(&handle).await {
                Ok(Some(did)) => FacetFeature::Mention { did },
                Ok(None) => {
                    log::debug!("Bluesky: Handle @{} did not resolve, no facet", handle);
                    continue;
                }
                Err(e) => {
                    log::warn!("Bluesky: Failed to resolve @{}: {}", handle, e);
                    continue;
                }
            },
            SpanKind::Link(uri) => FacetFeature::Link { uri },
            SpanKind::Tag(tag) => FacetFeature::Tag { tag },
        };

        facets.push(Facet {
            index: ByteSlice {
                byte_start: span.range.start,
                byte_end: span.range.end,
            },
            features: vec![feature],
        });
    }

    facets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluesky::types::{NewPost, PostRef};
    use crate::bluesky::BlueskyError;
    use async_trait::async_trait;

    struct Resolver;

    #[async_trait]
    impl PostClient for Resolver {
        async fn get_post(&self, uri: &str) -> Result<PostRef, BlueskyError> {
            Err(BlueskyError::PostNotFound(uri.to_string()))
        }

        async fn resolve_handle(&self, handle: &str) -> Result<Option<String>, BlueskyError> {
            match handle {
                "alice.bsky.social" => Ok(Some("did:plc:alice".to_string())),
                "flaky.example.com" => Err(BlueskyError::RateLimited),
                _ => Ok(None),
            }
        }

        async fn create_post(&self, _post: &NewPost) -> Result<PostRef, BlueskyError> {
            Err(BlueskyError::NotLoggedIn)
        }
    }

    #[test]
    fn test_mention_span_and_trailing_dot() {
        let text = "thanks @alice.bsky.social.";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].kind, SpanKind::Mention("alice.bsky.social".to_string()));
        assert_eq!(&text[spans[0].range.clone()], "@alice.bsky.social");
    }

    #[test]
    fn test_email_is_not_a_mention() {
        assert!(detect_spans("mail me at bob@example.com").is_empty());
        // no dot, not a handle
        assert!(detect_spans("hey @bob").is_empty());
    }

    #[test]
    fn test_link_trailing_punctuation() {
        let text = "docs (see https://example.com/a_b?x=1). More at https://rust-lang.org!";
        let spans = detect_spans(text);
        let links: Vec<&str> = spans.iter().map(|s| &text[s.range.clone()]).collect();
        assert_eq!(links, vec!["https://example.com/a_b?x=1", "https://rust-lang.org"]);
    }

    #[test]
    fn test_link_keeps_balanced_parens() {
        let text = "https://en.wikipedia.org/wiki/Rust_(programming_language)";
        let spans = detect_spans(text);
        assert_eq!(spans[0].range, 0..text.len());
    }

    #[test]
    fn test_tags() {
        let text = "#rust is fun, #2024 is not a tag, #async.";
        let tags: Vec<SpanKind> = detect_spans(text).into_iter().map(|s| s.kind).collect();
        assert_eq!(
            tags,
            vec![SpanKind::Tag("rust".to_string()), SpanKind::Tag("async".to_string())]
        );
        let long = format!("#{}", "a".repeat(65));
        assert!(detect_spans(&long).is_empty());
        assert!(detect_spans("# #!! #").is_empty());
    }

    #[test]
    fn test_byte_offsets_after_multibyte_text() {
        let text = "caf\u{e9} \u{1F600} #t\u{e9}";
        let spans = detect_spans(text);
        assert_eq!(spans.len(), 1);
        // "café " is 6 bytes, the emoji 4, plus a space
        assert_eq!(spans[0].range.start, 11);
        assert_eq!(spans[0].range.end, text.len());
    }

    #[tokio::test]
    async fn test_unresolved_and_failed_handles_get_no_facet() {
        let text = "(1/2) @alice.bsky.social @ghost.example.com @flaky.example.com https://x.dev #tag";
        let facets = detect_facets(text, &Resolver).await;

        assert_eq!(facets.len(), 3);
        assert_eq!(
            facets[0].features,
            vec![FacetFeature::Mention { did: "did:plc:alice".to_string() }]
        );
        assert_eq!(facets[0].index.byte_start, 6);
        assert_eq!(
            facets[1].features,
            vec![FacetFeature::Link { uri: "https://x.dev".to_string() }]
        );
        assert_eq!(facets[2].features, vec![FacetFeature::Tag { tag: "tag".to_string() }]);
    }
}
