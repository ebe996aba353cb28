use once_cell::sync::Lazy;
use regex::Regex;

/// Any `@handle` token, including dotted domain handles
static MENTION_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[\w.-]+").unwrap());

/// Remove @mentions from a post and return what is left as the question.
///
/// An empty result means the post carried nothing but mentions.
pub fn extract_question(post_text: &str) -> String {
    MENTION_TOKEN.replace_all(post_text, "").trim().to_string()
}
