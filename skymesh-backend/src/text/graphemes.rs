//! Grapheme cluster accounting.
//!
//! Bluesky measures post length in user-perceived characters (extended
//! grapheme clusters), not bytes or code points.

use unicode_segmentation::UnicodeSegmentation;

/// Number of grapheme clusters in `text`
pub fn count(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Grapheme clusters of `text`, in order
pub fn segments(text: &str) -> Vec<&str> {
    text.graphemes(true).collect()
}

/// Byte offset of the last cluster boundary at or before `offset`
pub fn floor_boundary(text: &str, offset: usize) -> usize {
    if offset >= text.len() {
        return text.len();
    }
    text.grapheme_indices(true)
        .map(|(i, _)| i)
        .take_while(|&i| i <= offset)
        .last()
        .unwrap_or(0)
}

/// True when the cluster holds nothing but whitespace
pub fn is_blank(cluster: &str) -> bool {
    cluster.chars().all(char::is_whitespace)
}
