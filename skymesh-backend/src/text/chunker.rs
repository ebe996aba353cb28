//! Split long text into post-sized chunks.
//!
//! Packing happens at three levels, each only used when the coarser one
//! cannot fit: whole sentences, then words, then fixed windows of grapheme
//! clusters. Every chunk returned holds at most `max_graphemes` clusters.

use crate::text::graphemes;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Sentence terminator followed by the whitespace run that separates sentences
static SENTENCE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Split `text` into chunks of at most `max_graphemes` grapheme clusters.
///
/// Empty (or whitespace-only) input yields no chunks. A `max_graphemes` of
/// zero is treated as one.
pub fn split(text: &str, max_graphemes: usize) -> Vec<String> {
    let max = max_graphemes.max(1);
    let mut packer = Packer::new(max);

    for sentence in sentences(text) {
        if packer.try_append(sentence) {
            continue;
        }
        packer.flush();

        if graphemes::count(sentence) <= max {
            packer.current = sentence.to_string();
        } else {
            packer.pack_words(sentence);
        }
    }

    packer.finish()
}

/// Sentences of `text`, split after `.`, `!` or `?` followed by whitespace
fn sentences(text: &str) -> Vec<&str> {
    let text = trim_blank(text);
    if text.is_empty() {
        return Vec::new();
    }

    let mut result = Vec::new();
    let mut start = 0;
    for m in SENTENCE_BREAK.find_iter(text) {
        // terminators are ASCII, so the sentence ends one byte into the match
        result.push(&text[start..m.start() + 1]);
        // a trailing space may carry a combining mark into the next sentence
        start = graphemes::floor_boundary(text, m.end());
    }
    if start < text.len() {
        result.push(&text[start..]);
    }
    result
}

/// `text` without leading or trailing whitespace-only clusters
fn trim_blank(text: &str) -> &str {
    let mut kept = text
        .grapheme_indices(true)
        .filter(|(_, cluster)| !graphemes::is_blank(cluster));
    let Some((start, first)) = kept.next() else {
        return "";
    };
    let end = kept
        .last()
        .map_or(start + first.len(), |(i, cluster)| i + cluster.len());
    &text[start..end]
}

/// Space separated words, cut only where a lone space is its own cluster
fn words(sentence: &str) -> impl Iterator<Item = &str> {
    let mut bounds = Vec::new();
    let mut start = 0;
    for (i, cluster) in sentence.grapheme_indices(true) {
        if cluster == " " {
            bounds.push(&sentence[start..i]);
            start = i + cluster.len();
        }
    }
    bounds.push(&sentence[start..]);
    bounds.into_iter().filter(|w| !trim_blank(w).is_empty())
}

struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
        }
    }

    /// Append `piece` to the running chunk (space separated) if it still fits
    fn try_append(&mut self, piece: &str) -> bool {
        let combined = if self.current.is_empty() {
            piece.to_string()
        } else {
            format!("{} {}", self.current, piece)
        };

        if graphemes::count(&combined) <= self.max {
            self.current = combined;
            true
        } else {
            false
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
    }

    /// Greedily pack the words of an oversized sentence
    fn pack_words(&mut self, sentence: &str) {
        for word in words(sentence) {
            if self.try_append(word) {
                continue;
            }
            self.flush();

            if graphemes::count(word) <= self.max {
                self.current = word.to_string();
            } else {
                let mut windows = hard_split(word, self.max);
                // the tail window stays open so following words can join it
                self.current = windows.pop().unwrap_or_default();
                self.chunks.extend(windows);
            }
        }
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Cut `word` into consecutive windows of `max` grapheme clusters
fn hard_split(word: &str, max: usize) -> Vec<String> {
    graphemes::segments(word)
        .chunks(max)
        .map(|window| window.concat())
        .collect()
}
