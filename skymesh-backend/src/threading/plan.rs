//! Thread planning: decide how a chunked answer maps onto posts.
//!
//! A plan is pure data computed before any network call. Each entry names
//! the post it replies to symbolically (the original mention, or an earlier
//! entry of the same plan); the publisher turns those into real references.

use crate::text::graphemes;
use std::fmt;
use thiserror::Error;

/// How a plan will appear on the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStrategy {
    /// One unlabeled reply
    SinglePost,
    /// One reply chain labeled `(i/n) `
    Chain { posts: usize },
    /// A summary reply plus one chain per part, each chain hanging off the mention
    MultiPart { parts: usize, depth: usize },
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePost => write!(f, "single post"),
            Self::Chain { posts } => write!(f, "chain of {}", posts),
            Self::MultiPart { parts, depth } => {
                write!(f, "{} parts of up to {} posts", parts, depth)
            }
        }
    }
}

/// The post an entry replies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyParent {
    /// The mention being answered (also the root of every entry)
    Mention,
    /// An earlier entry of the same plan, by index
    Entry(usize),
}

/// Rate-limit pause taken before creating an entry's post
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pause {
    None,
    /// Between posts of the same reply operation
    BetweenPosts,
    /// Before the first post of a part other than the first
    BetweenParts,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub parent: ReplyParent,
    pub label: String,
    pub body: String,
    pub pause: Pause,
}

impl PlanEntry {
    /// Final post text: label followed by body
    pub fn text(&self) -> String {
        format!("{}{}", self.label, self.body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPlan {
    pub strategy: PublishStrategy,
    pub entries: Vec<PlanEntry>,
}

impl ThreadPlan {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Longest label in grapheme clusters
    pub fn longest_label(&self) -> usize {
        self.entries
            .iter()
            .map(|e| graphemes::count(&e.label))
            .max()
            .unwrap_or(0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("answer is empty, nothing to post")]
    EmptyAnswer,
    #[error("max visible thread depth must be at least 1")]
    ZeroDepth,
    #[error("post limit of {limit} graphemes leaves no room for thread labels")]
    LimitTooSmall { limit: usize },
    #[error("planned post {index} is {graphemes} graphemes, over the {limit} limit")]
    PostTooLong {
        index: usize,
        graphemes: usize,
        limit: usize,
    },
}

/// Summary reply announcing a multi-part answer
pub fn summary_text(parts: usize, depth: usize) -> String {
    format!(
        "Your question requires a detailed answer that will be posted in {} parts. \
         Each part will contain up to {} posts in a thread. \
         Please check my recent posts or notifications to see all parts.",
        parts, depth
    )
}

/// Build the plan for already-chunked text.
///
/// - one chunk: a single unlabeled reply
/// - up to `max_visible_depth` chunks: one chain labeled `(i/n) `
/// - more: a summary reply, then `ceil(n / depth)` chains, each started
///   directly under the mention and labeled `PART p/P: ` /
///   `PART p/P (i/m): `
pub fn build_plan(chunks: &[String], max_visible_depth: usize) -> Result<ThreadPlan, PlanError> {
    if max_visible_depth == 0 {
        return Err(PlanError::ZeroDepth);
    }

    match chunks.len() {
        0 => Err(PlanError::EmptyAnswer),
        1 => Ok(ThreadPlan {
            strategy: PublishStrategy::SinglePost,
            entries: vec![PlanEntry {
                parent: ReplyParent::Mention,
                label: String::new(),
                body: chunks[0].clone(),
                pause: Pause::None,
            }],
        }),
        n if n <= max_visible_depth => Ok(chain_plan(chunks)),
        _ => Ok(multipart_plan(chunks, max_visible_depth)),
    }
}

fn chain_plan(chunks: &[String]) -> ThreadPlan {
    let total = chunks.len();
    let entries = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| PlanEntry {
            parent: if i == 0 {
                ReplyParent::Mention
            } else {
                ReplyParent::Entry(i - 1)
            },
            label: format!("({}/{}) ", i + 1, total),
            body: chunk.clone(),
            pause: if i == 0 { Pause::None } else { Pause::BetweenPosts },
        })
        .collect();

    ThreadPlan {
        strategy: PublishStrategy::Chain { posts: total },
        entries,
    }
}

fn multipart_plan(chunks: &[String], depth: usize) -> ThreadPlan {
    let parts = chunks.len().div_ceil(depth);
    let mut entries = Vec::with_capacity(chunks.len() + 1);

    entries.push(PlanEntry {
        parent: ReplyParent::Mention,
        label: String::new(),
        body: summary_text(parts, depth),
        pause: Pause::None,
    });

    for (part_index, part) in chunks.chunks(depth).enumerate() {
        let part_no = part_index + 1;
        let part_len = part.len();

        for (i, chunk) in part.iter().enumerate() {
            let (parent, label, pause) = if i == 0 {
                let pause = if part_index == 0 {
                    Pause::BetweenPosts
                } else {
                    Pause::BetweenParts
                };
                (
                    ReplyParent::Mention,
                    format!("PART {}/{}: ", part_no, parts),
                    pause,
                )
            } else {
                (
                    ReplyParent::Entry(entries.len() - 1),
                    format!("PART {}/{} ({}/{}): ", part_no, parts, i + 1, part_len),
                    Pause::BetweenPosts,
                )
            };

            entries.push(PlanEntry {
                parent,
                label,
                body: chunk.clone(),
                pause,
            });
        }
    }

    ThreadPlan {
        strategy: PublishStrategy::MultiPart { parts, depth },
        entries,
    }
}
