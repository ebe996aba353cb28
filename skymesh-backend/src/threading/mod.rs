//! Turning an answer into a reply thread: planning and publishing.

pub mod plan;
pub mod publisher;

pub use plan::{build_plan, PlanError, ThreadPlan};
pub use publisher::{Pacing, PublishError, ReplyPublisher};

use crate::text::{chunker, graphemes};

/// Graphemes initially set aside for the longest label a chain can carry
const LABEL_RESERVE: usize = 20;

/// Per-post platform limits a plan must respect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLimits {
    pub max_post_graphemes: usize,
    pub max_visible_depth: usize,
}

impl Default for ThreadLimits {
    fn default() -> Self {
        Self {
            max_post_graphemes: 300,
            max_visible_depth: 9,
        }
    }
}

/// Chunk `text` and plan the reply thread for it.
///
/// Text that fits one post is planned as-is. Longer text is chunked with room
/// left for labels; if the labels the plan ends up needing are longer than the
/// room left, chunking is redone with the larger reserve.
pub fn plan_reply(text: &str, limits: ThreadLimits) -> Result<ThreadPlan, PlanError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(PlanError::EmptyAnswer);
    }

    let max = limits.max_post_graphemes;
    if graphemes::count(text) <= max {
        return build_plan(&[text.to_string()], limits.max_visible_depth);
    }

    let mut reserve = LABEL_RESERVE;
    loop {
        if reserve >= max {
            return Err(PlanError::LimitTooSmall { limit: max });
        }

        let chunks = chunker::split(text, max - reserve);
        let plan = build_plan(&chunks, limits.max_visible_depth)?;

        let longest = plan.longest_label();
        if longest > reserve {
            reserve = longest;
            continue;
        }

        check_lengths(&plan, max)?;
        return Ok(plan);
    }
}

fn check_lengths(plan: &ThreadPlan, limit: usize) -> Result<(), PlanError> {
    for (index, entry) in plan.entries.iter().enumerate() {
        let graphemes = graphemes::count(&entry.text());
        if graphemes > limit {
            return Err(PlanError::PostTooLong {
                index,
                graphemes,
                limit,
            });
        }
    }
    Ok(())
}
