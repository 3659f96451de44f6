//! Composite result builder.
//!
//! Tags are unioned: duplicates collapse and first-seen order is kept.
//! Scores are summed; once more than one score contributes, the result
//! carries mode `"add"`.

use crate::models::{CompositeResult, Score, Tag};
use std::collections::HashSet;

/// Score mode reported when several scores were summed.
pub const SUMMED_SCORE_MODE: &str = "add";

#[derive(Debug, Default)]
pub struct CompositeBuilder {
    tags: Vec<Tag>,
    seen: HashSet<Tag>,
    score: Option<Score>,
}

impl CompositeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tags<I>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = Tag>,
    {
        for tag in tags {
            if self.seen.insert(tag.clone()) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn add_score(&mut self, score: Score) -> &mut Self {
        self.score = Some(match self.score.take() {
            None => score,
            Some(current) => Score {
                value: current.value + score.value,
                mode: Some(SUMMED_SCORE_MODE.to_string()),
            },
        });
        self
    }

    pub fn build(self) -> CompositeResult {
        CompositeResult {
            tags: self.tags,
            score: self.score,
        }
    }
}
