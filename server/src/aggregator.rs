//! Per-round vote tally
//!
//! Keeps the tag counts together with each player's current choice so a
//! changed vote moves between tags instead of being counted twice.

use shared::{PlayerId, Tag, TagCount};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub struct AnswerAggregator {
    /// Vote count per tag, ordered by tag name
    counts: BTreeMap<Tag, u32>,
    /// Current choice of every player who voted this round
    answers: HashMap<PlayerId, Tag>,
}

impl AnswerAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a vote, replacing the player's previous one.
    ///
    /// Returns the replaced tag, if any.
    pub fn record_answer(&mut self, player_id: &PlayerId, tag: Tag) -> Option<Tag> {
        let previous = self.answers.insert(player_id.clone(), tag);

        if let Some(old) = previous {
            if let Some(count) = self.counts.get_mut(&old) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(&old);
                }
            }
        }

        *self.counts.entry(tag).or_insert(0) += 1;
        previous
    }

    pub fn answer_of(&self, player_id: &PlayerId) -> Option<Tag> {
        self.answers.get(player_id).copied()
    }

    pub fn count(&self, tag: Tag) -> u32 {
        self.counts.get(&tag).copied().unwrap_or(0)
    }

    /// Tags with at least one vote, in tag order.
    pub fn snapshot(&self) -> Vec<TagCount> {
        self.counts
            .iter()
            .map(|(tag, count)| TagCount {
                tag: *tag,
                count: *count,
            })
            .collect()
    }

    /// Tag with the most votes. Ties go to the lexicographically smallest tag.
    /// `None` when nobody voted.
    pub fn plurality(&self) -> Option<Tag> {
        let mut winner: Option<(Tag, u32)> = None;
        // BTreeMap iterates in ascending tag order, so only a strictly
        // larger count displaces the current winner.
        for (tag, count) in &self.counts {
            match winner {
                Some((_, best)) if *count <= best => {}
                _ => winner = Some((*tag, *count)),
            }
        }
        winner.map(|(tag, _)| tag)
    }

    /// Sum of all tag counts
    pub fn total_votes(&self) -> u32 {
        self.counts.values().sum()
    }

    pub fn voter_count(&self) -> usize {
        self.answers.len()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.answers.clear();
    }
}
