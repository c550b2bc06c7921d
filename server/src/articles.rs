//! Article source: one ordered table per game mode, consumed by round number.

use log::info;
use serde::Deserialize;
use shared::{Article, GameMode, Tag};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("failed to read article file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse article file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("no articles configured for {0} mode")]
    Empty(GameMode),
}

/// On-disk layout of an article file
#[derive(Debug, Deserialize)]
struct ArticleFile {
    training: Vec<Article>,
    play: Vec<Article>,
}

#[derive(Debug, Clone)]
pub struct ArticleLibrary {
    training: Vec<Arc<Article>>,
    play: Vec<Arc<Article>>,
}

impl ArticleLibrary {
    /// Builds a library, rejecting a mode without articles.
    pub fn new(training: Vec<Article>, play: Vec<Article>) -> Result<Self, ArticleError> {
        if training.is_empty() {
            return Err(ArticleError::Empty(GameMode::Training));
        }
        if play.is_empty() {
            return Err(ArticleError::Empty(GameMode::Play));
        }

        Ok(Self {
            training: training.into_iter().map(Arc::new).collect(),
            play: play.into_iter().map(Arc::new).collect(),
        })
    }

    /// Parses `{ "training": [...], "play": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, ArticleError> {
        let file: ArticleFile = serde_json::from_str(json)?;
        Self::new(file.training, file.play)
    }

    pub fn load(path: &Path) -> Result<Self, ArticleError> {
        let json = std::fs::read_to_string(path)?;
        let library = Self::from_json(&json)?;
        info!(
            "Loaded {} training and {} play articles from {}",
            library.training.len(),
            library.play.len(),
            path.display()
        );
        Ok(library)
    }

    /// Article for a 1-based round. Rounds past the end of the table wrap.
    pub fn article(&self, mode: GameMode, round: u32) -> Arc<Article> {
        let table = match mode {
            GameMode::Training => &self.training,
            GameMode::Play => &self.play,
        };
        let index = (round.max(1) as usize - 1) % table.len();
        Arc::clone(&table[index])
    }

    pub fn len(&self, mode: GameMode) -> usize {
        match mode {
            GameMode::Training => self.training.len(),
            GameMode::Play => self.play.len(),
        }
    }

    /// The articles bundled with the server.
    pub fn builtin() -> Self {
        let training = vec![
            article(
                "SHOCKING: Scientists Find AMAZING Cure for ALL Diseases!",
                "In an unprecedented discovery that's sending shockwaves through the medical \
                 community, scientists claim they've found a miracle cure that works for every \
                 known disease. Click to learn this one weird trick!",
                "totally-real-news.com",
                Tag::Fake,
                Some(&[
                    "The headline shouts in capital letters",
                    "A single cure for every disease is not a plausible claim",
                    "The source domain is not a known outlet",
                ]),
            ),
            article(
                "Local Restaurant Receives Health Inspection Rating",
                "Downtown's popular restaurant 'The Hungry Fork' received its annual health \
                 inspection this week, maintaining its A rating for the third year in a row.",
                "localnews.com",
                Tag::Truth,
                Some(&[
                    "The tone is calm and factual",
                    "The claim is small and easy to verify",
                ]),
            ),
            article(
                "You Won't BELIEVE What This Celebrity Did Next!",
                "In a shocking turn of events that has left fans speechless, this A-list \
                 celebrity's latest actions have completely transformed the entertainment \
                 industry forever!",
                "celebrity-gossip-daily.net",
                Tag::Fake,
                Some(&[
                    "The headline withholds the actual news",
                    "No names, dates or places are given",
                ]),
            ),
        ];

        let play = vec![
            article(
                "BREAKING: Moon Made ENTIRELY of Cheese, NASA Admits!",
                "Leaked documents reportedly show that space agency officials have known the \
                 truth for decades.",
                "space-truths.biz",
                Tag::AllCapsTitle,
                None,
            ),
            article(
                "City Council Approves New Bike Lanes on Main Street",
                "The council voted 7-2 on Tuesday to add protected bike lanes along Main \
                 Street, with construction expected to begin in the spring.",
                "citygazette.com",
                Tag::Truth,
                None,
            ),
            article(
                "Drinking Coffee Lets You Skip Sleep Entirely, Study Finds",
                "An anonymous blogger cites a study nobody can locate to argue that five cups \
                 a day replace a full night of rest.",
                "my-health-secrets.blogspot.example",
                Tag::UnreliableSource,
                None,
            ),
            article(
                "Library Extends Weekend Opening Hours",
                "Starting next month the central library will stay open until 8pm on \
                 Saturdays and Sundays, the library board announced.",
                "citygazette.com",
                Tag::Truth,
                None,
            ),
        ];

        Self {
            training: training.into_iter().map(Arc::new).collect(),
            play: play.into_iter().map(Arc::new).collect(),
        }
    }
}

fn article(
    title: &str,
    content: &str,
    url: &str,
    correct_tag: Tag,
    clues: Option<&[&str]>,
) -> Article {
    Article {
        title: title.to_string(),
        content: content.to_string(),
        url: url.to_string(),
        correct_tag,
        clues: clues.map(|clues| clues.iter().map(|clue| clue.to_string()).collect()),
    }
}
