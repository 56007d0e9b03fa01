//! Stateless list filters

use crate::entry::MediaEntry;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingFilter {
    #[default]
    All,
    /// Score > 0
    Positive,
    /// Score >= 0
    NonNegative,
}

impl RatingFilter {
    pub fn matches(&self, rating: i64) -> bool {
        match self {
            RatingFilter::All => true,
            RatingFilter::Positive => rating > 0,
            RatingFilter::NonNegative => rating >= 0,
        }
    }
}

impl std::str::FromStr for RatingFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all" => Ok(RatingFilter::All),
            "positive" => Ok(RatingFilter::Positive),
            "non_negative" | "nonnegative" => Ok(RatingFilter::NonNegative),
            _ => bail!("Invalid rating filter: {}. Valid options: all, positive, non_negative", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayCountFilter {
    #[default]
    All,
    Zero,
    NonZero,
}

impl PlayCountFilter {
    pub fn matches(&self, play_count: i64) -> bool {
        match self {
            PlayCountFilter::All => true,
            PlayCountFilter::Zero => play_count == 0,
            PlayCountFilter::NonZero => play_count != 0,
        }
    }
}

impl std::str::FromStr for PlayCountFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "all" => Ok(PlayCountFilter::All),
            "zero" => Ok(PlayCountFilter::Zero),
            "non_zero" | "nonzero" => Ok(PlayCountFilter::NonZero),
            _ => bail!("Invalid play count filter: {}. Valid options: all, zero, non_zero", s),
        }
    }
}

/// Parameters of a list query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub include_subfolders: bool,
    pub rating: RatingFilter,
    pub plays: PlayCountFilter,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            include_subfolders: true,
            rating: RatingFilter::All,
            plays: PlayCountFilter::All,
        }
    }
}

impl ListQuery {
    pub fn matches(&self, entry: &MediaEntry) -> bool {
        (self.include_subfolders || entry.is_top_level())
            && self.rating.matches(entry.rating)
            && self.plays.matches(entry.play_count)
    }
}
