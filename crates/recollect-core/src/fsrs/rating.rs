//! Review ratings

use serde::{Deserialize, Serialize};

use super::scheduler::SchedulerError;

/// Learner's self-assessment of a review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rating {
    /// Forgot the card
    Again = 1,
    /// Recalled with serious difficulty
    Hard = 2,
    /// Recalled after some hesitation
    Good = 3,
    /// Recalled instantly
    Easy = 4,
}

impl Rating {
    /// All ratings in ordinal order
    pub const ALL: [Rating; 4] = [Rating::Again, Rating::Hard, Rating::Good, Rating::Easy];

    /// Ordinal code (1-4)
    #[inline]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Zero-based index into per-rating weight slots
    #[inline]
    pub fn index(self) -> usize {
        self as usize - 1
    }

    /// Parse an ordinal code
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Rating::Again),
            2 => Some(Rating::Hard),
            3 => Some(Rating::Good),
            4 => Some(Rating::Easy),
            _ => None,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(self) -> &'static str {
        match self {
            Rating::Again => "again",
            Rating::Hard => "hard",
            Rating::Good => "good",
            Rating::Easy => "easy",
        }
    }

    /// True for every rating except Again
    #[inline]
    pub fn is_success(self) -> bool {
        self != Rating::Again
    }
}

impl std::fmt::Display for Rating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Rating {
    type Err = SchedulerError;

    /// Accepts names in any case or ordinal codes, surrounding whitespace ignored
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        let rating = match key.as_str() {
            "again" => Some(Rating::Again),
            "hard" => Some(Rating::Hard),
            "good" => Some(Rating::Good),
            "easy" => Some(Rating::Easy),
            other => other.parse::<i32>().ok().and_then(Rating::from_i32),
        };
        rating.ok_or_else(|| SchedulerError::InvalidGrade(s.to_string()))
    }
}

impl TryFrom<i32> for Rating {
    type Error = SchedulerError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        Rating::from_i32(value).ok_or_else(|| SchedulerError::InvalidGrade(value.to_string()))
    }
}
