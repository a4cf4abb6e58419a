//! Grading reported footing against the stored prediction for that date.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

use crate::db::queries;
use crate::errors::AppError;
use crate::services::scoring::DayScore;

/// Footing as reported after a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ActualFooting {
    Good,
    Soft,
    Unsafe,
}

impl ActualFooting {
    /// 0 = good, 1 = soft, 2 = unsafe; aligned with `DayScore::ordinal`.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActualFooting::Good => "good",
            ActualFooting::Soft => "soft",
            ActualFooting::Unsafe => "unsafe",
        }
    }
}

impl fmt::Display for ActualFooting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid actual_footing {0:?}: expected good, soft or unsafe")]
pub struct ParseFootingError(pub String);

impl FromStr for ActualFooting {
    type Err = ParseFootingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(ActualFooting::Good),
            "soft" => Ok(ActualFooting::Soft),
            "unsafe" => Ok(ActualFooting::Unsafe),
            other => Err(ParseFootingError(other.to_string())),
        }
    }
}

/// How a prediction compared with what the rider found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Match,
    /// Ground was wetter than predicted: the model dries too fast
    TooDry,
    /// Ground was drier than predicted: the model dries too slowly
    TooWet,
}

use Outcome::{Match, TooDry, TooWet};

/// `ACCURACY_TABLE[predicted.ordinal()][actual.ordinal()]`.
pub const ACCURACY_TABLE: [[Outcome; 3]; 3] = [
    //  good     soft     unsafe
    [Match, TooDry, TooDry], // green
    [TooWet, Match, TooDry], // yellow
    [TooWet, TooWet, Match], // red
];

pub fn grade(predicted: DayScore, actual: ActualFooting) -> Outcome {
    ACCURACY_TABLE[predicted.ordinal()][actual.ordinal()]
}

/// Latest feedback for a date joined with the snapshot for that date.
#[derive(Debug, Clone, PartialEq)]
pub struct GradedFeedback {
    pub date: NaiveDate,
    pub predicted: DayScore,
    pub actual: ActualFooting,
    /// Drying rate in effect when the prediction was made
    pub dry_hours_used: f64,
    /// False when the prediction was scored without recent-rain history
    pub moisture_known: bool,
}

impl GradedFeedback {
    pub fn outcome(&self) -> Outcome {
        grade(self.predicted, self.actual)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct ScoreAccuracy {
    pub score: Option<DayScore>,
    pub total: u32,
    pub matches: u32,
    pub too_dry: u32,
    pub too_wet: u32,
}

impl ScoreAccuracy {
    fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Match => self.matches += 1,
            TooDry => self.too_dry += 1,
            TooWet => self.too_wet += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct AccuracyStats {
    pub total: u32,
    pub matches: u32,
    pub too_dry: u32,
    pub too_wet: u32,
    /// `None` until at least one graded sample exists
    pub accuracy_pct: Option<f64>,
    /// One entry per predicted score, green first
    pub by_score: Vec<ScoreAccuracy>,
    /// Feedback dates with no stored prediction
    pub unmatched_feedback: u32,
}

pub fn compute_accuracy(graded: &[GradedFeedback], unmatched_feedback: u32) -> AccuracyStats {
    let mut overall = ScoreAccuracy::default();
    let mut by_score: Vec<ScoreAccuracy> = DayScore::ALL
        .iter()
        .map(|s| ScoreAccuracy {
            score: Some(*s),
            ..ScoreAccuracy::default()
        })
        .collect();

    for g in graded {
        let outcome = g.outcome();
        overall.record(outcome);
        by_score[g.predicted.ordinal()].record(outcome);
    }

    let accuracy_pct = (overall.total > 0)
        .then(|| f64::from(overall.matches) / f64::from(overall.total) * 100.0);

    AccuracyStats {
        total: overall.total,
        matches: overall.matches,
        too_dry: overall.too_dry,
        too_wet: overall.too_wet,
        accuracy_pct,
        by_score,
        unmatched_feedback,
    }
}

/// Accuracy across all feedback that has a stored prediction.
pub async fn get_accuracy_stats(pool: &PgPool) -> Result<AccuracyStats, AppError> {
    let graded = queries::get_graded_feedback(pool, None).await?;
    let unmatched = queries::count_unmatched_feedback_dates(pool).await?;
    Ok(compute_accuracy(&graded, unmatched))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::forecast::fixtures::date;

    fn g(predicted: DayScore, actual: ActualFooting) -> GradedFeedback {
        GradedFeedback {
            date: date(2026, 5, 2),
            predicted,
            actual,
            dry_hours_used: 24.0,
            moisture_known: true,
        }
    }

    #[test]
    fn test_parse_actual_footing() {
        assert_eq!("soft".parse::<ActualFooting>().unwrap(), ActualFooting::Soft);
        let err = "muddy".parse::<ActualFooting>().unwrap_err();
        assert_eq!(err, ParseFootingError("muddy".to_string()));
        assert!("Good".parse::<ActualFooting>().is_err());
    }

    #[test]
    fn test_accuracy_table_direction() {
        assert_eq!(grade(DayScore::Green, ActualFooting::Good), Match);
        assert_eq!(grade(DayScore::Yellow, ActualFooting::Soft), Match);
        assert_eq!(grade(DayScore::Red, ActualFooting::Unsafe), Match);
        assert_eq!(grade(DayScore::Green, ActualFooting::Unsafe), TooDry);
        assert_eq!(grade(DayScore::Green, ActualFooting::Soft), TooDry);
        assert_eq!(grade(DayScore::Red, ActualFooting::Good), TooWet);
        assert_eq!(grade(DayScore::Yellow, ActualFooting::Good), TooWet);
    }

    #[test]
    fn test_compute_accuracy_counts() {
        let graded = vec![
            g(DayScore::Green, ActualFooting::Good),
            g(DayScore::Green, ActualFooting::Soft),
            g(DayScore::Yellow, ActualFooting::Soft),
            g(DayScore::Red, ActualFooting::Good),
        ];
        let stats = compute_accuracy(&graded, 2);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.matches, 2);
        assert_eq!(stats.too_dry, 1);
        assert_eq!(stats.too_wet, 1);
        assert_eq!(stats.accuracy_pct, Some(50.0));
        assert_eq!(stats.unmatched_feedback, 2);

        assert_eq!(stats.by_score.len(), 3);
        assert_eq!(stats.by_score[0].score, Some(DayScore::Green));
        assert_eq!(stats.by_score[0].total, 2);
        assert_eq!(stats.by_score[0].too_dry, 1);
        assert_eq!(stats.by_score[2].too_wet, 1);
    }

    #[test]
    fn test_compute_accuracy_empty() {
        let stats = compute_accuracy(&[], 0);
        assert_eq!(stats.total, 0);
        assert_eq!(stats.accuracy_pct, None);
        assert!(stats.by_score.iter().all(|s| s.total == 0));
    }
}
