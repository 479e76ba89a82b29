//! Rating aggregation.
//!
//! Pure functions over a book's rating collection. A collection holds at most
//! one rating per user, every grade lies in `[0, 5]`, and the average of an
//! empty collection is `0`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

use crate::error::AppError;
use crate::types::UserId;

pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 5.0;

/// One user's grade for a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub user_id: UserId,
    pub grade: f64,
}

/// A rating collection together with its recomputed average.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RatingSummary {
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
}

impl RatingSummary {
    fn from_ratings(ratings: Vec<Rating>) -> Self {
        let average_rating = average(&ratings);
        Self {
            ratings,
            average_rating,
        }
    }
}

/// Raw ratings as submitted with a whole book: either a bare grade attributed to
/// the submitter, or a list of `{ userId?, grade }` entries.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingsInput {
    Single(Value),
    Many(Vec<RawRating>),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRating {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub grade: Value,
}

impl RatingsInput {
    /// Interpret a JSON `ratings` value. Anything that is neither a number nor
    /// an array carries no ratings and yields `None`.
    pub fn from_value(value: &Value) -> Result<Option<Self>, RatingError> {
        match value {
            Value::Number(_) => Ok(Some(Self::Single(value.clone()))),
            Value::Array(items) => {
                let raw = items
                    .iter()
                    .map(|item| {
                        serde_json::from_value::<RawRating>(item.clone()).map_err(|e| {
                            RatingError::InvalidGrade(format!("malformed rating entry: {}", e))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Self::Many(raw)))
            }
            _ => Ok(None),
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RatingError {
    #[error("grade must be a number between 0 and 5 (got {0})")]
    InvalidGrade(String),

    #[error("a rating needs a user id")]
    MissingUser,

    #[error("user {0} has already rated this book")]
    Duplicate(UserId),
}

impl From<RatingError> for AppError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::Duplicate(_) => AppError::Conflict(err.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

/// Parse a grade from a JSON number or numeric string and check its range.
pub fn parse_grade(raw: &Value) -> Result<f64, RatingError> {
    let grade = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if !s.trim().is_empty() => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| RatingError::InvalidGrade(raw.to_string()))?;

    if !grade.is_finite() || !(MIN_GRADE..=MAX_GRADE).contains(&grade) {
        return Err(RatingError::InvalidGrade(raw.to_string()));
    }

    Ok(grade)
}

/// Arithmetic mean of the grades; `0` for an empty collection.
pub fn average(ratings: &[Rating]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let total: f64 = ratings.iter().map(|r| r.grade).sum();
    total / ratings.len() as f64
}

/// Append one user's rating to an existing collection.
pub fn add_rating(
    existing: &[Rating],
    user_id: &UserId,
    grade: &Value,
) -> Result<RatingSummary, RatingError> {
    let grade = parse_grade(grade)?;

    if user_id.as_str().trim().is_empty() {
        return Err(RatingError::MissingUser);
    }

    if existing.iter().any(|r| &r.user_id == user_id) {
        return Err(RatingError::Duplicate(user_id.clone()));
    }

    let mut ratings = existing.to_vec();
    ratings.push(Rating {
        user_id: user_id.clone(),
        grade,
    });

    Ok(RatingSummary::from_ratings(ratings))
}

/// Build a whole rating collection from raw input, attributing entries without
/// a user id to `fallback_user`.
pub fn replace_ratings(
    raw: &RatingsInput,
    fallback_user: &UserId,
) -> Result<RatingSummary, RatingError> {
    let entries: Vec<(Option<&str>, &Value)> = match raw {
        RatingsInput::Single(grade) => vec![(None, grade)],
        RatingsInput::Many(items) => items
            .iter()
            .map(|r| (r.user_id.as_deref(), &r.grade))
            .collect(),
    };

    let mut seen = HashSet::new();
    let mut ratings = Vec::with_capacity(entries.len());

    for (user, grade) in entries {
        let user_id = match user.map(str::trim) {
            Some(u) if !u.is_empty() => UserId::new(u),
            _ => fallback_user.clone(),
        };
        let grade = parse_grade(grade)?;

        if !seen.insert(user_id.clone()) {
            return Err(RatingError::Duplicate(user_id));
        }
        ratings.push(Rating { user_id, grade });
    }

    Ok(RatingSummary::from_ratings(ratings))
}
