//! Boundary normalization for book payloads.
//!
//! Clients send the book either as a JSON-encoded string (multipart `book`
//! field), as a nested object, or as flat top-level fields. Every shape ends up
//! as one [`BookPayload`] before the catalog sees it.

use serde_json::{Map, Value};

use crate::error::{AppError, AppResult};
use crate::rating::RatingsInput;

/// The `book` value as it arrived.
#[derive(Debug, Clone, PartialEq)]
pub enum BookField {
    /// A JSON document carried in a string
    Encoded(String),
    /// An already-structured JSON value
    Object(Value),
}

/// Normalized book fields. Absent and empty values are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BookPayload {
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<i64>,
    pub genre: Option<String>,
    pub ratings: Option<RatingsInput>,
}

/// The fields every new book must carry.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBookFields {
    pub title: String,
    pub author: String,
    pub year: i64,
    pub genre: String,
}

impl BookField {
    pub fn into_value(self) -> AppResult<Value> {
        match self {
            Self::Encoded(raw) => serde_json::from_str(&raw)
                .map_err(|e| AppError::validation(format!("book must be valid JSON: {}", e))),
            Self::Object(value) => Ok(value),
        }
    }
}

impl BookPayload {
    pub fn from_field(field: BookField) -> AppResult<Self> {
        Self::from_value(&field.into_value()?)
    }

    /// Read a payload from a JSON object. A nested `book` member wins over
    /// top-level fields.
    pub fn from_value(value: &Value) -> AppResult<Self> {
        let Value::Object(fields) = value else {
            return Err(AppError::validation("book must be a JSON object"));
        };

        match fields.get("book") {
            Some(Value::String(raw)) => Self::from_field(BookField::Encoded(raw.clone())),
            Some(nested @ Value::Object(_)) => Self::from_value(nested),
            _ => Self::from_map(fields),
        }
    }

    /// Build a payload from flat multipart text fields. A `ratings` field is
    /// read as JSON when it parses, so both `4` and `[{"grade":4}]` work.
    pub fn from_text_fields<'a>(
        fields: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> AppResult<Self> {
        let map: Map<String, Value> = fields
            .into_iter()
            .map(|(name, text)| {
                let value = if name == "ratings" {
                    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
                } else {
                    Value::String(text.to_string())
                };
                (name.to_string(), value)
            })
            .collect();
        Self::from_map(&map)
    }

    fn from_map(fields: &Map<String, Value>) -> AppResult<Self> {
        let ratings = match fields.get("ratings") {
            Some(value) => RatingsInput::from_value(value)?,
            None => None,
        };

        Ok(Self {
            title: text_field(fields, "title")?,
            author: text_field(fields, "author")?,
            year: year_field(fields)?,
            genre: text_field(fields, "genre")?,
            ratings,
        })
    }

    /// Names of required fields that are absent.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.title.is_none() {
            missing.push("title");
        }
        if self.author.is_none() {
            missing.push("author");
        }
        if self.year.is_none() {
            missing.push("year");
        }
        if self.genre.is_none() {
            missing.push("genre");
        }
        missing
    }

    /// Required fields for creation, or a validation error naming the gaps.
    pub fn require_complete(&self) -> AppResult<NewBookFields> {
        match (&self.title, &self.author, self.year, &self.genre) {
            (Some(title), Some(author), Some(year), Some(genre)) => Ok(NewBookFields {
                title: title.clone(),
                author: author.clone(),
                year,
                genre: genre.clone(),
            }),
            _ => Err(missing_fields_error(&self.missing_fields())),
        }
    }
}

pub fn missing_fields_error(fields: &[&str]) -> AppError {
    AppError::validation(format!("missing required fields: {}", fields.join(", ")))
}

fn text_field(fields: &Map<String, Value>, name: &str) -> AppResult<Option<String>> {
    match fields.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(AppError::validation(format!("{} must be a string", name))),
    }
}

/// Any whole number is a year, zero included; only absent or blank is missing.
fn year_field(fields: &Map<String, Value>) -> AppResult<Option<i64>> {
    let invalid = || AppError::validation("year must be a whole number");

    match fields.get("year") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => match (n.as_i64(), n.as_f64()) {
            (Some(year), _) => Ok(Some(year)),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                Ok(Some(f as i64))
            }
            _ => Err(invalid()),
        },
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s.trim().parse::<i64>().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}
