//! Book catalog.
//!
//! Orchestrates book reads and writes on top of the rating functions, the
//! image store and the `book` table:
//!
//! - creation validates the payload before any image is stored
//! - rating and update writes are compare-and-swap on `book.version`
//! - update and delete are limited to the book's owner
//! - a failed image release is logged and never undoes a decided write

mod payload;

pub use payload::{BookField, BookPayload, NewBookFields, missing_fields_error};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::auth::UserContext;
use crate::db::schema::{BookChanges, BookCreate, BookRecord};
use crate::db::{Db, QueryBuilder};
use crate::error::{AppError, AppResult};
use crate::images::{ImageStore, ImageUpload, filename_from_url, image_url};
use crate::rating::{self, Rating, RatingSummary};
use crate::types::{BookId, UserId};

/// Number of books returned by [`BookCatalog::top_rated`] on the HTTP surface.
pub const BEST_RATING_LIMIT: usize = 3;

/// Read-compute-write attempts on a contended book before giving up.
const MAX_WRITE_ATTEMPTS: u32 = 10;

/// Pause after a lost write, multiplied by the attempt number.
const WRITE_BACKOFF: Duration = Duration::from_millis(5);

/// Wire representation of a book.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    pub image_url: String,
    pub year: i64,
    pub genre: String,
    pub ratings: Vec<Rating>,
    pub average_rating: f64,
    pub owner_id: UserId,
}

impl From<BookRecord> for Book {
    fn from(record: BookRecord) -> Self {
        Self {
            id: record.key,
            title: record.title,
            author: record.author,
            image_url: record.image_url,
            year: record.year,
            genre: record.genre,
            ratings: record.ratings,
            average_rating: record.average_rating,
            owner_id: record.owner_id,
        }
    }
}

pub struct BookCatalog {
    db: Db,
    images: Arc<dyn ImageStore>,
}

impl BookCatalog {
    pub fn new(db: Db, images: Arc<dyn ImageStore>) -> Self {
        Self { db, images }
    }

    /// Create a book owned by `owner`.
    ///
    /// `base_url` is the public origin used to build the cover URL.
    pub async fn create(
        &self,
        owner: &UserContext,
        payload: &BookPayload,
        image: Option<ImageUpload>,
        base_url: &str,
    ) -> AppResult<Book> {
        let (fields, image) = match (payload.require_complete(), image) {
            (Ok(fields), Some(image)) => (fields, image),
            (_, image) => {
                let mut missing = payload.missing_fields();
                if image.is_none() {
                    missing.push("image");
                }
                return Err(missing_fields_error(&missing));
            }
        };

        let summary = match &payload.ratings {
            Some(raw) => rating::replace_ratings(raw, owner.user_id())?,
            None => RatingSummary::default(),
        };

        let filename = self.images.store(image).await?;

        let create = BookCreate {
            key: BookId::generate(),
            title: fields.title,
            author: fields.author,
            image_url: image_url(base_url, &filename),
            year: fields.year,
            genre: fields.genre,
            ratings: summary.ratings,
            average_rating: summary.average_rating,
            owner_id: owner.user_id().clone(),
        };

        match QueryBuilder::create_book(&self.db, &create).await {
            Ok(record) => {
                info!(book_id = %record.key, owner_id = %record.owner_id, "book created");
                Ok(record.into())
            }
            Err(e) => {
                self.release_quietly(&filename).await;
                Err(e.into())
            }
        }
    }

    /// Add the caller's rating to a book.
    ///
    /// `claimed_user` is the `userId` the client put in the body, if any. It
    /// must match the caller.
    pub async fn add_rating(
        &self,
        id: &BookId,
        caller: &UserContext,
        claimed_user: Option<&str>,
        grade: &Value,
    ) -> AppResult<Book> {
        let claimed = claimed_user.map(str::trim).filter(|u| !u.is_empty());
        if claimed.is_some_and(|u| u != caller.user_id().as_str()) {
            return Err(AppError::Forbidden(
                "cannot rate a book on behalf of another user".to_string(),
            ));
        }

        // Range check before touching the store.
        rating::parse_grade(grade)?;

        let (_, updated) = self
            .write_with_retry(id, |book| {
                let summary = rating::add_rating(&book.ratings, caller.user_id(), grade)?;
                Ok(BookChanges {
                    ratings: Some(summary.ratings),
                    average_rating: Some(summary.average_rating),
                    ..Default::default()
                })
            })
            .await?;

        info!(
            book_id = %id,
            user_id = %caller.user_id(),
            average_rating = updated.average_rating,
            "rating added"
        );
        Ok(updated.into())
    }

    /// Apply a partial update. Only the owner may update a book.
    ///
    /// Absent fields keep their value. Ratings are replaced only when the
    /// payload carries a list. A new image replaces the cover and the old file
    /// is released once the write has landed.
    pub async fn update(
        &self,
        id: &BookId,
        caller: &UserContext,
        payload: &BookPayload,
        image: Option<ImageUpload>,
        base_url: &str,
    ) -> AppResult<Book> {
        let current = self.find_record(id).await?;
        ensure_owner(&current, caller)?;

        let replacement = match &payload.ratings {
            Some(raw) if raw.is_many() => Some(rating::replace_ratings(raw, caller.user_id())?),
            _ => None,
        };

        let new_filename = match image {
            Some(upload) => Some(self.images.store(upload).await?),
            None => None,
        };
        let new_url = new_filename.as_deref().map(|f| image_url(base_url, f));

        let result = self
            .write_with_retry(id, |book| {
                ensure_owner(book, caller)?;
                let summary = replacement.clone().unwrap_or_else(|| RatingSummary {
                    average_rating: rating::average(&book.ratings),
                    ratings: book.ratings.clone(),
                });
                Ok(BookChanges {
                    title: payload.title.clone(),
                    author: payload.author.clone(),
                    image_url: new_url.clone(),
                    year: payload.year,
                    genre: payload.genre.clone(),
                    ratings: Some(summary.ratings),
                    average_rating: Some(summary.average_rating),
                })
            })
            .await;

        let (before, after) = match result {
            Ok(pair) => pair,
            Err(e) => {
                if let Some(filename) = &new_filename {
                    self.release_quietly(filename).await;
                }
                return Err(e);
            }
        };

        if let Some(new_filename) = &new_filename {
            match filename_from_url(&before.image_url) {
                Some(old) if &old != new_filename => self.release_quietly(&old).await,
                Some(_) => {}
                None => warn!(book_id = %id, url = %before.image_url, "previous cover has no stored file"),
            }
        }

        info!(book_id = %id, user_id = %caller.user_id(), "book updated");
        Ok(after.into())
    }

    /// Delete a book and release its cover. Only the owner may delete a book.
    pub async fn remove(&self, id: &BookId, caller: &UserContext) -> AppResult<()> {
        let book = self.find_record(id).await?;
        ensure_owner(&book, caller)?;

        match filename_from_url(&book.image_url) {
            Some(filename) => self.release_quietly(&filename).await,
            None => warn!(book_id = %id, url = %book.image_url, "book cover has no stored file"),
        }

        QueryBuilder::delete_book(&self.db, id).await?;
        info!(book_id = %id, user_id = %caller.user_id(), "book deleted");
        Ok(())
    }

    /// All books in creation order.
    pub async fn list(&self) -> AppResult<Vec<Book>> {
        let books = QueryBuilder::list_books(&self.db).await?;
        debug!(count = books.len(), "listed books");
        Ok(books.into_iter().map(Book::from).collect())
    }

    /// The `limit` best-rated books, highest average first. Equal averages
    /// keep creation order.
    pub async fn top_rated(&self, limit: usize) -> AppResult<Vec<Book>> {
        let books = QueryBuilder::list_top_rated(&self.db, limit).await?;
        Ok(books.into_iter().map(Book::from).collect())
    }

    pub async fn get(&self, id: &BookId) -> AppResult<Book> {
        Ok(self.find_record(id).await?.into())
    }

    async fn find_record(&self, id: &BookId) -> AppResult<BookRecord> {
        QueryBuilder::find_book(&self.db, id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("book {} not found", id)))
    }

    /// Read-compute-write loop guarded by the book's version.
    ///
    /// `apply` sees the freshly read book on every attempt. Returns the book as
    /// read and as written.
    async fn write_with_retry<F>(&self, id: &BookId, mut apply: F) -> AppResult<(BookRecord, BookRecord)>
    where
        F: FnMut(&BookRecord) -> AppResult<BookChanges> + Send,
    {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let current = self.find_record(id).await?;
            let changes = apply(&current)?;

            match QueryBuilder::update_book_if_version(&self.db, id, current.version, &changes).await? {
                Some(updated) => return Ok((current, updated)),
                None => {
                    debug!(book_id = %id, attempt, "book changed during write, retrying");
                    if attempt < MAX_WRITE_ATTEMPTS {
                        tokio::time::sleep(WRITE_BACKOFF * attempt).await;
                    }
                }
            }
        }

        warn!(book_id = %id, attempts = MAX_WRITE_ATTEMPTS, "giving up on contended book");
        Err(AppError::Conflict("book was modified concurrently".to_string()))
    }

    async fn release_quietly(&self, filename: &str) {
        if let Err(e) = self.images.release(filename).await {
            warn!(%filename, error = %e, "failed to release cover image");
        }
    }
}

fn ensure_owner(book: &BookRecord, caller: &UserContext) -> AppResult<()> {
    if caller.is(&book.owner_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "only the owner can modify this book".to_string(),
        ))
    }
}
