// Database query helpers for SurrealDB.
//
// Every catalog write goes through here. Book mutations are guarded by the
// `version` field so concurrent read-modify-write cycles cannot silently
// overwrite each other.

use crate::db::schema::*;
use crate::types::{BookId, Email};
use anyhow::{Result, anyhow};
use surrealdb::error::Db as DbError;
use surrealdb::{Surreal, engine::any::Any};

pub struct QueryBuilder;

/// Whether a SurrealDB error was raised by a UNIQUE index.
pub fn is_unique_violation(err: &surrealdb::Error) -> bool {
    matches!(err, surrealdb::Error::Db(DbError::IndexExists { .. }))
}

/// Whether the storage engine aborted a transaction because a concurrent
/// transaction committed first. The statement had no effect.
pub fn is_retryable_conflict(err: &surrealdb::Error) -> bool {
    matches!(err, surrealdb::Error::Db(DbError::TxRetryable))
}

impl QueryBuilder {
    /// Insert a user. Returns `None` when the email is already taken.
    pub async fn create_user(db: &Surreal<Any>, data: &UserCreate) -> Result<Option<UserRecord>> {
        let mut res = db
            .query("CREATE $id CONTENT $content")
            .bind(("id", UserRecord::record_id(&data.key)))
            .bind(("content", data.clone()))
            .await?;

        match res.take::<Option<UserRecord>>(0) {
            Ok(Some(user)) => Ok(Some(user)),
            Ok(None) => Err(anyhow!("failed to create user record")),
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn find_user_by_email(db: &Surreal<Any>, email: &Email) -> Result<Option<UserRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM user
                WHERE email = $email
                LIMIT 1
                "#,
            )
            .bind(("email", email.clone()))
            .await?;

        let users: Vec<UserRecord> = res.take(0)?;
        Ok(users.into_iter().next())
    }

    pub async fn create_book(db: &Surreal<Any>, data: &BookCreate) -> Result<BookRecord> {
        let mut res = db
            .query("CREATE $id CONTENT $content")
            .bind(("id", BookRecord::record_id(&data.key)))
            .bind(("content", data.clone()))
            .await?;

        let created: Option<BookRecord> = res.take(0)?;
        created.ok_or_else(|| anyhow!("failed to create book record"))
    }

    pub async fn find_book(db: &Surreal<Any>, key: &BookId) -> Result<Option<BookRecord>> {
        let mut res = db
            .query("SELECT * FROM $id")
            .bind(("id", BookRecord::record_id(key)))
            .await?;

        let books: Vec<BookRecord> = res.take(0)?;
        Ok(books.into_iter().next())
    }

    /// All books in creation order.
    pub async fn list_books(db: &Surreal<Any>) -> Result<Vec<BookRecord>> {
        let mut res = db
            .query("SELECT * FROM book ORDER BY created_at ASC, key ASC")
            .await?;

        let books: Vec<BookRecord> = res.take(0)?;
        Ok(books)
    }

    /// Highest average first; equal averages keep creation order.
    pub async fn list_top_rated(db: &Surreal<Any>, limit: usize) -> Result<Vec<BookRecord>> {
        let mut res = db
            .query(
                r#"
                SELECT * FROM book
                ORDER BY average_rating DESC, created_at ASC, key ASC
                LIMIT $limit
                "#,
            )
            .bind(("limit", limit as i64))
            .await?;

        let books: Vec<BookRecord> = res.take(0)?;
        Ok(books)
    }

    /// Merge `changes` into a book only if its version is still
    /// `expected_version`, bumping the version on success.
    ///
    /// Returns `None` when the book changed (or vanished) in the meantime,
    /// including when the engine aborted the write for a concurrent commit.
    pub async fn update_book_if_version(
        db: &Surreal<Any>,
        key: &BookId,
        expected_version: i64,
        changes: &BookChanges,
    ) -> Result<Option<BookRecord>> {
        let mut merge = serde_json::to_value(changes)?;
        if let Some(fields) = merge.as_object_mut() {
            fields.insert("version".to_string(), (expected_version + 1).into());
        }

        let res = db
            .query(
                r#"
                UPDATE $id MERGE $changes
                WHERE version = $version
                RETURN AFTER
                "#,
            )
            .bind(("id", BookRecord::record_id(key)))
            .bind(("changes", merge))
            .bind(("version", expected_version))
            .await;

        let updated = res.and_then(|mut res| res.take::<Vec<BookRecord>>(0));
        match updated {
            Ok(updated) => Ok(updated.into_iter().next()),
            Err(e) if is_retryable_conflict(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn delete_book(db: &Surreal<Any>, key: &BookId) -> Result<()> {
        db.query("DELETE $id")
            .bind(("id", BookRecord::record_id(key)))
            .await?
            .check()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DatabaseConfig, Db, create_connection, ensure_schema};
    use crate::rating::Rating;
    use crate::types::UserId;

    async fn setup_test_db() -> Db {
        let db = create_connection(DatabaseConfig::memory()).await.unwrap();
        ensure_schema(&db).await.unwrap();
        db
    }

    fn sample_book(title: &str, average_rating: f64) -> BookCreate {
        BookCreate {
            key: BookId::generate(),
            title: title.to_string(),
            author: "Author".to_string(),
            image_url: format!("http://localhost/images/{}.webp", title),
            year: 2000,
            genre: "Fiction".to_string(),
            ratings: Vec::new(),
            average_rating,
            owner_id: UserId::new("owner"),
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let db = setup_test_db().await;
        let create = UserCreate {
            key: UserId::generate(),
            email: Email::normalize("a@example.com"),
            password_hash: "hash".to_string(),
        };
        let first = QueryBuilder::create_user(&db, &create).await.unwrap();
        assert!(first.is_some());

        let again = UserCreate {
            key: UserId::generate(),
            ..create
        };
        let second = QueryBuilder::create_user(&db, &again).await.unwrap();
        assert!(second.is_none());

        let found = QueryBuilder::find_user_by_email(&db, &Email::normalize("A@example.com"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.key, first.unwrap().key);
    }

    #[tokio::test]
    async fn test_create_and_find_book() {
        let db = setup_test_db().await;
        let create = sample_book("Dune", 0.0);
        let created = QueryBuilder::create_book(&db, &create).await.unwrap();

        assert_eq!(created.key, create.key);
        assert_eq!(created.version, 0);
        assert!(created.created_at.is_some());

        let found = QueryBuilder::find_book(&db, &create.key).await.unwrap().unwrap();
        assert_eq!(found.title, "Dune");

        let missing = QueryBuilder::find_book(&db, &BookId::new("nope")).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_top_rated_orders_by_average() {
        let db = setup_test_db().await;
        for (title, avg) in [("one", 1.0), ("five", 5.0), ("three", 3.0), ("two", 2.0), ("four", 4.0)] {
            QueryBuilder::create_book(&db, &sample_book(title, avg)).await.unwrap();
        }

        let top = QueryBuilder::list_top_rated(&db, 3).await.unwrap();
        let titles: Vec<_> = top.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["five", "four", "three"]);

        let all = QueryBuilder::list_books(&db).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn test_list_top_rated_breaks_ties_by_creation() {
        let db = setup_test_db().await;
        for (title, avg) in [("first", 4.0), ("best", 5.0), ("second", 4.0), ("low", 1.0), ("third", 4.0)] {
            QueryBuilder::create_book(&db, &sample_book(title, avg)).await.unwrap();
        }

        let top = QueryBuilder::list_top_rated(&db, 4).await.unwrap();
        let titles: Vec<_> = top.iter().map(|b| b.title.as_str()).collect();
        assert_eq!(titles, vec!["best", "first", "second", "third"]);
    }

    #[tokio::test]
    async fn test_duplicate_email_error_is_classified() {
        let db = setup_test_db().await;
        let query = "CREATE user CONTENT { key: $key, email: 'dup@example.com', password_hash: 'h' }";
        db.query(query)
            .bind(("key", "u1"))
            .await
            .unwrap()
            .check()
            .unwrap();

        let err = db
            .query(query)
            .bind(("key", "u2"))
            .await
            .unwrap()
            .check()
            .unwrap_err();
        assert!(is_unique_violation(&err));
        assert!(!is_retryable_conflict(&err));
    }

    #[tokio::test]
    async fn test_update_if_version_detects_stale_writes() {
        let db = setup_test_db().await;
        let create = sample_book("Dune", 0.0);
        QueryBuilder::create_book(&db, &create).await.unwrap();

        let changes = BookChanges {
            ratings: Some(vec![Rating {
                user_id: UserId::new("u1"),
                grade: 4.0,
            }]),
            average_rating: Some(4.0),
            ..Default::default()
        };

        let updated = QueryBuilder::update_book_if_version(&db, &create.key, 0, &changes)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.average_rating, 4.0);
        assert_eq!(updated.title, "Dune");

        // A writer that still holds version 0 loses.
        let stale = QueryBuilder::update_book_if_version(&db, &create.key, 0, &changes)
            .await
            .unwrap();
        assert!(stale.is_none());
    }

    #[tokio::test]
    async fn test_delete_book() {
        let db = setup_test_db().await;
        let create = sample_book("Dune", 0.0);
        QueryBuilder::create_book(&db, &create).await.unwrap();

        QueryBuilder::delete_book(&db, &create.key).await.unwrap();
        assert!(QueryBuilder::find_book(&db, &create.key).await.unwrap().is_none());
    }
}
