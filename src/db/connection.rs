use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use surrealdb::Surreal;
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;

pub type Db = Surreal<Any>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub namespace: String,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: env::var("GRIMOIRE_DB_URL").unwrap_or_else(|_| "memory".to_string()),
            namespace: env::var("GRIMOIRE_DB_NAMESPACE")
                .unwrap_or_else(|_| "grimoire".to_string()),
            database: env::var("GRIMOIRE_DB_DATABASE").unwrap_or_else(|_| "catalog".to_string()),
            username: env::var("GRIMOIRE_DB_USERNAME").ok(),
            password: env::var("GRIMOIRE_DB_PASSWORD").ok(),
        }
    }
}

impl DatabaseConfig {
    /// In-process, non-persistent database. Used by tests and local runs.
    pub fn memory() -> Self {
        Self {
            url: "memory".to_string(),
            namespace: "grimoire".to_string(),
            database: "catalog".to_string(),
            username: None,
            password: None,
        }
    }
}

pub async fn create_connection(config: DatabaseConfig) -> Result<Db> {
    let db = surrealdb::engine::any::connect(config.url).await?;

    // Sign in if credentials are provided
    if let (Some(username), Some(password)) = (config.username, config.password) {
        db.signin(Root {
            username: &username,
            password: &password,
        })
        .await?;
    }

    db.use_ns(config.namespace).use_db(config.database).await?;

    Ok(db)
}

pub async fn ensure_schema(db: &Db) -> Result<()> {
    let schema_queries = [
        // Identity store. The unique email index is what rejects a raced
        // duplicate signup.
        "DEFINE TABLE IF NOT EXISTS user SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS key ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS email ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS password_hash ON TABLE user TYPE string;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE user TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS user_email ON TABLE user COLUMNS email UNIQUE;
         DEFINE INDEX IF NOT EXISTS user_key ON TABLE user COLUMNS key UNIQUE;",

        // Book catalog
        "DEFINE TABLE IF NOT EXISTS book SCHEMALESS;
         DEFINE FIELD IF NOT EXISTS key ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS title ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS author ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS image_url ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS year ON TABLE book TYPE int;
         DEFINE FIELD IF NOT EXISTS genre ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS ratings ON TABLE book TYPE array DEFAULT [];
         DEFINE FIELD IF NOT EXISTS average_rating ON TABLE book TYPE float DEFAULT 0.0;
         DEFINE FIELD IF NOT EXISTS owner_id ON TABLE book TYPE string;
         DEFINE FIELD IF NOT EXISTS version ON TABLE book TYPE int DEFAULT 0;
         DEFINE FIELD IF NOT EXISTS created_at ON TABLE book TYPE datetime DEFAULT time::now();
         DEFINE INDEX IF NOT EXISTS book_key ON TABLE book COLUMNS key UNIQUE;
         DEFINE INDEX IF NOT EXISTS book_average_rating ON TABLE book COLUMNS average_rating;",
    ];

    for query in schema_queries {
        db.query(query).await?.check()?;
    }

    Ok(())
}
