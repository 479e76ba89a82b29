use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;
use grimoire::{AppConfig, AppState, DatabaseConfig};

#[derive(Parser)]
#[command(name = "grimoire")]
#[command(about = "Book rating catalog API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Server {
        /// Bind address, e.g. 0.0.0.0:4000
        #[arg(long, env = "GRIMOIRE_BIND", default_value = grimoire::config::DEFAULT_BIND)]
        bind: String,
        #[arg(long, env = "GRIMOIRE_DB_URL", default_value = "memory")]
        db_url: String,
        /// Directory where cover images are stored and served from
        #[arg(long, env = "GRIMOIRE_IMAGES_DIR", default_value = grimoire::config::DEFAULT_IMAGES_DIR)]
        images_dir: PathBuf,
        /// Public origin for image URLs (defaults to the request's host)
        #[arg(long, env = "GRIMOIRE_PUBLIC_URL")]
        public_url: Option<String>,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "GRIMOIRE_DB_URL", default_value = "memory")]
        db_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("grimoire=info".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server {
            bind,
            db_url,
            images_dir,
            public_url,
        } => {
            info!("Starting catalog server on {}", bind);

            let config = AppConfig {
                bind,
                images_dir,
                public_base_url: public_url.filter(|url| !url.trim().is_empty()),
                ..Default::default()
            };
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };

            let state = AppState::init(config, db_config).await?;
            grimoire::serve(state).await?;
        }
        Commands::Init { db_url } => {
            let db_config = DatabaseConfig {
                url: db_url,
                ..Default::default()
            };
            info!("Using database url for initialization: {}", db_config.url);

            info!("Initializing database...");
            let db = grimoire::create_connection(db_config).await?;
            grimoire::ensure_schema(&db).await?;
            info!("Database initialized successfully");
        }
    }

    Ok(())
}
