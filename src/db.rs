use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Build, Rocket};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::migrate::Migrator;
use std::path::Path;
use std::str::FromStr;
use log::{error, info};
use crate::store::{KeyValueStore, Repository, StaleVersion, Versioned};
use crate::util::sqlx_to_anyhow;

static MIGRATOR: Migrator = sqlx::migrate!("db/migrations");

const MEMORY_DATABASE_URL: &str = "sqlite::memory:";

/// Collections stored as rows of the `collections` table, one JSON array per key.
/// Id counters live in the same table under `<collection>.next_id`.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[rocket::async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<Versioned>> {
        let row: Option<(String, i64)> = sqlx::query_as("SELECT data, version FROM collections WHERE key=?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await.map_err(sqlx_to_anyhow)?;
        Ok(row.map(|(data, version)| Versioned { data, version }))
    }

    async fn put(&self, key: &str, data: String, expected_version: i64) -> anyhow::Result<i64> {
        let res = if expected_version == 0 {
            sqlx::query("INSERT OR IGNORE INTO collections (key, data, version) VALUES (?, ?, 1)")
                .bind(key)
                .bind(data)
                .execute(&self.pool)
                .await.map_err(sqlx_to_anyhow)?
        } else {
            sqlx::query("UPDATE collections SET data=?, version=version+1 WHERE key=? AND version=?")
                .bind(data)
                .bind(key)
                .bind(expected_version)
                .execute(&self.pool)
                .await.map_err(sqlx_to_anyhow)?
        };
        if res.rows_affected() < 1 {
            return Err(StaleVersion { key: key.to_string(), expected: expected_version }.into());
        }
        Ok(expected_version + 1)
    }
}

pub struct StoreFairing();
#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "SQLite Collection Store with Migrations",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, rocket: Rocket<Build>) -> rocket::fairing::Result {
        let database_url = if cfg!(test) {
            MEMORY_DATABASE_URL.to_string()
        } else {
            let figment = rocket.figment();
            let Ok(database_url) = figment.extract_inner::<String>("database_url") else {
                error!("Configuration key 'database_url' is missing");
                return Err(rocket);
            };
            if let Some(db_path) = database_url.strip_prefix("sqlite://") {
                if !Path::new(db_path).exists() {
                    info!("Creating database: {database_url}");
                    if let Err(e) = std::fs::File::create(db_path) {
                        error!("Failed to create SQLite database file {db_path}: {e}");
                        return Err(rocket);
                    }
                }
            }
            database_url
        };

        info!("Opening database: {database_url}");
        let opts = match SqliteConnectOptions::from_str(&database_url) {
            Ok(opts) => opts.journal_mode(SqliteJournalMode::Wal),
            Err(err) => {
                error!("Invalid database url {database_url}: {err}");
                return Err(rocket);
            }
        };
        // every connection to an in-memory database sees its own empty database
        let pool_opts = if database_url == MEMORY_DATABASE_URL {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = match pool_opts.connect_with(opts).await {
            Ok(pool) => pool,
            Err(err) => {
                error!("Database connection error: {:?}", err);
                return Err(rocket);
            }
        };

        match MIGRATOR.run(&pool).await {
            Ok(_) => info!("Migrations applied successfully!"),
            Err(err) => {
                error!("Migration error: {:?}", err);
                return Err(rocket);
            }
        };

        Ok(rocket.manage(Repository::new(SqliteStore::new(pool))))
    }
}
