use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::gallery::ADMIN_ROLE;

mod listing;
mod types;

pub mod collection;
pub mod photo;
pub mod user;

const SCHEMA: &[(&str, &str)] = &[
    ("users", r#"
        CREATE TABLE IF NOT EXISTS users (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            email           TEXT NOT NULL,
            name            TEXT,
            role            TEXT NOT NULL,
            token           TEXT,
            creation_date   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            lastlog         TEXT
        )"#),
    ("photos", r#"
        CREATE TABLE IF NOT EXISTS photos (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            filename        TEXT NOT NULL,
            mimetype        TEXT NOT NULL,
            size            INTEGER NOT NULL,
            creation_date   TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            author_id       INTEGER NOT NULL REFERENCES users(id),
            caption         TEXT NOT NULL DEFAULT '',
            image           BLOB NOT NULL,
            thumbnail       BLOB NOT NULL,
            big_thumbnail   BLOB NOT NULL
        )"#),
    ("albums", r#"
        CREATE TABLE IF NOT EXISTS albums (
            name            TEXT PRIMARY KEY NOT NULL,
            cover_image_id  INTEGER REFERENCES photos(id) ON DELETE SET NULL
        )"#),
    ("photo_albums", r#"
        CREATE TABLE IF NOT EXISTS photo_albums (
            photo_id        INTEGER NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
            album_name      TEXT NOT NULL REFERENCES albums(name) ON DELETE CASCADE ON UPDATE CASCADE,
            UNIQUE (photo_id, album_name)
        )"#),
    ("tags", r#"
        CREATE TABLE IF NOT EXISTS tags (
            name            TEXT PRIMARY KEY NOT NULL,
            cover_image_id  INTEGER REFERENCES photos(id) ON DELETE SET NULL
        )"#),
    ("photo_tags", r#"
        CREATE TABLE IF NOT EXISTS photo_tags (
            photo_id        INTEGER NOT NULL REFERENCES photos(id) ON DELETE CASCADE,
            tag_name        TEXT NOT NULL REFERENCES tags(name) ON DELETE CASCADE ON UPDATE CASCADE,
            UNIQUE (photo_id, tag_name)
        )"#),
];

/// Opens a connection pool to the sqlite database at the given url,
/// creating the database file if needed.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)
        .with_context(|| format!("parse database url {:?}", url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(10))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Creates all tables that do not yet exist.
pub async fn create_schema(db: &SqlitePool) -> Result<()> {
    let mut tx = db.begin().await?;

    for (table, statement) in SCHEMA {
        debug!("Create table {} if missing", table);
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("create table {}", table))?;
    }

    tx.commit().await?;

    Ok(())
}

/// Makes sure every listed email has an Admin account.
pub async fn seed_admins(db: &SqlitePool, emails: &[String]) -> Result<()> {
    let mut tx = db.begin().await?;

    for email in emails {
        let created = sqlx::query("INSERT INTO users (email, role, creation_date) SELECT ?, ?, ? WHERE NOT EXISTS (SELECT 1 FROM users WHERE email = ?)")
            .bind(email)
            .bind(ADMIN_ROLE)
            .bind(Utc::now())
            .bind(email)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if created > 0 {
            info!("Created default admin {:?}", email);
        }
    }

    tx.commit().await?;

    Ok(())
}
