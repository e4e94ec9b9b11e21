use std::ops::DerefMut;

use anyhow::Result;
use sqlx::{FromRow, Sqlite, Transaction};

use crate::gallery::{Album, AlbumUpdate, PhotoId};

/// The two ways of grouping photos. Albums replaced tags, but both are still
/// stored and share the same structure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Collection {
    Albums,
    Tags,
}

impl Collection {
    fn table(&self) -> &'static str {
        match self {
            Collection::Albums => "albums",
            Collection::Tags => "tags",
        }
    }

    fn members(&self) -> &'static str {
        match self {
            Collection::Albums => "photo_albums",
            Collection::Tags => "photo_tags",
        }
    }

    fn member_column(&self) -> &'static str {
        match self {
            Collection::Albums => "album_name",
            Collection::Tags => "tag_name",
        }
    }

    fn select(&self) -> String {
        format!(
            "SELECT c.name, c.cover_image_id, COUNT(m.photo_id) AS image_count \
             FROM {table} AS c LEFT JOIN {members} AS m ON m.{column} = c.name",
            table = self.table(),
            members = self.members(),
            column = self.member_column(),
        )
    }
}

#[derive(FromRow)]
struct CollectionRow {
    name: String,
    cover_image_id: Option<PhotoId>,
    image_count: i64,
}

impl From<CollectionRow> for Album {
    fn from(row: CollectionRow) -> Self {
        Self {
            name: row.name,
            cover_image_id: row.cover_image_id,
            image_count: u32::try_from(row.image_count).unwrap_or(u32::MAX),
        }
    }
}

pub async fn list(tx: &mut Transaction<'_, Sqlite>, collection: Collection) -> Result<Vec<Album>> {
    let sql = format!("{} GROUP BY c.name ORDER BY c.name", collection.select());

    let rows: Vec<CollectionRow> = sqlx::query_as(&sql)
        .fetch_all(tx.deref_mut())
        .await?;

    Ok(rows.into_iter().map(Album::from).collect())
}

pub async fn read(tx: &mut Transaction<'_, Sqlite>, collection: Collection, name: &str) -> Result<Option<Album>> {
    let sql = format!("{} WHERE c.name = ? GROUP BY c.name", collection.select());

    let row: Option<CollectionRow> = sqlx::query_as(&sql)
        .bind(name)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(Album::from))
}

pub async fn insert(tx: &mut Transaction<'_, Sqlite>, collection: Collection, name: &str) -> Result<Album> {
    let sql = format!(
        "INSERT INTO {} (name) VALUES (?) RETURNING name, cover_image_id, 0 AS image_count",
        collection.table(),
    );

    let row: CollectionRow = sqlx::query_as(&sql)
        .bind(name)
        .fetch_one(tx.deref_mut())
        .await?;

    Ok(row.into())
}

/// Renames an entry and sets its cover image. Memberships follow the rename.
/// Returns the new name, or `None` if there is no entry called `name`.
pub async fn update(tx: &mut Transaction<'_, Sqlite>, collection: Collection, name: &str, update: &AlbumUpdate) -> Result<Option<String>> {
    let sql = format!(
        "UPDATE {} SET name = ?, cover_image_id = ? WHERE name = ? RETURNING name",
        collection.table(),
    );

    let name = sqlx::query_scalar(&sql)
        .bind(&update.name)
        .bind(update.cover_image_id)
        .bind(name)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(name)
}
