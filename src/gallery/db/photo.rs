use std::ops::DerefMut;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use sqlx::{Sqlite, Transaction};

use crate::gallery::db::listing::{AlbumJoin, Listing};
use crate::gallery::filter::ItemFilter;
use crate::gallery::{ImageKind, NewPhoto, Photo, PhotoData, PhotoId, PhotoUpdate, UserId};

// the albums of each photo are collected into a json array, sorted by name
const SELECT_PHOTOS: &str = "\
    SELECT photos.id, photos.filename, photos.mimetype, photos.size, photos.creation_date, \
        photos.author_id, photos.caption, \
        (SELECT json_group_array(album_name) FROM \
            (SELECT album_name FROM photo_albums WHERE photo_albums.photo_id = photos.id ORDER BY album_name) \
        ) AS albums \
    FROM photos";

const PHOTOS: Listing = Listing {
    select: SELECT_PHOTOS,
    search: &[
        "photos.caption",
        "COALESCE((SELECT group_concat(album_name, ' ') FROM photo_albums WHERE photo_albums.photo_id = photos.id), '')",
    ],
    album: Some(AlbumJoin {
        join: "JOIN photo_albums AS member ON member.photo_id = photos.id",
        column: "member.album_name",
    }),
    order_by: "photos.creation_date DESC, photos.id DESC",
};

#[derive(sqlx::FromRow)]
struct PhotoRow {
    pub id: PhotoId,
    pub filename: String,
    pub mimetype: String,
    pub size: i64,
    pub creation_date: DateTime<Utc>,
    pub author_id: UserId,
    pub caption: String,
    pub albums: String,
}

impl TryFrom<PhotoRow> for Photo {
    type Error = anyhow::Error;

    fn try_from(row: PhotoRow) -> Result<Self> {
        let albums = serde_json::from_str(&row.albums)
            .with_context(|| format!("decode albums of photo {}: {:?}", row.id, row.albums))?;

        Ok(Photo {
            id: row.id,
            filename: row.filename,
            mimetype: row.mimetype,
            size: row.size,
            creation_date: row.creation_date,
            author_id: row.author_id,
            caption: row.caption,
            albums,
        })
    }
}

impl ImageKind {
    fn column(&self) -> &'static str {
        match self {
            ImageKind::Image => "image",
            ImageKind::Thumbnail => "thumbnail",
            ImageKind::BigThumbnail => "big_thumbnail",
        }
    }
}

pub async fn list_photos(tx: &mut Transaction<'_, Sqlite>, filter: &ItemFilter) -> Result<Vec<Photo>> {
    let mut query = PHOTOS.query(filter);
    let sql = query.sql().to_owned();

    let rows: Vec<PhotoRow> = query
        .build_query_as()
        .fetch_all(tx.deref_mut())
        .await
        .with_context(|| format!("list photos: {}", sql))?;

    rows.into_iter().map(Photo::try_from).collect()
}

pub async fn read_photo(tx: &mut Transaction<'_, Sqlite>, id: PhotoId) -> Result<Option<Photo>> {
    let row: Option<PhotoRow> = sqlx::query_as(&format!("{} WHERE photos.id = ?", SELECT_PHOTOS))
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    // get the single row if any
    let Some(row) = row else {
        return Ok(None);
    };

    Ok(Some(Photo::try_from(row)?))
}

/// Reads one of the binary payloads of a photo together with the photos mime type.
pub async fn read_photo_image(tx: &mut Transaction<'_, Sqlite>, id: PhotoId, kind: ImageKind) -> Result<Option<(String, Vec<u8>)>> {
    let sql = format!("SELECT mimetype, {} FROM photos WHERE id = ?", kind.column());

    let row: Option<(String, Vec<u8>)> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row)
}

/// Inserts a photo with its payloads and album memberships. Fails if any of the
/// albums does not exist, the caller must then drop the transaction.
pub async fn insert_photo(tx: &mut Transaction<'_, Sqlite>, photo: &NewPhoto, data: &PhotoData) -> Result<PhotoId> {
    let id: PhotoId = sqlx::query_scalar("INSERT INTO photos (filename, mimetype, size, creation_date, author_id, caption, image, thumbnail, big_thumbnail) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id")
        .bind(&photo.filename)
        .bind(&photo.mimetype)
        .bind(data.image.len() as i64)
        .bind(Utc::now())
        .bind(photo.author_id)
        .bind(&photo.caption)
        .bind(&data.image)
        .bind(&data.thumbnail)
        .bind(&data.big_thumbnail)
        .fetch_one(tx.deref_mut())
        .await?;

    insert_albums(tx, id, &photo.albums).await?;

    Ok(id)
}

/// Replaces caption and album memberships of a photo. Returns `None` if there is
/// no such photo.
pub async fn update_photo(tx: &mut Transaction<'_, Sqlite>, id: PhotoId, update: &PhotoUpdate) -> Result<Option<PhotoId>> {
    // writing first takes the write lock right away, a later upgrade from a
    // read lock fails with SQLITE_BUSY instead of waiting
    let id: Option<PhotoId> = sqlx::query_scalar("UPDATE photos SET caption = ? WHERE id = ? RETURNING id")
        .bind(&update.caption)
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    let Some(id) = id else {
        return Ok(None);
    };

    // rewriting all memberships is simpler than computing a diff
    sqlx::query("DELETE FROM photo_albums WHERE photo_id = ?")
        .bind(id)
        .execute(tx.deref_mut())
        .await?;

    insert_albums(tx, id, &update.albums).await?;

    Ok(Some(id))
}

async fn insert_albums(tx: &mut Transaction<'_, Sqlite>, id: PhotoId, albums: &[String]) -> Result<()> {
    // a photo is a member of each album at most once
    for album in albums.iter().unique() {
        sqlx::query("INSERT INTO photo_albums (photo_id, album_name) VALUES (?, ?)")
            .bind(id)
            .bind(album)
            .execute(tx.deref_mut())
            .await
            .with_context(|| format!("add photo {} to album {:?}", id, album))?;
    }

    Ok(())
}

pub async fn delete_photo(tx: &mut Transaction<'_, Sqlite>, id: PhotoId) -> Result<Option<PhotoId>> {
    let id = sqlx::query_scalar("DELETE FROM photos WHERE id = ? RETURNING id")
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(id)
}
