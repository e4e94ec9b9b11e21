use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::instrument;

use crate::gallery::db::collection::{self, Collection};
use crate::gallery::db::{photo, user};
use crate::gallery::filter::ItemFilter;
use crate::gallery::{Album, AlbumUpdate, ImageKind, NewPhoto, Photo, PhotoData, PhotoId, PhotoUpdate, Tag, User, UserId, UserUpdate};

/// Access to everything stored in the gallery database. Each operation runs in
/// its own transaction, writes are only committed if every statement succeeded.
#[derive(Clone)]
pub struct Store {
    db: SqlitePool,
}

impl Store {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    #[instrument(skip_all, fields(query = %filter.query, count = filter.count, skip = filter.skip))]
    pub async fn photos(&self, filter: &ItemFilter) -> Result<Vec<Photo>> {
        let mut tx = self.db.begin().await?;
        photo::list_photos(&mut tx, filter).await
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn photo(&self, id: PhotoId) -> Result<Option<Photo>> {
        let mut tx = self.db.begin().await?;
        photo::read_photo(&mut tx, id).await
    }

    /// The mime type and bytes of one of the payloads of a photo.
    #[instrument(skip_all, fields(%id, ?kind))]
    pub async fn photo_image(&self, id: PhotoId, kind: ImageKind) -> Result<Option<(String, Vec<u8>)>> {
        let mut tx = self.db.begin().await?;
        photo::read_photo_image(&mut tx, id, kind).await
    }

    #[instrument(skip_all, fields(filename = %new.filename, albums = ?new.albums))]
    pub async fn create_photo(&self, new: NewPhoto, data: PhotoData) -> Result<Photo> {
        let mut tx = self.db.begin().await?;

        let id = photo::insert_photo(&mut tx, &new, &data).await?;

        let photo = photo::read_photo(&mut tx, id)
            .await?
            .with_context(|| format!("photo {} vanished after insert", id))?;

        tx.commit().await?;

        Ok(photo)
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn update_photo(&self, id: PhotoId, update: PhotoUpdate) -> Result<Option<Photo>> {
        let mut tx = self.db.begin().await?;

        let Some(id) = photo::update_photo(&mut tx, id, &update).await? else {
            return Ok(None);
        };

        let photo = photo::read_photo(&mut tx, id).await?;

        tx.commit().await?;

        Ok(photo)
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn delete_photo(&self, id: PhotoId) -> Result<Option<PhotoId>> {
        let mut tx = self.db.begin().await?;
        let deleted = photo::delete_photo(&mut tx, id).await?;
        tx.commit().await?;

        Ok(deleted)
    }

    pub async fn albums(&self) -> Result<Vec<Album>> {
        self.list(Collection::Albums).await
    }

    pub async fn album(&self, name: &str) -> Result<Option<Album>> {
        self.read(Collection::Albums, name).await
    }

    pub async fn create_album(&self, name: &str) -> Result<Album> {
        self.create(Collection::Albums, name).await
    }

    pub async fn update_album(&self, name: &str, update: AlbumUpdate) -> Result<Option<Album>> {
        self.update(Collection::Albums, name, update).await
    }

    pub async fn tags(&self) -> Result<Vec<Tag>> {
        self.list(Collection::Tags).await
    }

    pub async fn tag(&self, name: &str) -> Result<Option<Tag>> {
        self.read(Collection::Tags, name).await
    }

    pub async fn create_tag(&self, name: &str) -> Result<Tag> {
        self.create(Collection::Tags, name).await
    }

    pub async fn update_tag(&self, name: &str, update: AlbumUpdate) -> Result<Option<Tag>> {
        self.update(Collection::Tags, name, update).await
    }

    #[instrument(skip(self))]
    async fn list(&self, collection: Collection) -> Result<Vec<Album>> {
        let mut tx = self.db.begin().await?;
        collection::list(&mut tx, collection).await
    }

    #[instrument(skip(self))]
    async fn read(&self, collection: Collection, name: &str) -> Result<Option<Album>> {
        let mut tx = self.db.begin().await?;
        collection::read(&mut tx, collection, name).await
    }

    #[instrument(skip(self))]
    async fn create(&self, collection: Collection, name: &str) -> Result<Album> {
        let mut tx = self.db.begin().await?;
        let album = collection::insert(&mut tx, collection, name).await?;
        tx.commit().await?;

        Ok(album)
    }

    #[instrument(skip(self, update), fields(new_name = %update.name))]
    async fn update(&self, collection: Collection, name: &str, update: AlbumUpdate) -> Result<Option<Album>> {
        let mut tx = self.db.begin().await?;

        let Some(name) = collection::update(&mut tx, collection, name, &update).await? else {
            return Ok(None);
        };

        // the image count is not part of the row, read it back
        let album = collection::read(&mut tx, collection, &name).await?;

        tx.commit().await?;

        Ok(album)
    }

    #[instrument(skip_all, fields(query = %filter.query, count = filter.count, skip = filter.skip))]
    pub async fn users(&self, filter: &ItemFilter) -> Result<Vec<User>> {
        let mut tx = self.db.begin().await?;
        user::list_users(&mut tx, filter).await
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn user(&self, id: UserId) -> Result<Option<User>> {
        let mut tx = self.db.begin().await?;
        user::read_user(&mut tx, id).await
    }

    #[instrument(skip_all)]
    pub async fn user_by_token(&self, token: &str) -> Result<Option<User>> {
        let mut tx = self.db.begin().await?;
        user::read_user_by_token(&mut tx, token).await
    }

    #[instrument(skip_all, fields(email = %user.email, role = %user.role))]
    pub async fn create_user(&self, user: UserUpdate) -> Result<User> {
        let mut tx = self.db.begin().await?;
        let user = user::insert_user(&mut tx, &user).await?;
        tx.commit().await?;

        Ok(user)
    }

    #[instrument(skip_all, fields(%id, email = %user.email, role = %user.role))]
    pub async fn update_user(&self, id: UserId, user: UserUpdate) -> Result<Option<User>> {
        let mut tx = self.db.begin().await?;
        let user = user::update_user(&mut tx, id, &user).await?;
        tx.commit().await?;

        Ok(user)
    }

    #[instrument(skip_all, fields(%id))]
    pub async fn delete_user(&self, id: UserId) -> Result<Option<UserId>> {
        let mut tx = self.db.begin().await?;
        let deleted = user::delete_user(&mut tx, id).await?;
        tx.commit().await?;

        Ok(deleted)
    }

    /// Stores a new session token for the user with the given email. Returns
    /// `None` if there is no account for that email.
    #[instrument(skip(self, token))]
    pub async fn login(&self, email: &str, name: &str, token: &str) -> Result<Option<User>> {
        let mut tx = self.db.begin().await?;
        let user = user::login(&mut tx, email, name, token).await?;
        tx.commit().await?;

        Ok(user)
    }

    #[instrument(skip_all)]
    pub async fn logout(&self, token: &str) -> Result<()> {
        let mut tx = self.db.begin().await?;
        user::logout(&mut tx, token).await?;
        tx.commit().await?;

        Ok(())
    }
}
