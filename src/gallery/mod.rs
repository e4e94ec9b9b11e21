use std::fmt::{Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod config;
pub mod db;
pub mod filter;
pub mod scale;
pub mod store;

/// The role that may modify the gallery. Every other role can only read.
pub const ADMIN_ROLE: &str = "Admin";

/// A database generated row id, typed by the record it identifies.
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T> {
    value: i64,
    #[serde(skip)]
    _type: PhantomData<fn() -> T>,
}

pub type PhotoId = Id<Photo>;
pub type UserId = Id<User>;

impl<T> Id<T> {
    pub const fn new(value: i64) -> Self {
        Self { value, _type: PhantomData }
    }

    pub fn get(&self) -> i64 {
        self.value
    }
}

impl<T> From<i64> for Id<T> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Id({})", self.value)
    }
}

impl<T> Display for Id<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.value, f)
    }
}

impl<T> FromStr for Id<T> {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self::new)
    }
}

/// Metadata of a stored photo. The image payloads are only loaded on request,
/// see [ImageKind].
#[derive(Clone, Debug, Serialize)]
pub struct Photo {
    pub id: PhotoId,
    pub filename: String,
    pub mimetype: String,
    pub size: i64,
    pub creation_date: DateTime<Utc>,
    pub author_id: UserId,
    pub caption: String,

    /// Names of the albums this photo belongs to.
    pub albums: Vec<String>,
}

/// The binary payloads stored with every photo.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    Image,
    Thumbnail,
    BigThumbnail,
}

/// Everything needed to create a photo, except for the payloads.
#[derive(Clone, Debug)]
pub struct NewPhoto {
    pub filename: String,
    pub mimetype: String,
    pub author_id: UserId,
    pub caption: String,
    pub albums: Vec<String>,
}

pub struct PhotoData {
    pub image: Vec<u8>,
    pub thumbnail: Vec<u8>,
    pub big_thumbnail: Vec<u8>,
}

/// The only fields of a photo that can change after upload. The album list
/// replaces all memberships, so it must always be given.
#[derive(Clone, Debug, Deserialize)]
pub struct PhotoUpdate {
    #[serde(default)]
    pub caption: String,
    pub albums: Vec<String>,
}

/// A named collection of photos. Tags share the same shape.
#[derive(Clone, Debug, Serialize)]
pub struct Album {
    pub name: String,
    pub cover_image_id: Option<PhotoId>,

    // computed from the membership table
    pub image_count: u32,
}

pub type Tag = Album;

#[derive(Clone, Debug, Deserialize)]
pub struct AlbumUpdate {
    pub name: String,
    #[serde(default)]
    pub cover_image_id: Option<PhotoId>,
}

#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: String,
    pub lastlog: Option<DateTime<Utc>>,
    pub creation_date: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// The fields an administrator sets on a user. Name, token and last login
/// are owned by the login flow.
#[derive(Clone, Debug, Deserialize)]
pub struct UserUpdate {
    pub email: String,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_serializes_as_number() {
        let id = PhotoId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        assert_eq!(serde_json::from_str::<PhotoId>("7").unwrap(), PhotoId::new(7));
        assert_eq!("13".parse::<UserId>().unwrap().get(), 13);
        assert!("abc".parse::<UserId>().is_err());
        assert!(serde_json::from_str::<PhotoId>("\"7\"").is_err());
    }

    #[test]
    fn photo_update_requires_albums() {
        assert!(serde_json::from_str::<PhotoUpdate>(r#"{"caption": "x"}"#).is_err());

        let update: PhotoUpdate = serde_json::from_str(r#"{"albums": []}"#).unwrap();
        assert_eq!(update.caption, "");
        assert!(update.albums.is_empty());
    }

    #[test]
    fn only_exact_admin_role_is_admin() {
        let mut user = User {
            id: UserId::new(1),
            email: "a@example.com".into(),
            name: String::new(),
            role: "Admin".into(),
            lastlog: None,
            creation_date: Utc::now(),
        };

        assert!(user.is_admin());

        user.role = "admin".into();
        assert!(!user.is_admin());

        user.role = "Administrator".into();
        assert!(!user.is_admin());
    }

    #[test]
    fn missing_cover_image_serializes_as_null() {
        let album = Album { name: "Trips".into(), cover_image_id: None, image_count: 0 };
        let json = serde_json::to_value(&album).unwrap();
        assert!(json["cover_image_id"].is_null());

        let album = Album { cover_image_id: Some(PhotoId::new(0)), ..album };
        let json = serde_json::to_value(&album).unwrap();
        assert_eq!(json["cover_image_id"], 0);
    }
}
