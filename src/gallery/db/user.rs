use std::ops::DerefMut;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite, Transaction};

use crate::gallery::db::listing::Listing;
use crate::gallery::filter::ItemFilter;
use crate::gallery::{User, UserId, UserUpdate};

const USER_COLUMNS: &str = "users.id, users.email, users.name, users.role, users.lastlog, users.creation_date";

const USERS: Listing = Listing {
    select: "SELECT users.id, users.email, users.name, users.role, users.lastlog, users.creation_date FROM users",
    search: &["COALESCE(users.name, '')", "users.email", "users.role"],
    album: None,
    order_by: "users.lastlog DESC NULLS LAST, users.id",
};

#[derive(FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    name: Option<String>,
    role: String,
    lastlog: Option<DateTime<Utc>>,
    creation_date: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            // the name is only known after the first login
            name: row.name.unwrap_or_default(),
            role: row.role,
            lastlog: row.lastlog,
            creation_date: row.creation_date,
        }
    }
}

pub async fn list_users(tx: &mut Transaction<'_, Sqlite>, filter: &ItemFilter) -> Result<Vec<User>> {
    let mut query = USERS.query(filter);
    let sql = query.sql().to_owned();

    let rows: Vec<UserRow> = query
        .build_query_as()
        .fetch_all(tx.deref_mut())
        .await
        .with_context(|| format!("list users: {}", sql))?;

    Ok(rows.into_iter().map(User::from).collect())
}

pub async fn read_user(tx: &mut Transaction<'_, Sqlite>, id: UserId) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE users.id = ?", USER_COLUMNS);

    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(User::from))
}

/// Resolves a session token to its user.
pub async fn read_user_by_token(tx: &mut Transaction<'_, Sqlite>, token: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE users.token = ?", USER_COLUMNS);

    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(token)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(User::from))
}

pub async fn insert_user(tx: &mut Transaction<'_, Sqlite>, user: &UserUpdate) -> Result<User> {
    let sql = format!("INSERT INTO users (email, role, creation_date) VALUES (?, ?, ?) RETURNING {}", USER_COLUMNS);

    let row: UserRow = sqlx::query_as(&sql)
        .bind(&user.email)
        .bind(&user.role)
        .bind(Utc::now())
        .fetch_one(tx.deref_mut())
        .await?;

    Ok(row.into())
}

pub async fn update_user(tx: &mut Transaction<'_, Sqlite>, id: UserId, user: &UserUpdate) -> Result<Option<User>> {
    let sql = format!("UPDATE users SET email = ?, role = ? WHERE id = ? RETURNING {}", USER_COLUMNS);

    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(&user.email)
        .bind(&user.role)
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(User::from))
}

pub async fn delete_user(tx: &mut Transaction<'_, Sqlite>, id: UserId) -> Result<Option<UserId>> {
    let id = sqlx::query_scalar("DELETE FROM users WHERE id = ? RETURNING id")
        .bind(id)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(id)
}

/// Records a successful login of the user with the given email. Returns `None`
/// if no account exists for that email.
pub async fn login(tx: &mut Transaction<'_, Sqlite>, email: &str, name: &str, token: &str) -> Result<Option<User>> {
    let sql = format!("UPDATE users SET token = ?, name = ?, lastlog = ? WHERE email = ? RETURNING {}", USER_COLUMNS);

    let row: Option<UserRow> = sqlx::query_as(&sql)
        .bind(token)
        .bind(name)
        .bind(Utc::now())
        .bind(email)
        .fetch_optional(tx.deref_mut())
        .await?;

    Ok(row.map(User::from))
}

/// Invalidates a session token. Unknown tokens are ignored.
pub async fn logout(tx: &mut Transaction<'_, Sqlite>, token: &str) -> Result<()> {
    sqlx::query("UPDATE users SET token = NULL, lastlog = ? WHERE token = ?")
        .bind(Utc::now())
        .bind(token)
        .execute(tx.deref_mut())
        .await?;

    Ok(())
}
