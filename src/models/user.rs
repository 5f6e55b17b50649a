// User model
// Accounts, roles, ratings history and favorites. Password hashes are stored as given and
// never serialized.

use std::sync::Arc;

use rusqlite::ErrorCode;
use serde::{Deserialize, Serialize};

use crate::constants::{ROLE_USER, USER_ROLES};
use crate::db::row::{from_row, from_rows, int_bool, now_timestamp, row_i64};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};
use crate::model::{window, BaseModel, Conditions, Page};

use super::ContentKind;

const SORTABLE: &[&str] = &["username", "last_login_at"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: String,
    pub last_login_at: Option<String>,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
}

/// A rating joined with the title it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct UserRating {
    pub id: i64,
    pub content_type: String,
    pub content_id: i64,
    pub rating: i64,
    pub review: Option<String>,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct FavoriteItem {
    pub content_type: String,
    pub content_id: i64,
    pub title: String,
    pub slug: String,
    pub poster_url: Option<String>,
    pub added_at: String,
}

#[derive(Clone)]
pub struct UserModel {
    base: BaseModel,
}

impl UserModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "users", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.base
            .find_one(&Conditions::new().eq("email", normalize_email(email)))?
            .map(from_row)
            .transpose()
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        self.base
            .find_one(&Conditions::new().eq("username", username.trim().to_string()))?
            .map(from_row)
            .transpose()
    }

    /// Register an account. Usernames and emails are unique across active and deactivated users.
    pub fn create(&self, user: &NewUser) -> Result<User> {
        let username = user.username.trim();
        let email = normalize_email(&user.email);
        if username.is_empty() || email.is_empty() || user.password_hash.is_empty() {
            return Err(DalError::InvalidArgument(
                "username, email and password hash are required".into(),
            ));
        }
        let role = user.role.as_deref().unwrap_or(ROLE_USER);
        validate_role(role)?;

        self.db().transaction(|_| {
            if self.taken("username", username, None)? {
                return Err(DalError::Conflict(format!("username '{}' is taken", username)));
            }
            if self.taken("email", &email, None)? {
                return Err(DalError::Conflict(format!("email '{}' is already registered", email)));
            }

            let mut data = Row::new();
            data.insert("username".into(), username.into());
            data.insert("email".into(), email.clone().into());
            data.insert("password_hash".into(), user.password_hash.clone().into());
            data.insert("role".into(), role.into());
            if let Some(name) = &user.display_name {
                data.insert("display_name".into(), name.clone().into());
            }

            let row = self
                .base
                .create(data)
                .map_err(unique_to_conflict)?
                .ok_or_else(|| DalError::InvalidArgument("inserted user is not readable".into()))?;
            log::info!("Registered user {}", username);
            from_row(row)
        })
    }

    pub fn update_profile(&self, id: i64, update: &ProfileUpdate) -> Result<Option<User>> {
        let mut data = super::to_data(update)?;
        if let Some(email) = &update.email {
            let email = normalize_email(email);
            if self.taken("email", &email, Some(id))? {
                return Err(DalError::Conflict(format!("email '{}' is already registered", email)));
            }
            data.insert("email".into(), email.into());
        }
        if data.is_empty() {
            return self.find_by_id(id);
        }
        self.base
            .update(id, data)
            .map_err(unique_to_conflict)?
            .map(from_row)
            .transpose()
    }

    pub fn record_login(&self, id: i64) -> Result<bool> {
        let now = now_timestamp();
        let result = self.db().execute(
            "UPDATE users SET last_login_at = ?, updated_at = ? WHERE id = ? AND is_active = 1",
            &[SqlValue::Text(now.clone()), SqlValue::Text(now), SqlValue::Integer(id)],
        )?;
        Ok(result.changes > 0)
    }

    pub fn set_role(&self, id: i64, role: &str) -> Result<Option<User>> {
        validate_role(role)?;
        let mut data = Row::new();
        data.insert("role".into(), role.into());
        self.base.update(id, data)?.map(from_row).transpose()
    }

    pub fn deactivate(&self, id: i64) -> Result<bool> {
        self.base.delete(id)
    }

    /// The user's ratings, newest first, with the rated title.
    pub fn ratings(&self, user_id: i64, page: i64, per_page: i64) -> Result<Page<UserRating>> {
        let win = window(page, per_page);
        let total = self
            .db()
            .query_one(
                "SELECT COUNT(*) AS total FROM ratings WHERE user_id = ? AND is_active = 1",
                &[SqlValue::Integer(user_id)],
            )?
            .and_then(|row| row_i64(&row, "total"))
            .unwrap_or(0);

        let rows = self.db().query(
            "SELECT r.id, r.content_type, r.content_id, r.rating, r.review,
                    COALESCE(m.title, s.title) AS title, COALESCE(m.slug, s.slug) AS slug,
                    r.created_at, r.updated_at
             FROM ratings r
             LEFT JOIN movies m ON r.content_type = 'movie' AND m.id = r.content_id
             LEFT JOIN series s ON r.content_type = 'series' AND s.id = r.content_id
             WHERE r.user_id = ? AND r.is_active = 1
             ORDER BY r.updated_at DESC, r.id DESC
             LIMIT ? OFFSET ?",
            &[
                SqlValue::Integer(user_id),
                SqlValue::Integer(win.limit),
                SqlValue::Integer(win.offset),
            ],
        )?;
        Page::new(rows, win.page, win.per_page, total).try_map(from_row)
    }

    /// Mark a title as favorite. False when the title does not exist or is inactive.
    pub fn add_favorite(&self, user_id: i64, kind: ContentKind, content_id: i64) -> Result<bool> {
        let exists = self
            .db()
            .query_one(
                &format!("SELECT 1 AS hit FROM {} WHERE id = ? AND is_active = 1", kind.table()),
                &[SqlValue::Integer(content_id)],
            )?
            .is_some();
        if !exists {
            return Ok(false);
        }
        let now = now_timestamp();
        self.db().execute(
            "INSERT INTO favorites (user_id, content_type, content_id, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(user_id, content_type, content_id) DO UPDATE SET
                is_active = 1, updated_at = excluded.updated_at",
            &[
                SqlValue::Integer(user_id),
                SqlValue::Text(kind.as_str().into()),
                SqlValue::Integer(content_id),
                SqlValue::Text(now.clone()),
                SqlValue::Text(now),
            ],
        )?;
        Ok(true)
    }

    /// Returns whether an active favorite was removed.
    pub fn remove_favorite(&self, user_id: i64, kind: ContentKind, content_id: i64) -> Result<bool> {
        let result = self.db().execute(
            "UPDATE favorites SET is_active = 0, updated_at = ?
             WHERE user_id = ? AND content_type = ? AND content_id = ? AND is_active = 1",
            &[
                SqlValue::Text(now_timestamp()),
                SqlValue::Integer(user_id),
                SqlValue::Text(kind.as_str().into()),
                SqlValue::Integer(content_id),
            ],
        )?;
        Ok(result.changes > 0)
    }

    /// Favorites of active titles, most recently added first. `kind` narrows to movies or series.
    pub fn favorites(&self, user_id: i64, kind: Option<ContentKind>) -> Result<Vec<FavoriteItem>> {
        let mut sql = String::from(
            "SELECT f.content_type, f.content_id,
                    COALESCE(m.title, s.title) AS title, COALESCE(m.slug, s.slug) AS slug,
                    COALESCE(m.poster_url, s.poster_url) AS poster_url, f.updated_at AS added_at
             FROM favorites f
             LEFT JOIN movies m ON f.content_type = 'movie' AND m.id = f.content_id AND m.is_active = 1
             LEFT JOIN series s ON f.content_type = 'series' AND s.id = f.content_id AND s.is_active = 1
             WHERE f.user_id = ? AND f.is_active = 1 AND COALESCE(m.id, s.id) IS NOT NULL",
        );
        let mut params = vec![SqlValue::Integer(user_id)];
        if let Some(kind) = kind {
            sql.push_str(" AND f.content_type = ?");
            params.push(SqlValue::Text(kind.as_str().into()));
        }
        sql.push_str(" ORDER BY f.updated_at DESC, f.id DESC");
        from_rows(self.db().query(&sql, &params)?)
    }

    pub fn is_favorite(&self, user_id: i64, kind: ContentKind, content_id: i64) -> Result<bool> {
        super::is_favorite(self.db(), user_id, kind, content_id)
    }

    /// Whether `column` already holds `value` on a user other than `except`.
    fn taken(&self, column: &str, value: &str, except: Option<i64>) -> Result<bool> {
        let sql = format!("SELECT id FROM users WHERE {} = ? AND id != ?", column);
        Ok(self
            .db()
            .query_one(
                &sql,
                &[SqlValue::Text(value.to_string()), SqlValue::Integer(except.unwrap_or(0))],
            )?
            .is_some())
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_role(role: &str) -> Result<()> {
    if USER_ROLES.contains(&role) {
        Ok(())
    } else {
        Err(DalError::InvalidArgument(format!("unknown role '{}'", role)))
    }
}

/// A unique-constraint failure that slipped past the pre-check is still a conflict.
fn unique_to_conflict(err: DalError) -> DalError {
    match err {
        DalError::Database(rusqlite::Error::SqliteFailure(e, msg))
            if e.code == ErrorCode::ConstraintViolation =>
        {
            DalError::Conflict(msg.unwrap_or_else(|| "constraint violation".into()))
        }
        other => other,
    }
}
