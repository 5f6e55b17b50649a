// Catalog models
// Entity-specific queries on top of BaseModel: joins, nested details, counters and ratings.

pub mod category;
pub mod content;
pub mod episode;
pub mod movie;
pub mod person;
pub mod reference;
pub mod series;
pub mod user;

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::db::row::{now_timestamp, row_i64, row_str};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};

pub use category::{Category, CategoryModel, CategoryWithCounts, NewCategory};
pub use episode::{Episode, EpisodeDetails, EpisodeModel, NewEpisode};
pub use movie::{Movie, MovieDetails, MovieModel, NewMovie};
pub use person::{Credit, NewPerson, Person, PersonDetails, PersonModel};
pub use reference::{ReferenceItem, ReferenceKind, ReferenceModel};
pub use series::{NewSeason, NewSeries, Season, Series, SeriesDetails, SeriesModel};
pub use user::{FavoriteItem, NewUser, ProfileUpdate, User, UserModel, UserRating};

static NON_SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));

/// Polymorphic content type used by ratings and favorites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Movie,
    Series,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Movie => CONTENT_MOVIE,
            ContentKind::Series => CONTENT_SERIES,
        }
    }

    /// Table holding this kind of content.
    pub fn table(&self) -> &'static str {
        match self {
            ContentKind::Movie => "movies",
            ContentKind::Series => "series",
        }
    }
}

impl FromStr for ContentKind {
    type Err = DalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "movie" | "movies" => Ok(ContentKind::Movie),
            "series" | "show" | "shows" => Ok(ContentKind::Series),
            other => Err(DalError::InvalidArgument(format!("unknown content type '{}'", other))),
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A joined lookup row (section, country, language, quality, category, parent series).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Lift `{prefix}_id`, `{prefix}_name`, `{prefix}_slug` and `{prefix}_code` out of a flat
/// projection. None when the join found nothing.
pub fn lift_reference(row: &Row, prefix: &str) -> Option<Reference> {
    let id = row_i64(row, &format!("{}_id", prefix))?;
    let name = row_str(row, &format!("{}_name", prefix))?;
    Some(Reference {
        id,
        name: name.to_string(),
        slug: row_str(row, &format!("{}_slug", prefix)).map(String::from),
        code: row_str(row, &format!("{}_code", prefix)).map(String::from),
    })
}

/// A credited person on a movie or series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct CastMember {
    pub person_id: i64,
    pub name: String,
    pub slug: String,
    pub photo_url: Option<String>,
    pub role: String,
    pub character_name: Option<String>,
    pub sort_order: i64,
}

/// Input for crediting a person.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewCastMember {
    pub person_id: i64,
    pub role: String,
    pub character_name: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

/// A watch or download link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct MediaLink {
    pub id: i64,
    pub server_name: String,
    pub url: String,
    pub link_type: String,
    pub quality: Option<String>,
    pub file_size: Option<String>,
    pub sort_order: i64,
}

/// Input for a new link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLink {
    pub server_name: String,
    pub url: String,
    pub link_type: String,
    pub quality_id: Option<i64>,
    pub file_size: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

/// Aggregate of user ratings for one title.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct RatingSummary {
    pub average: Option<f64>,
    pub count: i64,
    pub user_rating: Option<i64>,
}

/// Browse filters shared by movies and series. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowseFilter {
    pub category: Option<String>, // category slug
    pub section: Option<String>,  // section slug
    pub country: Option<String>,  // country code
    pub language: Option<String>, // language code
    pub quality: Option<String>,  // quality name
    pub year: Option<i64>,
    pub min_rating: Option<f64>,
    pub status: Option<String>,
    pub featured: Option<bool>,
    pub sort_by: Option<String>,    // "title", "year", "rating", "views", "downloads", "created_at"
    pub sort_order: Option<String>, // "asc", "desc"
}

/// URL slug: lowercase ASCII alphanumerics separated by single hyphens.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let slug = NON_SLUG.replace_all(&lowered, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        SLUG_FALLBACK.to_string()
    } else {
        slug.to_string()
    }
}

/// Slug for `text` that is not yet used in `table`, suffixed -2, -3, ... on collision.
/// Inactive rows still hold their slug.
pub fn unique_slug(db: &Database, table: &str, text: &str) -> Result<String> {
    let base = slugify(text);
    let sql = format!("SELECT 1 AS taken FROM {} WHERE slug = ? LIMIT 1", table);
    let mut candidate = base.clone();
    let mut n = 2;
    while db.query_one(&sql, &[SqlValue::Text(candidate.clone())])?.is_some() {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    Ok(candidate)
}

/// Rating aggregate for a title, plus the given user's own score.
pub fn rating_summary(
    db: &Database,
    kind: ContentKind,
    content_id: i64,
    user_id: Option<i64>,
) -> Result<RatingSummary> {
    let row = db.query_one(
        "SELECT AVG(rating) AS average, COUNT(*) AS count FROM ratings
         WHERE content_type = ? AND content_id = ? AND is_active = 1",
        &[SqlValue::Text(kind.as_str().into()), SqlValue::Integer(content_id)],
    )?;
    let (average, count) = match row {
        Some(row) => (
            row.get("average").and_then(serde_json::Value::as_f64),
            row_i64(&row, "count").unwrap_or(0),
        ),
        None => (None, 0),
    };

    let user_rating = match user_id {
        Some(user_id) => db
            .query_one(
                "SELECT rating FROM ratings
                 WHERE user_id = ? AND content_type = ? AND content_id = ? AND is_active = 1",
                &[
                    SqlValue::Integer(user_id),
                    SqlValue::Text(kind.as_str().into()),
                    SqlValue::Integer(content_id),
                ],
            )?
            .and_then(|row| row_i64(&row, "rating")),
        None => None,
    };

    Ok(RatingSummary {
        average: average.map(|a| (a * 10.0).round() / 10.0),
        count,
        user_rating,
    })
}

/// Insert or replace a user's score for a title. One rating per user and title.
pub fn upsert_rating(
    db: &Database,
    user_id: i64,
    kind: ContentKind,
    content_id: i64,
    score: i64,
    review: Option<&str>,
) -> Result<RatingSummary> {
    if !(RATING_MIN..=RATING_MAX).contains(&score) {
        return Err(DalError::InvalidArgument(format!(
            "rating must be between {} and {}, got {}",
            RATING_MIN, RATING_MAX, score
        )));
    }
    let now = now_timestamp();
    db.execute(
        "INSERT INTO ratings (user_id, content_type, content_id, rating, review, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id, content_type, content_id) DO UPDATE SET
            rating = excluded.rating,
            review = excluded.review,
            is_active = 1,
            updated_at = excluded.updated_at",
        &[
            SqlValue::Integer(user_id),
            SqlValue::Text(kind.as_str().into()),
            SqlValue::Integer(content_id),
            SqlValue::Integer(score),
            review.map(|r| SqlValue::Text(r.to_string())).unwrap_or(SqlValue::Null),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now),
        ],
    )?;
    rating_summary(db, kind, content_id, Some(user_id))
}

/// Whether a user has an active favorite on a title.
pub fn is_favorite(db: &Database, user_id: i64, kind: ContentKind, content_id: i64) -> Result<bool> {
    Ok(db
        .query_one(
            "SELECT 1 AS hit FROM favorites
             WHERE user_id = ? AND content_type = ? AND content_id = ? AND is_active = 1",
            &[
                SqlValue::Integer(user_id),
                SqlValue::Text(kind.as_str().into()),
                SqlValue::Integer(content_id),
            ],
        )?
        .is_some())
}

/// Serialize an input struct into a data map for BaseModel, dropping unset fields.
pub(crate) fn to_data(value: &impl Serialize) -> Result<Row> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        _ => Err(DalError::InvalidArgument("expected a struct of columns".into())),
    }
}

/// Every model over one shared connection manager.
#[derive(Clone)]
pub struct Dal {
    pub db: Arc<Database>,
    pub movies: MovieModel,
    pub series: SeriesModel,
    pub episodes: EpisodeModel,
    pub people: PersonModel,
    pub users: UserModel,
    pub categories: CategoryModel,
    pub sections: ReferenceModel,
    pub countries: ReferenceModel,
    pub languages: ReferenceModel,
    pub qualities: ReferenceModel,
}

impl Dal {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            movies: MovieModel::new(Arc::clone(&db)),
            series: SeriesModel::new(Arc::clone(&db)),
            episodes: EpisodeModel::new(Arc::clone(&db)),
            people: PersonModel::new(Arc::clone(&db)),
            users: UserModel::new(Arc::clone(&db)),
            categories: CategoryModel::new(Arc::clone(&db)),
            sections: ReferenceModel::new(Arc::clone(&db), ReferenceKind::Section),
            countries: ReferenceModel::new(Arc::clone(&db), ReferenceKind::Country),
            languages: ReferenceModel::new(Arc::clone(&db), ReferenceKind::Language),
            qualities: ReferenceModel::new(Arc::clone(&db), ReferenceKind::Quality),
            db,
        }
    }
}
