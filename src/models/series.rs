// Series model
// Same surface as movies plus seasons. total_seasons is recomputed whenever a season is added.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::row::{from_row, from_rows, int_bool, now_timestamp};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};
use crate::model::{BaseModel, Conditions, FindOptions, Page, SortOrder};

use super::content::{self, SERIES};
use super::{
    is_favorite, lift_reference, rating_summary, to_data, unique_slug, upsert_rating, BrowseFilter,
    CastMember, ContentKind, NewCastMember, RatingSummary, Reference,
};

const SORTABLE: &[&str] = &[
    "title",
    "first_air_year",
    "imdb_rating",
    "views_count",
    "downloads_count",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Series {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub slug: String,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub trailer_url: Option<String>,
    pub first_air_year: Option<i64>,
    pub last_air_year: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub age_rating: Option<String>,
    pub status: String,
    #[serde(deserialize_with = "int_bool")]
    pub is_featured: bool,
    pub total_seasons: i64,
    pub total_episodes: i64,
    pub section_id: Option<i64>,
    pub country_id: Option<i64>,
    pub language_id: Option<i64>,
    pub quality_id: Option<i64>,
    pub views_count: i64,
    pub downloads_count: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Season {
    pub id: i64,
    pub series_id: i64,
    pub season_number: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub air_year: Option<i64>,
    pub episode_count: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetails {
    #[serde(flatten)]
    pub series: Series,
    pub section: Option<Reference>,
    pub country: Option<Reference>,
    pub language: Option<Reference>,
    pub quality: Option<Reference>,
    pub categories: Vec<Reference>,
    pub cast: Vec<CastMember>,
    pub seasons: Vec<Season>,
    pub rating: RatingSummary,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSeries {
    pub title: String,
    pub original_title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub trailer_url: Option<String>,
    pub first_air_year: Option<i64>,
    pub last_air_year: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub age_rating: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub is_featured: bool,
    pub section_id: Option<i64>,
    pub country_id: Option<i64>,
    pub language_id: Option<i64>,
    pub quality_id: Option<i64>,
    #[serde(default, skip_serializing)]
    pub category_ids: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewSeason {
    pub season_number: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub air_year: Option<i64>,
}

#[derive(Clone)]
pub struct SeriesModel {
    base: BaseModel,
}

impl SeriesModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "series", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Series>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Series>> {
        self.base
            .find_one(&Conditions::new().eq("slug", slug.to_string()))?
            .map(from_row)
            .transpose()
    }

    pub fn get_details(&self, id: i64, user_id: Option<i64>) -> Result<Option<SeriesDetails>> {
        let Some(row) = content::find_with_lookups(self.db(), &SERIES, id)? else {
            return Ok(None);
        };
        let section = lift_reference(&row, "section");
        let country = lift_reference(&row, "country");
        let language = lift_reference(&row, "language");
        let quality = lift_reference(&row, "quality");
        let series: Series = from_row(row)?;

        let favorite = match user_id {
            Some(user_id) => is_favorite(self.db(), user_id, ContentKind::Series, id)?,
            None => false,
        };

        Ok(Some(SeriesDetails {
            section,
            country,
            language,
            quality,
            categories: content::categories_for(self.db(), &SERIES, id)?,
            cast: content::cast_for(self.db(), &SERIES, id)?,
            seasons: self.seasons(id)?,
            rating: rating_summary(self.db(), ContentKind::Series, id, user_id)?,
            is_favorite: favorite,
            series,
        }))
    }

    pub fn get_details_by_slug(&self, slug: &str, user_id: Option<i64>) -> Result<Option<SeriesDetails>> {
        match content::id_for_slug(self.db(), &SERIES, slug)? {
            Some(id) => self.get_details(id, user_id),
            None => Ok(None),
        }
    }

    pub fn browse(&self, filter: &BrowseFilter, page: i64, per_page: i64) -> Result<Page<Series>> {
        content::browse(self.db(), &SERIES, filter, page, per_page)?.try_map(from_row)
    }

    pub fn search(&self, term: &str, page: i64, per_page: i64) -> Result<Page<Series>> {
        content::search(self.db(), &SERIES, term, page, per_page)?.try_map(from_row)
    }

    pub fn increment_views(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "views_count")
    }

    pub fn increment_downloads(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "downloads_count")
    }

    pub fn similar(&self, id: i64, limit: i64) -> Result<Vec<Series>> {
        from_rows(content::similar(self.db(), &SERIES, id, limit)?)
    }

    pub fn featured(&self, limit: i64) -> Result<Vec<Series>> {
        let rows = self.base.find_all(
            &Conditions::new().eq("is_featured", 1i64),
            &FindOptions::ordered("created_at", SortOrder::Desc).limit(limit),
        )?;
        from_rows(rows)
    }

    pub fn recent(&self, limit: i64) -> Result<Vec<Series>> {
        from_rows(self.base.get_recent(limit)?)
    }

    pub fn trending(&self, limit: i64) -> Result<Vec<Series>> {
        from_rows(self.base.get_trending(limit)?)
    }

    pub fn create(&self, series: &NewSeries) -> Result<Series> {
        if series.title.trim().is_empty() {
            return Err(DalError::InvalidArgument("series title is empty".into()));
        }
        let mut data: Row = to_data(series)?;

        self.db().transaction(|tx| {
            let slug = unique_slug(tx, "series", &series.title)?;
            data.insert("slug".into(), slug.into());
            let row = self
                .base
                .create(data)?
                .ok_or_else(|| DalError::InvalidArgument("inserted series is not readable".into()))?;
            let created: Series = from_row(row)?;
            if !series.category_ids.is_empty() {
                content::set_categories(tx, &SERIES, created.id, &series.category_ids)?;
            }
            log::info!("Created series {} ({})", created.id, created.slug);
            Ok(created)
        })
    }

    pub fn update(&self, id: i64, data: Row) -> Result<Option<Series>> {
        self.base.update(id, data)?.map(from_row).transpose()
    }

    pub fn set_categories(&self, id: i64, category_ids: &[i64]) -> Result<()> {
        content::set_categories(self.db(), &SERIES, id, category_ids)
    }

    pub fn add_cast(&self, id: i64, member: &NewCastMember) -> Result<()> {
        content::add_cast(self.db(), &SERIES, id, member)
    }

    pub fn rate(
        &self,
        user_id: i64,
        series_id: i64,
        score: i64,
        review: Option<&str>,
    ) -> Result<Option<RatingSummary>> {
        if self.base.find_by_id(series_id)?.is_none() {
            return Ok(None);
        }
        upsert_rating(self.db(), user_id, ContentKind::Series, series_id, score, review).map(Some)
    }

    pub fn soft_delete(&self, id: i64) -> Result<bool> {
        self.base.delete(id)
    }

    /// Active seasons in order.
    pub fn seasons(&self, series_id: i64) -> Result<Vec<Season>> {
        let rows = self.db().query(
            "SELECT * FROM seasons WHERE series_id = ? AND is_active = 1 ORDER BY season_number",
            &[SqlValue::Integer(series_id)],
        )?;
        from_rows(rows)
    }

    /// Add a season and refresh the series' season total. None when the series does not exist.
    pub fn add_season(&self, series_id: i64, season: &NewSeason) -> Result<Option<Season>> {
        if season.season_number < 0 {
            return Err(DalError::InvalidArgument("season number must not be negative".into()));
        }
        if self.base.find_by_id(series_id)?.is_none() {
            return Ok(None);
        }

        self.db().transaction(|tx| {
            let now = now_timestamp();
            let result = tx.execute(
                "INSERT INTO seasons (series_id, season_number, title, description, poster_url, air_year, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    SqlValue::Integer(series_id),
                    SqlValue::Integer(season.season_number),
                    opt_text(&season.title),
                    opt_text(&season.description),
                    opt_text(&season.poster_url),
                    season.air_year.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
                    SqlValue::Text(now.clone()),
                    SqlValue::Text(now.clone()),
                ],
            )?;
            tx.execute(
                "UPDATE series SET
                    total_seasons = (SELECT COUNT(*) FROM seasons WHERE series_id = ? AND is_active = 1),
                    updated_at = ?
                 WHERE id = ?",
                &[
                    SqlValue::Integer(series_id),
                    SqlValue::Text(now),
                    SqlValue::Integer(series_id),
                ],
            )?;
            tx.query_one(
                "SELECT * FROM seasons WHERE id = ?",
                &[SqlValue::Integer(result.last_insert_id)],
            )?
            .map(from_row)
            .transpose()
        })
    }
}

fn opt_text(value: &Option<String>) -> SqlValue {
    value.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn seeded() -> SeriesModel {
        let mut config = DbConfig::test();
        config.seed_enabled = true;
        SeriesModel::new(Arc::new(Database::open(config).unwrap()))
    }

    #[test]
    fn test_details_include_seasons() {
        let series = seeded();
        let details = series.get_details_by_slug("breaking-bad", None).unwrap().unwrap();
        assert_eq!(details.series.status, "completed");
        assert_eq!(details.seasons.len(), 1);
        assert_eq!(details.seasons[0].episode_count, 2);
        assert_eq!(details.cast[0].character_name.as_deref(), Some("Walter White"));
        assert_eq!(details.language.as_ref().and_then(|l| l.code.as_deref()), Some("en"));
        let categories: Vec<_> = details.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(categories, vec!["Drama", "Thriller"]);
    }

    #[test]
    fn test_add_season_maintains_total() {
        let series = seeded();
        let season = series
            .add_season(
                1,
                &NewSeason {
                    season_number: 2,
                    title: Some("Season 2".into()),
                    air_year: Some(2009),
                    ..NewSeason::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(season.season_number, 2);
        assert_eq!(season.episode_count, 0);
        assert_eq!(series.find_by_id(1).unwrap().unwrap().total_seasons, 2);

        // Duplicate season number violates the unique key and changes nothing
        let dup = NewSeason {
            season_number: 2,
            ..NewSeason::default()
        };
        assert!(series.add_season(1, &dup).is_err());
        assert_eq!(series.seasons(1).unwrap().len(), 2);

        assert!(series.add_season(999, &dup).unwrap().is_none());
    }

    #[test]
    fn test_create_browse_and_search() {
        let series = seeded();
        let created = series
            .create(&NewSeries {
                title: "Better Call Saul".into(),
                first_air_year: Some(2015),
                status: Some("completed".into()),
                category_ids: vec![4],
                ..NewSeries::default()
            })
            .unwrap();
        assert_eq!(created.slug, "better-call-saul");
        assert_eq!(created.total_seasons, 0);

        let drama = BrowseFilter {
            category: Some("drama".into()),
            sort_by: Some("year".into()),
            ..BrowseFilter::default()
        };
        let page = series.browse(&drama, 1, 10).unwrap();
        let titles: Vec<_> = page.data.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Better Call Saul", "Breaking Bad"]);

        let page = series.search("saul", 1, 10).unwrap();
        assert_eq!(page.total, 1);

        let similar = series.similar(created.id, 5).unwrap();
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].slug, "breaking-bad");
    }

    #[test]
    fn test_invalid_status_is_a_database_error() {
        let series = seeded();
        let err = series
            .create(&NewSeries {
                title: "Limbo".into(),
                status: Some("paused".into()),
                ..NewSeries::default()
            })
            .unwrap_err();
        assert!(matches!(err, DalError::Database(_)));
    }

    #[test]
    fn test_views_and_rating() {
        let series = seeded();
        series.increment_views(1).unwrap();
        assert_eq!(series.trending(5).unwrap().len(), 1);

        series
            .db()
            .execute(
                "INSERT INTO users (username, email, password_hash) VALUES ('fan', 'fan@x.io', 'h')",
                &[],
            )
            .unwrap();
        let summary = series.rate(1, 1, 10, None).unwrap().unwrap();
        assert_eq!(summary.average, Some(10.0));
        let details = series.get_details(1, Some(1)).unwrap().unwrap();
        assert_eq!(details.rating.user_rating, Some(10));
    }
}
