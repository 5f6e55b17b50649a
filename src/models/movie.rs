// Movie model

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::row::{from_row, from_rows, int_bool};
use crate::db::{Database, Row};
use crate::error::{DalError, Result};
use crate::model::{BaseModel, Conditions, FindOptions, Page, SortOrder};

use super::content::{self, MOVIES, MOVIE_LINKS};
use super::{
    is_favorite, lift_reference, rating_summary, to_data, unique_slug, upsert_rating, BrowseFilter,
    CastMember, ContentKind, MediaLink, NewCastMember, NewLink, RatingSummary, Reference,
};

const SORTABLE: &[&str] = &[
    "title",
    "release_year",
    "imdb_rating",
    "views_count",
    "downloads_count",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Movie {
    pub id: i64,
    pub title: String,
    pub original_title: Option<String>,
    pub slug: String,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub trailer_url: Option<String>,
    pub release_year: Option<i64>,
    pub release_date: Option<String>,
    pub duration_minutes: Option<i64>,
    pub imdb_rating: Option<f64>,
    pub age_rating: Option<String>,
    pub status: String,
    #[serde(deserialize_with = "int_bool")]
    pub is_featured: bool,
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

/// Movie with every association a detail page needs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetails {
    #[serde(flatten)]
    pub movie: Movie,
    pub section: Option<Reference>,
    pub country: Option<Reference>,
    pub language: Option<Reference>,
    pub quality: Option<Reference>,
    pub categories: Vec<Reference>,
    pub cast: Vec<CastMember>,
    pub links: Vec<MediaLink>,
    pub rating: RatingSummary,
    pub is_favorite: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewMovie {
    pub title: String,
    pub original_title: Option<String>,
    pub description: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub trailer_url: Option<String>,
    pub release_year: Option<i64>,
    pub release_date: Option<String>,
    pub duration_minutes: Option<i64>,
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

#[derive(Clone)]
pub struct MovieModel {
    base: BaseModel,
}

impl MovieModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "movies", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Movie>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Movie>> {
        self.base
            .find_one(&Conditions::new().eq("slug", slug.to_string()))?
            .map(from_row)
            .transpose()
    }

    /// Movie plus lookups, categories, cast, links and ratings.
    /// `user_id` adds the caller's own rating and favorite flag.
    pub fn get_details(&self, id: i64, user_id: Option<i64>) -> Result<Option<MovieDetails>> {
        let Some(row) = content::find_with_lookups(self.db(), &MOVIES, id)? else {
            return Ok(None);
        };
        let section = lift_reference(&row, "section");
        let country = lift_reference(&row, "country");
        let language = lift_reference(&row, "language");
        let quality = lift_reference(&row, "quality");
        let movie: Movie = from_row(row)?;

        let favorite = match user_id {
            Some(user_id) => is_favorite(self.db(), user_id, ContentKind::Movie, id)?,
            None => false,
        };

        Ok(Some(MovieDetails {
            section,
            country,
            language,
            quality,
            categories: content::categories_for(self.db(), &MOVIES, id)?,
            cast: content::cast_for(self.db(), &MOVIES, id)?,
            links: content::links_for(self.db(), &MOVIE_LINKS, id)?,
            rating: rating_summary(self.db(), ContentKind::Movie, id, user_id)?,
            is_favorite: favorite,
            movie,
        }))
    }

    pub fn get_details_by_slug(&self, slug: &str, user_id: Option<i64>) -> Result<Option<MovieDetails>> {
        match content::id_for_slug(self.db(), &MOVIES, slug)? {
            Some(id) => self.get_details(id, user_id),
            None => Ok(None),
        }
    }

    pub fn browse(&self, filter: &BrowseFilter, page: i64, per_page: i64) -> Result<Page<Movie>> {
        content::browse(self.db(), &MOVIES, filter, page, per_page)?.try_map(from_row)
    }

    pub fn search(&self, term: &str, page: i64, per_page: i64) -> Result<Page<Movie>> {
        content::search(self.db(), &MOVIES, term, page, per_page)?.try_map(from_row)
    }

    pub fn increment_views(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "views_count")
    }

    pub fn increment_downloads(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "downloads_count")
    }

    pub fn similar(&self, id: i64, limit: i64) -> Result<Vec<Movie>> {
        from_rows(content::similar(self.db(), &MOVIES, id, limit)?)
    }

    pub fn featured(&self, limit: i64) -> Result<Vec<Movie>> {
        let rows = self.base.find_all(
            &Conditions::new().eq("is_featured", 1i64),
            &FindOptions::ordered("created_at", SortOrder::Desc).limit(limit),
        )?;
        from_rows(rows)
    }

    pub fn recent(&self, limit: i64) -> Result<Vec<Movie>> {
        from_rows(self.base.get_recent(limit)?)
    }

    pub fn trending(&self, limit: i64) -> Result<Vec<Movie>> {
        from_rows(self.base.get_trending(limit)?)
    }

    /// Insert a movie with a unique slug and link its categories, all in one transaction.
    pub fn create(&self, movie: &NewMovie) -> Result<Movie> {
        if movie.title.trim().is_empty() {
            return Err(DalError::InvalidArgument("movie title is empty".into()));
        }
        let mut data: Row = to_data(movie)?;

        self.db().transaction(|tx| {
            let slug = unique_slug(tx, "movies", &movie.title)?;
            data.insert("slug".into(), slug.into());
            let row = self
                .base
                .create(data)?
                .ok_or_else(|| DalError::InvalidArgument("inserted movie is not readable".into()))?;
            let created: Movie = from_row(row)?;
            if !movie.category_ids.is_empty() {
                content::set_categories(tx, &MOVIES, created.id, &movie.category_ids)?;
            }
            log::info!("Created movie {} ({})", created.id, created.slug);
            Ok(created)
        })
    }

    pub fn update(&self, id: i64, data: Row) -> Result<Option<Movie>> {
        self.base.update(id, data)?.map(from_row).transpose()
    }

    pub fn set_categories(&self, id: i64, category_ids: &[i64]) -> Result<()> {
        content::set_categories(self.db(), &MOVIES, id, category_ids)
    }

    pub fn add_cast(&self, id: i64, member: &NewCastMember) -> Result<()> {
        content::add_cast(self.db(), &MOVIES, id, member)
    }

    pub fn add_link(&self, id: i64, link: &NewLink) -> Result<i64> {
        content::add_link(self.db(), &MOVIE_LINKS, id, link)
    }

    /// Record a user's 1-10 score. None when the movie does not exist.
    pub fn rate(
        &self,
        user_id: i64,
        movie_id: i64,
        score: i64,
        review: Option<&str>,
    ) -> Result<Option<RatingSummary>> {
        if self.base.find_by_id(movie_id)?.is_none() {
            return Ok(None);
        }
        upsert_rating(self.db(), user_id, ContentKind::Movie, movie_id, score, review).map(Some)
    }

    pub fn soft_delete(&self, id: i64) -> Result<bool> {
        self.base.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use serde_json::json;

    fn seeded() -> MovieModel {
        let mut config = DbConfig::test();
        config.seed_enabled = true;
        MovieModel::new(Arc::new(Database::open(config).unwrap()))
    }

    #[test]
    fn test_find_by_slug() {
        let movies = seeded();
        let movie = movies.find_by_slug("inception").unwrap().unwrap();
        assert_eq!(movie.id, 1);
        assert!(movie.is_featured);
        assert!(movies.find_by_slug("nope").unwrap().is_none());
    }

    #[test]
    fn test_details_are_enriched() {
        let movies = seeded();
        let details = movies.get_details(1, None).unwrap().unwrap();

        assert_eq!(details.movie.title, "Inception");
        assert_eq!(details.section.as_ref().map(|s| s.name.as_str()), Some("Movies"));
        assert_eq!(details.country.as_ref().and_then(|c| c.code.as_deref()), Some("US"));
        assert_eq!(details.quality.as_ref().map(|q| q.name.as_str()), Some("BluRay"));

        let categories: Vec<_> = details.categories.iter().map(|c| c.slug.as_deref()).collect();
        assert_eq!(categories, vec![Some("action"), Some("science-fiction"), Some("thriller")]);

        assert_eq!(details.cast.len(), 3);
        assert_eq!(details.cast[0].role, "director");
        assert_eq!(details.cast[1].character_name.as_deref(), Some("Cobb"));

        assert_eq!(details.links.len(), 2);
        assert_eq!(details.links[0].link_type, "watch");
        assert_eq!(details.links[0].quality.as_deref(), Some("BluRay"));

        assert_eq!(details.rating.count, 0);
        assert!(!details.is_favorite);

        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["title"], json!("Inception"));
        assert_eq!(json["isFeatured"], json!(true));
        assert!(json["cast"].is_array());
    }

    #[test]
    fn test_details_by_slug_and_missing() {
        let movies = seeded();
        assert!(movies.get_details_by_slug("spirited-away", None).unwrap().is_some());
        assert!(movies.get_details_by_slug("missing", None).unwrap().is_none());
        assert!(movies.get_details(999, None).unwrap().is_none());

        movies.soft_delete(3).unwrap();
        assert!(movies.get_details(3, None).unwrap().is_none());
    }

    #[test]
    fn test_browse_filters() {
        let movies = seeded();

        let sci_fi = BrowseFilter {
            category: Some("science-fiction".into()),
            sort_by: Some("year".into()),
            sort_order: Some("asc".into()),
            ..BrowseFilter::default()
        };
        let page = movies.browse(&sci_fi, 1, 10).unwrap();
        assert_eq!(page.total, 2);
        let titles: Vec<_> = page.data.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Inception", "Interstellar"]);

        let japanese = BrowseFilter {
            country: Some("JP".into()),
            language: Some("ja".into()),
            ..BrowseFilter::default()
        };
        let page = movies.browse(&japanese, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].slug, "spirited-away");

        let featured_good = BrowseFilter {
            featured: Some(true),
            min_rating: Some(8.75),
            ..BrowseFilter::default()
        };
        let page = movies.browse(&featured_good, 1, 10).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].slug, "inception");

        let by_year = BrowseFilter {
            year: Some(2001),
            ..BrowseFilter::default()
        };
        assert_eq!(movies.browse(&by_year, 1, 10).unwrap().total, 1);
    }

    #[test]
    fn test_browse_unknown_sort_key_uses_default() {
        let movies = seeded();
        let filter = BrowseFilter {
            sort_by: Some("1; DROP TABLE movies".into()),
            ..BrowseFilter::default()
        };
        let page = movies.browse(&filter, 1, 2).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 2);
        assert!(page.has_next);
    }

    #[test]
    fn test_search_ranks_title_matches_first() {
        let movies = seeded();
        movies
            .create(&NewMovie {
                title: "Space Station".into(),
                description: Some("Life aboard an orbital lab".into()),
                ..NewMovie::default()
            })
            .unwrap();

        let page = movies.search("space", 1, 10).unwrap();
        // Interstellar only matches on its description
        let titles: Vec<_> = page.data.iter().map(|m| m.title.as_str()).collect();
        assert_eq!(titles, vec!["Space Station", "Interstellar"]);
        assert_eq!(page.total, 2);
    }

    #[test]
    fn test_create_derives_unique_slug_and_links_categories() {
        let movies = seeded();
        let new = NewMovie {
            title: "Inception".into(),
            release_year: Some(2024),
            category_ids: vec![1, 4],
            ..NewMovie::default()
        };
        let created = movies.create(&new).unwrap();
        assert_eq!(created.slug, "inception-2");
        assert_eq!(created.status, "published");
        assert!(!created.is_featured);

        let details = movies.get_details(created.id, None).unwrap().unwrap();
        assert_eq!(details.categories.len(), 2);
    }

    #[test]
    fn test_create_rolls_back_on_bad_category() {
        let movies = seeded();
        let new = NewMovie {
            title: "Orphan".into(),
            category_ids: vec![999],
            ..NewMovie::default()
        };
        assert!(movies.create(&new).is_err());
        assert!(movies.find_by_slug("orphan").unwrap().is_none());
    }

    #[test]
    fn test_create_requires_title() {
        let movies = seeded();
        let err = movies.create(&NewMovie::default()).unwrap_err();
        assert!(matches!(err, DalError::InvalidArgument(_)));
    }

    #[test]
    fn test_counters_and_trending() {
        let movies = seeded();
        assert!(movies.trending(10).unwrap().is_empty());

        movies.increment_views(2).unwrap();
        movies.increment_views(2).unwrap();
        movies.increment_views(3).unwrap();
        movies.increment_downloads(3).unwrap();

        let trending = movies.trending(10).unwrap();
        let ids: Vec<_> = trending.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(movies.find_by_id(3).unwrap().unwrap().downloads_count, 1);
        assert!(!movies.increment_views(999).unwrap());
    }

    #[test]
    fn test_similar_shares_categories() {
        let movies = seeded();
        let similar = movies.similar(1, 8).unwrap();
        // Interstellar shares science-fiction; Spirited Away shares nothing with Inception
        let ids: Vec<_> = similar.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2]);

        let similar = movies.similar(2, 8).unwrap();
        let ids: Vec<_> = similar.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn test_featured_and_recent() {
        let movies = seeded();
        let featured = movies.featured(10).unwrap();
        assert_eq!(featured.len(), 2);
        assert!(featured.iter().all(|m| m.is_featured));
        assert_eq!(movies.recent(2).unwrap().len(), 2);
    }

    #[test]
    fn test_cast_links_and_rating() {
        let movies = seeded();
        movies
            .add_cast(
                3,
                &NewCastMember {
                    person_id: 1,
                    role: "producer".into(),
                    character_name: None,
                    sort_order: 5,
                },
            )
            .unwrap();
        movies
            .add_link(
                3,
                &NewLink {
                    server_name: "Backup".into(),
                    url: "https://cdn.example.com/spirited-away.m3u8".into(),
                    link_type: "watch".into(),
                    quality_id: Some(3),
                    ..NewLink::default()
                },
            )
            .unwrap();

        movies
            .db()
            .execute(
                "INSERT INTO users (username, email, password_hash) VALUES ('viewer', 'v@x.io', 'h')",
                &[],
            )
            .unwrap();
        let summary = movies.rate(1, 3, 9, Some("classic")).unwrap().unwrap();
        assert_eq!(summary.count, 1);
        assert!(movies.rate(1, 999, 9, None).unwrap().is_none());

        let details = movies.get_details(3, Some(1)).unwrap().unwrap();
        assert_eq!(details.cast.len(), 1);
        assert_eq!(details.links[0].quality.as_deref(), Some("WEB-DL"));
        assert_eq!(details.rating.user_rating, Some(9));
    }

    #[test]
    fn test_set_categories_replaces() {
        let movies = seeded();
        movies.set_categories(1, &[3]).unwrap();
        let details = movies.get_details(1, None).unwrap().unwrap();
        assert_eq!(details.categories.len(), 1);
        assert_eq!(details.categories[0].name, "Comedy");
    }
}
