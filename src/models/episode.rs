// Episode model
// Episodes belong to a season and, through it, a series. Creating or removing an episode
// recomputes seasons.episode_count and series.total_episodes in the same transaction.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::row::{from_row, from_rows, int_bool, now_timestamp, row_i64};
use crate::db::{Database, SqlValue};
use crate::error::{DalError, Result};
use crate::model::BaseModel;

use super::content::{self, EPISODE_LINKS};
use super::{MediaLink, NewLink, Reference};

const SORTABLE: &[&str] = &["episode_number", "air_date", "views_count"];

/// Episode columns plus its season number and parent titles when the query joins them.
const EPISODE_SELECT: &str = "SELECT e.*, s.season_number, sr.title AS series_title, sr.slug AS series_slug
    FROM episodes e
    JOIN seasons s ON s.id = e.season_id
    JOIN series sr ON sr.id = e.series_id";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Episode {
    pub id: i64,
    pub series_id: i64,
    pub season_id: i64,
    pub episode_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_minutes: Option<i64>,
    pub air_date: Option<String>,
    pub views_count: i64,
    pub downloads_count: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_slug: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EpisodeDetails {
    #[serde(flatten)]
    pub episode: Episode,
    pub series: Reference,
    pub links: Vec<MediaLink>,
    pub previous: Option<Episode>,
    pub next: Option<Episode>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEpisode {
    pub season_id: i64,
    pub episode_number: i64,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_minutes: Option<i64>,
    pub air_date: Option<String>,
}

#[derive(Clone)]
pub struct EpisodeModel {
    base: BaseModel,
}

impl EpisodeModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "episodes", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Episode>> {
        let sql = format!("{} WHERE e.id = ? AND e.is_active = 1", EPISODE_SELECT);
        self.db()
            .query_one(&sql, &[SqlValue::Integer(id)])?
            .map(from_row)
            .transpose()
    }

    pub fn list_for_season(&self, season_id: i64) -> Result<Vec<Episode>> {
        let sql = format!(
            "{} WHERE e.season_id = ? AND e.is_active = 1 ORDER BY e.episode_number",
            EPISODE_SELECT
        );
        from_rows(self.db().query(&sql, &[SqlValue::Integer(season_id)])?)
    }

    /// Every active episode of a series in watch order.
    pub fn list_for_series(&self, series_id: i64) -> Result<Vec<Episode>> {
        let sql = format!(
            "{} WHERE e.series_id = ? AND e.is_active = 1 AND s.is_active = 1
             ORDER BY s.season_number, e.episode_number",
            EPISODE_SELECT
        );
        from_rows(self.db().query(&sql, &[SqlValue::Integer(series_id)])?)
    }

    /// Episode with series context, links and its neighbours.
    pub fn get_details(&self, id: i64) -> Result<Option<EpisodeDetails>> {
        let Some(episode) = self.find_by_id(id)? else {
            return Ok(None);
        };
        let series = Reference {
            id: episode.series_id,
            name: episode.series_title.clone().unwrap_or_default(),
            slug: episode.series_slug.clone(),
            code: None,
        };
        Ok(Some(EpisodeDetails {
            series,
            links: content::links_for(self.db(), &EPISODE_LINKS, id)?,
            previous: self.previous(&episode)?,
            next: self.next(&episode)?,
            episode,
        }))
    }

    /// Following episode in the series, crossing into the next season.
    pub fn next(&self, episode: &Episode) -> Result<Option<Episode>> {
        self.neighbour(episode, ">", "ASC")
    }

    /// Preceding episode in the series, crossing into the previous season.
    pub fn previous(&self, episode: &Episode) -> Result<Option<Episode>> {
        self.neighbour(episode, "<", "DESC")
    }

    fn neighbour(&self, episode: &Episode, cmp: &str, order: &str) -> Result<Option<Episode>> {
        let season_number = match episode.season_number {
            Some(n) => n,
            None => return Ok(None),
        };
        let sql = format!(
            "{select} WHERE e.series_id = ? AND e.is_active = 1 AND s.is_active = 1
               AND (s.season_number {cmp} ? OR (s.season_number = ? AND e.episode_number {cmp} ?))
             ORDER BY s.season_number {order}, e.episode_number {order} LIMIT 1",
            select = EPISODE_SELECT,
            cmp = cmp,
            order = order
        );
        self.db()
            .query_one(
                &sql,
                &[
                    SqlValue::Integer(episode.series_id),
                    SqlValue::Integer(season_number),
                    SqlValue::Integer(season_number),
                    SqlValue::Integer(episode.episode_number),
                ],
            )?
            .map(from_row)
            .transpose()
    }

    /// Insert an episode under an existing season. None when the season does not exist.
    pub fn create(&self, episode: &NewEpisode) -> Result<Option<Episode>> {
        if episode.title.trim().is_empty() {
            return Err(DalError::InvalidArgument("episode title is empty".into()));
        }

        let id = self.db().transaction(|tx| {
            let Some(series_id) = tx
                .query_one(
                    "SELECT series_id FROM seasons WHERE id = ? AND is_active = 1",
                    &[SqlValue::Integer(episode.season_id)],
                )?
                .and_then(|row| row_i64(&row, "series_id"))
            else {
                return Ok(None);
            };

            let now = now_timestamp();
            let result = tx.execute(
                "INSERT INTO episodes (series_id, season_id, episode_number, title, description,
                    thumbnail_url, duration_minutes, air_date, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                &[
                    SqlValue::Integer(series_id),
                    SqlValue::Integer(episode.season_id),
                    SqlValue::Integer(episode.episode_number),
                    SqlValue::Text(episode.title.clone()),
                    opt_text(&episode.description),
                    opt_text(&episode.thumbnail_url),
                    episode.duration_minutes.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
                    opt_text(&episode.air_date),
                    SqlValue::Text(now.clone()),
                    SqlValue::Text(now),
                ],
            )?;
            refresh_counters(tx, episode.season_id, series_id)?;
            Ok(Some(result.last_insert_id))
        })?;

        match id {
            Some(id) => self.find_by_id(id),
            None => Ok(None),
        }
    }

    /// Soft delete and recompute the parent counters.
    pub fn soft_delete(&self, id: i64) -> Result<bool> {
        let Some(episode) = self.find_by_id(id)? else {
            return Ok(false);
        };
        self.db().transaction(|tx| {
            let deleted = self.base.delete(id)?;
            refresh_counters(tx, episode.season_id, episode.series_id)?;
            Ok(deleted)
        })
    }

    pub fn add_link(&self, episode_id: i64, link: &NewLink) -> Result<i64> {
        content::add_link(self.db(), &EPISODE_LINKS, episode_id, link)
    }

    pub fn increment_views(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "views_count")
    }

    pub fn increment_downloads(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "downloads_count")
    }

    /// Newest episodes of active series.
    pub fn latest(&self, limit: i64) -> Result<Vec<Episode>> {
        let sql = format!(
            "{} WHERE e.is_active = 1 AND s.is_active = 1 AND sr.is_active = 1
             ORDER BY e.created_at DESC, e.id DESC LIMIT ?",
            EPISODE_SELECT
        );
        from_rows(self.db().query(&sql, &[SqlValue::Integer(limit)])?)
    }
}

fn refresh_counters(db: &Database, season_id: i64, series_id: i64) -> Result<()> {
    let now = now_timestamp();
    db.execute(
        "UPDATE seasons SET
            episode_count = (SELECT COUNT(*) FROM episodes WHERE season_id = ? AND is_active = 1),
            updated_at = ?
         WHERE id = ?",
        &[
            SqlValue::Integer(season_id),
            SqlValue::Text(now.clone()),
            SqlValue::Integer(season_id),
        ],
    )?;
    db.execute(
        "UPDATE series SET
            total_episodes = (SELECT COUNT(*) FROM episodes WHERE series_id = ? AND is_active = 1),
            updated_at = ?
         WHERE id = ?",
        &[
            SqlValue::Integer(series_id),
            SqlValue::Text(now),
            SqlValue::Integer(series_id),
        ],
    )?;
    Ok(())
}

fn opt_text(value: &Option<String>) -> SqlValue {
    value.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use crate::models::series::{NewSeason, SeriesModel};

    fn seeded() -> (EpisodeModel, SeriesModel) {
        let mut config = DbConfig::test();
        config.seed_enabled = true;
        let db = Arc::new(Database::open(config).unwrap());
        (EpisodeModel::new(Arc::clone(&db)), SeriesModel::new(db))
    }

    fn new_episode(season_id: i64, number: i64, title: &str) -> NewEpisode {
        NewEpisode {
            season_id,
            episode_number: number,
            title: title.into(),
            ..NewEpisode::default()
        }
    }

    #[test]
    fn test_create_maintains_counters() {
        let (episodes, series) = seeded();
        let created = episodes
            .create(&new_episode(1, 3, "...And the Bag's in the River"))
            .unwrap()
            .unwrap();
        assert_eq!(created.series_id, 1);
        assert_eq!(created.season_number, Some(1));

        assert_eq!(series.seasons(1).unwrap()[0].episode_count, 3);
        assert_eq!(series.find_by_id(1).unwrap().unwrap().total_episodes, 3);

        assert!(episodes.soft_delete(created.id).unwrap());
        assert_eq!(series.seasons(1).unwrap()[0].episode_count, 2);
        assert_eq!(series.find_by_id(1).unwrap().unwrap().total_episodes, 2);
        assert!(!episodes.soft_delete(created.id).unwrap());
    }

    #[test]
    fn test_create_under_missing_season() {
        let (episodes, _) = seeded();
        assert!(episodes.create(&new_episode(42, 1, "Nowhere")).unwrap().is_none());
        assert!(episodes.create(&new_episode(1, 9, " ")).is_err());
    }

    #[test]
    fn test_duplicate_episode_number_rolls_back() {
        let (episodes, series) = seeded();
        assert!(episodes.create(&new_episode(1, 1, "Pilot again")).is_err());
        assert_eq!(series.find_by_id(1).unwrap().unwrap().total_episodes, 2);
    }

    #[test]
    fn test_navigation_crosses_seasons() {
        let (episodes, series) = seeded();
        let season2 = series
            .add_season(
                1,
                &NewSeason {
                    season_number: 2,
                    ..NewSeason::default()
                },
            )
            .unwrap()
            .unwrap();
        let s2e1 = episodes.create(&new_episode(season2.id, 1, "Seven Thirty-Seven")).unwrap().unwrap();

        let pilot = episodes.find_by_id(1).unwrap().unwrap();
        assert!(episodes.previous(&pilot).unwrap().is_none());
        assert_eq!(episodes.next(&pilot).unwrap().unwrap().id, 2);

        let s1e2 = episodes.find_by_id(2).unwrap().unwrap();
        assert_eq!(episodes.next(&s1e2).unwrap().unwrap().id, s2e1.id);
        assert_eq!(episodes.previous(&s2e1).unwrap().unwrap().id, 2);
        assert!(episodes.next(&s2e1).unwrap().is_none());

        let order: Vec<_> = episodes.list_for_series(1).unwrap().iter().map(|e| e.id).collect();
        assert_eq!(order, vec![1, 2, s2e1.id]);
        assert_eq!(episodes.list_for_season(season2.id).unwrap().len(), 1);
    }

    #[test]
    fn test_details_and_links() {
        let (episodes, _) = seeded();
        episodes
            .add_link(
                2,
                &NewLink {
                    server_name: "Main".into(),
                    url: "https://cdn.example.com/bb/s01e02.m3u8".into(),
                    link_type: "watch".into(),
                    ..NewLink::default()
                },
            )
            .unwrap();

        let details = episodes.get_details(2).unwrap().unwrap();
        assert_eq!(details.series.slug.as_deref(), Some("breaking-bad"));
        assert_eq!(details.links.len(), 1);
        assert_eq!(details.previous.as_ref().map(|e| e.id), Some(1));
        assert!(details.next.is_none());
        assert!(episodes.get_details(99).unwrap().is_none());
    }

    #[test]
    fn test_counters_and_latest() {
        let (episodes, _) = seeded();
        episodes.increment_views(1).unwrap();
        episodes.increment_downloads(1).unwrap();
        let pilot = episodes.find_by_id(1).unwrap().unwrap();
        assert_eq!(pilot.views_count, 1);
        assert_eq!(pilot.downloads_count, 1);

        let latest = episodes.latest(1).unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].series_title.as_deref(), Some("Breaking Bad"));
    }
}
