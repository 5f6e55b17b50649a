// Person model (cast and crew)

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::constants::CAST_ROLES;
use crate::db::row::{from_row, from_rows, int_bool, row_i64};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};
use crate::model::{window, BaseModel, Conditions, FindOptions, Page, SortOrder};

use super::{to_data, unique_slug};

const SORTABLE: &[&str] = &["name", "views_count", "birth_date"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Person {
    pub id: i64,
    pub name: String,
    pub original_name: Option<String>,
    pub slug: String,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub photo_url: Option<String>,
    pub views_count: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One title a person is credited on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Credit {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub poster_url: Option<String>,
    pub year: Option<i64>,
    pub role: String,
    pub character_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetails {
    #[serde(flatten)]
    pub person: Person,
    pub movies: Vec<Credit>,
    pub series: Vec<Credit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPerson {
    pub name: String,
    pub original_name: Option<String>,
    pub biography: Option<String>,
    pub birth_date: Option<String>,
    pub birth_place: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Clone)]
pub struct PersonModel {
    base: BaseModel,
}

impl PersonModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "people", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Person>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Person>> {
        self.base
            .find_one(&Conditions::new().eq("slug", slug.to_string()))?
            .map(from_row)
            .transpose()
    }

    /// Person with their filmography, newest titles first.
    pub fn get_details(&self, id: i64) -> Result<Option<PersonDetails>> {
        let Some(person) = self.find_by_id(id)? else {
            return Ok(None);
        };
        let movies = from_rows(self.db().query(
            "SELECT m.id, m.title, m.slug, m.poster_url, m.release_year AS year, mc.role, mc.character_name
             FROM movie_cast mc JOIN movies m ON m.id = mc.movie_id
             WHERE mc.person_id = ? AND m.is_active = 1
             ORDER BY m.release_year DESC, m.id DESC",
            &[SqlValue::Integer(id)],
        )?)?;
        let series = from_rows(self.db().query(
            "SELECT s.id, s.title, s.slug, s.poster_url, s.first_air_year AS year, sc.role, sc.character_name
             FROM series_cast sc JOIN series s ON s.id = sc.series_id
             WHERE sc.person_id = ? AND s.is_active = 1
             ORDER BY s.first_air_year DESC, s.id DESC",
            &[SqlValue::Integer(id)],
        )?)?;
        Ok(Some(PersonDetails {
            person,
            movies,
            series,
        }))
    }

    pub fn search(&self, term: &str, limit: i64) -> Result<Vec<Person>> {
        let rows = self.base.search(
            term,
            &["name", "original_name"],
            &Conditions::new(),
            &FindOptions::ordered("views_count", SortOrder::Desc).limit(limit),
        )?;
        from_rows(rows)
    }

    /// Alphabetical page of people, optionally only those credited in `role`.
    pub fn browse(&self, role: Option<&str>, page: i64, per_page: i64) -> Result<Page<Person>> {
        let Some(role) = role else {
            return self
                .base
                .paginate(
                    &Conditions::new(),
                    page,
                    per_page,
                    &FindOptions::ordered("name", SortOrder::Asc),
                )?
                .try_map(from_row);
        };
        if !CAST_ROLES.contains(&role) {
            return Err(DalError::InvalidArgument(format!("unknown cast role '{}'", role)));
        }

        let predicate = "p.is_active = 1 AND (
            EXISTS (SELECT 1 FROM movie_cast mc WHERE mc.person_id = p.id AND mc.role = ?)
            OR EXISTS (SELECT 1 FROM series_cast sc WHERE sc.person_id = p.id AND sc.role = ?))";
        let role_params = [SqlValue::Text(role.to_string()), SqlValue::Text(role.to_string())];

        let total = self
            .db()
            .query_one(
                &format!("SELECT COUNT(*) AS total FROM people p WHERE {}", predicate),
                &role_params,
            )?
            .and_then(|row| row_i64(&row, "total"))
            .unwrap_or(0);

        let win = window(page, per_page);
        let mut params = role_params.to_vec();
        params.push(SqlValue::Integer(win.limit));
        params.push(SqlValue::Integer(win.offset));
        let rows = self.db().query(
            &format!(
                "SELECT p.* FROM people p WHERE {} ORDER BY p.name ASC, p.id ASC LIMIT ? OFFSET ?",
                predicate
            ),
            &params,
        )?;
        Page::new(rows, win.page, win.per_page, total).try_map(from_row)
    }

    pub fn popular(&self, limit: i64) -> Result<Vec<Person>> {
        let rows = self.base.find_all(
            &Conditions::new(),
            &FindOptions::ordered("views_count", SortOrder::Desc).limit(limit),
        )?;
        from_rows(rows)
    }

    pub fn create(&self, person: &NewPerson) -> Result<Person> {
        if person.name.trim().is_empty() {
            return Err(DalError::InvalidArgument("person name is empty".into()));
        }
        let mut data: Row = to_data(person)?;
        self.db().transaction(|tx| {
            data.insert("slug".into(), unique_slug(tx, "people", &person.name)?.into());
            let row = self
                .base
                .create(data)?
                .ok_or_else(|| DalError::InvalidArgument("inserted person is not readable".into()))?;
            from_row(row)
        })
    }

    pub fn increment_views(&self, id: i64) -> Result<bool> {
        self.base.increment(id, "views_count")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;

    fn seeded() -> PersonModel {
        let mut config = DbConfig::test();
        config.seed_enabled = true;
        PersonModel::new(Arc::new(Database::open(config).unwrap()))
    }

    #[test]
    fn test_filmography() {
        let people = seeded();
        let nolan = people.find_by_slug("christopher-nolan").unwrap().unwrap();
        let details = people.get_details(nolan.id).unwrap().unwrap();
        let titles: Vec<_> = details.movies.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["Interstellar", "Inception"]);
        assert!(details.movies.iter().all(|c| c.role == "director"));
        assert!(details.series.is_empty());

        let cranston = people.find_by_slug("bryan-cranston").unwrap().unwrap();
        let details = people.get_details(cranston.id).unwrap().unwrap();
        assert_eq!(details.series.len(), 1);
        assert_eq!(details.series[0].year, Some(2008));
    }

    #[test]
    fn test_browse_by_role() {
        let people = seeded();
        let directors = people.browse(Some("director"), 1, 10).unwrap();
        assert_eq!(directors.total, 1);
        assert_eq!(directors.data[0].name, "Christopher Nolan");

        let actors = people.browse(Some("actor"), 1, 2).unwrap();
        assert_eq!(actors.total, 4);
        assert_eq!(actors.total_pages, 2);
        assert_eq!(actors.data[0].name, "Bryan Cranston");

        let everyone = people.browse(None, 1, 10).unwrap();
        assert_eq!(everyone.total, 5);

        assert!(people.browse(Some("caterer"), 1, 10).is_err());
    }

    #[test]
    fn test_create_search_and_popular() {
        let people = seeded();
        let created = people
            .create(&NewPerson {
                name: "Hayao Miyazaki".into(),
                original_name: Some("宮崎駿".into()),
                ..NewPerson::default()
            })
            .unwrap();
        assert_eq!(created.slug, "hayao-miyazaki");

        people.increment_views(created.id).unwrap();
        assert_eq!(people.popular(1).unwrap()[0].id, created.id);

        let found = people.search("miyazaki", 10).unwrap();
        assert_eq!(found.len(), 1);
        let found = people.search("宮崎", 10).unwrap();
        assert_eq!(found.len(), 1);
    }
}
