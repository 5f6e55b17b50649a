// Category model

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::row::{from_row, from_rows, int_bool};
use crate::db::{Database, Row};
use crate::error::{DalError, Result};
use crate::model::{BaseModel, Conditions, FindOptions, Page, SortOrder};

use super::content::{self, MOVIES, SERIES};
use super::movie::Movie;
use super::series::Series;
use super::{to_data, unique_slug, BrowseFilter};

const SORTABLE: &[&str] = &["name", "sort_order"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    pub sort_order: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct CategoryWithCounts {
    #[serde(flatten)]
    pub category: Category,
    pub movie_count: i64,
    pub series_count: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
}

#[derive(Clone)]
pub struct CategoryModel {
    base: BaseModel,
}

impl CategoryModel {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            base: BaseModel::new(db, "categories", SORTABLE),
        }
    }

    pub fn base(&self) -> &BaseModel {
        &self.base
    }

    fn db(&self) -> &Database {
        self.base.db()
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<Category>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        self.base
            .find_one(&Conditions::new().eq("slug", slug.to_string()))?
            .map(from_row)
            .transpose()
    }

    pub fn list(&self) -> Result<Vec<Category>> {
        let rows = self
            .base
            .find_all(&Conditions::new(), &FindOptions::ordered("sort_order", SortOrder::Asc))?;
        from_rows(rows)
    }

    /// Every active category with the number of active movies and series in it.
    pub fn list_with_counts(&self) -> Result<Vec<CategoryWithCounts>> {
        let rows = self.db().query(
            "SELECT c.*,
                (SELECT COUNT(*) FROM movie_categories mc JOIN movies m ON m.id = mc.movie_id
                 WHERE mc.category_id = c.id AND m.is_active = 1) AS movie_count,
                (SELECT COUNT(*) FROM series_categories sc JOIN series s ON s.id = sc.series_id
                 WHERE sc.category_id = c.id AND s.is_active = 1) AS series_count
             FROM categories c
             WHERE c.is_active = 1
             ORDER BY c.sort_order, c.name",
            &[],
        )?;
        from_rows(rows)
    }

    /// Movies in a category, newest first.
    pub fn movies(&self, slug: &str, page: i64, per_page: i64) -> Result<Page<Movie>> {
        content::browse(self.db(), &MOVIES, &in_category(slug), page, per_page)?.try_map(from_row)
    }

    pub fn series(&self, slug: &str, page: i64, per_page: i64) -> Result<Page<Series>> {
        content::browse(self.db(), &SERIES, &in_category(slug), page, per_page)?.try_map(from_row)
    }

    pub fn create(&self, category: &NewCategory) -> Result<Category> {
        if category.name.trim().is_empty() {
            return Err(DalError::InvalidArgument("category name is empty".into()));
        }
        let mut data: Row = to_data(category)?;
        self.db().transaction(|tx| {
            data.insert("slug".into(), unique_slug(tx, "categories", &category.name)?.into());
            let row = self
                .base
                .create(data)?
                .ok_or_else(|| DalError::InvalidArgument("inserted category is not readable".into()))?;
            from_row(row)
        })
    }
}

fn in_category(slug: &str) -> BrowseFilter {
    BrowseFilter {
        category: Some(slug.to_string()),
        ..BrowseFilter::default()
    }
}
