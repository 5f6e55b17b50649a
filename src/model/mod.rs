// Generic table model
// Condition compilation, pagination, soft deletes and the canned list queries shared by every
// entity. Rows come back as dynamic `Row`s; entity models lift them into typed structs.

pub mod conditions;
pub mod pagination;

use std::sync::Arc;

use crate::db::row::{json_to_sql, now_timestamp, row_i64};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};

pub use conditions::{compile_where, compile_where_qualified, Condition, Conditions, WhereClause};
pub use pagination::{window, Page, PageWindow};

use conditions::{validate_column, ACTIVE_COLUMN};

/// Columns every table can be ordered by.
const ALWAYS_SORTABLE: [&str; 3] = ["id", "created_at", "updated_at"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }

    /// "asc" (any case) is ascending, everything else descending.
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        }
    }
}

/// Ordering and windowing for list queries.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Column to order by; must be in the model's sortable list. Defaults to created_at.
    pub order_by: Option<String>,
    pub order: SortOrder,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FindOptions {
    pub fn ordered(column: &str, order: SortOrder) -> Self {
        Self {
            order_by: Some(column.to_string()),
            order,
            ..Self::default()
        }
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// CRUD and list queries for one table.
#[derive(Clone)]
pub struct BaseModel {
    db: Arc<Database>,
    table: &'static str,
    sortable: &'static [&'static str],
}

impl BaseModel {
    pub fn new(db: Arc<Database>, table: &'static str, sortable: &'static [&'static str]) -> Self {
        Self { db, table, sortable }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Active row by primary key.
    pub fn find_by_id(&self, id: i64) -> Result<Option<Row>> {
        let sql = format!("SELECT * FROM {} WHERE id = ? AND is_active = 1", self.table);
        self.db.query_one(&sql, &[SqlValue::Integer(id)])
    }

    pub fn find_one(&self, conditions: &Conditions) -> Result<Option<Row>> {
        let clause = compile_where(conditions)?;
        let sql = format!("SELECT * FROM {} {} LIMIT 1", self.table, clause.to_sql());
        self.db.query_one(&sql, &clause.params)
    }

    pub fn find_all(&self, conditions: &Conditions, options: &FindOptions) -> Result<Vec<Row>> {
        let clause = compile_where(conditions)?;
        self.select_where(clause, options)
    }

    pub fn count(&self, conditions: &Conditions) -> Result<i64> {
        let clause = compile_where(conditions)?;
        self.count_where(&clause)
    }

    /// Insert a row, stamping timestamps when absent, and return it re-read by id.
    pub fn create(&self, mut data: Row) -> Result<Option<Row>> {
        if data.is_empty() {
            return Err(DalError::InvalidArgument(format!("nothing to insert into {}", self.table)));
        }
        let now = now_timestamp();
        data.entry("created_at").or_insert_with(|| now.clone().into());
        data.entry("updated_at").or_insert_with(|| now.into());

        let mut columns = Vec::with_capacity(data.len());
        let mut params = Vec::with_capacity(data.len());
        for (column, value) in &data {
            columns.push(validate_column(column)?);
            params.push(json_to_sql(value));
        }
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders
        );

        let result = self.db.execute(&sql, &params)?;
        self.find_by_id(result.last_insert_id)
    }

    /// Partial update. Returns the re-read row, or None if nothing matched.
    pub fn update(&self, id: i64, mut data: Row) -> Result<Option<Row>> {
        data.remove("id");
        data.insert("updated_at".to_string(), now_timestamp().into());

        let mut assignments = Vec::with_capacity(data.len());
        let mut params = Vec::with_capacity(data.len() + 1);
        for (column, value) in &data {
            assignments.push(format!("{} = ?", validate_column(column)?));
            params.push(json_to_sql(value));
        }
        params.push(SqlValue::Integer(id));
        let sql = format!("UPDATE {} SET {} WHERE id = ?", self.table, assignments.join(", "));

        let result = self.db.execute(&sql, &params)?;
        if result.changes > 0 {
            self.find_by_id(id)
        } else {
            Ok(None)
        }
    }

    /// Soft delete: the row stays, flagged inactive.
    pub fn delete(&self, id: i64) -> Result<bool> {
        let sql = format!(
            "UPDATE {} SET {} = 0, updated_at = ? WHERE id = ?",
            self.table, ACTIVE_COLUMN
        );
        let result = self
            .db
            .execute(&sql, &[SqlValue::Text(now_timestamp()), SqlValue::Integer(id)])?;
        Ok(result.changes > 0)
    }

    /// Hard delete. Administrative cleanup only.
    pub fn destroy(&self, id: i64) -> Result<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.table);
        let result = self.db.execute(&sql, &[SqlValue::Integer(id)])?;
        Ok(result.changes > 0)
    }

    /// Count plus one windowed page of rows.
    pub fn paginate(
        &self,
        conditions: &Conditions,
        page: i64,
        per_page: i64,
        options: &FindOptions,
    ) -> Result<Page<Row>> {
        let win = window(page, per_page);
        let clause = compile_where(conditions)?;
        let total = self.count_where(&clause)?;

        let options = FindOptions {
            limit: Some(win.limit),
            offset: Some(win.offset),
            ..options.clone()
        };
        let data = self.select_where(clause, &options)?;
        Ok(Page::new(data, win.page, win.per_page, total))
    }

    /// `%term%` LIKE across `fields` (ORed), ANDed with the conditions.
    pub fn search(
        &self,
        term: &str,
        fields: &[&str],
        conditions: &Conditions,
        options: &FindOptions,
    ) -> Result<Vec<Row>> {
        let clause = compile_where(conditions)?;
        let clause = match like_any(term, fields)? {
            Some((fragment, params)) => clause.and(&fragment, params),
            None => clause,
        };
        self.select_where(clause, options)
    }

    pub fn get_recent(&self, limit: i64) -> Result<Vec<Row>> {
        self.find_all(
            &Conditions::new(),
            &FindOptions::ordered("created_at", SortOrder::Desc).limit(limit),
        )
    }

    /// Most viewed rows. Only meaningful for tables with a views_count column.
    pub fn get_trending(&self, limit: i64) -> Result<Vec<Row>> {
        let sql = format!(
            "SELECT * FROM {} WHERE is_active = 1 AND views_count > 0
             ORDER BY views_count DESC, id DESC LIMIT ?",
            self.table
        );
        self.db.query(&sql, &[SqlValue::Integer(limit)])
    }

    /// `counter = counter + 1` in a single statement.
    pub fn increment(&self, id: i64, column: &str) -> Result<bool> {
        let column = validate_column(column)?;
        let sql = format!(
            "UPDATE {} SET {} = {} + 1, updated_at = ? WHERE id = ?",
            self.table, column, column
        );
        let result = self
            .db
            .execute(&sql, &[SqlValue::Text(now_timestamp()), SqlValue::Integer(id)])?;
        Ok(result.changes > 0)
    }

    /// Read one integer column of a row regardless of its active flag.
    pub fn column_value(&self, id: i64, column: &str) -> Result<Option<i64>> {
        let column = validate_column(column)?;
        let sql = format!("SELECT {} AS value FROM {} WHERE id = ?", column, self.table);
        Ok(self
            .db
            .query_one(&sql, &[SqlValue::Integer(id)])?
            .and_then(|row| row_i64(&row, "value")))
    }

    fn count_where(&self, clause: &WhereClause) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) AS total FROM {} {}", self.table, clause.to_sql());
        Ok(self
            .db
            .query_one(&sql, &clause.params)?
            .and_then(|row| row_i64(&row, "total"))
            .unwrap_or(0))
    }

    fn select_where(&self, clause: WhereClause, options: &FindOptions) -> Result<Vec<Row>> {
        let order = self.order_clause(options)?;
        let where_sql = clause.to_sql();
        let mut params = clause.params;
        let window = window_clause(options, &mut params);
        let sql = format!("SELECT * FROM {} {} {}{}", self.table, where_sql, order, window);
        self.db.query(&sql, &params)
    }

    fn order_clause(&self, options: &FindOptions) -> Result<String> {
        let column = options.order_by.as_deref().unwrap_or("created_at");
        validate_column(column)?;
        let allowed = ALWAYS_SORTABLE.contains(&column) || self.sortable.contains(&column);
        if !allowed {
            return Err(DalError::InvalidSortColumn {
                table: self.table.to_string(),
                column: column.to_string(),
            });
        }
        let order = options.order.as_sql();
        // id breaks ties so page windows never overlap or skip rows
        if column == "id" {
            Ok(format!("ORDER BY id {}", order))
        } else {
            Ok(format!("ORDER BY {} {}, id {}", column, order, order))
        }
    }
}

/// `LIMIT ?` / `OFFSET ?` tail. OFFSET is only emitted when requested.
pub fn window_clause(options: &FindOptions, params: &mut Vec<SqlValue>) -> String {
    match (options.limit, options.offset) {
        (Some(limit), Some(offset)) => {
            params.push(SqlValue::Integer(limit));
            params.push(SqlValue::Integer(offset));
            " LIMIT ? OFFSET ?".to_string()
        }
        (Some(limit), None) => {
            params.push(SqlValue::Integer(limit));
            " LIMIT ?".to_string()
        }
        (None, Some(offset)) => {
            params.push(SqlValue::Integer(offset));
            " LIMIT -1 OFFSET ?".to_string()
        }
        (None, None) => String::new(),
    }
}

/// `(f1 LIKE ? OR f2 LIKE ?)` for a search term, or None when there is nothing to match.
pub fn like_any(term: &str, fields: &[&str]) -> Result<Option<(String, Vec<SqlValue>)>> {
    let term = term.trim();
    if term.is_empty() || fields.is_empty() {
        return Ok(None);
    }
    let pattern = format!("%{}%", term);
    let mut fragments = Vec::with_capacity(fields.len());
    for field in fields {
        fragments.push(format!("{} LIKE ?", qualified_column(field)?));
    }
    let params = vec![SqlValue::Text(pattern); fields.len()];
    Ok(Some((format!("({})", fragments.join(" OR ")), params)))
}

/// Accept `column` or `alias.column`.
fn qualified_column(name: &str) -> Result<&str> {
    match name.split_once('.') {
        Some((alias, column)) => {
            validate_column(alias)?;
            validate_column(column)?;
            Ok(name)
        }
        None => validate_column(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use serde_json::json;

    const MOVIE_SORTABLE: &[&str] = &["title", "views_count", "release_year", "sort_order"];

    fn setup() -> (Arc<Database>, BaseModel) {
        let db = Arc::new(Database::open(DbConfig::test()).unwrap());
        let movies = BaseModel::new(Arc::clone(&db), "movies", MOVIE_SORTABLE);
        (db, movies)
    }

    fn movie(title: &str, slug: &str) -> Row {
        let mut row = Row::new();
        row.insert("title".into(), json!(title));
        row.insert("slug".into(), json!(slug));
        row
    }

    fn create(model: &BaseModel, title: &str, slug: &str) -> i64 {
        let row = model.create(movie(title, slug)).unwrap().unwrap();
        row_i64(&row, "id").unwrap()
    }

    #[test]
    fn test_create_stamps_and_refetches() {
        let (_db, movies) = setup();
        let row = movies.create(movie("Test", "test")).unwrap().unwrap();
        assert_eq!(row["title"], json!("Test"));
        assert_eq!(row["is_active"], json!(1));
        assert!(row["created_at"].as_str().is_some());
        assert_eq!(row["created_at"], row["updated_at"]);
    }

    #[test]
    fn test_end_to_end_soft_delete_scenario() {
        let (_db, movies) = setup();
        let id = create(&movies, "Test", "test");

        let found = movies.find_by_id(id).unwrap().unwrap();
        assert_eq!(found["is_active"], json!(1));
        let by_slug = movies
            .find_one(&Conditions::new().eq("slug", "test".to_string()))
            .unwrap()
            .unwrap();
        assert_eq!(row_i64(&by_slug, "id"), Some(id));

        for _ in 0..3 {
            assert!(movies.increment(id, "views_count").unwrap());
        }
        assert_eq!(movies.column_value(id, "views_count").unwrap(), Some(3));

        assert!(movies.delete(id).unwrap());
        assert!(movies.find_by_id(id).unwrap().is_none());
        assert!(movies.find_all(&Conditions::new(), &FindOptions::default()).unwrap().is_empty());

        let inactive = movies
            .find_all(&Conditions::new().active(false), &FindOptions::default())
            .unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(row_i64(&inactive[0], "id"), Some(id));
        assert_eq!(movies.column_value(id, "is_active").unwrap(), Some(0));
    }

    #[test]
    fn test_destroy_removes_row() {
        let (_db, movies) = setup();
        let id = create(&movies, "Gone", "gone");
        assert!(movies.destroy(id).unwrap());
        assert_eq!(movies.column_value(id, "id").unwrap(), None);
        assert!(!movies.destroy(id).unwrap());
    }

    #[test]
    fn test_update_is_partial() {
        let (_db, movies) = setup();
        let id = create(&movies, "Before", "before");

        let mut changes = Row::new();
        changes.insert("title".into(), json!("After"));
        let updated = movies.update(id, changes).unwrap().unwrap();
        assert_eq!(updated["title"], json!("After"));
        assert_eq!(updated["slug"], json!("before"));

        let mut changes = Row::new();
        changes.insert("title".into(), json!("Nobody"));
        assert!(movies.update(9_999, changes).unwrap().is_none());
    }

    #[test]
    fn test_pages_cover_result_set_exactly_once() {
        let (_db, movies) = setup();
        for i in 0..23 {
            create(&movies, &format!("Movie {:02}", i), &format!("movie-{:02}", i));
        }
        let options = FindOptions::ordered("title", SortOrder::Asc);
        let all = movies.find_all(&Conditions::new(), &options).unwrap();
        assert_eq!(all.len(), 23);

        let mut collected = Vec::new();
        let mut page_no = 1;
        loop {
            let page = movies.paginate(&Conditions::new(), page_no, 5, &options).unwrap();
            assert_eq!(page.total, 23);
            assert_eq!(page.total_pages, 5);
            assert_eq!(page.has_next, page_no < 5);
            collected.extend(page.data);
            if !page.has_next {
                break;
            }
            page_no += 1;
        }
        assert_eq!(collected, all);
    }

    #[test]
    fn test_page_size_is_not_capped() {
        let (_db, movies) = setup();
        for i in 0..120 {
            create(&movies, &format!("Movie {:03}", i), &format!("movie-{:03}", i));
        }
        let page = movies
            .paginate(&Conditions::new(), 1, 150, &FindOptions::default())
            .unwrap();
        assert_eq!(page.per_page, 150);
        assert_eq!(page.data.len(), 120);
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn test_page_far_past_the_end_is_empty() {
        let (_db, movies) = setup();
        create(&movies, "Only", "only");
        let page = movies
            .paginate(&Conditions::new(), i64::MAX, 20, &FindOptions::default())
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, 1);
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn test_default_order_is_newest_first() {
        let (_db, movies) = setup();
        let first = create(&movies, "First", "first");
        let second = create(&movies, "Second", "second");
        let rows = movies.find_all(&Conditions::new(), &FindOptions::default()).unwrap();
        // Same created_at second: id breaks the tie, newest first
        assert_eq!(row_i64(&rows[0], "id"), Some(second));
        assert_eq!(row_i64(&rows[1], "id"), Some(first));
    }

    #[test]
    fn test_unlisted_sort_column_is_rejected() {
        let (_db, movies) = setup();
        let options = FindOptions::ordered("description", SortOrder::Asc);
        let err = movies.find_all(&Conditions::new(), &options).unwrap_err();
        assert!(matches!(err, DalError::InvalidSortColumn { .. }));

        let options = FindOptions::ordered("title; DROP TABLE movies", SortOrder::Asc);
        assert!(movies.find_all(&Conditions::new(), &options).is_err());
    }

    #[test]
    fn test_window_clause_variants() {
        let mut params = Vec::new();
        assert_eq!(window_clause(&FindOptions::default().limit(5), &mut params), " LIMIT ?");
        assert_eq!(params, vec![SqlValue::Integer(5)]);

        let mut params = Vec::new();
        assert_eq!(
            window_clause(&FindOptions::default().offset(10), &mut params),
            " LIMIT -1 OFFSET ?"
        );

        let mut params = Vec::new();
        assert_eq!(window_clause(&FindOptions::default(), &mut params), "");
        assert!(params.is_empty());
    }

    #[test]
    fn test_search_ors_fields_and_respects_conditions() {
        let (_db, movies) = setup();
        create(&movies, "The Dark Knight", "the-dark-knight");
        let mut dark = movie("Dark City", "dark-city");
        dark.insert("description".into(), json!("noir"));
        movies.create(dark).unwrap();
        let mut other = movie("Daylight", "daylight");
        other.insert("description".into(), json!("a dark tunnel"));
        let other_id = row_i64(&movies.create(other).unwrap().unwrap(), "id").unwrap();
        create(&movies, "Comedy", "comedy");

        let hits = movies
            .search("dark", &["title", "description"], &Conditions::new(), &FindOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 3);

        movies.delete(other_id).unwrap();
        let hits = movies
            .search("dark", &["title", "description"], &Conditions::new(), &FindOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 2, "inactive rows are excluded");
    }

    #[test]
    fn test_recent_and_trending() {
        let (_db, movies) = setup();
        let a = create(&movies, "A", "a");
        let b = create(&movies, "B", "b");
        create(&movies, "C", "c");
        movies.increment(a, "views_count").unwrap();
        movies.increment(b, "views_count").unwrap();
        movies.increment(b, "views_count").unwrap();

        let trending = movies.get_trending(10).unwrap();
        assert_eq!(trending.len(), 2, "unviewed rows are not trending");
        assert_eq!(row_i64(&trending[0], "id"), Some(b));

        assert_eq!(movies.get_recent(2).unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let (_db, movies) = setup();
        let id = create(&movies, "Popular", "popular");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let movies = movies.clone();
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        movies.increment(id, "views_count").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(movies.column_value(id, "views_count").unwrap(), Some(200));
    }

    #[test]
    fn test_count_with_conditions() {
        let (_db, movies) = setup();
        let mut row = movie("Old", "old");
        row.insert("release_year".into(), json!(1999));
        movies.create(row).unwrap();
        create(&movies, "Undated", "undated");

        assert_eq!(movies.count(&Conditions::new()).unwrap(), 2);
        assert_eq!(movies.count(&Conditions::new().is_null("release_year")).unwrap(), 1);
        assert_eq!(movies.count(&Conditions::new().is_in("release_year", [1999i64, 2000])).unwrap(), 1);
    }
}
