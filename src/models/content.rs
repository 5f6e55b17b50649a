// Queries shared by movies and series
// Both tables have the same shape (lookups, category junction, cast, counters), so browse,
// search, similar and the association helpers are written once against a table descriptor.

use crate::constants::{CAST_ROLES, LINK_TYPES};
use crate::db::row::{from_rows, now_timestamp, row_i64};
use crate::db::{Database, Row, SqlValue};
use crate::error::{DalError, Result};
use crate::model::{compile_where_qualified, like_any, window, Conditions, Page, SortOrder};

use super::{BrowseFilter, CastMember, ContentKind, MediaLink, NewCastMember, NewLink, Reference};

/// Table layout of one content kind.
#[derive(Debug, Clone, Copy)]
pub struct ContentTable {
    pub kind: ContentKind,
    pub table: &'static str,
    pub category_table: &'static str,
    pub cast_table: &'static str,
    /// Foreign key column in the junction and cast tables.
    pub owner_column: &'static str,
    pub year_column: &'static str,
}

pub const MOVIES: ContentTable = ContentTable {
    kind: ContentKind::Movie,
    table: "movies",
    category_table: "movie_categories",
    cast_table: "movie_cast",
    owner_column: "movie_id",
    year_column: "release_year",
};

pub const SERIES: ContentTable = ContentTable {
    kind: ContentKind::Series,
    table: "series",
    category_table: "series_categories",
    cast_table: "series_cast",
    owner_column: "series_id",
    year_column: "first_air_year",
};

/// Link table layout (movie links, episode links).
#[derive(Debug, Clone, Copy)]
pub struct LinkTable {
    pub table: &'static str,
    pub owner_column: &'static str,
}

pub const MOVIE_LINKS: LinkTable = LinkTable {
    table: "movie_links",
    owner_column: "movie_id",
};

pub const EPISODE_LINKS: LinkTable = LinkTable {
    table: "episode_links",
    owner_column: "episode_id",
};

/// Columns the detail query adds next to `c.*`, consumed by `lift_reference`.
const LOOKUP_COLUMNS: &str = "sec.name AS section_name, sec.slug AS section_slug,
    co.name AS country_name, co.code AS country_code,
    la.name AS language_name, la.code AS language_code,
    q.name AS quality_name";

const LOOKUP_JOINS: &str = "LEFT JOIN sections sec ON sec.id = c.section_id
    LEFT JOIN countries co ON co.id = c.country_id
    LEFT JOIN languages la ON la.id = c.language_id
    LEFT JOIN qualities q ON q.id = c.quality_id";

/// Active row plus its lookup names, by id.
pub fn find_with_lookups(db: &Database, t: &ContentTable, id: i64) -> Result<Option<Row>> {
    let sql = format!(
        "SELECT c.*, {} FROM {} c {} WHERE c.id = ? AND c.is_active = 1",
        LOOKUP_COLUMNS, t.table, LOOKUP_JOINS
    );
    db.query_one(&sql, &[SqlValue::Integer(id)])
}

/// Id of the active row with `slug`.
pub fn id_for_slug(db: &Database, t: &ContentTable, slug: &str) -> Result<Option<i64>> {
    let sql = format!("SELECT id FROM {} WHERE slug = ? AND is_active = 1", t.table);
    Ok(db
        .query_one(&sql, &[SqlValue::Text(slug.to_string())])?
        .and_then(|row| row_i64(&row, "id")))
}

/// Sort column for a browse request. Unknown keys fall back to newest first.
fn browse_sort_column(t: &ContentTable, sort_by: Option<&str>) -> &'static str {
    match sort_by {
        Some("title") => "title",
        Some("year") => t.year_column,
        Some("rating") => "imdb_rating",
        Some("views") | Some("popular") => "views_count",
        Some("downloads") => "downloads_count",
        Some("updated_at") => "updated_at",
        _ => "created_at",
    }
}

/// Filtered, sorted page of active content rows.
pub fn browse(
    db: &Database,
    t: &ContentTable,
    filter: &BrowseFilter,
    page: i64,
    per_page: i64,
) -> Result<Page<Row>> {
    let mut conditions = Conditions::new();
    if let Some(year) = filter.year {
        conditions = conditions.eq(t.year_column, year);
    }
    if let Some(status) = &filter.status {
        conditions = conditions.eq("status", status.clone());
    }
    if let Some(featured) = filter.featured {
        conditions = conditions.eq("is_featured", i64::from(featured));
    }
    let mut clause = compile_where_qualified(&conditions, "c")?;

    if let Some(slug) = &filter.category {
        let fragment = format!(
            "EXISTS (SELECT 1 FROM {} j JOIN categories cat ON cat.id = j.category_id
                     WHERE j.{} = c.id AND cat.slug = ? AND cat.is_active = 1)",
            t.category_table, t.owner_column
        );
        clause = clause.and(&fragment, [SqlValue::Text(slug.clone())]);
    }
    if let Some(slug) = &filter.section {
        clause = clause.and(
            "c.section_id IN (SELECT id FROM sections WHERE slug = ?)",
            [SqlValue::Text(slug.clone())],
        );
    }
    if let Some(code) = &filter.country {
        clause = clause.and(
            "c.country_id IN (SELECT id FROM countries WHERE code = ?)",
            [SqlValue::Text(code.clone())],
        );
    }
    if let Some(code) = &filter.language {
        clause = clause.and(
            "c.language_id IN (SELECT id FROM languages WHERE code = ?)",
            [SqlValue::Text(code.clone())],
        );
    }
    if let Some(name) = &filter.quality {
        clause = clause.and(
            "c.quality_id IN (SELECT id FROM qualities WHERE name = ?)",
            [SqlValue::Text(name.clone())],
        );
    }
    if let Some(min) = filter.min_rating {
        clause = clause.and("c.imdb_rating >= ?", [SqlValue::Real(min)]);
    }

    let win = window(page, per_page);
    let count_sql = format!("SELECT COUNT(*) AS total FROM {} c {}", t.table, clause.to_sql());
    let total = db
        .query_one(&count_sql, &clause.params)?
        .and_then(|row| row_i64(&row, "total"))
        .unwrap_or(0);

    let column = browse_sort_column(t, filter.sort_by.as_deref());
    let order = SortOrder::parse(filter.sort_order.as_deref()).as_sql();
    let sql = format!(
        "SELECT c.* FROM {} c {} ORDER BY c.{} {} NULLS LAST, c.id {} LIMIT ? OFFSET ?",
        t.table,
        clause.to_sql(),
        column,
        order,
        order
    );
    let mut params = clause.params;
    params.push(SqlValue::Integer(win.limit));
    params.push(SqlValue::Integer(win.offset));
    let rows = db.query(&sql, &params)?;

    Ok(Page::new(rows, win.page, win.per_page, total))
}

/// Title search ranked exact match, then prefix match, then anything else; views break ties.
pub fn search(db: &Database, t: &ContentTable, term: &str, page: i64, per_page: i64) -> Result<Page<Row>> {
    let win = window(page, per_page);
    let Some((fragment, like_params)) =
        like_any(term, &["c.title", "c.original_title", "c.description"])?
    else {
        return Ok(Page::new(Vec::new(), win.page, win.per_page, 0));
    };
    let term = term.trim();

    let count_sql = format!(
        "SELECT COUNT(*) AS total FROM {} c WHERE c.is_active = 1 AND {}",
        t.table, fragment
    );
    let total = db
        .query_one(&count_sql, &like_params)?
        .and_then(|row| row_i64(&row, "total"))
        .unwrap_or(0);

    let sql = format!(
        "SELECT c.*,
            CASE WHEN c.title LIKE ? THEN 0 WHEN c.title LIKE ? THEN 1 ELSE 2 END AS relevance
         FROM {} c WHERE c.is_active = 1 AND {}
         ORDER BY relevance, c.views_count DESC, c.id DESC LIMIT ? OFFSET ?",
        t.table, fragment
    );
    let mut params = vec![
        SqlValue::Text(term.to_string()),
        SqlValue::Text(format!("{}%", term)),
    ];
    params.extend(like_params);
    params.push(SqlValue::Integer(win.limit));
    params.push(SqlValue::Integer(win.offset));
    let rows = db.query(&sql, &params)?;

    Ok(Page::new(rows, win.page, win.per_page, total))
}

/// Active titles sharing a category with `id`, best rated first.
pub fn similar(db: &Database, t: &ContentTable, id: i64, limit: i64) -> Result<Vec<Row>> {
    let sql = format!(
        "SELECT DISTINCT c.* FROM {table} c
         JOIN {junction} j ON j.{owner} = c.id
         WHERE j.category_id IN (SELECT category_id FROM {junction} WHERE {owner} = ?)
           AND c.id != ? AND c.is_active = 1
         ORDER BY c.imdb_rating DESC, c.views_count DESC, c.id DESC
         LIMIT ?",
        table = t.table,
        junction = t.category_table,
        owner = t.owner_column
    );
    db.query(
        &sql,
        &[SqlValue::Integer(id), SqlValue::Integer(id), SqlValue::Integer(limit)],
    )
}

pub fn categories_for(db: &Database, t: &ContentTable, id: i64) -> Result<Vec<Reference>> {
    let sql = format!(
        "SELECT cat.id, cat.name, cat.slug FROM categories cat
         JOIN {} j ON j.category_id = cat.id
         WHERE j.{} = ? AND cat.is_active = 1
         ORDER BY cat.sort_order, cat.name",
        t.category_table, t.owner_column
    );
    from_rows(db.query(&sql, &[SqlValue::Integer(id)])?)
}

pub fn cast_for(db: &Database, t: &ContentTable, id: i64) -> Result<Vec<CastMember>> {
    let sql = format!(
        "SELECT p.id AS person_id, p.name, p.slug, p.photo_url, x.role, x.character_name, x.sort_order
         FROM {} x JOIN people p ON p.id = x.person_id
         WHERE x.{} = ? AND p.is_active = 1
         ORDER BY x.sort_order, p.name",
        t.cast_table, t.owner_column
    );
    from_rows(db.query(&sql, &[SqlValue::Integer(id)])?)
}

pub fn links_for(db: &Database, l: &LinkTable, owner_id: i64) -> Result<Vec<MediaLink>> {
    let sql = format!(
        "SELECT l.id, l.server_name, l.url, l.link_type, q.name AS quality, l.file_size, l.sort_order
         FROM {} l LEFT JOIN qualities q ON q.id = l.quality_id
         WHERE l.{} = ? AND l.is_active = 1
         ORDER BY l.link_type DESC, l.sort_order, l.id",
        l.table, l.owner_column
    );
    from_rows(db.query(&sql, &[SqlValue::Integer(owner_id)])?)
}

/// Replace the category set of a title.
pub fn set_categories(db: &Database, t: &ContentTable, id: i64, category_ids: &[i64]) -> Result<()> {
    db.transaction(|tx| {
        tx.execute(
            &format!("DELETE FROM {} WHERE {} = ?", t.category_table, t.owner_column),
            &[SqlValue::Integer(id)],
        )?;
        let insert = format!(
            "INSERT OR IGNORE INTO {} ({}, category_id) VALUES (?, ?)",
            t.category_table, t.owner_column
        );
        for category_id in category_ids {
            tx.execute(&insert, &[SqlValue::Integer(id), SqlValue::Integer(*category_id)])?;
        }
        Ok(())
    })
}

/// Credit a person. Re-crediting the same person in the same role replaces the entry.
pub fn add_cast(db: &Database, t: &ContentTable, id: i64, member: &NewCastMember) -> Result<()> {
    if !CAST_ROLES.contains(&member.role.as_str()) {
        return Err(DalError::InvalidArgument(format!("unknown cast role '{}'", member.role)));
    }
    let sql = format!(
        "INSERT OR REPLACE INTO {} ({}, person_id, role, character_name, sort_order)
         VALUES (?, ?, ?, ?, ?)",
        t.cast_table, t.owner_column
    );
    db.execute(
        &sql,
        &[
            SqlValue::Integer(id),
            SqlValue::Integer(member.person_id),
            SqlValue::Text(member.role.clone()),
            member.character_name.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
            SqlValue::Integer(member.sort_order),
        ],
    )?;
    Ok(())
}

/// Attach a link. Returns the new link id.
pub fn add_link(db: &Database, l: &LinkTable, owner_id: i64, link: &NewLink) -> Result<i64> {
    if !LINK_TYPES.contains(&link.link_type.as_str()) {
        return Err(DalError::InvalidArgument(format!("unknown link type '{}'", link.link_type)));
    }
    if link.url.trim().is_empty() {
        return Err(DalError::InvalidArgument("link url is empty".into()));
    }
    let now = now_timestamp();
    let sql = format!(
        "INSERT INTO {} ({}, server_name, url, link_type, quality_id, file_size, sort_order, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        l.table, l.owner_column
    );
    let result = db.execute(
        &sql,
        &[
            SqlValue::Integer(owner_id),
            SqlValue::Text(link.server_name.clone()),
            SqlValue::Text(link.url.clone()),
            SqlValue::Text(link.link_type.clone()),
            link.quality_id.map(SqlValue::Integer).unwrap_or(SqlValue::Null),
            link.file_size.clone().map(SqlValue::Text).unwrap_or(SqlValue::Null),
            SqlValue::Integer(link.sort_order),
            SqlValue::Text(now.clone()),
            SqlValue::Text(now),
        ],
    )?;
    Ok(result.last_insert_id)
}
