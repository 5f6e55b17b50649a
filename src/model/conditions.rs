// Condition maps and WHERE clause compilation
// Values are always bound positionally; only validated column names reach the SQL text.

use std::sync::LazyLock;

use regex::Regex;

use crate::db::SqlValue;
use crate::error::{DalError, Result};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier regex"));

/// Wildcard marker that turns a text value into a LIKE predicate.
pub const WILDCARD: char = '%';

/// The column every entity table uses for soft deletes.
pub const ACTIVE_COLUMN: &str = "is_active";

/// Check that `name` is a bare column identifier safe to splice into SQL.
pub fn validate_column(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(DalError::InvalidColumn(name.to_string()))
    }
}

/// A single column constraint.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `col = ?`
    Eq(SqlValue),
    /// `col IN (?, ?, ...)`
    In(Vec<SqlValue>),
    /// `col IS NULL`
    IsNull,
    /// `col LIKE ?`
    Like(String),
}

impl Condition {
    /// Pick the predicate from the value's shape: NULL is IS NULL, text with a
    /// wildcard is LIKE, anything else is equality.
    pub fn from_value(value: SqlValue) -> Self {
        match value {
            SqlValue::Null => Condition::IsNull,
            SqlValue::Text(s) if s.contains(WILDCARD) => Condition::Like(s),
            other => Condition::Eq(other),
        }
    }
}

/// Ordered column -> condition map. Re-adding a column replaces its condition in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conditions {
    entries: Vec<(String, Condition)>,
}

impl Conditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, condition: Condition) -> Self {
        self.set(column, condition);
        self
    }

    pub fn set(&mut self, column: impl Into<String>, condition: Condition) {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = condition,
            None => self.entries.push((column, condition)),
        }
    }

    /// Constraint inferred from the value (see `Condition::from_value`).
    pub fn value(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(column, Condition::from_value(value.into()))
    }

    pub fn eq(self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.with(column, Condition::Eq(value.into()))
    }

    pub fn is_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.with(column, Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn is_null(self, column: impl Into<String>) -> Self {
        self.with(column, Condition::IsNull)
    }

    pub fn like(self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(column, Condition::Like(pattern.into()))
    }

    /// Include inactive rows too (`is_active = 0`) or only them, overriding the default.
    pub fn active(self, active: bool) -> Self {
        self.eq(ACTIVE_COLUMN, i64::from(active))
    }

    pub fn contains(&self, column: &str) -> bool {
        self.entries.iter().any(|(c, _)| c == column)
    }

    pub fn get(&self, column: &str) -> Option<&Condition> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, cond)| cond)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Condition)> {
        self.entries.iter().map(|(c, cond)| (c.as_str(), cond))
    }
}

/// A compiled predicate and its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub predicate: String,
    pub params: Vec<SqlValue>,
}

impl WhereClause {
    /// `WHERE <predicate>`
    pub fn to_sql(&self) -> String {
        format!("WHERE {}", self.predicate)
    }

    /// AND another fragment onto the predicate.
    pub fn and(mut self, fragment: &str, params: impl IntoIterator<Item = SqlValue>) -> Self {
        self.predicate = format!("{} AND {}", self.predicate, fragment);
        self.params.extend(params);
        self
    }
}

/// Compile a condition map into a WHERE predicate.
///
/// An empty map becomes `is_active = 1`. Otherwise `is_active = 1` is appended unless the
/// caller constrained `is_active` explicitly, and each entry compiles in order to
/// `IS NULL`, `IN (...)`, `LIKE ?` or `= ?`, joined with AND.
pub fn compile_where(conditions: &Conditions) -> Result<WhereClause> {
    compile(conditions, None)
}

/// Same as `compile_where`, qualifying every column with a table alias (`m.title`).
pub fn compile_where_qualified(conditions: &Conditions, alias: &str) -> Result<WhereClause> {
    validate_column(alias)?;
    compile(conditions, Some(alias))
}

fn compile(conditions: &Conditions, alias: Option<&str>) -> Result<WhereClause> {
    let qualify = |column: &str| match alias {
        Some(a) => format!("{}.{}", a, column),
        None => column.to_string(),
    };

    if conditions.is_empty() {
        return Ok(WhereClause {
            predicate: format!("{} = 1", qualify(ACTIVE_COLUMN)),
            params: Vec::new(),
        });
    }

    let mut conditions = conditions.clone();
    if !conditions.contains(ACTIVE_COLUMN) {
        conditions.set(ACTIVE_COLUMN, Condition::Eq(SqlValue::Integer(1)));
    }

    let mut fragments = Vec::with_capacity(conditions.len());
    let mut params = Vec::new();
    for (column, condition) in conditions.iter() {
        let column = qualify(validate_column(column)?);
        match condition {
            Condition::IsNull => fragments.push(format!("{} IS NULL", column)),
            Condition::In(values) => {
                let placeholders = vec!["?"; values.len()].join(", ");
                fragments.push(format!("{} IN ({})", column, placeholders));
                params.extend(values.iter().cloned());
            }
            Condition::Like(pattern) => {
                fragments.push(format!("{} LIKE ?", column));
                params.push(SqlValue::Text(pattern.clone()));
            }
            Condition::Eq(value) => {
                fragments.push(format!("{} = ?", column));
                params.push(value.clone());
            }
        }
    }

    Ok(WhereClause {
        predicate: fragments.join(" AND "),
        params,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> SqlValue {
        SqlValue::Text(s.to_string())
    }

    #[test]
    fn test_empty_map_defaults_to_active() {
        let clause = compile_where(&Conditions::new()).unwrap();
        assert_eq!(clause.to_sql(), "WHERE is_active = 1");
        assert!(clause.params.is_empty());
    }

    #[test]
    fn test_mixed_predicates_compile_in_order() {
        let conditions = Conditions::new()
            .value("status", SqlValue::Null)
            .is_in("tags", [1i64, 2])
            .value("name", text("%abc%"));

        let clause = compile_where(&conditions).unwrap();
        assert_eq!(
            clause.predicate,
            "status IS NULL AND tags IN (?, ?) AND name LIKE ? AND is_active = ?"
        );
        assert_eq!(
            clause.params,
            vec![SqlValue::Integer(1), SqlValue::Integer(2), text("%abc%"), SqlValue::Integer(1)]
        );
    }

    #[test]
    fn test_explicit_is_active_is_not_overridden() {
        let conditions = Conditions::new().eq("section_id", 3i64).active(false);
        let clause = compile_where(&conditions).unwrap();
        assert_eq!(clause.predicate, "section_id = ? AND is_active = ?");
        assert_eq!(clause.params, vec![SqlValue::Integer(3), SqlValue::Integer(0)]);
    }

    #[test]
    fn test_plain_text_is_equality() {
        let conditions = Conditions::new().value("slug", text("inception"));
        let clause = compile_where(&conditions).unwrap();
        assert_eq!(clause.predicate, "slug = ? AND is_active = ?");
    }

    #[test]
    fn test_setting_a_column_twice_replaces_it() {
        let conditions = Conditions::new().eq("year", 2010i64).eq("year", 2014i64);
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions.get("year"), Some(&Condition::Eq(SqlValue::Integer(2014))));
    }

    #[test]
    fn test_qualified_columns() {
        let conditions = Conditions::new().eq("section_id", 1i64);
        let clause = compile_where_qualified(&conditions, "m").unwrap();
        assert_eq!(clause.predicate, "m.section_id = ? AND m.is_active = ?");

        let clause = compile_where_qualified(&Conditions::new(), "m").unwrap();
        assert_eq!(clause.predicate, "m.is_active = 1");
    }

    #[test]
    fn test_injection_in_column_name_is_rejected() {
        let conditions = Conditions::new().eq("id = 1 OR 1", 1i64);
        let err = compile_where(&conditions).unwrap_err();
        assert!(matches!(err, DalError::InvalidColumn(_)));
    }

    #[test]
    fn test_values_never_reach_sql_text() {
        let conditions = Conditions::new().eq("title", text("x'; DROP TABLE movies; --"));
        let clause = compile_where(&conditions).unwrap();
        assert!(!clause.predicate.contains("DROP"));
        assert_eq!(clause.params[0], text("x'; DROP TABLE movies; --"));
    }

    #[test]
    fn test_and_appends_fragment() {
        let clause = compile_where(&Conditions::new())
            .unwrap()
            .and("views_count > ?", [SqlValue::Integer(0)]);
        assert_eq!(clause.to_sql(), "WHERE is_active = 1 AND views_count > ?");
        assert_eq!(clause.params, vec![SqlValue::Integer(0)]);
    }
}
