// Lookup tables: sections, countries, languages, qualities

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::db::row::{from_row, from_rows, int_bool};
use crate::db::Database;
use crate::error::Result;
use crate::model::{BaseModel, Conditions, FindOptions, SortOrder};

const SORTABLE: &[&str] = &["name", "sort_order"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    Section,
    Country,
    Language,
    Quality,
}

impl ReferenceKind {
    pub fn table(&self) -> &'static str {
        match self {
            ReferenceKind::Section => "sections",
            ReferenceKind::Country => "countries",
            ReferenceKind::Language => "languages",
            ReferenceKind::Quality => "qualities",
        }
    }

    /// Natural key used by `find_by_code`.
    pub fn code_column(&self) -> &'static str {
        match self {
            ReferenceKind::Section => "slug",
            ReferenceKind::Country | ReferenceKind::Language => "code",
            ReferenceKind::Quality => "name",
        }
    }
}

/// A lookup row. Columns a table lacks stay None.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct ReferenceItem {
    pub id: i64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    pub sort_order: i64,
    #[serde(deserialize_with = "int_bool")]
    pub is_active: bool,
}

#[derive(Clone)]
pub struct ReferenceModel {
    base: BaseModel,
    kind: ReferenceKind,
}

impl ReferenceModel {
    pub fn new(db: Arc<Database>, kind: ReferenceKind) -> Self {
        Self {
            base: BaseModel::new(db, kind.table(), SORTABLE),
            kind,
        }
    }

    pub fn kind(&self) -> ReferenceKind {
        self.kind
    }

    pub fn list(&self) -> Result<Vec<ReferenceItem>> {
        let rows = self
            .base
            .find_all(&Conditions::new(), &FindOptions::ordered("sort_order", SortOrder::Asc))?;
        from_rows(rows)
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<ReferenceItem>> {
        self.base.find_by_id(id)?.map(from_row).transpose()
    }

    pub fn find_by_code(&self, code: &str) -> Result<Option<ReferenceItem>> {
        self.base
            .find_one(&Conditions::new().eq(self.kind.code_column(), code.to_string()))?
            .map(from_row)
            .transpose()
    }
}
