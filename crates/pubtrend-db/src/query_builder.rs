//! Parameterized query composition for listing endpoints.
//!
//! SQL text is assembled only from `&'static str` fragments. Every value that
//! originates from a request (search pattern, ids, limit, offset) goes into a
//! numbered bind slot, and the sort column and direction are resolved against
//! a static allow-list before they reach the text.

use chrono::{DateTime, Utc};
use pubtrend_core::CoreError;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, Postgres};

/// Searches this short or shorter are ignored.
pub const MIN_SEARCH_CHARS: usize = 4;

/// A value bound to a numbered placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Int(i64),
    Float(f64),
    TextArray(Vec<String>),
    Timestamp(DateTime<Utc>),
}

impl From<&str> for BindValue {
    fn from(value: &str) -> Self {
        BindValue::Text(value.to_string())
    }
}

impl From<String> for BindValue {
    fn from(value: String) -> Self {
        BindValue::Text(value)
    }
}

impl From<i64> for BindValue {
    fn from(value: i64) -> Self {
        BindValue::Int(value)
    }
}

impl From<f64> for BindValue {
    fn from(value: f64) -> Self {
        BindValue::Float(value)
    }
}

impl From<Vec<String>> for BindValue {
    fn from(value: Vec<String>) -> Self {
        BindValue::TextArray(value)
    }
}

impl From<DateTime<Utc>> for BindValue {
    fn from(value: DateTime<Utc>) -> Self {
        BindValue::Timestamp(value)
    }
}

/// Finished query text plus its bind values, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct SafeQuery {
    sql: String,
    params: Vec<BindValue>,
}

impl SafeQuery {
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn params(&self) -> &[BindValue] {
        &self.params
    }

    /// Prepare a typed query with every parameter bound.
    pub fn query_as<O>(&self) -> QueryAs<'_, Postgres, O, PgArguments>
    where
        O: for<'r> FromRow<'r, PgRow>,
    {
        self.params
            .iter()
            .fold(sqlx::query_as::<_, O>(&self.sql), |query, param| match param {
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Int(v) => query.bind(*v),
                BindValue::Float(v) => query.bind(*v),
                BindValue::TextArray(v) => query.bind(v.clone()),
                BindValue::Timestamp(v) => query.bind(*v),
            })
    }
}

/// Append-only SQL writer. Text can only come from static fragments; values
/// can only enter through [`QueryWriter::push_bind`].
#[derive(Debug, Default)]
pub struct QueryWriter {
    sql: String,
    params: Vec<BindValue>,
}

impl QueryWriter {
    #[must_use]
    pub fn new(base: &'static str) -> Self {
        Self {
            sql: base.to_string(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, fragment: &'static str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    /// Append the next `$n` placeholder and record its value.
    pub fn push_bind(&mut self, value: impl Into<BindValue>) -> &mut Self {
        self.params.push(value.into());
        self.sql.push('$');
        self.sql.push_str(&self.params.len().to_string());
        self
    }

    #[must_use]
    pub fn finish(self) -> SafeQuery {
        SafeQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// One sortable column: the public request name and the SQL expression it maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortColumn {
    pub key: &'static str,
    pub expr: &'static str,
}

impl SortColumn {
    #[must_use]
    pub const fn new(key: &'static str, expr: &'static str) -> Self {
        Self { key, expr }
    }
}

/// Non-empty allow-list of sort columns. The first entry is the fallback.
#[derive(Debug, Clone, Copy)]
pub struct SortAllowList(&'static [SortColumn]);

impl SortAllowList {
    /// # Panics
    ///
    /// Panics (at compile time when used in a `const`) on an empty list.
    #[must_use]
    pub const fn new(columns: &'static [SortColumn]) -> Self {
        assert!(!columns.is_empty(), "sort allow-list must not be empty");
        Self(columns)
    }

    #[must_use]
    pub const fn default_column(&self) -> &'static SortColumn {
        let columns: &'static [SortColumn] = self.0;
        &columns[0]
    }

    #[must_use]
    pub fn columns(&self) -> &'static [SortColumn] {
        self.0
    }

    /// Exact, case-sensitive match; anything else yields the default column.
    #[must_use]
    pub fn resolve(&self, requested: Option<&str>) -> &'static SortColumn {
        requested
            .and_then(|key| self.0.iter().find(|col| col.key == key))
            .unwrap_or_else(|| self.default_column())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    /// `desc` in any case selects descending; everything else is ascending.
    #[must_use]
    pub fn parse(requested: Option<&str>) -> Self {
        match requested {
            Some(raw) if raw.eq_ignore_ascii_case("desc") => SortOrder::Desc,
            _ => SortOrder::Asc,
        }
    }

    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => " ASC NULLS LAST",
            SortOrder::Desc => " DESC NULLS LAST",
        }
    }
}

/// Request-side listing parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub sort: Option<String>,
    pub order: Option<String>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            sort: None,
            order: None,
            search: None,
            limit: 10,
            offset: 0,
        }
    }
}

impl ListQuery {
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidParameter`] when `limit` is not positive or
    /// `offset` is negative.
    pub fn new(limit: i64, offset: i64) -> Result<Self, CoreError> {
        if limit < 1 {
            return Err(CoreError::InvalidParameter {
                name: "limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if offset < 0 {
            return Err(CoreError::InvalidParameter {
                name: "offset",
                reason: "must not be negative".to_string(),
            });
        }
        Ok(Self {
            limit,
            offset,
            ..Self::default()
        })
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Option<String>, order: Option<String>) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    #[must_use]
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search;
        self
    }
}

/// The fixed parts of a listing query around its dynamic tail.
#[derive(Debug, Clone, Copy)]
pub struct ListingShape {
    /// Introduces the search predicate and ends with the compared expression,
    /// e.g. `" WHERE p.title ILIKE "` or `" AND p.title ILIKE "`.
    pub search_clause: &'static str,
    /// Fragment between the search predicate and `ORDER BY` (grouping, closing
    /// a subquery). May be empty.
    pub tail: &'static str,
    pub sortable: SortAllowList,
    /// Unique expression appended to every `ORDER BY` so pages are stable.
    pub tiebreak: &'static str,
}

/// Turn a raw search term into a bound `ILIKE` pattern, or `None` when the
/// term is too short to search on. `%`, `_` and `\` match literally.
#[must_use]
pub fn search_pattern(term: Option<&str>) -> Option<String> {
    let term = term?;
    if term.chars().count() < MIN_SEARCH_CHARS {
        return None;
    }
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    Some(pattern)
}

/// Complete a listing query: optional search predicate, tail, allow-listed
/// `ORDER BY` with a stable tiebreak, and bound `LIMIT`/`OFFSET`.
#[must_use]
pub fn build(mut base: QueryWriter, shape: &ListingShape, query: &ListQuery) -> SafeQuery {
    if let Some(pattern) = search_pattern(query.search.as_deref()) {
        base.push(shape.search_clause).push_bind(pattern);
    }
    base.push(shape.tail);

    let column = shape.sortable.resolve(query.sort.as_deref());
    let order = SortOrder::parse(query.order.as_deref());
    base.push(" ORDER BY ")
        .push(column.expr)
        .push(order.as_sql())
        .push(", ")
        .push(shape.tiebreak)
        .push(" ASC LIMIT ")
        .push_bind(query.limit)
        .push(" OFFSET ")
        .push_bind(query.offset);
    base.finish()
}
