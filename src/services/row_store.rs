//! The row-store collaborator: equality filters, ordering, range pagination
//! with an optional exact count, insert, update-by-id and delete-by-id over a
//! fixed set of tables.
//!
//! Rows travel as JSON objects ([`Record`]); typed callers go through
//! [`decode_records`] and [`to_record`].

use async_trait::async_trait;
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};
use sqlx::{QueryBuilder, Row as _, SqlitePool, sqlite::Sqlite, sqlite::SqliteRow};
use std::{fmt, sync::Arc};
use thiserror::Error;
use uuid::Uuid;

/// One row, column name to value.
pub type Record = Map<String, Value>;

#[derive(Debug, Error)]
pub enum RowStoreError {
    #[error("table `{table}` has no column `{column}`")]
    UnknownColumn { table: Table, column: String },
    #[error("column `{column}` cannot be written")]
    ReadOnlyColumn { column: String },
    #[error("range {from}..={to} is outside the addressable rows")]
    RangeOutOfBounds { from: u64, to: u64 },
    #[error("no row `{id}` in `{table}`")]
    NotFound { table: Table, id: String },
    #[error("row does not match the expected shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type RowStoreResult<T> = Result<T, RowStoreError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Albums,
    AlbumPhotos,
    PortfolioImages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Text,
    NullableText,
    Integer,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Albums => "albums",
            Table::AlbumPhotos => "album_photos",
            Table::PortfolioImages => "portfolio_images",
        }
    }

    fn columns(self) -> &'static [(&'static str, ColumnKind)] {
        use ColumnKind::*;
        match self {
            Table::Albums => &[
                ("id", Text),
                ("title", Text),
                ("cover_image_url", Text),
                ("order_index", Integer),
                ("created_at", Text),
            ],
            Table::AlbumPhotos => &[
                ("id", Text),
                ("album_id", Text),
                ("photo_url", Text),
                ("order_index", Integer),
                ("created_at", Text),
            ],
            Table::PortfolioImages => &[
                ("id", Text),
                ("title", Text),
                ("description", NullableText),
                ("image_url", Text),
                ("category", Text),
                ("order_index", Integer),
                ("created_at", Text),
                ("updated_at", Text),
            ],
        }
    }

    fn has_column(self, column: &str) -> bool {
        self.columns().iter().any(|(name, _)| *name == column)
    }

    fn column_list(self) -> String {
        self.columns()
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn check_column(self, column: &str) -> RowStoreResult<()> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(RowStoreError::UnknownColumn {
                table: self,
                column: column.to_string(),
            })
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// A select query. `range` is inclusive on both ends, like `offset..=last`.
#[derive(Debug, Clone)]
pub struct Select {
    pub table: Table,
    pub filters: Vec<(String, Value)>,
    pub order: Option<(String, Direction)>,
    pub range: Option<(u64, u64)>,
    pub count: bool,
}

impl Select {
    pub fn from(table: Table) -> Self {
        Self {
            table,
            filters: Vec::new(),
            order: None,
            range: None,
            count: false,
        }
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }

    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.order = Some((column.to_string(), direction));
        self
    }

    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.range = Some((from, to));
        self
    }

    /// Also report the exact number of rows matching the filters.
    pub fn with_count(mut self) -> Self {
        self.count = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub rows: Vec<Record>,
    /// Rows matching the filters, ignoring `range`; only with `with_count`.
    pub count: Option<u64>,
}

#[async_trait]
pub trait RowStore: Send + Sync {
    async fn select(&self, query: &Select) -> RowStoreResult<Selection>;

    /// Insert a row; `id` and timestamps are filled in when absent. Returns
    /// the stored row.
    async fn insert(&self, table: Table, row: Record) -> RowStoreResult<Record>;

    async fn update(&self, table: Table, id: &str, changes: Record) -> RowStoreResult<()>;

    async fn delete(&self, table: Table, id: &str) -> RowStoreResult<()>;
}

pub fn decode_records<T: DeserializeOwned>(rows: Vec<Record>) -> RowStoreResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(RowStoreError::from))
        .collect()
}

pub fn decode_record<T: DeserializeOwned>(row: Record) -> RowStoreResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

/// Serialize `value` into a record, dropping `null` fields.
pub fn to_record<T: Serialize>(value: &T) -> RowStoreResult<Record> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map.into_iter().filter(|(_, v)| !v.is_null()).collect()),
        other => Err(RowStoreError::Decode(serde::de::Error::custom(format!(
            "expected an object, got {}",
            other
        )))),
    }
}

/// SQLite-backed row store over the tables in `migrations/`.
#[derive(Clone)]
pub struct SqliteRowStore {
    pub db: Arc<SqlitePool>,
}

impl SqliteRowStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    fn push_filters(
        builder: &mut QueryBuilder<'_, Sqlite>,
        query: &Select,
    ) -> RowStoreResult<()> {
        for (idx, (column, value)) in query.filters.iter().enumerate() {
            query.table.check_column(column)?;
            builder.push(if idx == 0 { " WHERE " } else { " AND " });
            builder.push(column.as_str());
            builder.push(" = ");
            push_value(builder, value);
        }
        Ok(())
    }

    fn decode_row(table: Table, row: &SqliteRow) -> RowStoreResult<Record> {
        let mut record = Record::new();
        for (name, kind) in table.columns() {
            let value = match kind {
                ColumnKind::Text => Value::String(row.try_get::<String, _>(*name)?),
                ColumnKind::NullableText => row
                    .try_get::<Option<String>, _>(*name)?
                    .map(Value::String)
                    .unwrap_or(Value::Null),
                ColumnKind::Integer => Value::from(row.try_get::<i64, _>(*name)?),
            };
            record.insert((*name).to_string(), value);
        }
        Ok(record)
    }
}

#[async_trait]
impl RowStore for SqliteRowStore {
    async fn select(&self, query: &Select) -> RowStoreResult<Selection> {
        let table = query.table;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT ");
        builder.push(table.column_list());
        builder.push(" FROM ");
        builder.push(table.name());
        Self::push_filters(&mut builder, query)?;

        if let Some((column, direction)) = &query.order {
            table.check_column(column)?;
            builder.push(" ORDER BY ");
            builder.push(column.as_str());
            builder.push(match direction {
                Direction::Ascending => " ASC",
                Direction::Descending => " DESC",
            });
            // Ties keep insertion order so consecutive ranges never overlap.
            builder.push(", rowid ASC");
        }

        let mut rows = Vec::new();
        let skip = matches!(query.range, Some((from, to)) if to < from);
        if !skip {
            if let Some((from, to)) = query.range {
                let out_of_range = || RowStoreError::RangeOutOfBounds { from, to };
                let offset = i64::try_from(from).map_err(|_| out_of_range())?;
                let limit = i64::try_from(to - from)
                    .ok()
                    .and_then(|span| span.checked_add(1))
                    .ok_or_else(out_of_range)?;
                builder.push(" LIMIT ");
                builder.push_bind(limit);
                builder.push(" OFFSET ");
                builder.push_bind(offset);
            }
            for row in builder.build().fetch_all(&*self.db).await? {
                rows.push(Self::decode_row(table, &row)?);
            }
        }

        let count = if query.count {
            let mut counter = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM ");
            counter.push(table.name());
            Self::push_filters(&mut counter, query)?;
            let total: i64 = counter.build_query_scalar().fetch_one(&*self.db).await?;
            Some(total.max(0) as u64)
        } else {
            None
        };

        Ok(Selection { rows, count })
    }

    async fn insert(&self, table: Table, mut row: Record) -> RowStoreResult<Record> {
        let now = Value::String(Utc::now().to_rfc3339());
        row.entry("id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        for stamp in ["created_at", "updated_at"] {
            if table.has_column(stamp) {
                row.entry(stamp).or_insert_with(|| now.clone());
            }
        }

        let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
        builder.push(table.name());
        builder.push(" (");
        for (idx, column) in row.keys().enumerate() {
            table.check_column(column)?;
            if idx > 0 {
                builder.push(", ");
            }
            builder.push(column.as_str());
        }
        builder.push(") VALUES (");
        for (idx, value) in row.values().enumerate() {
            if idx > 0 {
                builder.push(", ");
            }
            push_value(&mut builder, value);
        }
        builder.push(") RETURNING ");
        builder.push(table.column_list());

        let stored = builder.build().fetch_one(&*self.db).await?;
        Self::decode_row(table, &stored)
    }

    async fn update(&self, table: Table, id: &str, mut changes: Record) -> RowStoreResult<()> {
        if changes.contains_key("id") {
            return Err(RowStoreError::ReadOnlyColumn { column: "id".into() });
        }
        if table.has_column("updated_at") {
            changes
                .entry("updated_at")
                .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
        }
        if changes.is_empty() {
            return Ok(());
        }

        let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
        builder.push(table.name());
        builder.push(" SET ");
        for (idx, (column, value)) in changes.iter().enumerate() {
            table.check_column(column)?;
            if idx > 0 {
                builder.push(", ");
            }
            builder.push(column.as_str());
            builder.push(" = ");
            push_value(&mut builder, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id.to_string());

        let result = builder.build().execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            return Err(RowStoreError::NotFound {
                table,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, table: Table, id: &str) -> RowStoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", table.name());
        let result = sqlx::query(&sql).bind(id).execute(&*self.db).await?;
        if result.rows_affected() == 0 {
            return Err(RowStoreError::NotFound {
                table,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            builder.push_bind(None::<String>);
        }
        Value::Bool(b) => {
            builder.push_bind(*b);
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                builder.push_bind(i);
            }
            None => {
                builder.push_bind(n.as_f64());
            }
        },
        Value::String(s) => {
            builder.push_bind(s.clone());
        }
        other => {
            builder.push_bind(other.to_string());
        }
    }
}
