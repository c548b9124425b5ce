//! Relational data access: the [`DataSource`] and [`SchemaProvider`] seams
//! and their `sqlx` implementation over typed SQLite, MySQL and Postgres
//! pools.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::mysql::{MySqlPool, MySqlRow};
use sqlx::pool::PoolOptions;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::types::chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::types::{Decimal, JsonValue, Uuid};
use sqlx::{Column, ColumnIndex, Decode, Executor, Row, Type, TypeInfo, ValueRef};
use tracing::{debug, info, instrument, warn};

use sqlsage_config::DatabaseConfig;

// ── Result sets ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Int(i64),
    Float(f64),
    /// Exact decimal, kept in its database text form.
    Decimal(String),
    Bool(bool),
    Text(String),
    Bytes(Vec<u8>),
}

impl CellValue {
    fn is_numeric(&self) -> bool {
        matches!(self, CellValue::Int(_) | CellValue::Float(_) | CellValue::Decimal(_))
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => f.write_str("NULL"),
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Decimal(v) => f.write_str(v),
            CellValue::Bool(v) => write!(f, "{v}"),
            CellValue::Text(v) => f.write_str(v),
            CellValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Rows returned by one query, together with the query that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub query: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The single value of a one-row, one-column result.
    pub fn scalar(&self) -> Option<&CellValue> {
        match (self.columns.len(), self.rows.as_slice()) {
            (1, [row]) => row.first(),
            _ => None,
        }
    }

    /// Aligned plain-text table.  Numeric columns are right-aligned.
    pub fn to_text_table(&self) -> String {
        if self.rows.is_empty() {
            return format!("(no rows)\ncolumns: {}", self.columns.join(", "));
        }

        let rendered: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| row.iter().map(|cell| single_line(&cell.to_string())).collect())
            .collect();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &rendered {
            for (i, cell) in row.iter().enumerate() {
                if let Some(width) = widths.get_mut(i) {
                    *width = (*width).max(cell.chars().count());
                }
            }
        }
        let numeric: Vec<bool> = (0..self.columns.len())
            .map(|i| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .all(|cell| cell.is_numeric() || *cell == CellValue::Null)
            })
            .collect();

        let mut lines = Vec::with_capacity(self.rows.len() + 1);
        let header: Vec<String> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| pad(name, widths[i], numeric[i]))
            .collect();
        lines.push(header.join("  ").trim_end().to_string());
        for row in &rendered {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| {
                    let width = widths.get(i).copied().unwrap_or(0);
                    pad(cell, width, numeric.get(i).copied().unwrap_or(false))
                })
                .collect();
            lines.push(cells.join("  ").trim_end().to_string());
        }
        lines.join("\n")
    }
}

fn single_line(text: &str) -> String {
    text.replace(['\n', '\r'], " ")
}

fn pad(text: &str, width: usize, right: bool) -> String {
    if right {
        format!("{text:>width$}")
    } else {
        format!("{text:<width$}")
    }
}

// ── Seams ───────────────────────────────────────────────────────────────────

#[async_trait]
pub trait DataSource: Send + Sync {
    async fn execute(&self, query: &str) -> Result<ResultSet>;
}

#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Dialect label for prompts, e.g. `MySQL`.
    fn dialect(&self) -> &str;

    /// Table and column description handed to the translator.
    async fn describe(&self) -> Result<String>;
}

/// Hand-written schema description read from a file.
#[derive(Debug, Clone)]
pub struct StaticSchema {
    dialect: String,
    text: String,
}

impl StaticSchema {
    pub fn new(dialect: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            dialect: dialect.into(),
            text: text.into(),
        }
    }

    pub fn from_file(dialect: impl Into<String>, path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read schema file {}", path.display()))?;
        Ok(Self::new(dialect, text))
    }
}

#[async_trait]
impl SchemaProvider for StaticSchema {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    async fn describe(&self) -> Result<String> {
        Ok(self.text.clone())
    }
}

// ── sqlx ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Sqlite,
    MySql,
    Postgres,
}

impl Backend {
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Some(Backend::Sqlite),
            "mysql" | "mariadb" => Some(Backend::MySql),
            "postgres" | "postgresql" => Some(Backend::Postgres),
            _ => None,
        }
    }

    fn quote_ident(self, ident: &str) -> String {
        match self {
            Backend::MySql => format!("`{}`", ident.replace('`', "``")),
            Backend::Sqlite | Backend::Postgres => format!("\"{}\"", ident.replace('"', "\"\"")),
        }
    }
}

#[derive(Debug, Clone)]
enum DbPool {
    Sqlite(SqlitePool),
    MySql(MySqlPool),
    Postgres(PgPool),
}

/// Pooled connection to the configured database.  Connections are health
/// checked before use and recycled once they reach the configured age.
#[derive(Debug, Clone)]
pub struct SqlDatabase {
    pool: DbPool,
    dialect: String,
    sample_rows: usize,
}

fn pool_options<DB: sqlx::Database>(config: &DatabaseConfig) -> PoolOptions<DB> {
    let max_lifetime = (config.recycle_secs > 0).then(|| Duration::from_secs(config.recycle_secs));
    PoolOptions::new()
        .max_connections(config.max_connections.max(1))
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs.max(1)))
        .test_before_acquire(config.pre_ping)
        .max_lifetime(max_lifetime)
}

impl SqlDatabase {
    #[instrument(skip(config), fields(dialect = %config.dialect_name()))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let backend = Backend::from_url(&config.url)
            .with_context(|| format!("unsupported database url scheme in {}", redact(&config.url)))?;
        let url = config.url.as_str();
        let pool = match backend {
            Backend::Sqlite => pool_options(config).connect(url).await.map(DbPool::Sqlite),
            Backend::MySql => pool_options(config).connect(url).await.map(DbPool::MySql),
            Backend::Postgres => pool_options(config).connect(url).await.map(DbPool::Postgres),
        }
        .with_context(|| format!("connect to {}", redact(url)))?;
        info!(url = %redact(url), ?backend, "database pool ready");

        Ok(Self {
            pool,
            dialect: config.dialect_name().to_string(),
            sample_rows: config.sample_rows,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_sqlite(pool: SqlitePool, dialect: impl Into<String>, sample_rows: usize) -> Self {
        Self {
            pool: DbPool::Sqlite(pool),
            dialect: dialect.into(),
            sample_rows,
        }
    }

    fn backend(&self) -> Backend {
        match self.pool {
            DbPool::Sqlite(_) => Backend::Sqlite,
            DbPool::MySql(_) => Backend::MySql,
            DbPool::Postgres(_) => Backend::Postgres,
        }
    }

    /// Round-trip a trivial statement.
    pub async fn ping(&self) -> Result<()> {
        match &self.pool {
            DbPool::Sqlite(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            DbPool::MySql(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
            DbPool::Postgres(pool) => sqlx::query("SELECT 1").execute(pool).await.map(drop),
        }
        .context("database ping failed")
    }

    pub async fn table_names(&self) -> Result<Vec<String>> {
        let sql = match self.backend() {
            Backend::Sqlite => {
                "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') \
                 AND name NOT LIKE 'sqlite_%' ORDER BY name"
            }
            Backend::MySql => {
                "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() ORDER BY table_name"
            }
            Backend::Postgres => {
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_schema = current_schema() ORDER BY table_name"
            }
        };
        let rows = self.fetch_text(sql, None).await.context("list tables")?;
        Ok(rows.into_iter().filter_map(|row| row.into_iter().next()).collect())
    }

    async fn table_definition(&self, table: &str) -> Result<String> {
        let backend = self.backend();
        if backend == Backend::Sqlite {
            let rows = self
                .fetch_text("SELECT sql FROM sqlite_master WHERE name = ?", Some(table))
                .await
                .with_context(|| format!("read definition of {table}"))?;
            return rows
                .into_iter()
                .find_map(|row| row.into_iter().next())
                .with_context(|| format!("no definition recorded for {table}"));
        }

        let sql = match backend {
            Backend::MySql => {
                "SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR) \
                 FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
            }
            _ => {
                "SELECT column_name::text, data_type::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position"
            }
        };
        let rows = self
            .fetch_text(sql, Some(table))
            .await
            .with_context(|| format!("read columns of {table}"))?;
        let columns: Vec<String> = rows
            .iter()
            .filter_map(|row| match row.as_slice() {
                [name, kind, ..] => Some(format!("\t{} {}", backend.quote_ident(name), kind.to_uppercase())),
                _ => None,
            })
            .collect();
        Ok(format!(
            "CREATE TABLE {} (\n{}\n)",
            backend.quote_ident(table),
            columns.join(",\n")
        ))
    }

    /// Run a catalog query whose columns are all text.
    async fn fetch_text(&self, sql: &str, bind: Option<&str>) -> Result<Vec<Vec<String>>, sqlx::Error> {
        match &self.pool {
            DbPool::Sqlite(pool) => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                text_rows(&query.fetch_all(pool).await?)
            }
            DbPool::MySql(pool) => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                text_rows(&query.fetch_all(pool).await?)
            }
            DbPool::Postgres(pool) => {
                let mut query = sqlx::query(sql);
                if let Some(value) = bind {
                    query = query.bind(value);
                }
                text_rows(&query.fetch_all(pool).await?)
            }
        }
    }

    /// Column names of a statement, without running it.
    async fn column_names(&self, query: &str) -> Result<Vec<String>, sqlx::Error> {
        let names = match &self.pool {
            DbPool::Sqlite(pool) => names_of(pool.describe(query).await?.columns()),
            DbPool::MySql(pool) => names_of(pool.describe(query).await?.columns()),
            DbPool::Postgres(pool) => names_of(pool.describe(query).await?.columns()),
        };
        Ok(names)
    }
}

fn redact(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}

fn names_of<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

fn text_rows<R>(rows: &[R]) -> Result<Vec<Vec<String>>, sqlx::Error>
where
    R: Row,
    usize: ColumnIndex<R>,
    for<'r> Option<String>: Decode<'r, R::Database> + Type<R::Database>,
{
    rows.iter()
        .map(|row| {
            (0..row.len())
                .map(|idx| row.try_get::<Option<String>, _>(idx).map(Option::unwrap_or_default))
                .collect()
        })
        .collect()
}

// ── Cell decoding ───────────────────────────────────────────────────────────

/// How a column's declared type is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int,
    UnsignedInt,
    Float,
    Decimal,
    Date,
    Time,
    DateTime,
    ZonedDateTime,
    Uuid,
    Json,
    Text,
    Bytes,
    Other,
}

/// Classify a MySQL or Postgres type name as reported by the driver, e.g.
/// `DECIMAL`, `BIGINT UNSIGNED` or `TIMESTAMPTZ`.
fn column_kind(type_name: &str) -> ColumnKind {
    let name = type_name.trim().to_ascii_uppercase();
    let base = name.split(['(', ' ']).next().unwrap_or_default();
    let unsigned = name.contains("UNSIGNED");
    match base {
        "BOOL" | "BOOLEAN" => ColumnKind::Bool,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" if unsigned => {
            ColumnKind::UnsignedInt
        }
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "INTEGER" | "BIGINT" | "INT2" | "INT4"
        | "INT8" => ColumnKind::Int,
        "YEAR" => ColumnKind::UnsignedInt,
        "FLOAT" | "DOUBLE" | "REAL" | "FLOAT4" | "FLOAT8" => ColumnKind::Float,
        "DECIMAL" | "NUMERIC" => ColumnKind::Decimal,
        "DATE" => ColumnKind::Date,
        "TIME" => ColumnKind::Time,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "TIMESTAMPTZ" => ColumnKind::ZonedDateTime,
        "UUID" => ColumnKind::Uuid,
        "JSON" | "JSONB" => ColumnKind::Json,
        "CHAR" | "VARCHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "BPCHAR" | "NAME"
        | "CITEXT" | "ENUM" | "SET" => ColumnKind::Text,
        "BYTEA" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            ColumnKind::Bytes
        }
        _ => ColumnKind::Other,
    }
}

fn unsigned_cell(value: u64) -> CellValue {
    i64::try_from(value)
        .map(CellValue::Int)
        .unwrap_or_else(|_| CellValue::Decimal(value.to_string()))
}

fn is_null<R: Row>(row: &R, idx: usize) -> bool
where
    usize: ColumnIndex<R>,
{
    row.try_get_raw(idx).map_or(true, |raw| raw.is_null())
}

/// Decoding by probing the plain types every driver supports.
fn fallback_cell<'r, R>(row: &'r R, idx: usize) -> CellValue
where
    R: Row,
    usize: ColumnIndex<R>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    if is_null(row, idx) {
        return CellValue::Null;
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return CellValue::Int(v);
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return CellValue::Float(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(idx) {
        return CellValue::Bool(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return CellValue::Text(v);
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return CellValue::Bytes(v);
    }
    CellValue::Text(format!("<{}>", row.column(idx).type_info().name()))
}

/// Decoding driven by the column's declared type, for the kinds MySQL and
/// Postgres share.  `None` means the value did not decode as its kind.
fn typed_cell<'r, R>(row: &'r R, idx: usize, kind: ColumnKind) -> Option<CellValue>
where
    R: Row,
    usize: ColumnIndex<R>,
    bool: Decode<'r, R::Database> + Type<R::Database>,
    i16: Decode<'r, R::Database> + Type<R::Database>,
    i32: Decode<'r, R::Database> + Type<R::Database>,
    i64: Decode<'r, R::Database> + Type<R::Database>,
    f32: Decode<'r, R::Database> + Type<R::Database>,
    f64: Decode<'r, R::Database> + Type<R::Database>,
    Decimal: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDate: Decode<'r, R::Database> + Type<R::Database>,
    NaiveTime: Decode<'r, R::Database> + Type<R::Database>,
    NaiveDateTime: Decode<'r, R::Database> + Type<R::Database>,
    DateTime<Utc>: Decode<'r, R::Database> + Type<R::Database>,
    JsonValue: Decode<'r, R::Database> + Type<R::Database>,
    String: Decode<'r, R::Database> + Type<R::Database>,
    Vec<u8>: Decode<'r, R::Database> + Type<R::Database>,
{
    match kind {
        ColumnKind::Bool => row.try_get::<bool, _>(idx).ok().map(CellValue::Bool),
        ColumnKind::Int => row
            .try_get::<i64, _>(idx)
            .ok()
            .or_else(|| row.try_get::<i32, _>(idx).ok().map(i64::from))
            .or_else(|| row.try_get::<i16, _>(idx).ok().map(i64::from))
            .map(CellValue::Int),
        ColumnKind::Float => row
            .try_get::<f64, _>(idx)
            .ok()
            .or_else(|| row.try_get::<f32, _>(idx).ok().map(f64::from))
            .map(CellValue::Float),
        ColumnKind::Decimal => row
            .try_get::<Decimal, _>(idx)
            .ok()
            .map(|v| CellValue::Decimal(v.to_string())),
        ColumnKind::Date => row
            .try_get::<NaiveDate, _>(idx)
            .ok()
            .map(|v| CellValue::Text(v.to_string())),
        ColumnKind::Time => row
            .try_get::<NaiveTime, _>(idx)
            .ok()
            .map(|v| CellValue::Text(v.to_string())),
        ColumnKind::DateTime => row
            .try_get::<NaiveDateTime, _>(idx)
            .ok()
            .or_else(|| row.try_get::<DateTime<Utc>, _>(idx).ok().map(|v| v.naive_utc()))
            .map(|v| CellValue::Text(v.to_string())),
        ColumnKind::ZonedDateTime => row
            .try_get::<DateTime<Utc>, _>(idx)
            .ok()
            .map(|v| CellValue::Text(v.to_rfc3339())),
        ColumnKind::Json => row
            .try_get::<JsonValue, _>(idx)
            .ok()
            .map(|v| CellValue::Text(v.to_string())),
        ColumnKind::Text => row.try_get::<String, _>(idx).ok().map(CellValue::Text),
        ColumnKind::Bytes => row.try_get::<Vec<u8>, _>(idx).ok().map(CellValue::Bytes),
        ColumnKind::UnsignedInt | ColumnKind::Uuid | ColumnKind::Other => None,
    }
}

/// SQLite values carry their own storage class, so probing is enough.
fn decode_sqlite(row: &SqliteRow, idx: usize) -> CellValue {
    fallback_cell(row, idx)
}

fn decode_mysql(row: &MySqlRow, idx: usize) -> CellValue {
    if is_null(row, idx) {
        return CellValue::Null;
    }
    let kind = column_kind(row.column(idx).type_info().name());
    let decoded = match kind {
        ColumnKind::UnsignedInt => row
            .try_get::<u64, _>(idx)
            .ok()
            .or_else(|| row.try_get::<u16, _>(idx).ok().map(u64::from))
            .map(unsigned_cell),
        kind => typed_cell(row, idx, kind),
    };
    decoded.unwrap_or_else(|| fallback_cell(row, idx))
}

fn decode_postgres(row: &PgRow, idx: usize) -> CellValue {
    if is_null(row, idx) {
        return CellValue::Null;
    }
    let kind = column_kind(row.column(idx).type_info().name());
    let decoded = match kind {
        ColumnKind::Uuid => row
            .try_get::<Uuid, _>(idx)
            .ok()
            .map(|v| CellValue::Text(v.to_string())),
        kind => typed_cell(row, idx, kind),
    };
    decoded.unwrap_or_else(|| fallback_cell(row, idx))
}

fn rows_to_result<R: Row>(query: &str, rows: &[R], decode: fn(&R, usize) -> CellValue) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| names_of(row.columns()))
        .unwrap_or_default();
    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode(row, idx)).collect())
        .collect();
    ResultSet {
        query: query.to_string(),
        columns,
        rows,
    }
}

#[async_trait]
impl DataSource for SqlDatabase {
    #[instrument(skip(self), fields(backend = ?self.backend()))]
    async fn execute(&self, query: &str) -> Result<ResultSet> {
        let mut result = match &self.pool {
            DbPool::Sqlite(pool) => {
                let rows = sqlx::query(query).fetch_all(pool).await.context("query failed")?;
                rows_to_result(query, &rows, decode_sqlite)
            }
            DbPool::MySql(pool) => {
                let rows = sqlx::query(query).fetch_all(pool).await.context("query failed")?;
                rows_to_result(query, &rows, decode_mysql)
            }
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(query).fetch_all(pool).await.context("query failed")?;
                rows_to_result(query, &rows, decode_postgres)
            }
        };

        if result.columns.is_empty() {
            match self.column_names(query).await {
                Ok(columns) => result.columns = columns,
                Err(err) => debug!(%err, "could not describe empty result"),
            }
        }
        debug!(rows = result.row_count(), columns = result.columns.len(), "query executed");
        Ok(result)
    }
}

#[async_trait]
impl SchemaProvider for SqlDatabase {
    fn dialect(&self) -> &str {
        &self.dialect
    }

    /// One `CREATE TABLE` block per table followed by a few sample rows.
    async fn describe(&self) -> Result<String> {
        let backend = self.backend();
        let tables = self.table_names().await?;
        let mut blocks = Vec::with_capacity(tables.len());
        for table in &tables {
            let mut block = self.table_definition(table).await?;
            if self.sample_rows > 0 {
                let sample_sql = format!(
                    "SELECT * FROM {} LIMIT {}",
                    backend.quote_ident(table),
                    self.sample_rows
                );
                match self.execute(&sample_sql).await {
                    Ok(sample) => block.push_str(&format!(
                        "\n\n/*\n{} rows from {table} table:\n{}\n*/",
                        self.sample_rows,
                        sample.to_text_table()
                    )),
                    Err(err) => warn!(table, %err, "skipping sample rows"),
                }
            }
            blocks.push(block);
        }
        Ok(blocks.join("\n\n"))
    }
}
