use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::{Column, Connection, Row as _, TypeInfo, ValueRef};
use thiserror::Error;
use tracing::{debug, warn};

use super::models::{Row, RowError, RowValue, STATUS_COLUMN, UPDATED_AT_COLUMN};
use crate::config::DatabaseConfig;

/// Fixed predicate: only rows written by the API data source are monitored.
const DATA_SOURCE_PREDICATE: &str = "api_data_source = 1";

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Database connection error: {0}")]
    Connection(#[source] sqlx::Error),
    #[error("Database query error: {0}")]
    Query(#[source] sqlx::Error),
    #[error("Malformed result row: {0}")]
    MalformedRow(#[from] RowError),
}

/// Something that can list the rows which reached `status_id` within the last
/// `window_minutes`, newest first.
#[async_trait]
pub trait RowSource: Send + Sync {
    async fn fetch_recent(
        &self,
        status_id: i32,
        window_minutes: u32,
    ) -> Result<Vec<Row>, SourceError>;

    /// Human readable name of the monitored table, e.g. `billing.orders`.
    fn describe_target(&self) -> String;
}

/// Reads rows from PostgreSQL. Every call opens its own connection and closes
/// it before returning; nothing is pooled between cycles.
pub struct PostgresRowSource {
    options: PgConnectOptions,
    target: String,
    query: String,
}

impl PostgresRowSource {
    pub fn new(config: &DatabaseConfig) -> Self {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .application_name("rowwatch");

        Self::with_options(options, &config.schema, &config.table)
    }

    pub fn with_options(options: PgConnectOptions, schema: &str, table: &str) -> Self {
        Self {
            options,
            target: display_table_name(schema, table),
            query: build_recent_rows_query(&qualified_table_name(schema, table)),
        }
    }
}

#[async_trait]
impl RowSource for PostgresRowSource {
    async fn fetch_recent(
        &self,
        status_id: i32,
        window_minutes: u32,
    ) -> Result<Vec<Row>, SourceError> {
        let mut conn = PgConnection::connect_with(&self.options)
            .await
            .map_err(SourceError::Connection)?;

        let window = i32::try_from(window_minutes).unwrap_or(i32::MAX);
        let result = sqlx::query(&self.query)
            .bind(status_id)
            .bind(window)
            .fetch_all(&mut conn)
            .await;

        // Release the connection whatever the query outcome was.
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database connection cleanly.");
        }

        let pg_rows = result.map_err(SourceError::Query)?;
        debug!(count = pg_rows.len(), table = %self.target, "Fetched candidate rows.");

        pg_rows.iter().map(decode_row).collect()
    }

    fn describe_target(&self) -> String {
        self.target.clone()
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Table reference used in SQL. `public` is left implicit.
pub(crate) fn qualified_table_name(schema: &str, table: &str) -> String {
    if schema.is_empty() || schema == "public" {
        quote_ident(table)
    } else {
        format!("{}.{}", quote_ident(schema), quote_ident(table))
    }
}

pub(crate) fn display_table_name(schema: &str, table: &str) -> String {
    if schema.is_empty() || schema == "public" {
        table.to_string()
    } else {
        format!("{schema}.{table}")
    }
}

// The table name comes from operator configuration and cannot be a bind
// parameter; status and window are bound as $1 and $2.
pub(crate) fn build_recent_rows_query(qualified_table: &str) -> String {
    format!(
        "SELECT * FROM {qualified_table} \
         WHERE {STATUS_COLUMN} = $1 \
         AND {DATA_SOURCE_PREDICATE} \
         AND {UPDATED_AT_COLUMN} >= NOW() - make_interval(mins => $2) \
         ORDER BY {UPDATED_AT_COLUMN} DESC"
    )
}

/// How a column is decoded, chosen from its Postgres type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Text,
    Uuid,
    TimestampTz,
    /// Naive timestamps are interpreted as UTC.
    Timestamp,
    Date,
    Json,
    Unsupported,
}

impl ColumnKind {
    fn from_type_name(type_name: &str) -> Self {
        match type_name {
            "BOOL" => ColumnKind::Bool,
            "INT2" => ColumnKind::SmallInt,
            "INT4" => ColumnKind::Int,
            "INT8" => ColumnKind::BigInt,
            "FLOAT4" => ColumnKind::Real,
            "FLOAT8" => ColumnKind::Double,
            "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => ColumnKind::Text,
            "UUID" => ColumnKind::Uuid,
            "TIMESTAMPTZ" => ColumnKind::TimestampTz,
            "TIMESTAMP" => ColumnKind::Timestamp,
            "DATE" => ColumnKind::Date,
            "JSON" | "JSONB" => ColumnKind::Json,
            _ => ColumnKind::Unsupported,
        }
    }
}

fn decode_row(pg_row: &PgRow) -> Result<Row, SourceError> {
    let mut columns = Vec::with_capacity(pg_row.len());
    for column in pg_row.columns() {
        let value = decode_value(pg_row, column.ordinal(), column.type_info().name())
            .map_err(SourceError::Query)?;
        columns.push((column.name().to_string(), value));
    }
    Ok(Row::from_columns(columns)?)
}

fn decode_value(pg_row: &PgRow, index: usize, type_name: &str) -> Result<RowValue, sqlx::Error> {
    if pg_row.try_get_raw(index)?.is_null() {
        return Ok(RowValue::Null);
    }

    let value = match ColumnKind::from_type_name(type_name) {
        ColumnKind::Bool => RowValue::Bool(pg_row.try_get(index)?),
        ColumnKind::SmallInt => RowValue::Integer(pg_row.try_get::<i16, _>(index)?.into()),
        ColumnKind::Int => RowValue::Integer(pg_row.try_get::<i32, _>(index)?.into()),
        ColumnKind::BigInt => RowValue::Integer(pg_row.try_get(index)?),
        ColumnKind::Real => RowValue::Float(pg_row.try_get::<f32, _>(index)?.into()),
        ColumnKind::Double => RowValue::Float(pg_row.try_get(index)?),
        ColumnKind::Text => RowValue::Text(pg_row.try_get(index)?),
        ColumnKind::Uuid => uuid_value(pg_row.try_get(index)?),
        ColumnKind::TimestampTz => RowValue::Timestamp(pg_row.try_get::<DateTime<Utc>, _>(index)?),
        ColumnKind::Timestamp => naive_timestamp_value(pg_row.try_get(index)?),
        ColumnKind::Date => RowValue::Date(pg_row.try_get::<NaiveDate, _>(index)?),
        ColumnKind::Json => RowValue::Json(pg_row.try_get(index)?),
        ColumnKind::Unsupported => RowValue::Unsupported(type_name.to_string()),
    };
    Ok(value)
}

fn uuid_value(value: uuid::Uuid) -> RowValue {
    RowValue::Text(value.to_string())
}

fn naive_timestamp_value(value: NaiveDateTime) -> RowValue {
    RowValue::Timestamp(value.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_public_schema_is_implicit() {
        assert_eq!(qualified_table_name("public", "orders"), "\"orders\"");
        assert_eq!(display_table_name("public", "orders"), "orders");
        assert_eq!(display_table_name("", "orders"), "orders");
    }

    #[test]
    fn test_custom_schema_is_qualified() {
        assert_eq!(qualified_table_name("billing", "orders"), "\"billing\".\"orders\"");
        assert_eq!(display_table_name("billing", "orders"), "billing.orders");
    }

    #[test]
    fn test_identifier_quotes_are_escaped() {
        assert_eq!(qualified_table_name("public", "bad\"name"), "\"bad\"\"name\"");
    }

    #[test]
    fn test_query_shape() {
        let query = build_recent_rows_query("\"billing\".\"orders\"");

        assert!(query.starts_with("SELECT * FROM \"billing\".\"orders\" WHERE"));
        assert!(query.contains("status_id = $1"));
        assert!(query.contains("AND api_data_source = 1"));
        assert!(query.contains("updated_at >= NOW() - make_interval(mins => $2)"));
        assert!(query.ends_with("ORDER BY updated_at DESC"));
    }

    #[test]
    fn test_describe_target_uses_configured_table() {
        let config = DatabaseConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "app".to_string(),
            user: "monitor".to_string(),
            password: String::new(),
            schema: "billing".to_string(),
            table: "orders".to_string(),
        };
        let source = PostgresRowSource::new(&config);

        assert_eq!(source.describe_target(), "billing.orders");
    }

    #[test]
    fn test_column_kinds() {
        assert_eq!(ColumnKind::from_type_name("INT8"), ColumnKind::BigInt);
        assert_eq!(ColumnKind::from_type_name("VARCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_type_name("BPCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMP"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), ColumnKind::TimestampTz);
        assert_eq!(ColumnKind::from_type_name("JSONB"), ColumnKind::Json);
        assert_eq!(ColumnKind::from_type_name("NUMERIC"), ColumnKind::Unsupported);
        assert_eq!(ColumnKind::from_type_name("int8"), ColumnKind::Unsupported);
    }

    #[test]
    fn test_naive_timestamp_is_read_as_utc() {
        let naive = NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();

        assert_eq!(
            naive_timestamp_value(naive),
            RowValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap())
        );
    }

    #[test]
    fn test_uuid_is_carried_as_text() {
        let id = uuid::Uuid::parse_str("6f1c2b9e-0000-4000-8000-000000000001").unwrap();
        let value = uuid_value(id);

        assert_eq!(
            value,
            RowValue::Text("6f1c2b9e-0000-4000-8000-000000000001".to_string())
        );
        assert!(crate::db::RowId::try_from(&value).is_ok());
    }

    #[test]
    fn test_null_identifier_is_a_malformed_row() {
        let result: Result<Row, SourceError> =
            Row::from_columns(vec![("id".to_string(), RowValue::Null)]).map_err(SourceError::from);

        assert!(matches!(result, Err(SourceError::MalformedRow(_))));
    }
}
