//! PostgreSQL driver handle.

use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use crate::models::{FetchMode, Row, Value};
use crate::drivers::row::{DecimalText, TypeCategory, categorize_type, encode_binary, shape_row};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::{Column, Executor, Row as SqlxRow, TypeInfo};
use tokio::sync::Mutex;

/// One live PostgreSQL link.
pub struct PostgresHandle {
    conn: Mutex<PgConnection>,
}

impl PostgresHandle {
    pub fn new(conn: PgConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    async fn control(&self, statement: &str) -> DbResult<()> {
        let mut conn = self.conn.lock().await;
        (&mut *conn).execute(statement).await.map_err(Error::from)?;
        Ok(())
    }
}

#[async_trait]
impl DriverHandle for PostgresHandle {
    async fn query(
        &self,
        statement: &str,
        bindings: &[Value],
        mode: FetchMode,
    ) -> DbResult<Vec<Row>> {
        let mut conn = self.conn.lock().await;

        let mut query = sqlx::query(statement);
        for value in bindings {
            query = bind_value(query, value);
        }

        let rows: Vec<PgRow> = query.fetch_all(&mut *conn).await.map_err(Error::from)?;
        Ok(rows.iter().map(|row| row_to_json(row, mode)).collect())
    }

    async fn execute(&self, statement: &str, bindings: &[Value]) -> DbResult<u64> {
        let mut conn = self.conn.lock().await;

        let mut query = sqlx::query(statement);
        for value in bindings {
            query = bind_value(query, value);
        }

        let result = query.execute(&mut *conn).await.map_err(Error::from)?;
        Ok(result.rows_affected())
    }

    async fn exec_raw(&self, statement: &str) -> DbResult<u64> {
        let mut conn = self.conn.lock().await;
        let result = (&mut *conn).execute(statement).await.map_err(Error::from)?;
        Ok(result.rows_affected())
    }

    async fn begin(&self) -> DbResult<()> {
        self.control("BEGIN").await
    }

    async fn commit(&self) -> DbResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.control("ROLLBACK").await
    }

    fn driver_name(&self) -> &str {
        "pgsql"
    }
}

fn bind_value<'q>(
    query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    value: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::DateTime(v) => query.bind(*v),
        Value::String(v) => query.bind(v.as_str()),
    }
}

fn row_to_json(row: &PgRow, mode: FetchMode) -> Row {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values: Vec<JsonValue> = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| decode_column(row, idx, col.type_info().name()))
        .collect();

    shape_row(columns, values, mode)
}

fn decode_column(row: &PgRow, idx: usize, type_name: &str) -> JsonValue {
    match categorize_type(type_name) {
        TypeCategory::Decimal => decode_decimal(row, idx),
        TypeCategory::Integer => decode_integer(row, idx),
        TypeCategory::Boolean => decode_boolean(row, idx),
        TypeCategory::Float => decode_float(row, idx),
        TypeCategory::Binary => decode_binary_col(row, idx),
        TypeCategory::Json => decode_json(row, idx),
        TypeCategory::Uuid => decode_uuid(row, idx),
        TypeCategory::Unknown => decode_text(row, idx),
    }
}

fn decode_decimal(row: &PgRow, idx: usize) -> JsonValue {
    match row.try_get::<Option<DecimalText>, _>(idx) {
        Ok(Some(v)) => JsonValue::String(v.0),
        Ok(None) => JsonValue::Null,
        Err(e) => {
            tracing::error!("Failed to decode NUMERIC: {:?}", e);
            JsonValue::Null
        }
    }
}

fn decode_integer(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(None) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Null;
    }
    if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return JsonValue::Number(v.into());
    }
    JsonValue::Null
}

fn decode_boolean(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<bool>, _>(idx)
        .ok()
        .flatten()
        .map(JsonValue::Bool)
        .unwrap_or(JsonValue::Null)
}

fn decode_float(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return serde_json::Number::from_f64(v)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
        return serde_json::Number::from_f64(v as f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(v.to_string()));
    }
    JsonValue::Null
}

fn decode_binary_col(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<Vec<u8>>, _>(idx)
        .ok()
        .flatten()
        .map(|v| encode_binary(&v))
        .unwrap_or(JsonValue::Null)
}

fn decode_json(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<serde_json::Value>, _>(idx)
        .ok()
        .flatten()
        .unwrap_or(JsonValue::Null)
}

fn decode_uuid(row: &PgRow, idx: usize) -> JsonValue {
    row.try_get::<Option<uuid::Uuid>, _>(idx)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn decode_text(row: &PgRow, idx: usize) -> JsonValue {
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return JsonValue::String(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
        return JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string());
    }
    if let Ok(Some(v)) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
        return JsonValue::String(v.format("%Y-%m-%d").to_string());
    }
    JsonValue::Null
}
