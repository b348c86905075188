//! SQL Server driver handle, backed by tiberius.
//!
//! Compiled only with the `mssql` feature. tiberius processes results at
//! result-set granularity; rows are materialized before conversion.

use crate::driver::DriverHandle;
use crate::error::{DbResult, Error};
use crate::models::{FetchMode, Row, Value};
use crate::drivers::row::{encode_binary, shape_row};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tiberius::{Client, ColumnData, FromSql, ToSql};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::Compat;

/// One live SQL Server link.
pub struct SqlServerHandle {
    client: Mutex<Client<Compat<TcpStream>>>,
}

impl SqlServerHandle {
    pub fn new(client: Client<Compat<TcpStream>>) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    async fn control(&self, statement: &str) -> DbResult<()> {
        let mut client = self.client.lock().await;
        client
            .simple_query(statement)
            .await
            .map_err(|e| Error::driver(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| Error::driver(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl DriverHandle for SqlServerHandle {
    async fn query(
        &self,
        statement: &str,
        bindings: &[Value],
        mode: FetchMode,
    ) -> DbResult<Vec<Row>> {
        let mut client = self.client.lock().await;

        let params = to_sql_params(bindings);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let rows = client
            .query(statement, &refs)
            .await
            .map_err(|e| Error::driver(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| Error::driver(e.to_string()))?;

        Ok(rows.into_iter().map(|row| row_to_json(row, mode)).collect())
    }

    async fn execute(&self, statement: &str, bindings: &[Value]) -> DbResult<u64> {
        let mut client = self.client.lock().await;

        let params = to_sql_params(bindings);
        let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let result = client
            .execute(statement, &refs)
            .await
            .map_err(|e| Error::driver(e.to_string()))?;

        Ok(result.total())
    }

    async fn exec_raw(&self, statement: &str) -> DbResult<u64> {
        // Direct batch; transaction control must not go through sp_executesql
        self.control(statement).await?;
        Ok(0)
    }

    async fn begin(&self) -> DbResult<()> {
        self.control("BEGIN TRANSACTION").await
    }

    async fn commit(&self) -> DbResult<()> {
        self.control("COMMIT").await
    }

    async fn rollback(&self) -> DbResult<()> {
        self.control("ROLLBACK").await
    }

    fn driver_name(&self) -> &str {
        "sqlsrv"
    }
}

fn to_sql_params(bindings: &[Value]) -> Vec<Box<dyn ToSql>> {
    bindings
        .iter()
        .map(|value| -> Box<dyn ToSql> {
            match value {
                Value::Null => Box::new(Option::<String>::None),
                Value::Bool(v) => Box::new(*v),
                Value::Int(v) => Box::new(*v),
                Value::Float(v) => Box::new(*v),
                Value::DateTime(v) => Box::new(*v),
                Value::String(v) => Box::new(v.clone()),
            }
        })
        .collect()
}

fn row_to_json(row: tiberius::Row, mode: FetchMode) -> Row {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values: Vec<JsonValue> = row.into_iter().map(|data| column_data_to_json(&data)).collect();

    shape_row(columns, values, mode)
}

fn column_data_to_json(data: &ColumnData<'static>) -> JsonValue {
    match data {
        ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        ColumnData::U8(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I16(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I32(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::I64(v) => v.map(|n| JsonValue::Number(n.into())).unwrap_or(JsonValue::Null),
        ColumnData::F32(v) => v
            .and_then(|n| serde_json::Number::from_f64(n as f64))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| JsonValue::String(s.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Guid(v) => v
            .map(|g| JsonValue::String(g.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Numeric(v) => v
            .and_then(|n| serde_json::Number::from_f64(f64::from(n)))
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| encode_binary(b))
            .unwrap_or(JsonValue::Null),
        ColumnData::DateTime(_) | ColumnData::DateTime2(_) | ColumnData::SmallDateTime(_) => {
            chrono::NaiveDateTime::from_sql(data)
                .ok()
                .flatten()
                .map(|v| JsonValue::String(v.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(JsonValue::Null)
        }
        ColumnData::Date(_) => chrono::NaiveDate::from_sql(data)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Time(_) => chrono::NaiveTime::from_sql(data)
            .ok()
            .flatten()
            .map(|v| JsonValue::String(v.format("%H:%M:%S").to_string()))
            .unwrap_or(JsonValue::Null),
        _ => JsonValue::Null,
    }
}
