//! Shared row-decoding machinery for the sqlx-backed handles.
//!
//! Type conversion is two-phase: [`categorize_type`] classifies the column's
//! reported type name into a logical category, then a dialect-specific
//! decoder extracts the value. Decoding failures degrade to JSON null rather
//! than failing the whole row.

use crate::models::{FetchMode, Row};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgTypeInfo, PgValueRef};
use sqlx::{Decode, Type, TypeInfo};

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Binary,
    Json,
    Uuid,
    Unknown,
}

/// Classify a column type name into a logical category.
pub(crate) fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric first, it overlaps the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    // Everything else (varchar, text, char, date, time, ...) decodes as text
    TypeCategory::Unknown
}

/// Shape decoded column values into a [`Row`] per the fetch mode.
pub(crate) fn shape_row(columns: Vec<String>, values: Vec<JsonValue>, mode: FetchMode) -> Row {
    match mode {
        FetchMode::Assoc => JsonValue::Object(columns.into_iter().zip(values).collect()),
        FetchMode::Num => JsonValue::Array(values),
    }
}

/// Encode binary column data as a JSON string: UTF-8 when it is valid text,
/// base64 otherwise.
pub(crate) fn encode_binary(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    match std::str::from_utf8(bytes) {
        Ok(s) => JsonValue::String(s.to_string()),
        Err(_) => JsonValue::String(STANDARD.encode(bytes)),
    }
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper decoding DECIMAL/NUMERIC columns as their raw string
/// representation, preserving the exact database value.
#[derive(Debug)]
pub(crate) struct DecimalText(pub String);

impl Type<sqlx::MySql> for DecimalText {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for DecimalText {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for DecimalText {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for DecimalText {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(DecimalText(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_common_types() {
        assert_eq!(categorize_type("BIGINT"), TypeCategory::Integer);
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Decimal);
        assert_eq!(categorize_type("BOOLEAN"), TypeCategory::Boolean);
        assert_eq!(categorize_type("DOUBLE"), TypeCategory::Float);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("VARCHAR"), TypeCategory::Unknown);
    }

    #[test]
    fn test_shape_row_modes() {
        let columns = vec!["id".to_string(), "name".to_string()];
        let values = vec![JsonValue::from(1), JsonValue::from("a")];

        let assoc = shape_row(columns.clone(), values.clone(), FetchMode::Assoc);
        assert_eq!(assoc["id"], JsonValue::from(1));

        let num = shape_row(columns, values, FetchMode::Num);
        assert_eq!(num[0], JsonValue::from(1));
        assert_eq!(num[1], JsonValue::from("a"));
    }

    #[test]
    fn test_encode_binary_prefers_utf8() {
        assert_eq!(encode_binary(b"hello"), JsonValue::String("hello".to_string()));
        assert_eq!(
            encode_binary(&[0xff, 0xfe]),
            JsonValue::String("//4=".to_string())
        );
    }
}
