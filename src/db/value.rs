//! Row values shared across engines.
//!
//! Queries return [`Row`]s of [`SqlValue`]s, a tagged scalar union that every
//! engine decodes into. Classification happens in two phases: the column's
//! declared type name maps to a [`TypeCategory`], then an engine-specific
//! decoder extracts the value for that category.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as SqlxRow, Type, TypeInfo};

use crate::config::EngineKind;

/// A single scalar value, either bound as a parameter or decoded from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(JsonValue),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Int(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

impl Serialize for SqlValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use base64::{Engine as _, engine::general_purpose::STANDARD};
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => serializer.serialize_str(&STANDARD.encode(v)),
            Self::Json(v) => v.serialize(serializer),
        }
    }
}

/// One decoded row: column names paired with values, in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, SqlValue)>,
}

impl Row {
    pub fn from_pairs(columns: Vec<(String, SqlValue)>) -> Self {
        Self { columns }
    }

    /// Look up a value by column name.
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|(col, _)| col == name)
            .map(|(_, value)| value)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(SqlValue::as_i64)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(SqlValue::as_f64)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(SqlValue::as_str)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(SqlValue::as_bool)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(col, _)| col.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (col, value) in &self.columns {
            map.serialize_entry(col, value)?;
        }
        map.end()
    }
}

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    Temporal,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, engine: EngineKind) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric first; "numeric" overlaps the float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC affinity stores floats
        if engine == EngineKind::Sqlite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    if lower.contains("int") || lower.contains("serial") {
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

    if lower.contains("date") || lower.contains("time") {
        return TypeCategory::Temporal;
    }

    if lower.contains("char") || lower == "text" || lower == "string" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

/// Raw DECIMAL/NUMERIC value kept as its exact string representation.
#[derive(Debug)]
pub(crate) struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

/// Convert an engine-native row into a [`Row`].
pub trait DecodeRow {
    fn decode_row(&self) -> Row;
}

impl DecodeRow for SqliteRow {
    fn decode_row(&self) -> Row {
        let columns = self
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, EngineKind::Sqlite);
                (col.name().to_string(), sqlite::decode_column(self, idx, category))
            })
            .collect();
        Row::from_pairs(columns)
    }
}

impl DecodeRow for PgRow {
    fn decode_row(&self) -> Row {
        let columns = self
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, EngineKind::Postgres);
                (col.name().to_string(), postgres::decode_column(self, idx, category))
            })
            .collect();
        Row::from_pairs(columns)
    }
}

impl DecodeRow for MySqlRow {
    fn decode_row(&self) -> Row {
        let columns = self
            .columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, EngineKind::MySql);
                (col.name().to_string(), mysql::decode_column(self, idx, category))
            })
            .collect();
        Row::from_pairs(columns)
    }
}

mod sqlite {
    use super::*;

    /// SQLite columns are dynamically typed, and expression or aggregate
    /// columns (`SELECT 1 AS x`, `COUNT(*)`) carry no declared type at
    /// all. The declared-type decoders are attempted first; when the
    /// declared type is missing or disagrees with the stored value, the
    /// value is decoded by its actual storage class instead.
    pub fn decode_column(row: &SqliteRow, idx: usize, category: TypeCategory) -> SqlValue {
        let declared = match category {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float | TypeCategory::Decimal => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json => decode_json_text(row, idx),
            TypeCategory::Text | TypeCategory::Temporal => decode_text(row, idx),
            _ => None,
        };
        declared.unwrap_or_else(|| decode_by_storage_class(row, idx))
    }

    fn decode_by_storage_class(row: &SqliteRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Int(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return SqlValue::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
            return SqlValue::Text(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return SqlValue::Bytes(v);
        }
        SqlValue::Null
    }

    fn decode_integer(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        match row.try_get::<Option<i64>, _>(idx) {
            Ok(Some(v)) => Some(SqlValue::Int(v)),
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }

    fn decode_boolean(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(Some(v)) => Some(SqlValue::Bool(v)),
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }

    fn decode_float(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        match row.try_get::<Option<f64>, _>(idx) {
            Ok(Some(v)) => Some(SqlValue::Float(v)),
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }

    fn decode_bytes(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        match row.try_get::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(v)) => Some(SqlValue::Bytes(v)),
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }

    fn decode_json_text(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        // SQLite stores JSON as text
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => match serde_json::from_str::<JsonValue>(&v) {
                Ok(json) => Some(SqlValue::Json(json)),
                Err(_) => Some(SqlValue::Text(v)),
            },
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Option<SqlValue> {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => Some(SqlValue::Text(v)),
            Ok(None) => Some(SqlValue::Null),
            Err(_) => None,
        }
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize, category: TypeCategory) -> SqlValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => SqlValue::Text(v.0),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode NUMERIC: {:?}", e);
                SqlValue::Null
            }
        }
    }

    fn decode_integer(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Int(v);
        }
        SqlValue::Null
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(Some(v)) => SqlValue::Bool(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_float(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return SqlValue::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return SqlValue::Float(v as f64);
        }
        SqlValue::Null
    }

    fn decode_bytes(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(v)) => SqlValue::Bytes(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_json(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<JsonValue>, _>(idx) {
            Ok(Some(v)) => SqlValue::Json(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_uuid(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => SqlValue::Text(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_temporal(row: &PgRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<DateTime<Utc>>, _>(idx) {
            return SqlValue::Text(v.to_rfc3339());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        SqlValue::Null
    }

    fn decode_text(row: &PgRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => SqlValue::Text(v),
            _ => SqlValue::Null,
        }
    }
}

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize, category: TypeCategory) -> SqlValue {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Temporal => decode_temporal(row, idx),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<RawDecimal>, _>(idx) {
            Ok(Some(v)) => SqlValue::Text(v.0),
            Ok(None) => SqlValue::Null,
            Err(e) => {
                tracing::error!("Failed to decode DECIMAL: {:?}", e);
                SqlValue::Null
            }
        }
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<i8>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i16>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i32>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
            return SqlValue::Int(v);
        }
        // TINYINT UNSIGNED and friends
        if let Ok(Some(v)) = row.try_get::<Option<u8>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u16>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u32>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        if let Ok(Some(v)) = row.try_get::<Option<u64>, _>(idx) {
            return SqlValue::Int(v as i64);
        }
        SqlValue::Null
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<bool>, _>(idx) {
            Ok(Some(v)) => SqlValue::Bool(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
            return SqlValue::Float(v);
        }
        if let Ok(Some(v)) = row.try_get::<Option<f32>, _>(idx) {
            return SqlValue::Float(v as f64);
        }
        SqlValue::Null
    }

    fn decode_bytes(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<Vec<u8>>, _>(idx) {
            Ok(Some(v)) => SqlValue::Bytes(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<JsonValue>, _>(idx) {
            Ok(Some(v)) => SqlValue::Json(v),
            _ => SqlValue::Null,
        }
    }

    fn decode_temporal(row: &MySqlRow, idx: usize) -> SqlValue {
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveDate>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        if let Ok(Some(v)) = row.try_get::<Option<NaiveTime>, _>(idx) {
            return SqlValue::Text(v.to_string());
        }
        SqlValue::Null
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> SqlValue {
        match row.try_get::<Option<String>, _>(idx) {
            Ok(Some(v)) => SqlValue::Text(v),
            _ => SqlValue::Null,
        }
    }
}
