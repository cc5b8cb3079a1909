//! Column and field metadata derived from the database catalog.

use crate::case::to_field_name;
use crate::error::StoreError;
use serde::Serialize;

/// Native column type code, following the JDBC `java.sql.Types` vocabulary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum SqlType {
    Bit,
    Boolean,
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Float,
    Double,
    Decimal,
    Numeric,
    Char,
    Varchar,
    LongVarchar,
    Date,
    Time,
    Timestamp,
    /// Catalog type with no code of its own (e.g. uuid, jsonb, timestamptz).
    Other(String),
}

impl SqlType {
    /// Map a PostgreSQL `information_schema.columns.data_type` value.
    pub fn from_pg(data_type: &str) -> SqlType {
        match data_type.to_lowercase().as_str() {
            "bit" => SqlType::Bit,
            "boolean" | "bool" => SqlType::Boolean,
            "smallint" | "int2" => SqlType::SmallInt,
            "integer" | "int" | "int4" => SqlType::Integer,
            "bigint" | "int8" => SqlType::BigInt,
            "real" | "float4" => SqlType::Float,
            "double precision" | "float8" => SqlType::Double,
            "decimal" => SqlType::Decimal,
            "numeric" => SqlType::Numeric,
            "character" | "char" | "bpchar" => SqlType::Char,
            "character varying" | "varchar" => SqlType::Varchar,
            "text" => SqlType::LongVarchar,
            "date" => SqlType::Date,
            "time without time zone" | "time" => SqlType::Time,
            "timestamp without time zone" | "timestamp" => SqlType::Timestamp,
            other => SqlType::Other(other.to_string()),
        }
    }

    /// PostgreSQL type name used for parameter casts.
    pub fn pg_name(&self) -> &str {
        match self {
            SqlType::Bit => "bit",
            SqlType::Boolean => "boolean",
            SqlType::TinyInt | SqlType::SmallInt => "smallint",
            SqlType::Integer => "integer",
            SqlType::BigInt => "bigint",
            SqlType::Float => "real",
            SqlType::Double => "double precision",
            SqlType::Decimal | SqlType::Numeric => "numeric",
            SqlType::Char => "character",
            SqlType::Varchar => "character varying",
            SqlType::LongVarchar => "text",
            SqlType::Date => "date",
            SqlType::Time => "time",
            SqlType::Timestamp => "timestamp",
            SqlType::Other(name) => name,
        }
    }
}

/// Logical kind of value a field holds. Closed set: every supported column maps to one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticType {
    Boolean,
    Integer,
    Long,
    Float,
    Double,
    Decimal,
    Text,
    Date,
    Time,
    Timestamp,
}

impl SemanticType {
    pub fn from_sql(sql_type: &SqlType) -> Option<SemanticType> {
        Some(match sql_type {
            SqlType::Bit | SqlType::Boolean => SemanticType::Boolean,
            SqlType::TinyInt | SqlType::SmallInt | SqlType::Integer => SemanticType::Integer,
            SqlType::BigInt => SemanticType::Long,
            SqlType::Float => SemanticType::Float,
            SqlType::Double => SemanticType::Double,
            SqlType::Decimal | SqlType::Numeric => SemanticType::Decimal,
            SqlType::Char | SqlType::Varchar | SqlType::LongVarchar => SemanticType::Text,
            SqlType::Date => SemanticType::Date,
            SqlType::Time => SemanticType::Time,
            SqlType::Timestamp => SemanticType::Timestamp,
            SqlType::Other(_) => return None,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
    pub is_key: bool,
    pub nullable: bool,
    pub auto_increment: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: String,
    pub semantic_type: SemanticType,
    pub column: Column,
}

impl Field {
    /// Build a field from its column, deriving the field name and semantic type.
    pub fn from_column(column: Column) -> Result<Field, StoreError> {
        let semantic_type = SemanticType::from_sql(&column.sql_type).ok_or_else(|| {
            StoreError::UnsupportedType {
                column: column.name.clone(),
                type_name: column.sql_type.pg_name().to_string(),
            }
        })?;
        Ok(Field {
            name: to_field_name(&column.name),
            semantic_type,
            column,
        })
    }

    pub fn is_key(&self) -> bool {
        self.column.is_key
    }

    pub fn is_auto_increment(&self) -> bool {
        self.column.auto_increment
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, sql_type: SqlType) -> Column {
        Column {
            name: name.into(),
            sql_type,
            is_key: false,
            nullable: true,
            auto_increment: false,
        }
    }

    #[test]
    fn test_semantic_type_mapping() {
        let cases = [
            (SqlType::Bit, SemanticType::Boolean),
            (SqlType::Boolean, SemanticType::Boolean),
            (SqlType::TinyInt, SemanticType::Integer),
            (SqlType::SmallInt, SemanticType::Integer),
            (SqlType::Integer, SemanticType::Integer),
            (SqlType::BigInt, SemanticType::Long),
            (SqlType::Float, SemanticType::Float),
            (SqlType::Double, SemanticType::Double),
            (SqlType::Decimal, SemanticType::Decimal),
            (SqlType::Numeric, SemanticType::Decimal),
            (SqlType::Char, SemanticType::Text),
            (SqlType::Varchar, SemanticType::Text),
            (SqlType::LongVarchar, SemanticType::Text),
            (SqlType::Date, SemanticType::Date),
            (SqlType::Time, SemanticType::Time),
            (SqlType::Timestamp, SemanticType::Timestamp),
        ];
        for (sql, semantic) in cases {
            assert_eq!(SemanticType::from_sql(&sql), Some(semantic), "{:?}", sql);
        }
    }

    #[test]
    fn test_pg_catalog_names() {
        assert_eq!(SqlType::from_pg("character varying"), SqlType::Varchar);
        assert_eq!(SqlType::from_pg("timestamp without time zone"), SqlType::Timestamp);
        assert_eq!(SqlType::from_pg("double precision"), SqlType::Double);
        assert_eq!(SqlType::from_pg("uuid"), SqlType::Other("uuid".into()));
    }

    #[test]
    fn test_unsupported_column_fails() {
        let err = Field::from_column(column("payload", SqlType::from_pg("jsonb"))).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedType { ref column, .. } if column == "payload"));
    }

    #[test]
    fn test_field_from_column() {
        let field = Field::from_column(column("LONG_VALUE", SqlType::BigInt)).unwrap();
        assert_eq!(field.name, "longValue");
        assert_eq!(field.semantic_type, SemanticType::Long);
    }
}
