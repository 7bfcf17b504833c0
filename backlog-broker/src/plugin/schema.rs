//! Output schema and value model for decoded rows.
//!
//! A plugin describes its output as a static table of [`FieldSpec`]s: the
//! field definition plus a plain function pulling that field out of the
//! plugin's parsed record. Rows are produced by walking the table in order.

use serde::Serialize;

#[derive(Serialize, Clone, Copy, Debug, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Double,
    VarChar,
    Binary,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    TinyInt(i8),
    SmallInt(i16),
    Integer(i32),
    BigInt(i64),
    Double(f64),
    VarChar(String),
    Binary(Vec<u8>),
    Null,
}

impl FieldValue {
    /// `None` for [`FieldValue::Null`], which fits every column.
    pub fn data_type(&self) -> Option<DataType> {
        match self {
            FieldValue::TinyInt(_) => Some(DataType::TinyInt),
            FieldValue::SmallInt(_) => Some(DataType::SmallInt),
            FieldValue::Integer(_) => Some(DataType::Integer),
            FieldValue::BigInt(_) => Some(DataType::BigInt),
            FieldValue::Double(_) => Some(DataType::Double),
            FieldValue::VarChar(_) => Some(DataType::VarChar),
            FieldValue::Binary(_) => Some(DataType::Binary),
            FieldValue::Null => None,
        }
    }
}

/// One output column.
#[derive(Serialize, Clone, Debug, Eq, PartialEq)]
pub struct DataField {
    pub name: &'static str,
    pub data_type: DataType,
    pub description: &'static str,
}

impl DataField {
    pub const fn new(name: &'static str, data_type: DataType, description: &'static str) -> Self {
        Self {
            name,
            data_type,
            description,
        }
    }
}

/// Column definition plus its extractor over the parsed record `T`.
pub struct FieldSpec<T> {
    pub field: DataField,
    pub extract: fn(&T) -> FieldValue,
}

pub fn schema_of<T>(specs: &[FieldSpec<T>]) -> Vec<DataField> {
    specs.iter().map(|spec| spec.field.clone()).collect()
}

pub fn extract_row<T>(specs: &[FieldSpec<T>], record: &T) -> Vec<FieldValue> {
    specs.iter().map(|spec| (spec.extract)(record)).collect()
}

#[cfg(test)]
mod tests {
    use super::{extract_row, schema_of, DataField, DataType, FieldSpec, FieldValue};

    struct Reading {
        celsius: f64,
        label: &'static str,
    }

    const READING_FIELDS: &[FieldSpec<Reading>] = &[
        FieldSpec {
            field: DataField::new("celsius", DataType::Double, "temperature"),
            extract: |reading: &Reading| FieldValue::Double(reading.celsius),
        },
        FieldSpec {
            field: DataField::new("label", DataType::VarChar, "sensor label"),
            extract: |reading: &Reading| FieldValue::VarChar(reading.label.to_string()),
        },
    ];

    #[test]
    fn rows_follow_schema_order_and_types() {
        let schema = schema_of(READING_FIELDS);
        let row = extract_row(
            READING_FIELDS,
            &Reading {
                celsius: 21.5,
                label: "roof",
            },
        );

        assert_eq!(
            schema.iter().map(|field| field.name).collect::<Vec<_>>(),
            vec!["celsius", "label"]
        );
        for (field, value) in schema.iter().zip(&row) {
            assert_eq!(value.data_type(), Some(field.data_type));
        }
    }
}
