//! Arrow record batches from core [`Row`]s.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanArray, Float64Array, Int8Array, Int32Array, StringArray, UInt8Array,
    UInt32Array, UInt64Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use serde_json::Value;
use valleyvote_core::Row;

use crate::StoreError;

/// Build a batch with one column per schema field.
///
/// Fields absent from a row, or null, become nulls; a non-nullable field
/// without a value is an error, as is a value of the wrong JSON type.
/// Row fields not named in the schema are ignored.
pub fn rows_to_batch(schema: &Schema, rows: &[Row]) -> Result<RecordBatch, StoreError> {
    let columns = schema
        .fields()
        .iter()
        .map(|field| column(field, rows))
        .collect::<Result<Vec<ArrayRef>, StoreError>>()?;
    Ok(RecordBatch::try_new(Arc::new(schema.clone()), columns)?)
}

fn column(field: &Field, rows: &[Row]) -> Result<ArrayRef, StoreError> {
    let array: ArrayRef = match field.data_type() {
        DataType::UInt64 => Arc::new(UInt64Array::from(values(field, rows, Value::as_u64)?)),
        DataType::UInt32 => Arc::new(UInt32Array::from(values(field, rows, |v| {
            v.as_u64().and_then(|n| u32::try_from(n).ok())
        })?)),
        DataType::UInt8 => Arc::new(UInt8Array::from(values(field, rows, |v| {
            v.as_u64().and_then(|n| u8::try_from(n).ok())
        })?)),
        DataType::Int32 => Arc::new(Int32Array::from(values(field, rows, |v| {
            v.as_i64().and_then(|n| i32::try_from(n).ok())
        })?)),
        DataType::Int8 => Arc::new(Int8Array::from(values(field, rows, |v| {
            v.as_i64().and_then(|n| i8::try_from(n).ok())
        })?)),
        DataType::Float64 => Arc::new(Float64Array::from(values(field, rows, Value::as_f64)?)),
        DataType::Boolean => Arc::new(BooleanArray::from(values(field, rows, Value::as_bool)?)),
        DataType::Utf8 => Arc::new(StringArray::from(values(field, rows, |v| {
            v.as_str().map(str::to_string)
        })?)),
        other => {
            return Err(StoreError::Field {
                field: field.name().clone(),
                message: format!("unsupported column type {other}"),
            });
        }
    };
    Ok(array)
}

fn values<T>(
    field: &Field,
    rows: &[Row],
    convert: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<Option<T>>, StoreError> {
    rows.iter()
        .map(|row| match row.get(field.name()) {
            None | Some(Value::Null) if field.is_nullable() => Ok(None),
            None | Some(Value::Null) => Err(StoreError::Field {
                field: field.name().clone(),
                message: "missing value for non-nullable column".into(),
            }),
            Some(v) => convert(v).map(Some).ok_or_else(|| StoreError::Field {
                field: field.name().clone(),
                message: format!("cannot store {v} as {}", field.data_type()),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use valleyvote_core::schema::legislature;

    fn schema() -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::UInt64, false),
            Field::new("name", DataType::Utf8, false),
            Field::new("score", DataType::Float64, true),
            Field::new("value", DataType::Int8, false),
        ])
    }

    #[test]
    fn builds_columns_in_schema_order() {
        let rows = vec![
            Row::new().with("name", "a").with("id", 1).with("score", 1.5).with("value", -2),
            Row::new().with("id", 2).with("name", "b").with("value", 1).with("extra", true),
        ];
        let batch = rows_to_batch(&schema(), &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);

        let score = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(score.value(0), 1.5);
        assert!(score.is_null(1));
        let value = batch.column(3).as_any().downcast_ref::<Int8Array>().unwrap();
        assert_eq!(value.value(0), -2);
    }

    #[test]
    fn missing_required_value_rejected() {
        let rows = vec![Row::new().with("id", 1)];
        let err = rows_to_batch(&schema(), &rows).unwrap_err();
        assert!(matches!(err, StoreError::Field { ref field, .. } if field == "name"));
    }

    #[test]
    fn wrong_type_rejected() {
        let rows = vec![Row::new().with("id", "one").with("name", "a").with("value", 1)];
        assert!(rows_to_batch(&schema(), &rows).is_err());
    }

    #[test]
    fn empty_rows_give_empty_batch() {
        let batch = rows_to_batch(&legislature::votes_schema(), &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.num_columns(), 8);
    }
}
