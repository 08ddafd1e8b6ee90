// LanceDB vector database module
// Arrow schema of a collection table and conversion between record batches
// and stored records


pub mod vector_store;

use std::collections::BTreeMap;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, FixedSizeListArray, Float32Array, Int64Array, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::DateTime;

use super::{Collection, Record, RecordFilter, RecordMetadata};
use crate::{MemoryError, Result};

pub const VECTOR_COLUMN: &str = "vector";

/// Schema of a collection table with vectors of `vector_dim` components
#[inline]
pub fn record_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("text", DataType::Utf8, false),
        Field::new("author", DataType::Utf8, true),
        Field::new("channel", DataType::Utf8, true),
        Field::new("platform", DataType::Utf8, true),
        Field::new("role", DataType::Utf8, true),
        Field::new("source", DataType::Utf8, true),
        Field::new("parent_id", DataType::Utf8, true),
        Field::new("chunk_index", DataType::UInt32, true),
        // free-form metadata as a JSON object of strings
        Field::new("extra", DataType::Utf8, false),
        // milliseconds since the Unix epoch
        Field::new("created_at", DataType::Int64, false),
    ]))
}

/// Vector dimension declared by an existing table schema
#[inline]
pub fn schema_vector_dimension(schema: &Schema) -> Option<usize> {
    schema
        .field_with_name(VECTOR_COLUMN)
        .ok()
        .and_then(|field| match field.data_type() {
            DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
            _ => None,
        })
}

/// Quote a value for use inside a Lance filter expression
#[inline]
pub fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Lance filter expression selecting the records of `collection` that pass
/// `filter`, `None` when nothing is excluded
#[inline]
pub fn filter_predicate(filter: &RecordFilter, collection: Collection) -> Option<String> {
    if !filter.applies_to(collection) {
        return None;
    }

    let clauses: Vec<String> = [
        ("author", &filter.author),
        ("channel", &filter.channel),
        ("platform", &filter.platform),
    ]
    .into_iter()
    .filter_map(|(column, value)| {
        value
            .as_deref()
            .map(|value| format!("{} = {}", column, sql_literal(value)))
    })
    .collect();
    Some(clauses.join(" AND "))
}

/// Build a record batch from records that all carry `vector_dim` components
#[inline]
pub fn records_to_batch(records: &[Record], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut flat_values = Vec::with_capacity(len * vector_dim);
    let mut extras = Vec::with_capacity(len);
    for record in records {
        if record.vector.len() != vector_dim {
            return Err(MemoryError::Configuration(format!(
                "record {} has {} dimensions, store expects {}",
                record.id,
                record.vector.len(),
                vector_dim
            )));
        }
        flat_values.extend_from_slice(&record.vector);
        extras.push(
            serde_json::to_string(&record.metadata.extra)
                .map_err(|e| MemoryError::Other(e.into()))?,
        );
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        vector_dim as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| store_error("Failed to create vector array", e))?;

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            records.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(vector_array),
        Arc::new(StringArray::from(
            records.iter().map(|r| r.text.as_str()).collect::<Vec<_>>(),
        )),
        optional_column(records, |m| m.author.as_deref()),
        optional_column(records, |m| m.channel.as_deref()),
        optional_column(records, |m| m.platform.as_deref()),
        optional_column(records, |m| m.role.as_deref()),
        optional_column(records, |m| m.source.as_deref()),
        optional_column(records, |m| m.parent_id.as_deref()),
        Arc::new(UInt32Array::from(
            records
                .iter()
                .map(|r| r.metadata.chunk_index)
                .collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(extras)),
        Arc::new(Int64Array::from(
            records
                .iter()
                .map(|r| r.created_at.timestamp_millis())
                .collect::<Vec<_>>(),
        )),
    ];

    RecordBatch::try_new(record_schema(vector_dim), arrays)
        .map_err(|e| store_error("Failed to create record batch", e))
}

/// Decode every row of a batch read from `collection`'s table
#[inline]
pub fn batch_to_records(batch: &RecordBatch, collection: Collection) -> Result<Vec<Record>> {
    let ids = column::<StringArray>(batch, "id")?;
    let vectors = column::<FixedSizeListArray>(batch, VECTOR_COLUMN)?;
    let texts = column::<StringArray>(batch, "text")?;
    let authors = column::<StringArray>(batch, "author")?;
    let channels = column::<StringArray>(batch, "channel")?;
    let platforms = column::<StringArray>(batch, "platform")?;
    let roles = column::<StringArray>(batch, "role")?;
    let sources = column::<StringArray>(batch, "source")?;
    let parent_ids = column::<StringArray>(batch, "parent_id")?;
    let chunk_indexes = column::<UInt32Array>(batch, "chunk_index")?;
    let extras = column::<StringArray>(batch, "extra")?;
    let created_ats = column::<Int64Array>(batch, "created_at")?;

    let optional = |array: &StringArray, row: usize| -> Option<String> {
        (!array.is_null(row)).then(|| array.value(row).to_string())
    };

    let mut records = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let vector_values = vectors.value(row);
        let vector = vector_values
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| {
                MemoryError::StoreUnavailable("Invalid vector column type".to_string())
            })?
            .values()
            .to_vec();

        let extra: BTreeMap<String, String> = serde_json::from_str(extras.value(row))
            .map_err(|e| store_error("Invalid extra metadata", e))?;

        let created_at = DateTime::from_timestamp_millis(created_ats.value(row)).ok_or_else(|| {
            MemoryError::StoreUnavailable(format!(
                "Invalid timestamp {} in collection {}",
                created_ats.value(row),
                collection
            ))
        })?;

        records.push(Record {
            id: ids.value(row).to_string(),
            collection,
            vector,
            text: texts.value(row).to_string(),
            metadata: RecordMetadata {
                author: optional(authors, row),
                channel: optional(channels, row),
                platform: optional(platforms, row),
                role: optional(roles, row),
                source: optional(sources, row),
                parent_id: optional(parent_ids, row),
                chunk_index: (!chunk_indexes.is_null(row)).then(|| chunk_indexes.value(row)),
                extra,
            },
            created_at,
        });
    }

    Ok(records)
}

fn optional_column(
    records: &[Record],
    get: impl Fn(&RecordMetadata) -> Option<&str>,
) -> ArrayRef {
    Arc::new(StringArray::from(
        records
            .iter()
            .map(|r| get(&r.metadata))
            .collect::<Vec<_>>(),
    ))
}

fn column<'a, T: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| MemoryError::StoreUnavailable(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| MemoryError::StoreUnavailable(format!("Invalid {} column type", name)))
}

pub(crate) fn store_error(context: &str, error: impl std::fmt::Display) -> MemoryError {
    MemoryError::StoreUnavailable(format!("{}: {}", context, error))
}
