use std::sync::Arc;

use arbor_error::{ArborResult, arbor_bail};
use arbor_select::{INDEX_PREFIX, is_index_column};
use arrow_array::{Array, RecordBatch};
use arrow_schema::{Field, Schema};
use itertools::Itertools;

use crate::{LabeledTable, RowIndex};

/// The column of a batch that carries the row index, and the index's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    position: usize,
    name: Option<String>,
}

impl IndexDescriptor {
    /// Find the index column among the column `names`.
    ///
    /// More than one index column is an [`AmbiguousIndex`](arbor_error::ArborError::AmbiguousIndex)
    /// error; the writer never produces such files.
    pub fn find<'a>(names: impl IntoIterator<Item = &'a str>) -> ArborResult<Option<Self>> {
        let found = names
            .into_iter()
            .enumerate()
            .filter(|(_, name)| is_index_column(name))
            .collect_vec();

        match found.as_slice() {
            [] => Ok(None),
            [(position, column)] => {
                let suffix = &column[INDEX_PREFIX.len()..];
                Ok(Some(Self {
                    position: *position,
                    name: (!suffix.is_empty()).then(|| suffix.to_string()),
                }))
            }
            _ => arbor_bail!(
                AmbiguousIndex: "More than one index found in file: {}",
                found.iter().map(|(_, name)| name).join(", ")
            ),
        }
    }

    /// Position of the index column.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Name of the index, `None` when unnamed.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

/// The name of the column storing an index called `name`.
pub fn index_column_name(name: Option<&str>) -> String {
    format!("{INDEX_PREFIX}{}", name.unwrap_or_default())
}

/// Fails when a column name occurs more than once.
pub fn check_unique_columns<'a>(names: impl IntoIterator<Item = &'a str>) -> ArborResult<()> {
    let duplicates = names.into_iter().duplicates().collect_vec();
    if !duplicates.is_empty() {
        arbor_bail!(
            DuplicateColumns: "Table contains duplicated column names {}",
            duplicates.join(", ")
        );
    }
    Ok(())
}

/// Encode `table` into the batch handed to storage.
///
/// With `store_index` the row index is appended as the last column, named by
/// [`index_column_name`]. A default index is written as `Int64` row numbers. Data columns
/// named with the [`INDEX_PREFIX`] are rejected, with or without `store_index`.
pub fn encode_index(table: &LabeledTable, store_index: bool) -> ArborResult<RecordBatch> {
    let batch = table.batch();
    let schema = batch.schema_ref();
    check_unique_columns(table.column_names())?;
    if let Some(column) = table.column_names().find(|name| is_index_column(name)) {
        arbor_bail!(
            DuplicateColumns: "Table contains a column '{}' which is reserved for the index",
            column
        );
    }
    if !store_index {
        return Ok(batch.clone());
    }

    let values = table.index_array()?;
    let field = Field::new(
        index_column_name(table.index().name()),
        values.data_type().clone(),
        values.null_count() > 0,
    );

    let fields = schema
        .fields()
        .iter()
        .cloned()
        .chain([Arc::new(field)])
        .collect_vec();
    let mut columns = batch.columns().to_vec();
    columns.push(values);

    Ok(RecordBatch::try_new(
        Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
        columns,
    )?)
}

/// Decode a batch read from storage into a labeled table.
///
/// A stored index column becomes the row index. Without one the table gets a default index
/// starting at `start_index`, which lets consecutive chunks of a read continue one another.
pub fn decode_index(mut batch: RecordBatch, start_index: u64) -> ArborResult<LabeledTable> {
    let descriptor = IndexDescriptor::find(
        batch
            .schema_ref()
            .fields()
            .iter()
            .map(|field| field.name().as_str()),
    )?;

    match descriptor {
        None => Ok(LabeledTable::with_default_index(batch, start_index)),
        Some(IndexDescriptor { position, name }) => {
            let values = batch.remove_column(position);
            LabeledTable::try_new(batch, RowIndex::stored(name, values))
        }
    }
}
