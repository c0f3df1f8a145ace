use std::sync::Arc;

use arbor_error::{ArborResult, arbor_bail, arbor_err};
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch};
use arrow_schema::SchemaRef;
use arrow_select::concat::{concat, concat_batches};
use itertools::Itertools;

/// The values of a [`RowIndex`].
#[derive(Debug, Clone)]
pub enum IndexValues {
    /// Consecutive row numbers starting at `start`, one per row of the table.
    Default { start: u64 },
    /// Explicit index values, one per row of the table.
    Stored(ArrayRef),
}

/// The row labels of a [`LabeledTable`].
#[derive(Debug, Clone)]
pub struct RowIndex {
    name: Option<String>,
    values: IndexValues,
}

impl RowIndex {
    /// A default index numbering rows from `start`.
    pub fn default_from(start: u64) -> Self {
        Self {
            name: None,
            values: IndexValues::Default { start },
        }
    }

    /// An index with explicit values.
    pub fn stored(name: Option<String>, values: ArrayRef) -> Self {
        Self {
            name,
            values: IndexValues::Stored(values),
        }
    }

    /// Rename the index; `None` leaves it unnamed.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn values(&self) -> &IndexValues {
        &self.values
    }

    /// The first row number of a default index.
    pub fn start(&self) -> Option<u64> {
        match self.values {
            IndexValues::Default { start } => Some(start),
            IndexValues::Stored(_) => None,
        }
    }

    /// The index values for a table of `len` rows as an array.
    ///
    /// A default index is materialized as `Int64`.
    pub fn to_array(&self, len: usize) -> ArborResult<ArrayRef> {
        match &self.values {
            IndexValues::Stored(values) => Ok(values.clone()),
            IndexValues::Default { start } => {
                let begin = i64::try_from(*start)
                    .map_err(|_| arbor_err!(OutOfBounds: "Row index {} exceeds i64", start))?;
                let len = i64::try_from(len)
                    .map_err(|_| arbor_err!(OutOfBounds: "Row count {} exceeds i64", len))?;
                Ok(Arc::new(Int64Array::from_iter_values(begin..begin + len)))
            }
        }
    }
}

/// A table of named columns with a row index.
#[derive(Debug, Clone)]
pub struct LabeledTable {
    batch: RecordBatch,
    index: RowIndex,
}

impl LabeledTable {
    /// A table with the default index `0..num_rows`.
    pub fn new(batch: RecordBatch) -> Self {
        Self::with_default_index(batch, 0)
    }

    /// A table whose default index starts at `start`.
    pub fn with_default_index(batch: RecordBatch, start: u64) -> Self {
        Self {
            batch,
            index: RowIndex::default_from(start),
        }
    }

    /// A table with the given index, which must label every row.
    pub fn try_new(batch: RecordBatch, index: RowIndex) -> ArborResult<Self> {
        if let IndexValues::Stored(values) = index.values() {
            if values.len() != batch.num_rows() {
                arbor_bail!(
                    MismatchedTypes: "Index has {} values but the table has {} rows",
                    values.len(),
                    batch.num_rows()
                );
            }
        }
        Ok(Self { batch, index })
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    pub fn index(&self) -> &RowIndex {
        &self.index
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.batch
            .schema_ref()
            .fields()
            .iter()
            .map(|field| field.name().as_str())
    }

    pub fn column(&self, name: &str) -> Option<&ArrayRef> {
        self.batch.column_by_name(name)
    }

    /// The index values as an array, see [`RowIndex::to_array`].
    pub fn index_array(&self) -> ArborResult<ArrayRef> {
        self.index.to_array(self.num_rows())
    }

    /// Rename the row index; `None` leaves it unnamed.
    pub fn with_index_name(mut self, name: Option<String>) -> Self {
        self.index = self.index.with_name(name);
        self
    }

    pub fn into_parts(self) -> (RecordBatch, RowIndex) {
        (self.batch, self.index)
    }

    /// Stack tables with the same columns on top of each other.
    ///
    /// Default indices that continue one another stay a default index, anything else is
    /// materialized and concatenated.
    pub fn concat(tables: &[LabeledTable]) -> ArborResult<LabeledTable> {
        let Some(first) = tables.first() else {
            arbor_bail!("Cannot concatenate zero tables");
        };
        if let Some(other) = tables.iter().find(|t| t.index.name() != first.index.name()) {
            arbor_bail!(
                MismatchedTypes: "Cannot concatenate tables with index names '{}' and '{}'",
                first.index.name().unwrap_or_default(),
                other.index.name().unwrap_or_default()
            );
        }

        let batch = concat_batches(first.batch.schema_ref(), tables.iter().map(|t| &t.batch))?;

        let contiguous = tables.iter().tuple_windows().all(|(prev, next)| {
            match (prev.index.start(), next.index.start()) {
                (Some(p), Some(n)) => p + prev.num_rows() as u64 == n,
                _ => false,
            }
        });
        let index = match first.index.start() {
            Some(start) if contiguous => {
                RowIndex::default_from(start).with_name(first.index.name.clone())
            }
            _ => {
                let arrays = tables
                    .iter()
                    .map(|t| t.index_array())
                    .collect::<ArborResult<Vec<_>>>()?;
                let arrays = arrays.iter().map(|a| a.as_ref()).collect::<Vec<&dyn Array>>();
                RowIndex::stored(first.index.name.clone(), concat(&arrays)?)
            }
        };

        Self::try_new(batch, index)
    }
}

impl PartialEq for LabeledTable {
    fn eq(&self, other: &Self) -> bool {
        if self.batch != other.batch || self.index.name() != other.index.name() {
            return false;
        }
        match (self.index.start(), other.index.start()) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => match (self.index_array(), other.index_array()) {
                (Ok(lhs), Ok(rhs)) => lhs == rhs,
                _ => false,
            },
        }
    }
}
