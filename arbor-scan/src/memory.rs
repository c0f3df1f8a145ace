use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use arbor_error::{ArborResult, arbor_bail, arbor_err};
use arbor_select::{ColumnSchema, ResolvedColumn};
use arrow_array::{Array, ArrayRef, BooleanArray, RecordBatch, RecordBatchOptions};
use arrow_schema::{Field, FieldRef, Schema};
use arrow_select::concat::concat_batches;
use arrow_select::filter::filter_record_batch;
use itertools::Itertools;
use parking_lot::RwLock;

use crate::{ExtractOptions, ExtractRequest, StorageEngine, WriteMode, WriteOptions};

/// Computes a derived column from the rows of a tree.
pub type ExpressionFn = dyn Fn(&RecordBatch) -> ArborResult<ArrayRef> + Send + Sync;

/// Selects the rows of a tree to keep.
pub type PredicateFn = dyn Fn(&RecordBatch) -> ArborResult<BooleanArray> + Send + Sync;

#[derive(Debug, Clone)]
struct Tree {
    key: String,
    batch: RecordBatch,
}

/// A [`StorageEngine`] holding every tree of every file as one Arrow batch in memory.
///
/// The engine has no expression language of its own. Verbatim column expressions and filters
/// are looked up by their exact text among the closures registered with
/// [`with_expression`](Self::with_expression) and [`with_filter`](Self::with_filter).
#[derive(Default)]
pub struct MemoryStorage {
    files: RwLock<HashMap<String, Vec<Tree>>>,
    expressions: HashMap<String, Arc<ExpressionFn>>,
    filters: HashMap<String, Arc<PredicateFn>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the derived column computed for the verbatim expression `text`.
    pub fn with_expression<F>(mut self, text: impl Into<String>, expression: F) -> Self
    where
        F: Fn(&RecordBatch) -> ArborResult<ArrayRef> + Send + Sync + 'static,
    {
        self.expressions.insert(text.into(), Arc::new(expression));
        self
    }

    /// Register the predicate evaluated for the filter expression `text`.
    pub fn with_filter<F>(mut self, text: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&RecordBatch) -> ArborResult<BooleanArray> + Send + Sync + 'static,
    {
        self.filters.insert(text.into(), Arc::new(predicate));
        self
    }

    /// Store `batch` as tree `key` of `file`, replacing any tree of that name.
    pub fn insert(&self, file: impl Into<String>, key: impl Into<String>, batch: RecordBatch) {
        let key = key.into();
        let mut files = self.files.write();
        let trees = files.entry(file.into()).or_default();
        match trees.iter_mut().find(|tree| tree.key == key) {
            Some(tree) => tree.batch = batch,
            None => trees.push(Tree { key, batch }),
        }
    }

    /// The stored rows of tree `key` of `file`.
    pub fn get(&self, file: &str, key: &str) -> Option<RecordBatch> {
        self.files
            .read()
            .get(file)
            .and_then(|trees| trees.iter().find(|tree| tree.key == key))
            .map(|tree| tree.batch.clone())
    }

    /// The batches of tree `key` in `files`, in file order.
    fn trees(
        &self,
        key: &str,
        files: &[String],
        options: &ExtractOptions,
    ) -> ArborResult<Vec<RecordBatch>> {
        let mut batches = Vec::with_capacity(files.len());
        for file in files {
            match self.get(file, key) {
                Some(batch) => batches.push(batch),
                None if options.warn_missing_key() => {
                    log::warn!("Skipping '{}' which has no tree '{}'", file, key);
                }
                None => arbor_bail!(MissingKey: "Tree '{}' not found in '{}'", key, file),
            }
        }
        Ok(batches)
    }

    /// Project, derive and filter the rows of one slice of a tree.
    fn evaluate(&self, rows: &RecordBatch, request: &ExtractRequest<'_>) -> ArborResult<RecordBatch> {
        let mut fields: Vec<FieldRef> = Vec::with_capacity(request.columns.len());
        let mut columns = Vec::with_capacity(request.columns.len());
        for column in request.columns {
            match column {
                ResolvedColumn::Column(name) => {
                    let (idx, field) = rows.schema_ref().column_with_name(name).ok_or_else(|| {
                        arbor_err!(
                            MismatchedTypes: "Column '{}' is missing from tree '{}'",
                            name,
                            request.key
                        )
                    })?;
                    fields.push(Arc::new(field.clone()));
                    columns.push(rows.column(idx).clone());
                }
                ResolvedColumn::Expression(text) => {
                    let expression = self.expressions.get(text).ok_or_else(|| {
                        arbor_err!(NotImplemented: "Cannot evaluate expression '{}'", text)
                    })?;
                    let values = expression(rows)?;
                    if values.len() != rows.num_rows() {
                        arbor_bail!(
                            MismatchedTypes: "Expression '{}' produced {} values for {} rows",
                            text,
                            values.len(),
                            rows.num_rows()
                        );
                    }
                    fields.push(Arc::new(Field::new(text, values.data_type().clone(), true)));
                    columns.push(values);
                }
            }
        }

        let batch = RecordBatch::try_new_with_options(
            Arc::new(Schema::new(fields)),
            columns,
            &RecordBatchOptions::new().with_row_count(Some(rows.num_rows())),
        )?;

        let Some(filter) = request.filter else {
            return Ok(batch);
        };
        let predicate = self
            .filters
            .get(filter)
            .ok_or_else(|| arbor_err!(NotImplemented: "Cannot evaluate filter '{}'", filter))?;
        Ok(filter_record_batch(&batch, &predicate(rows)?)?)
    }
}

impl Debug for MemoryStorage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("files", &self.files.read().keys().sorted().collect_vec())
            .field("expressions", &self.expressions.keys().sorted().collect_vec())
            .field("filters", &self.filters.keys().sorted().collect_vec())
            .finish()
    }
}

fn to_usize(value: u64) -> ArborResult<usize> {
    usize::try_from(value).map_err(|_| arbor_err!(OutOfBounds: "Row {} is out of range", value))
}

impl StorageEngine for MemoryStorage {
    fn list_keys(&self, file: &str) -> ArborResult<Vec<String>> {
        let files = self.files.read();
        let trees = files
            .get(file)
            .ok_or_else(|| arbor_err!(InvalidArgument: "No such file '{}'", file))?;
        Ok(trees.iter().map(|tree| tree.key.clone()).collect())
    }

    fn list_columns(&self, file: &str, key: &str) -> ArborResult<ColumnSchema> {
        let batch = self
            .get(file, key)
            .ok_or_else(|| arbor_err!(MissingKey: "Tree '{}' not found in '{}'", key, file))?;
        Ok(batch
            .schema_ref()
            .fields()
            .iter()
            .map(|field| field.name().as_str())
            .collect())
    }

    fn row_count(&self, key: &str, files: &[String], options: &ExtractOptions) -> ArborResult<u64> {
        Ok(self
            .trees(key, files, options)?
            .iter()
            .map(|batch| batch.num_rows() as u64)
            .sum())
    }

    fn extract(&self, request: &ExtractRequest<'_>) -> ArborResult<RecordBatch> {
        let trees = self.trees(request.key, request.files, request.options)?;
        let Some(first) = trees.first() else {
            arbor_bail!(MissingKey: "Tree '{}' not found in any input file", request.key);
        };

        let stop = request.stop.unwrap_or(u64::MAX);
        let mut offset = 0u64;
        let mut pieces = Vec::new();
        for batch in &trees {
            let rows = batch.num_rows() as u64;
            let begin = request.start.max(offset);
            let end = stop.min(offset + rows);
            if begin < end {
                let slice = batch.slice(to_usize(begin - offset)?, to_usize(end - begin)?);
                pieces.push(self.evaluate(&slice, request)?);
            }
            offset += rows;
        }
        log::debug!(
            "Extracted rows {}..{} of '{}' from {} of {} files",
            request.start,
            stop.min(offset),
            request.key,
            pieces.len(),
            trees.len()
        );

        let schema = match pieces.first() {
            Some(piece) => piece.schema(),
            None => {
                let empty = self.evaluate(&first.slice(0, 0), request)?;
                let schema = empty.schema();
                pieces.push(empty);
                schema
            }
        };
        Ok(concat_batches(&schema, &pieces)?)
    }

    fn write(
        &self,
        batch: RecordBatch,
        file: &str,
        key: &str,
        options: &WriteOptions,
    ) -> ArborResult<()> {
        let mut files = self.files.write();
        match options.mode() {
            WriteMode::Recreate => {
                files.insert(
                    file.to_string(),
                    vec![Tree {
                        key: key.to_string(),
                        batch,
                    }],
                );
            }
            WriteMode::Update => {
                let trees = files.entry(file.to_string()).or_default();
                match trees.iter_mut().find(|tree| tree.key == key) {
                    Some(tree) => {
                        if tree.batch.schema_ref().fields() != batch.schema_ref().fields() {
                            arbor_bail!(
                                MismatchedTypes: "Cannot append to tree '{}' of '{}' with different columns",
                                key,
                                file
                            );
                        }
                        let appended = concat_batches(tree.batch.schema_ref(), [&tree.batch, &batch])?;
                        tree.batch = appended;
                    }
                    None => trees.push(Tree {
                        key: key.to_string(),
                        batch,
                    }),
                }
            }
        }
        log::debug!("Wrote tree '{}' of '{}' ({})", key, file, options.mode());
        Ok(())
    }
}
