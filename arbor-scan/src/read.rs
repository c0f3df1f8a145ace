use arbor_error::{ArborResult, arbor_bail, arbor_err};
use arbor_frame::{Flatten, FlattenPlan, LabeledTable};
use arbor_select::{ColumnResolver, ColumnSpec};
use itertools::Itertools;

use crate::{ExtractOptions, StorageEngine, TableStream};

/// Options for reading one tree from one or more files.
///
/// ```
/// use arbor_scan::{MemoryStorage, ReadOptions};
/// # use std::sync::Arc;
/// # use arrow_array::{ArrayRef, Int32Array, RecordBatch};
///
/// let engine = MemoryStorage::new();
/// # let batch = RecordBatch::try_from_iter([
/// #     ("pt_x", Arc::new(Int32Array::from(vec![1, 2, 3])) as ArrayRef),
/// #     ("pt_y", Arc::new(Int32Array::from(vec![4, 5, 6])) as ArrayRef),
/// # ])?;
/// engine.insert("events.root", "events", batch);
///
/// let table = ReadOptions::new(["events.root"])
///     .with_columns(["pt_{x,y}"])
///     .read(&engine)?;
/// assert_eq!(table.num_rows(), 3);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    paths: Vec<String>,
    key: Option<String>,
    columns: ColumnSpec,
    chunk_size: Option<usize>,
    filter: Option<String>,
    flatten: Flatten,
    extract_options: ExtractOptions,
}

impl ReadOptions {
    /// Read the files `paths`, whose rows are concatenated in order.
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// The tree to read. Without one, the first file must hold exactly one tree.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Columns to read, as brace/glob patterns or `noexpand:` expressions.
    pub fn with_columns<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = self.columns.with_include(specs);
        self
    }

    /// Columns to leave out, applied after [`with_columns`](Self::with_columns).
    pub fn with_ignore<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.columns = self.columns.with_ignore(specs);
        self
    }

    /// Read at most `chunk_size` rows per extraction, see [`TableStream`].
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    /// Keep only the rows selected by the storage engine's filter expression `filter`.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    pub fn with_flatten(mut self, flatten: impl Into<Flatten>) -> Self {
        self.flatten = flatten.into();
        self
    }

    pub fn with_extract_options(mut self, extract_options: ExtractOptions) -> Self {
        self.extract_options = extract_options;
        self
    }

    /// Read everything into a single table; the chunk size is ignored.
    pub fn read<E: StorageEngine + ?Sized>(mut self, engine: &E) -> ArborResult<LabeledTable> {
        self.chunk_size = None;
        self.scan(engine)?
            .next()
            .ok_or_else(|| arbor_err!("Read produced no table"))?
    }

    /// Plan the read and return the stream of its tables.
    ///
    /// Columns are resolved against the schema of the first file holding the tree. Nothing is
    /// extracted until the stream is polled.
    pub fn scan<E: StorageEngine + ?Sized>(self, engine: &E) -> ArborResult<TableStream<'_, E>> {
        let Some(first) = self.paths.first() else {
            arbor_bail!("No input files to read");
        };
        if self.chunk_size == Some(0) {
            arbor_bail!("Chunk size must be positive");
        }

        let key = match &self.key {
            Some(key) => key.clone(),
            None => detect_key(engine, first)?,
        };

        let seed = self.seed_file(engine, &key)?;
        let schema = engine.list_columns(seed, &key)?;
        let columns = ColumnResolver::new(&schema).resolve(&self.columns)?;
        let flatten = FlattenPlan::try_new(&self.flatten, &columns)?;
        let total_rows = engine.row_count(&key, &self.paths, &self.extract_options)?;
        log::debug!(
            "Reading {} rows of tree '{}' from {} files, columns {}",
            total_rows,
            key,
            self.paths.len(),
            columns
        );

        Ok(TableStream::new(
            engine,
            self.paths,
            key,
            columns,
            self.filter,
            flatten,
            self.extract_options,
            total_rows,
            self.chunk_size.map(|size| size as u64),
        ))
    }

    /// The file whose schema drives column resolution.
    fn seed_file<E: StorageEngine + ?Sized>(&self, engine: &E, key: &str) -> ArborResult<&str> {
        let Some(first) = self.paths.first() else {
            arbor_bail!("No input files to read");
        };
        if !self.extract_options.warn_missing_key() {
            return Ok(first);
        }
        for path in &self.paths {
            if engine.list_keys(path)?.iter().any(|k| k == key) {
                return Ok(path);
            }
        }
        arbor_bail!(MissingKey: "Tree '{}' not found in any input file", key)
    }
}

fn detect_key<E: StorageEngine + ?Sized>(engine: &E, file: &str) -> ArborResult<String> {
    let mut keys = engine.list_keys(file)?;
    match keys.len() {
        0 => arbor_bail!(AmbiguousSource: "No trees found in {}", file),
        1 => Ok(keys.remove(0)),
        _ => arbor_bail!(
            AmbiguousSource: "More than one tree found in {}: {}",
            file,
            keys.iter().join(", ")
        ),
    }
}
