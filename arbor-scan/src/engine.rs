use std::fmt::{Display, Formatter};
use std::str::FromStr;

use arbor_error::{ArborError, ArborResult, arbor_err};
use arbor_select::{ColumnSchema, ResolvedColumns};
use arrow_array::RecordBatch;

/// The tree name used when the caller does not choose one.
pub const DEFAULT_KEY: &str = "default";

/// The storage engine behind Arbor: it owns the on-disk format.
///
/// Arbor resolves columns, plans chunks, flattens arrays and encodes the row index; everything
/// touching the files themselves goes through this trait.
pub trait StorageEngine {
    /// The names of the trees in `file`, in file order.
    fn list_keys(&self, file: &str) -> ArborResult<Vec<String>>;

    /// The column names of tree `key` in `file`.
    fn list_columns(&self, file: &str, key: &str) -> ArborResult<ColumnSchema>;

    /// The number of rows of tree `key` over all `files`, before any filter.
    fn row_count(&self, key: &str, files: &[String], options: &ExtractOptions) -> ArborResult<u64>;

    /// Read rows `[start, stop)` of the tree `key` concatenated over all request files.
    ///
    /// The returned batch holds the requested columns in request order. Verbatim expressions are
    /// evaluated by the engine and named by their text. Rows rejected by the filter are dropped,
    /// so the batch may be shorter than the requested range.
    fn extract(&self, request: &ExtractRequest<'_>) -> ArborResult<RecordBatch>;

    /// Store `batch` as tree `key` of `file`.
    fn write(
        &self,
        batch: RecordBatch,
        file: &str,
        key: &str,
        options: &WriteOptions,
    ) -> ArborResult<()>;
}

/// One bounded extraction issued to a [`StorageEngine`].
#[derive(Debug, Clone, Copy)]
pub struct ExtractRequest<'a> {
    pub files: &'a [String],
    pub key: &'a str,
    pub columns: &'a ResolvedColumns,
    /// First row of the range, counted over the concatenation of `files`.
    pub start: u64,
    /// End of the range, exclusive. `None` reads to the end of the last file.
    pub stop: Option<u64>,
    /// Filter expression, evaluated by the engine.
    pub filter: Option<&'a str>,
    pub options: &'a ExtractOptions,
}

/// Options passed through to every extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    warn_missing_key: bool,
}

impl ExtractOptions {
    /// Skip files without the requested tree, logging a warning, instead of failing.
    pub fn with_warn_missing_key(mut self, warn_missing_key: bool) -> Self {
        self.warn_missing_key = warn_missing_key;
        self
    }

    pub fn warn_missing_key(&self) -> bool {
        self.warn_missing_key
    }
}

/// What happens to an existing file on write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Replace the file and every tree in it.
    #[default]
    Recreate,
    /// Keep the file. Rows are appended to an existing tree, or a new tree is added.
    Update,
}

impl FromStr for WriteMode {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "w" | "recreate" => Ok(WriteMode::Recreate),
            "a" | "update" => Ok(WriteMode::Update),
            _ => Err(arbor_err!(
                InvalidArgument: "Unknown write mode '{}', use 'w' to recreate or 'a' to update",
                s
            )),
        }
    }
}

impl Display for WriteMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteMode::Recreate => write!(f, "recreate"),
            WriteMode::Update => write!(f, "update"),
        }
    }
}

/// Options for [`write_table`](crate::write_table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOptions {
    mode: WriteMode,
    store_index: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            mode: WriteMode::default(),
            store_index: true,
        }
    }
}

impl WriteOptions {
    pub fn with_mode(mut self, mode: WriteMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether the row index is written as an extra column, on by default.
    pub fn with_store_index(mut self, store_index: bool) -> Self {
        self.store_index = store_index;
        self
    }

    pub fn mode(&self) -> WriteMode {
        self.mode
    }

    pub fn store_index(&self) -> bool {
        self.store_index
    }
}
