use arbor_error::{ArborResult, ResultExt};
use arbor_frame::{LabeledTable, encode_index};

use crate::{StorageEngine, WriteOptions};

/// Write `table` as tree `key` of `file`.
///
/// Unless disabled in `options`, the row index is stored in an extra column so that reading
/// the tree back restores it. Tables with repeated column names are rejected.
pub fn write_table<E: StorageEngine + ?Sized>(
    engine: &E,
    table: &LabeledTable,
    file: &str,
    key: &str,
    options: &WriteOptions,
) -> ArborResult<()> {
    let batch = encode_index(table, options.store_index())?;
    log::debug!(
        "Writing {} rows and {} columns to tree '{}' of '{}'",
        batch.num_rows(),
        batch.num_columns(),
        key,
        file
    );
    engine
        .write(batch, file, key, options)
        .with_context(|| format!("Failed to write tree '{key}' of '{file}'"))
}
