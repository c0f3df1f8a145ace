//! Column selection for Arbor reads.
//!
//! A read names the columns it wants with specifiers. A specifier is either a shell-style
//! pattern, optionally containing brace alternations (`pt_{x,y}*`), or a verbatim expression
//! prefixed with [`VERBATIM_PREFIX`] that is handed to the storage engine untouched. The
//! [`ColumnResolver`] turns include and ignore specifiers into the concrete
//! [`ResolvedColumns`] of a single tree.

mod braces;
mod glob;
mod resolve;
mod schema;

pub use braces::*;
pub use glob::*;
pub use resolve::*;
pub use schema::*;

/// Prefix of the column that carries a table's row index through storage.
///
/// The rest of the column name is the index's name; an empty rest means an unnamed index.
pub const INDEX_PREFIX: &str = "__index__";

/// Name of the column holding each flattened row's position within its source array.
pub const ARRAY_INDEX_COLUMN: &str = "__array_index";

/// Prefix marking a column specifier that is forwarded to the storage engine unresolved.
pub const VERBATIM_PREFIX: &str = "noexpand:";

/// Whether `name` is a column carrying a stored row index.
#[inline]
pub fn is_index_column(name: &str) -> bool {
    name.starts_with(INDEX_PREFIX)
}
