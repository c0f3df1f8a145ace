//! Labeled tables and the transforms layered on top of storage.
//!
//! A [`LabeledTable`] is an Arrow [`RecordBatch`](arrow_array::RecordBatch) plus a
//! [`RowIndex`]. Storage has no notion of a row index, so [`encode_index`] stores it in an extra
//! column named after [`INDEX_PREFIX`](arbor_select::INDEX_PREFIX) and [`decode_index`] turns
//! that column back into the index. [`FlattenPlan`] expands array columns into rows.

mod codec;
mod flatten;
mod table;

pub use codec::*;
pub use flatten::*;
pub use table::*;
