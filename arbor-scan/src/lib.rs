//! Reading and writing labeled tables through a [`StorageEngine`].
//!
//! A read is configured with [`ReadOptions`]: the files to concatenate, the tree, the columns
//! and optionally a chunk size, a filter and the array columns to flatten. Planning resolves the
//! columns once; the resulting [`TableStream`] then extracts chunk after chunk on demand.
//! [`write_table`] stores a table, row index included.
//!
//! [`MemoryStorage`] is an in-memory engine for tests and small datasets.

mod engine;
mod memory;
mod read;
mod stream;
mod write;

pub use engine::*;
pub use memory::*;
pub use read::*;
pub use stream::*;
pub use write::*;

#[cfg(test)]
mod tests;
