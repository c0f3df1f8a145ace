use arbor_error::{ArborResult, ResultExt};
use arbor_frame::{FlattenPlan, LabeledTable, decode_index};
use arbor_select::ResolvedColumns;

use crate::{ExtractOptions, ExtractRequest, StorageEngine};

/// The row ranges a read extracts, one per chunk.
#[derive(Debug, Clone)]
struct ChunkPlan {
    next: u64,
    total: u64,
    chunk_size: Option<u64>,
    done: bool,
}

impl ChunkPlan {
    fn new(total: u64, chunk_size: Option<u64>) -> Self {
        Self {
            next: 0,
            total,
            chunk_size,
            done: false,
        }
    }

    fn chunk_count(&self) -> u64 {
        match self.chunk_size {
            None => 1,
            Some(size) => self.total.div_ceil(size),
        }
    }

    fn next_range(&mut self) -> Option<(u64, Option<u64>)> {
        if self.done {
            return None;
        }
        let Some(size) = self.chunk_size else {
            self.done = true;
            return Some((0, None));
        };
        if self.next >= self.total {
            self.done = true;
            return None;
        }
        let start = self.next;
        self.next = self.total.min(start.saturating_add(size));
        Some((start, Some(self.next)))
    }

    fn stop(&mut self) {
        self.done = true;
    }
}

/// A lazy, forward-only sequence of labeled tables read from one tree of several files.
///
/// Each step extracts one chunk of the files' concatenated rows, flattens it if requested and
/// decodes its row index. Files without a stored index get a default index that continues
/// across chunks and files: the first row of every table is numbered by the count of rows
/// yielded before it. Chunks left empty by the filter are skipped.
///
/// Without a chunk size the stream yields exactly one table, which may be empty. Iteration
/// ends after the first error.
pub struct TableStream<'a, E: StorageEngine + ?Sized> {
    engine: &'a E,
    files: Vec<String>,
    key: String,
    columns: ResolvedColumns,
    filter: Option<String>,
    flatten: Option<FlattenPlan>,
    options: ExtractOptions,
    plan: ChunkPlan,
    offset: u64,
}

impl<'a, E: StorageEngine + ?Sized> TableStream<'a, E> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: &'a E,
        files: Vec<String>,
        key: String,
        columns: ResolvedColumns,
        filter: Option<String>,
        flatten: Option<FlattenPlan>,
        options: ExtractOptions,
        total_rows: u64,
        chunk_size: Option<u64>,
    ) -> Self {
        Self {
            engine,
            files,
            key,
            columns,
            filter,
            flatten,
            options,
            plan: ChunkPlan::new(total_rows, chunk_size),
            offset: 0,
        }
    }

    /// The number of chunks the read was split into, before skipping empty ones.
    pub fn chunk_count(&self) -> u64 {
        self.plan.chunk_count()
    }

    /// The tree being read.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The columns each extraction fetches.
    pub fn columns(&self) -> &ResolvedColumns {
        &self.columns
    }

    fn read_chunk(&mut self, start: u64, stop: Option<u64>) -> ArborResult<Option<LabeledTable>> {
        let mut batch = self
            .engine
            .extract(&ExtractRequest {
                files: &self.files,
                key: &self.key,
                columns: &self.columns,
                start,
                stop,
                filter: self.filter.as_deref(),
                options: &self.options,
            })
            .with_context(|| format!("Failed to read tree '{}' from row {}", self.key, start))?;
        if let Some(flatten) = &self.flatten {
            batch = flatten.apply(&batch)?;
        }
        if stop.is_some() && batch.num_rows() == 0 {
            log::debug!("Skipping empty chunk at row {}", start);
            return Ok(None);
        }

        let rows = batch.num_rows() as u64;
        let table = decode_index(batch, self.offset)?;
        self.offset += rows;
        Ok(Some(table))
    }
}

impl<E: StorageEngine + ?Sized> Iterator for TableStream<'_, E> {
    type Item = ArborResult<LabeledTable>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((start, stop)) = self.plan.next_range() {
            match self.read_chunk(start, stop) {
                Ok(Some(table)) => return Some(Ok(table)),
                Ok(None) => {}
                Err(err) => {
                    self.plan.stop();
                    return Some(Err(err));
                }
            }
        }
        None
    }
}
