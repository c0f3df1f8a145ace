use std::ops::Range;
use std::sync::Arc;

use arbor_error::{ArborError, arbor_err};
use arbor_frame::{Flatten, LabeledTable, RowIndex};
use arbor_select::ARRAY_INDEX_COLUMN;
use arrow_array::cast::AsArray;
use arrow_array::types::{Int32Type, Int64Type};
use arrow_array::{
    ArrayRef, BooleanArray, FixedSizeListArray, Float64Array, Int32Array, Int64Array, RecordBatch,
    StringArray,
};
use itertools::Itertools;
use rstest::rstest;

use crate::{
    DEFAULT_KEY, ExtractOptions, MemoryStorage, ReadOptions, WriteMode, WriteOptions, write_table,
};

fn frame(rows: Range<i32>) -> RecordBatch {
    let y = rows.clone().map(|x| f64::from(x) * 0.5).collect_vec();
    RecordBatch::try_from_iter([
        ("x", Arc::new(Int32Array::from_iter_values(rows)) as ArrayRef),
        ("y", Arc::new(Float64Array::from(y)) as ArrayRef),
    ])
    .unwrap()
}

fn xs(table: &LabeledTable) -> Vec<i32> {
    table
        .column("x")
        .unwrap()
        .as_primitive::<Int32Type>()
        .values()
        .to_vec()
}

fn index(table: &LabeledTable) -> Vec<i64> {
    table
        .index_array()
        .unwrap()
        .as_primitive::<Int64Type>()
        .values()
        .to_vec()
}

fn without_index() -> WriteOptions {
    WriteOptions::default().with_store_index(false)
}

#[rstest]
#[case(Some("MyAwesomeName"))]
#[case(None)]
fn index_round_trips(#[case] name: Option<&str>) {
    let engine = MemoryStorage::new();
    let values = Arc::new(Int64Array::from(vec![10, 20, 30])) as ArrayRef;
    let table =
        LabeledTable::try_new(frame(0..3), RowIndex::stored(name.map(String::from), values))
            .unwrap();

    write_table(&engine, &table, "tmp.root", DEFAULT_KEY, &WriteOptions::default()).unwrap();
    let read = ReadOptions::new(["tmp.root"]).read(&engine).unwrap();

    assert_eq!(read, table);
    assert_eq!(read.index().name(), name);
}

#[test]
fn default_index_round_trips() {
    let engine = MemoryStorage::new();
    let table = LabeledTable::new(frame(0..4));
    write_table(&engine, &table, "tmp.root", DEFAULT_KEY, &WriteOptions::default()).unwrap();
    assert_eq!(
        engine.get("tmp.root", DEFAULT_KEY).unwrap().schema_ref().field(2).name(),
        "__index__"
    );
    assert_eq!(ReadOptions::new(["tmp.root"]).read(&engine).unwrap(), table);
}

#[test]
fn string_index_survives_chunking() {
    let engine = MemoryStorage::new();
    let labels = Arc::new(StringArray::from(vec!["a", "b", "c", "d", "e"])) as ArrayRef;
    let table =
        LabeledTable::try_new(frame(0..5), RowIndex::stored(Some("id".to_string()), labels))
            .unwrap();
    write_table(&engine, &table, "tmp.root", "t", &WriteOptions::default()).unwrap();

    let chunks = ReadOptions::new(["tmp.root"])
        .with_chunk_size(2)
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(chunks.len(), 3);
    assert!(chunks.iter().all(|chunk| chunk.index().start().is_none()));
    assert_eq!(LabeledTable::concat(&chunks).unwrap(), table);
}

#[test]
fn chunked_read_matches_full_read() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", frame(0..6));

    let full = ReadOptions::new(["tmp.root"]).read(&engine).unwrap();
    let stream = ReadOptions::new(["tmp.root"])
        .with_chunk_size(2)
        .scan(&engine)
        .unwrap();
    assert_eq!(stream.chunk_count(), 3);

    let chunks = stream.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(
        chunks.iter().map(|c| c.index().start()).collect_vec(),
        vec![Some(0), Some(2), Some(4)]
    );
    let joined = LabeledTable::concat(&chunks).unwrap();
    assert_eq!(joined, full);
    assert_eq!(index(&joined), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn chunks_continue_across_files() {
    let engine = MemoryStorage::new();
    let files = ["a.root", "b.root", "c.root"];
    for (file, start) in files.iter().zip([0, 6, 12]) {
        engine.insert(*file, "t", frame(start..start + 6));
    }

    let chunks = ReadOptions::new(files)
        .with_chunk_size(3)
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(chunks.len(), 6);
    for (n, chunk) in chunks.iter().enumerate() {
        let first = i32::try_from(n * 3).unwrap();
        assert_eq!(xs(chunk), vec![first, first + 1, first + 2]);
        assert_eq!(chunk.index().start(), Some(n as u64 * 3));
    }
}

#[test]
fn chunks_may_straddle_files() {
    let engine = MemoryStorage::new();
    engine.insert("a.root", "t", frame(0..3));
    engine.insert("b.root", "t", frame(3..8));

    let chunks = ReadOptions::new(["a.root", "b.root"])
        .with_chunk_size(2)
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        chunks.iter().map(xs).collect_vec(),
        vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]
    );
    assert_eq!(index(&LabeledTable::concat(&chunks).unwrap()), (0..8).collect_vec());
}

#[test]
fn empty_files_add_no_chunks() {
    let engine = MemoryStorage::new();
    engine.insert("a.root", "t", frame(0..3));
    engine.insert("b.root", "t", frame(3..3));
    engine.insert("c.root", "t", frame(3..6));

    let chunks = ReadOptions::new(["a.root", "b.root", "c.root"])
        .with_chunk_size(3)
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(chunks.iter().map(xs).collect_vec(), vec![vec![0, 1, 2], vec![3, 4, 5]]);
    assert_eq!(
        chunks.iter().map(|c| c.index().start()).collect_vec(),
        vec![Some(0), Some(3)]
    );
}

fn filtered_engine() -> MemoryStorage {
    let engine = MemoryStorage::new().with_filter("x >= 3", |batch: &RecordBatch| {
        let x = batch
            .column_by_name("x")
            .ok_or_else(|| arbor_err!("no column x"))?
            .as_primitive::<Int32Type>();
        Ok(x.values().iter().map(|v| Some(*v >= 3)).collect::<BooleanArray>())
    });
    engine.insert("tmp.root", "t", frame(0..10));
    engine
}

#[test]
fn empty_chunks_are_skipped() {
    let engine = filtered_engine();
    let stream = ReadOptions::new(["tmp.root"])
        .with_chunk_size(1)
        .with_filter("x >= 3")
        .scan(&engine)
        .unwrap();
    assert_eq!(stream.chunk_count(), 10);

    let chunks = stream.collect::<Result<Vec<_>, _>>().unwrap();
    assert_eq!(chunks.len(), 7);
    assert_eq!(chunks.iter().flat_map(xs).collect_vec(), (3..10).collect_vec());
    assert_eq!(
        chunks.iter().map(|c| c.index().start()).collect_vec(),
        (0..7).map(Some).collect_vec()
    );
}

#[test]
fn filtered_full_read() {
    let engine = filtered_engine();
    let table = ReadOptions::new(["tmp.root"])
        .with_filter("x >= 3")
        .read(&engine)
        .unwrap();
    assert_eq!(table.num_rows(), 7);
    assert_eq!(index(&table), (0..7).collect_vec());
}

#[test]
fn unknown_filter_ends_the_stream() {
    let engine = filtered_engine();
    let mut stream = ReadOptions::new(["tmp.root"])
        .with_chunk_size(4)
        .with_filter("y < 1")
        .scan(&engine)
        .unwrap();
    let err = stream.next().unwrap().unwrap_err();
    assert!(matches!(err.root_cause(), ArborError::NotImplemented(..)));
    assert!(stream.next().is_none());
}

#[test]
fn full_read_of_empty_selection_yields_one_table() {
    let engine = MemoryStorage::new().with_filter("none", |batch: &RecordBatch| {
        Ok(BooleanArray::from(vec![false; batch.num_rows()]))
    });
    engine.insert("tmp.root", "t", frame(0..5));

    let tables = ReadOptions::new(["tmp.root"])
        .with_filter("none")
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].num_rows(), 0);
    assert_eq!(tables[0].column_names().collect_vec(), vec!["x", "y"]);
}

#[rstest]
#[case(&[], &["y"], &["x"])]
#[case(&["y", "x"], &[], &["y", "x"])]
#[case(&["{x,y}"], &["x"], &["y"])]
#[case(&["*"], &["[x]"], &["y"])]
fn selects_columns(#[case] include: &[&str], #[case] ignore: &[&str], #[case] expected: &[&str]) {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", frame(0..2));
    let table = ReadOptions::new(["tmp.root"])
        .with_columns(include)
        .with_ignore(ignore)
        .read(&engine)
        .unwrap();
    assert_eq!(table.column_names().collect_vec(), expected);
}

#[test]
fn unmatched_column_fails() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", frame(0..2));
    assert!(matches!(
        ReadOptions::new(["tmp.root"]).with_columns(["z*"]).scan(&engine),
        Err(ArborError::UnmatchedPattern(..))
    ));
}

#[test]
fn index_is_kept_with_column_selection() {
    let engine = MemoryStorage::new();
    let values = Arc::new(Int64Array::from(vec![5, 6])) as ArrayRef;
    let table =
        LabeledTable::try_new(frame(0..2), RowIndex::stored(Some("ev".to_string()), values))
            .unwrap();
    write_table(&engine, &table, "tmp.root", "t", &WriteOptions::default()).unwrap();

    let read = ReadOptions::new(["tmp.root"])
        .with_columns(["x"])
        .read(&engine)
        .unwrap();
    assert_eq!(read.column_names().collect_vec(), vec!["x"]);
    assert_eq!(read.index().name(), Some("ev"));
    assert_eq!(index(&read), vec![5, 6]);

    assert!(matches!(
        ReadOptions::new(["tmp.root"])
            .with_ignore(["__index__*"])
            .scan(&engine),
        Err(ArborError::ForbiddenIgnore(..))
    ));
}

#[test]
fn verbatim_columns_are_evaluated_by_the_engine() {
    let engine = MemoryStorage::new().with_expression("x * 2", |batch: &RecordBatch| {
        let x = batch.column(0).as_primitive::<Int32Type>();
        Ok(Arc::new(Int32Array::from_iter_values(x.values().iter().map(|v| v * 2))) as ArrayRef)
    });
    engine.insert("tmp.root", "t", frame(0..3));

    let table = ReadOptions::new(["tmp.root"])
        .with_columns(["x", "noexpand:x * 2"])
        .read(&engine)
        .unwrap();
    assert_eq!(table.column_names().collect_vec(), vec!["x", "x * 2"]);
    assert_eq!(
        table
            .column("x * 2")
            .unwrap()
            .as_primitive::<Int32Type>()
            .values()
            .to_vec(),
        vec![0, 2, 4]
    );
}

#[test]
fn two_index_columns_are_ambiguous() {
    let engine = MemoryStorage::new();
    engine.insert(
        "tmp.root",
        "t",
        RecordBatch::try_from_iter([
            ("__index__a", Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef),
            ("__index__b", Arc::new(Int32Array::from(vec![3, 4])) as ArrayRef),
        ])
        .unwrap(),
    );
    assert!(matches!(
        ReadOptions::new(["tmp.root"]).read(&engine),
        Err(ArborError::AmbiguousIndex(..))
    ));
}

#[test]
fn key_must_be_unambiguous() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "a", frame(0..2));
    engine.insert("tmp.root", "b", frame(0..3));

    assert!(matches!(
        ReadOptions::new(["tmp.root"]).scan(&engine),
        Err(ArborError::AmbiguousSource(..))
    ));
    let table = ReadOptions::new(["tmp.root"])
        .with_key("b")
        .read(&engine)
        .unwrap();
    assert_eq!(table.num_rows(), 3);
}

#[test]
fn missing_tree_can_be_skipped() {
    let engine = MemoryStorage::new();
    engine.insert("a.root", "other", frame(0..1));
    engine.insert("b.root", "t", frame(0..2));
    engine.insert("c.root", "t", frame(2..5));
    let files = ["a.root", "b.root", "c.root"];

    assert!(matches!(
        ReadOptions::new(files).with_key("t").scan(&engine),
        Err(ArborError::MissingKey(..))
    ));

    let table = ReadOptions::new(files)
        .with_key("t")
        .with_extract_options(ExtractOptions::default().with_warn_missing_key(true))
        .read(&engine)
        .unwrap();
    assert_eq!(xs(&table), vec![0, 1, 2, 3, 4]);
}

#[test]
fn duplicate_columns_are_not_written() {
    let engine = MemoryStorage::new();
    let batch = RecordBatch::try_from_iter([
        ("a", Arc::new(Int32Array::from(vec![1])) as ArrayRef),
        ("a", Arc::new(Int32Array::from(vec![2])) as ArrayRef),
    ])
    .unwrap();
    let err = write_table(
        &engine,
        &LabeledTable::new(batch),
        "tmp.root",
        "t",
        &without_index(),
    )
    .unwrap_err();
    assert!(matches!(err, ArborError::DuplicateColumns(..)));
    assert!(engine.get("tmp.root", "t").is_none());
}

#[test]
fn reserved_index_column_is_not_written() {
    let engine = MemoryStorage::new();
    let batch = RecordBatch::try_from_iter([
        ("x", Arc::new(Int32Array::from(vec![1, 2])) as ArrayRef),
        ("__index__a", Arc::new(Int32Array::from(vec![3, 4])) as ArrayRef),
    ])
    .unwrap();
    let table = LabeledTable::new(batch).with_index_name(Some("b".to_string()));
    let err = write_table(&engine, &table, "tmp.root", "t", &WriteOptions::default())
        .unwrap_err();
    assert!(matches!(err, ArborError::DuplicateColumns(..)));
    assert!(engine.get("tmp.root", "t").is_none());
}

#[test]
fn expression_named_like_a_column_is_dropped() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", frame(0..3));

    let table = ReadOptions::new(["tmp.root"])
        .with_columns(["x", "noexpand:x"])
        .read(&engine)
        .unwrap();
    assert_eq!(table.column_names().collect_vec(), vec!["x"]);
    assert_eq!(xs(&table), vec![0, 1, 2]);

    write_table(&engine, &table, "out.root", "t", &without_index()).unwrap();
    assert_eq!(engine.get("out.root", "t").unwrap().num_columns(), 1);
}

#[test]
fn update_appends_to_a_tree() {
    let engine = MemoryStorage::new();
    write_table(&engine, &LabeledTable::new(frame(0..3)), "tmp.root", "t", &without_index())
        .unwrap();
    let update = without_index().with_mode(WriteMode::Update);
    write_table(&engine, &LabeledTable::new(frame(3..5)), "tmp.root", "t", &update).unwrap();

    let table = ReadOptions::new(["tmp.root"]).read(&engine).unwrap();
    assert_eq!(xs(&table), vec![0, 1, 2, 3, 4]);

    let other = RecordBatch::try_from_iter([(
        "z",
        Arc::new(Int32Array::from(vec![1])) as ArrayRef,
    )])
    .unwrap();
    let err = write_table(&engine, &LabeledTable::new(other), "tmp.root", "t", &update)
        .unwrap_err();
    assert!(matches!(err.root_cause(), ArborError::MismatchedTypes(..)));
}

fn tracks() -> RecordBatch {
    let pt = FixedSizeListArray::from_iter_primitive::<Int32Type, _, _>(
        (0..4).map(|row| Some(vec![Some(row * 10), Some(row * 10 + 1)])),
        2,
    );
    RecordBatch::try_from_iter([
        ("x", Arc::new(Int32Array::from(vec![0, 1, 2, 3])) as ArrayRef),
        ("pt", Arc::new(pt) as ArrayRef),
    ])
    .unwrap()
}

#[test]
fn flattened_chunks_continue_the_index() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", tracks());

    let chunks = ReadOptions::new(["tmp.root"])
        .with_chunk_size(2)
        .with_flatten(Flatten::from_iter(["pt"]))
        .scan(&engine)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();

    assert_eq!(chunks.len(), 2);
    assert_eq!(
        chunks.iter().map(|c| c.index().start()).collect_vec(),
        vec![Some(0), Some(4)]
    );
    assert_eq!(xs(&chunks[1]), vec![2, 2, 3, 3]);
    assert_eq!(
        chunks[0]
            .column(ARRAY_INDEX_COLUMN)
            .unwrap()
            .as_primitive::<Int64Type>()
            .values()
            .to_vec(),
        vec![0, 1, 0, 1]
    );
    assert_eq!(
        chunks[0]
            .column("pt")
            .unwrap()
            .as_primitive::<Int32Type>()
            .values()
            .to_vec(),
        vec![0, 1, 10, 11]
    );
}

#[test]
fn flatten_checks_requested_columns() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", tracks());

    assert!(matches!(
        ReadOptions::new(["tmp.root"])
            .with_columns(["x"])
            .with_flatten(Flatten::from_iter(["pt"]))
            .scan(&engine),
        Err(ArborError::InvalidFlatten(..))
    ));
    assert!(matches!(
        ReadOptions::new(["tmp.root"])
            .with_flatten(Flatten::from_iter(["x"]))
            .read(&engine)
            .map_err(|err| err.root_cause().to_string()),
        Err(msg) if msg.contains("scalar type")
    ));
}

#[test]
fn chunk_size_must_be_positive() {
    let engine = MemoryStorage::new();
    engine.insert("tmp.root", "t", frame(0..2));
    assert!(matches!(
        ReadOptions::new(["tmp.root"]).with_chunk_size(0).scan(&engine),
        Err(ArborError::InvalidArgument(..))
    ));
}
