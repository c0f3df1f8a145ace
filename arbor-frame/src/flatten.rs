use std::iter::repeat_n;
use std::sync::Arc;

use arbor_error::{ArborResult, arbor_bail, arbor_err};
use arbor_select::{ARRAY_INDEX_COLUMN, ResolvedColumns};
use arrow_array::cast::AsArray;
use arrow_array::{
    Array, ArrayRef, GenericListArray, Int64Array, OffsetSizeTrait, RecordBatch, UInt64Array,
};
use arrow_schema::{DataType, Field, FieldRef, Schema};
use arrow_select::take::take;
use itertools::Itertools;

/// Which array columns a read expands into rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Flatten {
    /// Keep array columns as they are.
    #[default]
    None,
    /// Expand every array column. Deprecated in favour of [`Flatten::Columns`].
    All,
    /// Expand the listed columns and drop every other array column.
    Columns(Vec<String>),
}

impl From<bool> for Flatten {
    fn from(value: bool) -> Self {
        if value { Flatten::All } else { Flatten::None }
    }
}

impl<S: Into<String>> FromIterator<S> for Flatten {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Flatten::Columns(iter.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Targets {
    All,
    Columns(Vec<String>),
}

/// A validated [`Flatten`] request, applied to every batch of a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenPlan {
    targets: Targets,
}

impl FlattenPlan {
    /// Validate `flatten` against the columns a read fetches.
    ///
    /// Returns `None` when nothing is to be flattened. Listing a column the read does not fetch
    /// is an [`InvalidFlatten`](arbor_error::ArborError::InvalidFlatten) error.
    pub fn try_new(flatten: &Flatten, columns: &ResolvedColumns) -> ArborResult<Option<Self>> {
        let targets = match flatten {
            Flatten::None => return Ok(None),
            Flatten::Columns(names) if names.is_empty() => return Ok(None),
            Flatten::All => {
                log::warn!(
                    "Flattening every array column is deprecated, list the columns to flatten instead"
                );
                Targets::All
            }
            Flatten::Columns(names) => {
                if let Some(missing) = names.iter().find(|n| !columns.contains_column(n)) {
                    arbor_bail!(
                        InvalidFlatten: "Cannot flatten column '{}' which is not being read",
                        missing
                    );
                }
                Targets::Columns(names.iter().unique().cloned().collect())
            }
        };
        Ok(Some(Self { targets }))
    }

    /// The columns this plan flattens, `None` for every array column.
    pub fn columns(&self) -> Option<&[String]> {
        match &self.targets {
            Targets::All => None,
            Targets::Columns(names) => Some(names),
        }
    }

    /// Expand the array columns of `batch` into rows.
    ///
    /// Scalar columns repeat once per array element and an `Int64` column named
    /// [`ARRAY_INDEX_COLUMN`] holds each element's position within its source row.
    pub fn apply(&self, batch: &RecordBatch) -> ArborResult<RecordBatch> {
        let schema = batch.schema_ref();
        if schema.column_with_name(ARRAY_INDEX_COLUMN).is_some() {
            arbor_bail!(
                InvalidFlatten: "Cannot flatten a table that already has a '{}' column",
                ARRAY_INDEX_COLUMN
            );
        }

        let targets = match &self.targets {
            Targets::All => {
                let names = schema
                    .fields()
                    .iter()
                    .filter(|f| is_array_type(f.data_type()))
                    .map(|f| f.name().clone())
                    .collect_vec();
                if names.is_empty() {
                    arbor_bail!(InvalidFlatten: "No array column in input to flatten");
                }
                names
            }
            Targets::Columns(names) => {
                for name in names {
                    let field = schema.field_with_name(name).map_err(|_| {
                        arbor_err!(InvalidFlatten: "Column '{}' to flatten is missing", name)
                    })?;
                    if !is_array_type(field.data_type()) {
                        arbor_bail!(
                            InvalidFlatten: "Cannot flatten column '{}' which has a scalar type",
                            name
                        );
                    }
                }
                names.clone()
            }
        };

        let mut exploded = Vec::with_capacity(targets.len());
        for name in &targets {
            let Some(column) = batch.column_by_name(name) else {
                arbor_bail!(InvalidFlatten: "Column '{}' to flatten is missing", name);
            };
            exploded.push((name.as_str(), explode(column)?));
        }

        let Some((first_name, (_, lengths))) = exploded.first() else {
            return Ok(batch.clone());
        };
        if let Some((name, _)) = exploded.iter().find(|(_, (_, l))| l != lengths) {
            arbor_bail!(
                InconsistentLengths: "Columns '{}' and '{}' hold arrays of different lengths",
                first_name,
                name
            );
        }

        let repeat = UInt64Array::from_iter_values(
            lengths
                .iter()
                .zip(0u64..)
                .flat_map(|(&len, row)| repeat_n(row, len)),
        );
        let positions = Int64Array::from_iter_values(
            lengths.iter().flat_map(|&len| (0i64..).take(len)),
        );

        let mut fields: Vec<FieldRef> = Vec::with_capacity(schema.fields().len() + 1);
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len() + 1);
        for (field, column) in schema.fields().iter().zip(batch.columns()) {
            let flattened = exploded
                .iter()
                .find(|(name, _)| *name == field.name().as_str());
            if let Some((_, (values, _))) = flattened {
                fields.push(Arc::new(Field::new(
                    field.name(),
                    values.data_type().clone(),
                    true,
                )));
                columns.push(values.clone());
            } else if is_array_type(field.data_type()) {
                log::debug!("Dropping array column '{}' which is not flattened", field.name());
            } else {
                fields.push(field.clone());
                columns.push(take(column.as_ref(), &repeat, None)?);
            }
        }
        fields.push(Arc::new(Field::new(ARRAY_INDEX_COLUMN, DataType::Int64, false)));
        columns.push(Arc::new(positions));

        Ok(RecordBatch::try_new(
            Arc::new(Schema::new_with_metadata(fields, schema.metadata().clone())),
            columns,
        )?)
    }
}

fn is_array_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::List(_) | DataType::LargeList(_) | DataType::FixedSizeList(..)
    )
}

/// The concatenated elements of an array column and the number of elements in each row.
fn explode(array: &ArrayRef) -> ArborResult<(ArrayRef, Vec<usize>)> {
    match array.data_type() {
        DataType::List(_) => Ok(explode_list(array.as_list::<i32>())),
        DataType::LargeList(_) => Ok(explode_list(array.as_list::<i64>())),
        DataType::FixedSizeList(_, width) => {
            let list = array.as_fixed_size_list();
            let width = usize::try_from(*width)
                .map_err(|_| arbor_err!(InvalidArgument: "Invalid list width {}", width))?;
            let values = list.values().slice(0, list.len() * width);
            Ok((values, vec![width; list.len()]))
        }
        other => arbor_bail!(InvalidFlatten: "Cannot flatten column of type {}", other),
    }
}

fn explode_list<O: OffsetSizeTrait>(list: &GenericListArray<O>) -> (ArrayRef, Vec<usize>) {
    let offsets = list.value_offsets();
    let start = offsets.first().map(|o| o.as_usize()).unwrap_or_default();
    let end = offsets.last().map(|o| o.as_usize()).unwrap_or_default();
    (
        list.values().slice(start, end - start),
        list.offsets().lengths().collect(),
    )
}
