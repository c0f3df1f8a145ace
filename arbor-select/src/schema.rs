use std::collections::HashSet;

use crate::is_index_column;

/// The ordered column names of one tree in one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSchema {
    names: Vec<String>,
    lookup: HashSet<String>,
}

impl ColumnSchema {
    /// Create a schema from column names; repeated names keep their first position.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut schema = Self::default();
        for name in names {
            let name = name.into();
            if schema.lookup.insert(name.clone()) {
                schema.names.push(name);
            }
        }
        schema
    }

    /// The column names in schema order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Iterate the column names in schema order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Whether the schema has a column called `name`.
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains(name)
    }

    /// The columns that carry a stored row index.
    pub fn index_columns(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|name| is_index_column(name))
    }

    /// The number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the tree has no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ColumnSchema {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}
