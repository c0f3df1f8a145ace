use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use arbor_error::{ArborResult, arbor_bail};
use itertools::{Either, Itertools};

use crate::{ColumnSchema, GlobPattern, VERBATIM_PREFIX, expand_braces, is_glob, is_index_column};

/// One column specifier of a read request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Specifier {
    /// A brace/glob pattern matched against the schema.
    Pattern(String),
    /// An expression handed to the storage engine as is, without the [`VERBATIM_PREFIX`].
    Verbatim(String),
}

impl Specifier {
    /// Classify a raw specifier by its prefix.
    pub fn parse(spec: &str) -> Self {
        match spec.strip_prefix(VERBATIM_PREFIX) {
            Some(expression) => Self::Verbatim(expression.to_string()),
            None => Self::Pattern(spec.to_string()),
        }
    }
}

impl From<&str> for Specifier {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for Specifier {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl Display for Specifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Specifier::Pattern(pattern) => f.write_str(pattern),
            Specifier::Verbatim(expression) => write!(f, "{VERBATIM_PREFIX}{expression}"),
        }
    }
}

/// The include and ignore specifiers of a read.
///
/// An empty include list selects every column. Ignore specifiers are applied after the include
/// specifiers have been resolved and override them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSpec {
    include: Vec<Specifier>,
    ignore: Vec<Specifier>,
}

impl ColumnSpec {
    /// An empty spec, selecting every column.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add include specifiers.
    pub fn with_include<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.include
            .extend(specs.into_iter().map(|s| Specifier::parse(s.as_ref())));
        self
    }

    /// Add ignore specifiers.
    pub fn with_ignore<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ignore
            .extend(specs.into_iter().map(|s| Specifier::parse(s.as_ref())));
        self
    }

    /// The include specifiers, in the order they were added.
    pub fn include(&self) -> &[Specifier] {
        &self.include
    }

    /// The ignore specifiers, in the order they were added.
    pub fn ignore(&self) -> &[Specifier] {
        &self.ignore
    }
}

/// A column to fetch from the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResolvedColumn {
    /// A column of the schema.
    Column(String),
    /// A verbatim expression the storage engine evaluates itself.
    Expression(String),
}

impl ResolvedColumn {
    /// The name the fetched column carries, i.e. the column name or the expression text.
    pub fn name(&self) -> &str {
        match self {
            ResolvedColumn::Column(name) | ResolvedColumn::Expression(name) => name,
        }
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ResolvedColumn::Expression(_))
    }
}

impl Display for ResolvedColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedColumn::Column(name) => f.write_str(name),
            ResolvedColumn::Expression(expression) => write!(f, "{VERBATIM_PREFIX}{expression}"),
        }
    }
}

/// The ordered, duplicate-free list of columns a read fetches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedColumns {
    columns: Vec<ResolvedColumn>,
}

impl ResolvedColumns {
    /// Create from a list of columns.
    ///
    /// Entries are unique by [`ResolvedColumn::name`]: a later column or expression carrying a
    /// name already taken is dropped, so the fetched batch never repeats a column name.
    pub fn new(columns: impl IntoIterator<Item = ResolvedColumn>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .unique_by(|column| column.name().to_string())
                .collect(),
        }
    }

    /// Every schema column, in schema order.
    pub fn all(schema: &ColumnSchema) -> Self {
        Self::new(schema.iter().map(|c| ResolvedColumn::Column(c.to_string())))
    }

    pub fn columns(&self) -> &[ResolvedColumn] {
        &self.columns
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedColumn> {
        self.columns.iter()
    }

    /// The names the fetched columns carry, see [`ResolvedColumn::name`].
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(ResolvedColumn::name)
    }

    /// Whether the schema column `name` is fetched.
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|c| matches!(c, ResolvedColumn::Column(n) if n == name))
    }

    /// The number of columns and expressions fetched.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Whether nothing is fetched.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Display for ResolvedColumns {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.columns.iter().format(", "))
    }
}

impl<'a> IntoIterator for &'a ResolvedColumns {
    type Item = &'a ResolvedColumn;
    type IntoIter = std::slice::Iter<'a, ResolvedColumn>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}

/// Resolves a [`ColumnSpec`] against the [`ColumnSchema`] of one tree.
///
/// Include resolution:
/// 1. verbatim specifiers are set aside and pass through unresolved,
/// 2. pattern specifiers are brace-expanded,
/// 3. every expanded pattern is matched against the schema, exact names first and shell
///    wildcards otherwise; a pattern that matches nothing is an error,
/// 4. every index column of the schema is appended, so a stored index is never lost,
/// 5. verbatim expressions follow; one named like a selected column is dropped.
///
/// Ignore specifiers are matched the same way, except that patterns matching nothing are
/// skipped. Ignoring an index column is an error.
#[derive(Debug, Clone, Copy)]
pub struct ColumnResolver<'a> {
    schema: &'a ColumnSchema,
}

impl<'a> ColumnResolver<'a> {
    /// A resolver over the columns of `schema`.
    pub fn new(schema: &'a ColumnSchema) -> Self {
        Self { schema }
    }

    /// Resolve the columns `spec` selects.
    pub fn resolve(&self, spec: &ColumnSpec) -> ArborResult<ResolvedColumns> {
        let mut columns = self.resolve_include(spec.include())?;
        self.apply_ignore(&mut columns, spec.ignore())?;
        log::debug!("Resolved columns {}", columns);
        Ok(columns)
    }

    /// Schema columns matched by `patterns`, in first-seen order.
    ///
    /// Each pattern is brace-expanded first. With `fail` set, an expanded pattern matching no
    /// column is an [`UnmatchedPattern`](arbor_error::ArborError::UnmatchedPattern) error.
    pub fn matching<'p>(
        &self,
        patterns: impl IntoIterator<Item = &'p str>,
        fail: bool,
    ) -> ArborResult<Vec<String>> {
        let mut selected = Vec::new();
        for spec in patterns {
            for pattern in expand_braces(spec) {
                if self.match_pattern(&pattern, &mut selected)? {
                    continue;
                }
                if fail {
                    arbor_bail!(UnmatchedPattern: "Pattern '{}' didn't match any column", pattern);
                }
                log::trace!("Pattern '{}' matched no column", pattern);
            }
        }
        Ok(selected.into_iter().unique().collect())
    }

    fn match_pattern(&self, pattern: &str, selected: &mut Vec<String>) -> ArborResult<bool> {
        if self.schema.contains(pattern) {
            selected.push(pattern.to_string());
            return Ok(true);
        }
        if !is_glob(pattern) {
            return Ok(false);
        }

        let glob = GlobPattern::new(pattern)?;
        let before = selected.len();
        selected.extend(
            self.schema
                .iter()
                .filter(|name| glob.is_match(name))
                .map(String::from),
        );
        Ok(selected.len() > before)
    }

    fn resolve_include(&self, include: &[Specifier]) -> ArborResult<ResolvedColumns> {
        if include.is_empty() {
            return Ok(ResolvedColumns::all(self.schema));
        }

        let (patterns, verbatim): (Vec<&str>, Vec<&str>) =
            include.iter().partition_map(|spec| match spec {
                Specifier::Pattern(pattern) => Either::Left(pattern.as_str()),
                Specifier::Verbatim(expression) => Either::Right(expression.as_str()),
            });

        let matched = self.matching(patterns, true)?;
        let index = self.schema.index_columns().map(String::from);

        Ok(ResolvedColumns::new(
            matched
                .into_iter()
                .chain(index)
                .map(ResolvedColumn::Column)
                .chain(
                    verbatim
                        .into_iter()
                        .map(|e| ResolvedColumn::Expression(e.to_string())),
                ),
        ))
    }

    fn apply_ignore(&self, columns: &mut ResolvedColumns, ignore: &[Specifier]) -> ArborResult<()> {
        if ignore.is_empty() {
            return Ok(());
        }

        let (patterns, verbatim): (Vec<&str>, HashSet<&str>) =
            ignore.iter().partition_map(|spec| match spec {
                Specifier::Pattern(pattern) => Either::Left(pattern.as_str()),
                Specifier::Verbatim(expression) => Either::Right(expression.as_str()),
            });

        let ignored = self.matching(patterns, false)?;
        if let Some(index) = ignored.iter().find(|name| is_index_column(name)) {
            arbor_bail!(ForbiddenIgnore: "Index column '{}' is being ignored", index);
        }

        let ignored = ignored.iter().map(String::as_str).collect::<HashSet<_>>();
        columns.columns.retain(|column| match column {
            ResolvedColumn::Column(name) => !ignored.contains(name.as_str()),
            ResolvedColumn::Expression(expression) => !verbatim.contains(expression.as_str()),
        });
        Ok(())
    }
}
