//! Population state table.
//!
//! The population is stored column-wise: one typed column per attribute, one
//! row per simulant. Components read and write slices of columns addressed
//! by a [`SimulantIndex`], a plain ordered set of row numbers. Row numbers
//! are stable for the life of a simulation - simulants are never removed,
//! only marked dead in the `alive` column - which is what makes them usable
//! as common-random-number draw indices.
//!
//! # Key Types
//!
//! - [`Column`] - A typed column of values
//! - [`PopulationTable`] - The columnar state table
//! - [`SimulantIndex`] - An ordered subset of rows
//! - [`Predicate`] / [`Comparison`] - Row filters used by results
//!   observations and event listeners
//! - [`PopulationManager`] - Table ownership plus initializer registrations

use indexmap::IndexMap;

use ceam_foundation::{ColumnId, ComponentId};

use crate::error::{Error, Result};
use crate::resource::{ResourceKind, ResourceRef};

/// The standard column marking simulants as alive.
pub const ALIVE_COLUMN: &str = "alive";

/// A typed column of per-simulant values.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Floating-point attribute (age, blood pressure, cost).
    F64(Vec<f64>),
    /// Integer attribute (counts, years).
    I64(Vec<i64>),
    /// Flag attribute (alive, adherent).
    Bool(Vec<bool>),
    /// Categorical attribute (sex, condition).
    Str(Vec<String>),
}

impl Column {
    /// Number of rows in the column.
    pub fn len(&self) -> usize {
        match self {
            Column::F64(v) => v.len(),
            Column::I64(v) => v.len(),
            Column::Bool(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    /// Whether the column has no rows.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value at a row.
    pub fn value_at(&self, row: usize) -> ScalarValue {
        match self {
            Column::F64(v) => ScalarValue::F64(v[row]),
            Column::I64(v) => ScalarValue::I64(v[row]),
            Column::Bool(v) => ScalarValue::Bool(v[row]),
            Column::Str(v) => ScalarValue::Str(v[row].clone()),
        }
    }

    fn append(&mut self, other: Column) -> Option<()> {
        match (self, other) {
            (Column::F64(a), Column::F64(b)) => a.extend(b),
            (Column::I64(a), Column::I64(b)) => a.extend(b),
            (Column::Bool(a), Column::Bool(b)) => a.extend(b),
            (Column::Str(a), Column::Str(b)) => a.extend(b),
            _ => return None,
        }
        Some(())
    }
}

/// A single typed value, used by filters and stratification sources.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// Floating-point value.
    F64(f64),
    /// Integer value.
    I64(i64),
    /// Boolean value.
    Bool(bool),
    /// String value.
    Str(String),
}

/// Comparison operators for row predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// Equal.
    Eq,
    /// Not equal.
    Ne,
    /// Less than.
    Lt,
    /// Less than or equal.
    Le,
    /// Greater than.
    Gt,
    /// Greater than or equal.
    Ge,
}

/// A single column comparison, e.g. `age >= 25`.
#[derive(Debug, Clone)]
pub struct Comparison {
    /// Column to test.
    pub column: ColumnId,
    /// Comparison operator.
    pub op: CompareOp,
    /// Right-hand value.
    pub value: ScalarValue,
}

impl Comparison {
    /// Build a comparison.
    pub fn new(column: impl Into<ColumnId>, op: CompareOp, value: ScalarValue) -> Self {
        Self {
            column: column.into(),
            op,
            value,
        }
    }

    fn matches(&self, column: &Column, row: usize) -> Result<bool> {
        let lhs = column.value_at(row);
        let ord = match (&lhs, &self.value) {
            (ScalarValue::F64(a), ScalarValue::F64(b)) => a.partial_cmp(b),
            (ScalarValue::I64(a), ScalarValue::I64(b)) => Some(a.cmp(b)),
            (ScalarValue::Bool(a), ScalarValue::Bool(b)) => Some(a.cmp(b)),
            (ScalarValue::Str(a), ScalarValue::Str(b)) => Some(a.cmp(b)),
            _ => {
                return Err(Error::ColumnType {
                    column: self.column.clone(),
                    expected: scalar_type_name(&self.value),
                })
            }
        };
        let Some(ord) = ord else {
            // NaN compares false against everything.
            return Ok(false);
        };
        Ok(match self.op {
            CompareOp::Eq => ord.is_eq(),
            CompareOp::Ne => ord.is_ne(),
            CompareOp::Lt => ord.is_lt(),
            CompareOp::Le => ord.is_le(),
            CompareOp::Gt => ord.is_gt(),
            CompareOp::Ge => ord.is_ge(),
        })
    }
}

fn scalar_type_name(v: &ScalarValue) -> &'static str {
    match v {
        ScalarValue::F64(_) => "f64",
        ScalarValue::I64(_) => "i64",
        ScalarValue::Bool(_) => "bool",
        ScalarValue::Str(_) => "str",
    }
}

/// A conjunction of comparisons. An empty predicate matches every row.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    /// Comparisons that must all hold.
    pub comparisons: Vec<Comparison>,
}

impl Predicate {
    /// The always-true predicate.
    pub fn all() -> Self {
        Self::default()
    }

    /// A single-comparison predicate.
    pub fn single(column: impl Into<ColumnId>, op: CompareOp, value: ScalarValue) -> Self {
        Self {
            comparisons: vec![Comparison::new(column, op, value)],
        }
    }

    /// Add a further comparison.
    pub fn and(mut self, column: impl Into<ColumnId>, op: CompareOp, value: ScalarValue) -> Self {
        self.comparisons.push(Comparison::new(column, op, value));
        self
    }
}

/// An ordered subset of population rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SimulantIndex(Vec<usize>);

impl SimulantIndex {
    /// Build an index from explicit rows.
    pub fn new(rows: Vec<usize>) -> Self {
        Self(rows)
    }

    /// The contiguous index `[start, end)`.
    pub fn from_range(range: std::ops::Range<usize>) -> Self {
        Self(range.collect())
    }

    /// Number of simulants in the index.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// The rows as a slice.
    pub fn rows(&self) -> &[usize] {
        &self.0
    }
}

impl FromIterator<usize> for SimulantIndex {
    fn from_iter<T: IntoIterator<Item = usize>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The columnar population state table.
#[derive(Debug, Default)]
pub struct PopulationTable {
    columns: IndexMap<ColumnId, Column>,
    len: usize,
}

impl PopulationTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of simulants.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table has no simulants.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Registered column identifiers, in insertion order.
    pub fn column_ids(&self) -> impl Iterator<Item = &ColumnId> {
        self.columns.keys()
    }

    /// Whether the column exists.
    pub fn contains_column(&self, id: &ColumnId) -> bool {
        self.columns.contains_key(id)
    }

    /// The index of every simulant.
    pub fn full_index(&self) -> SimulantIndex {
        SimulantIndex::from_range(0..self.len)
    }

    /// The index of living simulants.
    ///
    /// Event listeners that only make sense for the living (the original
    /// framework's `only_living` decorator) filter through this.
    pub fn living(&self) -> Result<SimulantIndex> {
        let alive = self.bools(&ColumnId::from(ALIVE_COLUMN))?;
        Ok((0..self.len).filter(|&row| alive[row]).collect())
    }

    /// Extend the table by `count` blank rows, returning their index.
    ///
    /// Columns are not touched; initializers are responsible for appending a
    /// value for every new row to every column they own.
    pub fn grow(&mut self, count: usize) -> SimulantIndex {
        let start = self.len;
        self.len += count;
        SimulantIndex::from_range(start..self.len)
    }

    /// Append values to a column, creating it if absent.
    ///
    /// Used by initializers: the appended values must bring the column
    /// exactly up to the table length.
    pub fn append_column(&mut self, id: ColumnId, values: Column) -> Result<()> {
        let appended = values.len();
        match self.columns.get_mut(&id) {
            Some(existing) => {
                let before = existing.len();
                if existing.append(values).is_none() {
                    return Err(Error::ColumnType {
                        column: id,
                        expected: "matching column type",
                    });
                }
                if before + appended != self.len {
                    return Err(Error::ColumnLength {
                        column: id,
                        expected: self.len - before,
                        got: appended,
                    });
                }
            }
            None => {
                if appended != self.len {
                    return Err(Error::ColumnLength {
                        column: id,
                        expected: self.len,
                        got: appended,
                    });
                }
                self.columns.insert(id, values);
            }
        }
        Ok(())
    }

    /// A column by id.
    pub fn column(&self, id: &ColumnId) -> Result<&Column> {
        self.columns
            .get(id)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))
    }

    /// A float column as a slice.
    pub fn f64s(&self, id: &ColumnId) -> Result<&[f64]> {
        match self.column(id)? {
            Column::F64(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "f64",
            }),
        }
    }

    /// An integer column as a slice.
    pub fn i64s(&self, id: &ColumnId) -> Result<&[i64]> {
        match self.column(id)? {
            Column::I64(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "i64",
            }),
        }
    }

    /// A boolean column as a slice.
    pub fn bools(&self, id: &ColumnId) -> Result<&[bool]> {
        match self.column(id)? {
            Column::Bool(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "bool",
            }),
        }
    }

    /// A string column as a slice.
    pub fn strs(&self, id: &ColumnId) -> Result<&[String]> {
        match self.column(id)? {
            Column::Str(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "str",
            }),
        }
    }

    /// Scatter float values into a column over an index.
    pub fn set_f64(&mut self, id: &ColumnId, index: &SimulantIndex, values: &[f64]) -> Result<()> {
        if values.len() != index.len() {
            return Err(Error::ColumnLength {
                column: id.clone(),
                expected: index.len(),
                got: values.len(),
            });
        }
        let column = self.f64s_mut(id)?;
        for (row, value) in index.iter().zip(values) {
            column[row] = *value;
        }
        Ok(())
    }

    /// Broadcast a single float into a column over an index.
    pub fn fill_f64(&mut self, id: &ColumnId, index: &SimulantIndex, value: f64) -> Result<()> {
        let column = self.f64s_mut(id)?;
        for row in index.iter() {
            column[row] = value;
        }
        Ok(())
    }

    /// Broadcast a single integer into a column over an index.
    pub fn fill_i64(&mut self, id: &ColumnId, index: &SimulantIndex, value: i64) -> Result<()> {
        let column = self.i64s_mut(id)?;
        for row in index.iter() {
            column[row] = value;
        }
        Ok(())
    }

    /// Broadcast a single boolean into a column over an index.
    pub fn fill_bool(&mut self, id: &ColumnId, index: &SimulantIndex, value: bool) -> Result<()> {
        let column = self.bools_mut(id)?;
        for row in index.iter() {
            column[row] = value;
        }
        Ok(())
    }

    /// Scatter integers into a column over an index.
    pub fn set_i64(&mut self, id: &ColumnId, index: &SimulantIndex, values: &[i64]) -> Result<()> {
        if values.len() != index.len() {
            return Err(Error::ColumnLength {
                column: id.clone(),
                expected: index.len(),
                got: values.len(),
            });
        }
        let column = self.i64s_mut(id)?;
        for (row, value) in index.iter().zip(values) {
            column[row] = *value;
        }
        Ok(())
    }

    /// Scatter strings into a column over an index.
    pub fn set_str(&mut self, id: &ColumnId, index: &SimulantIndex, values: &[String]) -> Result<()> {
        if values.len() != index.len() {
            return Err(Error::ColumnLength {
                column: id.clone(),
                expected: index.len(),
                got: values.len(),
            });
        }
        let column = self.strs_mut(id)?;
        for (row, value) in index.iter().zip(values) {
            column[row] = value.clone();
        }
        Ok(())
    }

    /// Filter an index down to the rows matching a predicate.
    pub fn filter(&self, index: &SimulantIndex, predicate: &Predicate) -> Result<SimulantIndex> {
        let mut out = Vec::new();
        'rows: for row in index.iter() {
            for comparison in &predicate.comparisons {
                let column = self.column(&comparison.column)?;
                if !comparison.matches(column, row)? {
                    continue 'rows;
                }
            }
            out.push(row);
        }
        Ok(SimulantIndex::new(out))
    }

    /// Check that every column covers every row.
    ///
    /// Run after initializers to catch a component that declared a column
    /// and then failed to populate it for new simulants.
    pub fn validate_complete(&self) -> Result<()> {
        for (id, column) in &self.columns {
            if column.len() != self.len {
                return Err(Error::ColumnLength {
                    column: id.clone(),
                    expected: self.len,
                    got: column.len(),
                });
            }
        }
        Ok(())
    }

    fn f64s_mut(&mut self, id: &ColumnId) -> Result<&mut Vec<f64>> {
        match self
            .columns
            .get_mut(id)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))?
        {
            Column::F64(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "f64",
            }),
        }
    }

    fn i64s_mut(&mut self, id: &ColumnId) -> Result<&mut Vec<i64>> {
        match self
            .columns
            .get_mut(id)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))?
        {
            Column::I64(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "i64",
            }),
        }
    }

    fn bools_mut(&mut self, id: &ColumnId) -> Result<&mut Vec<bool>> {
        match self
            .columns
            .get_mut(id)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))?
        {
            Column::Bool(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "bool",
            }),
        }
    }

    fn strs_mut(&mut self, id: &ColumnId) -> Result<&mut Vec<String>> {
        match self
            .columns
            .get_mut(id)
            .ok_or_else(|| Error::UnknownColumn(id.clone()))?
        {
            Column::Str(v) => Ok(v),
            _ => Err(Error::ColumnType {
                column: id.clone(),
                expected: "str",
            }),
        }
    }
}

/// Write access to the table scoped to one initializer call.
///
/// Initializers may read anything but may only create the columns they
/// declared during setup; writing an undeclared column is an
/// [`Error::UndeclaredColumn`].
#[derive(Debug)]
pub struct PopulationUpdater<'a> {
    table: &'a mut PopulationTable,
    component: &'a ComponentId,
    allowed: &'a [ColumnId],
}

impl<'a> PopulationUpdater<'a> {
    /// Scope an updater to a component's declared columns.
    pub fn new(
        table: &'a mut PopulationTable,
        component: &'a ComponentId,
        allowed: &'a [ColumnId],
    ) -> Self {
        Self {
            table,
            component,
            allowed,
        }
    }

    /// Read access to the whole table.
    pub fn table(&self) -> &PopulationTable {
        self.table
    }

    /// Append values for the new rows to a declared column.
    pub fn append_column(&mut self, id: ColumnId, values: Column) -> Result<()> {
        if !self.allowed.contains(&id) {
            return Err(Error::UndeclaredColumn {
                component: self.component.clone(),
                column: id,
            });
        }
        self.table.append_column(id, values)
    }
}

/// A component's declaration that it initializes population columns.
#[derive(Debug, Clone)]
pub struct InitializerRegistration {
    /// The registering component.
    pub component: ComponentId,
    /// Columns the initializer creates.
    pub creates: Vec<ColumnId>,
    /// Resources the initializer reads.
    pub requires: Vec<ResourceRef>,
}

/// Owns the state table and the initializer registrations.
#[derive(Debug, Default)]
pub struct PopulationManager {
    table: PopulationTable,
    initializers: Vec<InitializerRegistration>,
}

impl PopulationManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an initializer registration.
    pub fn register_initializer(&mut self, registration: InitializerRegistration) {
        self.initializers.push(registration);
    }

    /// All initializer registrations, in registration order.
    pub fn initializers(&self) -> &[InitializerRegistration] {
        &self.initializers
    }

    /// The registration made by a component, if any.
    pub fn initializer_for(&self, component: &ComponentId) -> Option<&InitializerRegistration> {
        self.initializers.iter().find(|r| &r.component == component)
    }

    /// The columns a component declared, as resource references.
    pub fn declared_columns(registration: &InitializerRegistration) -> Vec<ResourceRef> {
        registration
            .creates
            .iter()
            .map(|c| ResourceRef::new(ResourceKind::Column, c.as_str()))
            .collect()
    }

    /// Shared access to the table.
    pub fn table(&self) -> &PopulationTable {
        &self.table
    }

    /// Mutable access to the table.
    pub fn table_mut(&mut self) -> &mut PopulationTable {
        &mut self.table
    }
}
