//! The runtime value universe: scalars, rows, relations and the placeholder
//! conventions shared by the whole pipeline.
//!
//! A [`Row`] is an *ordered* attribute→value map and a [`Relation`] is an
//! ordered sequence of rows together with a `columns` list that defines
//! projection order and completeness. Rows may be sparse; before querying,
//! [`Relation::add_placeholders`] unions every row's keys with the declared
//! columns and fills the gaps with [`NO_VALUE`]. The same `NO_VALUE` marker
//! is preserved throughout execution and stripped from result rows at the
//! very end.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::Arc;

use indexmap::IndexMap;
use seahash::SeaHasher;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{IqlError, Result};
use crate::model::{ConstrainedGpm, GpmHandle};

pub type AttrHasher = BuildHasherDefault<SeaHasher>;

/// An ordered attribute→value map.
pub type Row = IndexMap<String, Value, AttrHasher>;

/// Sentinel for an absent cell. One value, two readings: the literal `null`
/// and the placeholder written into sparse rows.
pub const NO_VALUE: Value = Value::Null;

/// Sort direction produced by `ASC`/`DESC`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// The built-in functions an environment always carries. These appear in
/// compiled plans as predicate calls and are hoisted into query inputs by
/// the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    NotEq,
    Exp,
    Merge,
    LogPdf,
    Pull,
}

impl Builtin {
    pub fn name(&self) -> &'static str {
        match self {
            Builtin::Gt => ">",
            Builtin::Gte => ">=",
            Builtin::Lt => "<",
            Builtin::Lte => "<=",
            Builtin::Eq => "=",
            Builtin::NotEq => "not=",
            Builtin::Exp => "exp",
            Builtin::Merge => "merge",
            Builtin::LogPdf => "logpdf",
            Builtin::Pull => "pull",
        }
    }
    pub fn from_name(name: &str) -> Option<Builtin> {
        match name {
            ">" => Some(Builtin::Gt),
            ">=" => Some(Builtin::Gte),
            "<" => Some(Builtin::Lt),
            "<=" => Some(Builtin::Lte),
            "=" => Some(Builtin::Eq),
            "not=" => Some(Builtin::NotEq),
            "exp" => Some(Builtin::Exp),
            "merge" => Some(Builtin::Merge),
            "logpdf" => Some(Builtin::LogPdf),
            "pull" => Some(Builtin::Pull),
            _ => None,
        }
    }
}

// ------------- Value -------------
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
    Row(Row),
    Relation(Relation),
    Comparator(Direction),
    Builtin(Builtin),
    Model(GpmHandle),
}

impl Value {
    pub fn is_no_value(&self) -> bool {
        matches!(self, Value::Null)
    }
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

/// Equality over values. Integers and floats compare numerically; model
/// handles compare by identity.
pub fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Comparator(x), Value::Comparator(y)) => x == y,
        (Value::Builtin(x), Value::Builtin(y)) => x == y,
        (Value::Model(x), Value::Model(y)) => Arc::ptr_eq(x, y),
        (Value::Row(x), Value::Row(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).map(|w| value_eq(v, w)).unwrap_or(false))
        }
        (Value::Relation(x), Value::Relation(y)) => x.same_rows(y),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx == fy,
            _ => false,
        },
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        value_eq(self, other)
    }
}

/// Partial order over comparable values: numbers against numbers (across
/// int/float), strings against strings, booleans against booleans.
pub fn value_partial_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Symbol(x), Value::Symbol(y)) => Some(x.cmp(y)),
        (x, y) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.partial_cmp(&fy),
            _ => None,
        },
    }
}

/// Total order used by the sort transducer: values rank by class first
/// (absent cells sort lowest), then within a class by the partial order.
pub fn value_cmp(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Int(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Symbol(_) => 4,
            _ => 5,
        }
    }
    match value_partial_cmp(a, b) {
        Some(ordering) => ordering,
        None => rank(a).cmp(&rank(b)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{}", s),
            Value::Symbol(s) => write!(f, "{}", s),
            Value::Row(row) => {
                write!(f, "{{")?;
                for (i, (k, v)) in row.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                write!(f, "}}")
            }
            Value::Relation(rel) => write!(f, "<relation of {} columns>", rel.columns().len()),
            Value::Comparator(Direction::Ascending) => write!(f, "asc"),
            Value::Comparator(Direction::Descending) => write!(f, "desc"),
            Value::Builtin(b) => write!(f, "{}", b.name()),
            Value::Model(_) => write!(f, "<model>"),
        }
    }
}

// Plans are rendered for debug logging; opaque values serialize as display
// placeholders rather than failing the whole render.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::String(s) | Value::Symbol(s) => serializer.serialize_str(s),
            Value::Row(row) => {
                let mut map = serializer.serialize_map(Some(row.len()))?;
                for (k, v) in row {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

// ------------- Statistical types -------------
/// The three statistical types a model schema may declare for a column.
/// They drive best-effort pre-coercion of input cells and nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatisticalType {
    Binary,
    Categorical,
    Gaussian,
}

fn coerce_value(value: Value, stat_type: StatisticalType) -> Value {
    match (stat_type, &value) {
        (StatisticalType::Binary, Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => value,
        },
        (StatisticalType::Binary, Value::Int(0)) => Value::Bool(false),
        (StatisticalType::Binary, Value::Int(1)) => Value::Bool(true),
        (StatisticalType::Gaussian, Value::Int(i)) => Value::Float(*i as f64),
        (StatisticalType::Gaussian, Value::String(s)) => match s.parse::<f64>() {
            Ok(x) => Value::Float(x),
            Err(_) => value,
        },
        (StatisticalType::Categorical, Value::Null) => value,
        (StatisticalType::Categorical, Value::String(_)) => value,
        (StatisticalType::Categorical, other) => Value::String(other.to_string()),
        _ => value,
    }
}

// ------------- Relation -------------
/// Row source backing a relation: materialized rows, or an unbounded
/// pull-based sampler over a constrained model (a generated table).
#[derive(Debug, Clone)]
enum RowSource {
    Rows(Vec<Row>),
    Sampler(Arc<ConstrainedGpm>),
}

#[derive(Debug, Clone)]
pub struct Relation {
    columns: Vec<String>,
    source: RowSource,
}

impl Relation {
    pub fn new(rows: Vec<Row>, columns: Vec<String>) -> Self {
        Self { columns, source: RowSource::Rows(rows) }
    }

    /// Relation with columns inferred as the union of row keys in
    /// first-seen order.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, source: RowSource::Rows(rows) }
    }

    pub fn empty() -> Self {
        Self { columns: Vec::new(), source: RowSource::Rows(Vec::new()) }
    }

    /// A generated table: an unbounded lazy stream of simulated rows.
    pub fn sampled(model: Arc<ConstrainedGpm>) -> Self {
        let columns = model.targets().iter().cloned().collect();
        Self { columns, source: RowSource::Sampler(model) }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn set_columns(&mut self, columns: Vec<String>) {
        self.columns = columns;
    }

    /// Materialized rows. Empty for a generated table that has not been
    /// capped yet.
    pub fn rows(&self) -> &[Row] {
        match &self.source {
            RowSource::Rows(rows) => rows,
            RowSource::Sampler(_) => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }

    /// True when the row source is an unbounded sampler.
    pub fn is_unbounded(&self) -> bool {
        matches!(self.source, RowSource::Sampler(_))
    }

    fn same_rows(&self, other: &Relation) -> bool {
        if self.is_unbounded() || other.is_unbounded() {
            return false;
        }
        self.columns == other.columns
            && self.rows().len() == other.rows().len()
            && self
                .rows()
                .iter()
                .zip(other.rows())
                .all(|(a, b)| value_eq(&Value::Row(a.clone()), &Value::Row(b.clone())))
    }

    /// Pulls `cap` rows (all rows when `None`), passing each through the
    /// optional transform. An unbounded source without a cap is refused;
    /// the validator rejects such queries before they get here.
    pub fn materialize(
        &self,
        cap: Option<usize>,
        transform: Option<&dyn Fn(Row) -> Row>,
    ) -> Result<Vec<Row>> {
        let apply = |row: Row| match transform {
            Some(f) => f(row),
            None => row,
        };
        match &self.source {
            RowSource::Rows(rows) => {
                let take = cap.unwrap_or(rows.len());
                Ok(rows.iter().take(take).cloned().map(apply).collect())
            }
            RowSource::Sampler(model) => {
                let take = cap.ok_or_else(|| {
                    IqlError::Execution("unbounded generated relation requires a limit".into())
                })?;
                let mut rows = Vec::with_capacity(take);
                for sample in Arc::clone(model).sample_iter().take(take) {
                    rows.push(apply(sample?));
                }
                Ok(rows)
            }
        }
    }

    /// Unions every row's keys with the declared columns and writes
    /// `NO_VALUE` into any missing cell. Idempotent.
    pub fn add_placeholders(self) -> Self {
        let Relation { mut columns, source } = self;
        match source {
            RowSource::Sampler(_) => Self { columns, source },
            RowSource::Rows(rows) => {
                for row in &rows {
                    for key in row.keys() {
                        if !columns.iter().any(|c| c == key) {
                            columns.push(key.clone());
                        }
                    }
                }
                let rows = rows
                    .into_iter()
                    .map(|mut row| {
                        for column in &columns {
                            if !row.contains_key(column) {
                                row.insert(column.clone(), NO_VALUE);
                            }
                        }
                        row
                    })
                    .collect();
                Self { columns, source: RowSource::Rows(rows) }
            }
        }
    }

    /// Appends another relation's rows, unioning the column lists.
    pub fn append(&mut self, other: &Relation) {
        for column in other.columns() {
            if !self.columns.iter().any(|c| c == column) {
                self.columns.push(column.clone());
            }
        }
        if let RowSource::Rows(rows) = &mut self.source {
            rows.extend(other.rows().iter().cloned());
        }
    }

    /// Best-effort coercion of cells according to declared statistical
    /// types. Never alters the relational schema.
    pub fn coerce(&mut self, schema: &HashMap<String, StatisticalType, AttrHasher>) {
        if let RowSource::Rows(rows) = &mut self.source {
            for row in rows {
                for (key, value) in row.iter_mut() {
                    if let Some(stat_type) = schema.get(key) {
                        let cell = std::mem::replace(value, NO_VALUE);
                        *value = coerce_value(cell, *stat_type);
                    }
                }
            }
        }
    }
}

/// Convenience constructor for a row out of attribute/value pairs.
pub fn row_of(entries: Vec<(&str, Value)>) -> Row {
    entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_equality_across_int_and_float() {
        assert!(value_eq(&Value::Int(1), &Value::Float(1.0)));
        assert!(!value_eq(&Value::Int(1), &Value::Float(1.5)));
        assert!(!value_eq(&Value::Int(1), &Value::String("1".into())));
    }

    #[test]
    fn total_order_ranks_absent_lowest() {
        assert_eq!(value_cmp(&Value::Null, &Value::Int(0)), Ordering::Less);
        assert_eq!(value_cmp(&Value::Int(2), &Value::Float(1.5)), Ordering::Greater);
        assert_eq!(value_cmp(&Value::Int(3), &Value::Int(3)), Ordering::Equal);
    }

    #[test]
    fn placeholders_are_idempotent() {
        let rel = Relation::new(
            vec![row_of(vec![("x", Value::Int(1))]), row_of(vec![("y", Value::Int(2))])],
            vec!["x".into()],
        );
        let once = rel.add_placeholders();
        let twice = once.clone().add_placeholders();
        assert_eq!(once.columns(), twice.columns());
        assert_eq!(once.rows(), twice.rows());
        for row in once.rows() {
            assert!(row.contains_key("x") && row.contains_key("y"));
        }
    }

    #[test]
    fn coercion_is_best_effort() {
        let mut schema: HashMap<String, StatisticalType, AttrHasher> = HashMap::default();
        schema.insert("flag".into(), StatisticalType::Binary);
        schema.insert("height".into(), StatisticalType::Gaussian);
        schema.insert("kind".into(), StatisticalType::Categorical);
        let mut rel = Relation::from_rows(vec![row_of(vec![
            ("flag", Value::String("true".into())),
            ("height", Value::String("1.82".into())),
            ("kind", Value::Int(3)),
        ])]);
        rel.coerce(&schema);
        let row = &rel.rows()[0];
        assert_eq!(row["flag"], Value::Bool(true));
        assert_eq!(row["height"], Value::Float(1.82));
        assert_eq!(row["kind"], Value::String("3".into()));
    }
}
