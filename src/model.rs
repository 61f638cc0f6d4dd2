//! Generative probabilistic models as opaque providers, plus the two
//! wrappers the query language composes over them.
//!
//! A provider implements [`Gpm`]: `logpdf` reports the log-density of a
//! point event and `simulate` draws one row over a set of target variables.
//! The engine never inspects a model beyond these two calls and caches
//! nothing. Wrappers compose by wrapping a shared handle, never by
//! mutation, so constraint chains form an acyclic tree.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;

use crate::error::Result;
use crate::value::{AttrHasher, Row, Value};

/// Ordered set of variables a model should report or sample.
pub type TargetSet = IndexSet<String, AttrHasher>;

pub trait Gpm: fmt::Debug + Send + Sync {
    /// Log-density of the point event `targets` given `constraints`.
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64>;
    /// Draw one row over `targets` given `constraints`.
    fn simulate(&self, targets: &TargetSet, constraints: &Row) -> Result<Row>;
}

/// Models are shared by reference; the engine treats them as read-only.
pub type GpmHandle = Arc<dyn Gpm>;

/// Right-biased map merge: entries of `over` win on key collision.
pub fn merged(base: &Row, over: &Row) -> Row {
    let mut out = base.clone();
    for (k, v) in over {
        out.insert(k.clone(), v.clone());
    }
    out
}

fn restrict(map: &Row, keep: &TargetSet) -> Row {
    map.iter().filter(|(k, _)| keep.contains(k.as_str())).map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn intersect(own: &TargetSet, requested: &TargetSet) -> TargetSet {
    own.iter().filter(|t| requested.contains(t.as_str())).cloned().collect()
}

// ------------- Conditioning -------------
/// Point conditioning produced by `GIVEN`: a fixed constraint map merged
/// into every call, with the call's own constraints winning.
#[derive(Debug)]
pub struct ConditionedGpm {
    model: GpmHandle,
    conditions: Row,
}

/// Wraps `model` with the point events in `events`. Events mapping to
/// `NO_VALUE` are dropped.
pub fn condition(model: GpmHandle, events: Row) -> GpmHandle {
    let conditions: Row = events.into_iter().filter(|(_, v)| !matches!(v, Value::Null)).collect();
    Arc::new(ConditionedGpm { model, conditions })
}

impl Gpm for ConditionedGpm {
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64> {
        self.model.logpdf(targets, &merged(&self.conditions, constraints))
    }
    fn simulate(&self, targets: &TargetSet, constraints: &Row) -> Result<Row> {
        self.model.simulate(targets, &merged(&self.conditions, constraints))
    }
}

// ------------- Constraining -------------
/// A model restricted to a fixed target set `T` with implicit constraints
/// `C`. Once constructed both are immutable: `logpdf(t, c)` forwards
/// `(t ∩ T, C ∪ c)` and `simulate(t, c)` draws over `T ∩ t` with `C ∪ c`,
/// the call's constraints winning collisions.
#[derive(Debug)]
pub struct ConstrainedGpm {
    model: GpmHandle,
    targets: TargetSet,
    constraints: Row,
}

impl ConstrainedGpm {
    pub fn new(model: GpmHandle, targets: TargetSet, constraints: Row) -> Self {
        Self { model, targets, constraints }
    }

    pub fn targets(&self) -> &TargetSet {
        &self.targets
    }

    /// The unbounded stream behind a generated table: every element is one
    /// `simulate` call over the full target set with no extra constraints.
    /// Pull-based; callers bound consumption with a LIMIT.
    pub fn sample_iter(self: Arc<Self>) -> SampleIter {
        SampleIter { model: self }
    }
}

impl Gpm for ConstrainedGpm {
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64> {
        self.model.logpdf(&restrict(targets, &self.targets), &merged(&self.constraints, constraints))
    }
    fn simulate(&self, targets: &TargetSet, constraints: &Row) -> Result<Row> {
        self.model
            .simulate(&intersect(&self.targets, targets), &merged(&self.constraints, constraints))
    }
}

pub struct SampleIter {
    model: Arc<ConstrainedGpm>,
}

impl Iterator for SampleIter {
    type Item = Result<Row>;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.model.simulate(&self.model.targets, &Row::default()))
    }
}
