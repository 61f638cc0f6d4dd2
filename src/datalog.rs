//! A minimal evaluator for the Datalog-style IR.
//!
//! The datasource is a row database: entities are integer identities whose
//! facts are the attributes of one row. Evaluation threads a list of
//! variable bindings through the `where` clauses in order; pattern clauses
//! enumerate entity candidates, predicate calls bind or filter, `or_join`
//! unions its branches over the declared bound list.
//!
//! Candidate entities are tracked in a compact tri-state set (none / one /
//! bitmap) so conjunctions of pattern clauses intersect cheaply before any
//! per-binding work happens.

use indexmap::IndexMap;
use roaring::RoaringTreemap;

use crate::error::{IqlError, Result};
use crate::ir::{Clause, Find, PullPattern, Query, Term, Var, DB_VAR};
use crate::model::merged;
use crate::value::{value_eq, value_partial_cmp, AttrHasher, Builtin, Row, Value};
use std::cmp::Ordering;

// ------------- EntitySet -------------
/// Tri-state set of entity identities. Most clauses touch either nothing,
/// a single entity, or a bitmap; keeping the three cases separate avoids
/// allocating a bitmap until a set actually grows.
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySet {
    Empty,
    One(u64),
    Many(RoaringTreemap),
}

impl EntitySet {
    pub fn new() -> Self {
        EntitySet::Empty
    }

    pub fn insert(&mut self, id: u64) {
        match self {
            EntitySet::Empty => *self = EntitySet::One(id),
            EntitySet::One(existing) => {
                if *existing != id {
                    let mut map = RoaringTreemap::new();
                    map.insert(*existing);
                    map.insert(id);
                    *self = EntitySet::Many(map);
                }
            }
            EntitySet::Many(map) => {
                map.insert(id);
            }
        }
    }

    pub fn contains(&self, id: u64) -> bool {
        match self {
            EntitySet::Empty => false,
            EntitySet::One(existing) => *existing == id,
            EntitySet::Many(map) => map.contains(id),
        }
    }

    pub fn len(&self) -> u64 {
        match self {
            EntitySet::Empty => 0,
            EntitySet::One(_) => 1,
            EntitySet::Many(map) => map.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// In-place intersection, collapsing back to the small states.
    pub fn intersect_with(&mut self, other: &EntitySet) {
        match (&mut *self, other) {
            (EntitySet::Empty, _) => {}
            (_, EntitySet::Empty) => *self = EntitySet::Empty,
            (EntitySet::One(mine), _) => {
                if !other.contains(*mine) {
                    *self = EntitySet::Empty;
                }
            }
            (EntitySet::Many(map), EntitySet::One(theirs)) => {
                if map.contains(*theirs) {
                    *self = EntitySet::One(*theirs);
                } else {
                    *self = EntitySet::Empty;
                }
            }
            (EntitySet::Many(map), EntitySet::Many(theirs)) => {
                *map &= theirs;
                match map.len() {
                    0 => *self = EntitySet::Empty,
                    1 => {
                        if let Some(only) = map.min() {
                            *self = EntitySet::One(only);
                        }
                    }
                    _ => {}
                }
            }
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        match self {
            EntitySet::Empty => Box::new(std::iter::empty()),
            EntitySet::One(id) => Box::new(std::iter::once(*id)),
            EntitySet::Many(map) => Box::new(map.iter()),
        }
    }
}

impl Default for EntitySet {
    fn default() -> Self {
        Self::new()
    }
}

// ------------- Database -------------
/// The row database: entity identity is the row's position, which is also
/// its `db_id` attribute.
pub struct Database {
    rows: Vec<Row>,
}

impl Database {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn row(&self, id: u64) -> Option<&Row> {
        self.rows.get(id as usize)
    }

    pub fn entities(&self) -> EntitySet {
        let mut set = EntitySet::new();
        for id in 0..self.rows.len() {
            set.insert(id as u64);
        }
        set
    }

    /// Entities whose `attr` fact equals `value`.
    pub fn matching(&self, attr: &str, value: &Value) -> EntitySet {
        let mut set = EntitySet::new();
        for (id, row) in self.rows.iter().enumerate() {
            if row.get(attr).map(|cell| value_eq(cell, value)).unwrap_or(false) {
                set.insert(id as u64);
            }
        }
        set
    }
}

// ------------- evaluation -------------
type Bindings = IndexMap<String, Value, AttrHasher>;

pub struct QueryOutput {
    pub tuples: Vec<Vec<Value>>,
    pub keys: Option<Vec<String>>,
}

struct Context<'a> {
    db: &'a Database,
    /// Intersection of every top-level constant pattern clause; pattern
    /// enumeration starts from this instead of rescanning the database.
    candidates: Option<EntitySet>,
}

/// Runs a query against its positional inputs. Input 0 must be the row
/// database; the remaining inputs seed the initial bindings.
pub fn run(query: &Query, inputs: &[Value]) -> Result<QueryOutput> {
    if query.in_vars.len() != inputs.len() {
        return Err(IqlError::Execution(format!(
            "query takes {} inputs but {} were supplied",
            query.in_vars.len(),
            inputs.len()
        )));
    }
    let mut database = None;
    let mut seed = Bindings::default();
    for (var, value) in query.in_vars.iter().zip(inputs) {
        if var.name() == DB_VAR {
            match value {
                Value::Relation(rel) => database = Some(Database::new(rel.rows().to_vec())),
                _ => {
                    return Err(IqlError::Execution("datasource input is not a relation".into()))
                }
            }
        } else {
            seed.insert(var.name().to_string(), value.clone());
        }
    }
    let db = database.ok_or_else(|| IqlError::Execution("no datasource bound to $".into()))?;

    let mut candidates: Option<EntitySet> = None;
    for clause in &query.clauses {
        if let Clause::Pattern { e: Term::Var(_), a, v: Term::Const(value) } = clause {
            let matched = db.matching(a, value);
            candidates = Some(match candidates {
                None => matched,
                Some(mut set) => {
                    set.intersect_with(&matched);
                    set
                }
            });
        }
    }
    let ctx = Context { db: &db, candidates };

    let mut state = vec![seed];
    for clause in &query.clauses {
        state = apply_clause(&ctx, clause, state)?;
        if state.is_empty() {
            break;
        }
    }

    let mut tuples = Vec::with_capacity(state.len());
    for binding in state {
        let mut tuple = Vec::with_capacity(query.find.len());
        for find in &query.find {
            match find {
                Find::Var(var) => {
                    let value = binding.get(var.name()).cloned().ok_or_else(|| {
                        IqlError::Execution(format!("unbound find variable {}", var))
                    })?;
                    tuple.push(value);
                }
                Find::Pull { e, pattern } => {
                    let entity = binding.get(e.name()).cloned().ok_or_else(|| {
                        IqlError::Execution(format!("unbound find variable {}", e))
                    })?;
                    tuple.push(pull_row(&db, entity_id(&entity)?, pattern)?);
                }
            }
        }
        tuples.push(tuple);
    }
    Ok(QueryOutput { tuples, keys: query.keys.clone() })
}

fn entity_id(value: &Value) -> Result<u64> {
    match value {
        Value::Int(id) if *id >= 0 => Ok(*id as u64),
        other => Err(IqlError::Execution(format!("{} is not an entity identity", other))),
    }
}

fn resolve(binding: &Bindings, term: &Term) -> Result<Option<Value>> {
    match term {
        Term::Const(value) => Ok(Some(value.clone())),
        Term::Var(var) => Ok(binding.get(var.name()).cloned()),
        Term::Sym(name) => Builtin::from_name(name)
            .map(|builtin| Some(Value::Builtin(builtin)))
            .ok_or_else(|| IqlError::Execution(format!("unresolved symbol {}", name))),
    }
}

fn resolve_required(binding: &Bindings, term: &Term) -> Result<Value> {
    resolve(binding, term)?
        .ok_or_else(|| IqlError::Execution(format!("unbound variable in {:?}", term)))
}

/// Binds `var` or checks agreement with an existing binding; false means
/// the binding is inconsistent and must be dropped.
fn bind_or_check(binding: &mut Bindings, var: &Var, value: Value) -> bool {
    match binding.get(var.name()) {
        Some(existing) => value_eq(existing, &value),
        None => {
            binding.insert(var.name().to_string(), value);
            true
        }
    }
}

fn apply_clause(ctx: &Context, clause: &Clause, state: Vec<Bindings>) -> Result<Vec<Bindings>> {
    let mut out = Vec::new();
    match clause {
        Clause::Pattern { e, a, v } => {
            for binding in state {
                match resolve(&binding, e)? {
                    Some(entity) => {
                        let id = entity_id(&entity)?;
                        let cell = ctx.db.row(id).and_then(|row| row.get(a));
                        let cell = match cell {
                            Some(cell) => cell.clone(),
                            None => continue,
                        };
                        match resolve(&binding, v)? {
                            Some(expected) => {
                                if value_eq(&cell, &expected) {
                                    out.push(binding);
                                }
                            }
                            None => {
                                let mut extended = binding;
                                if let Term::Var(v_var) = v {
                                    if bind_or_check(&mut extended, v_var, cell) {
                                        out.push(extended);
                                    }
                                }
                            }
                        }
                    }
                    None => {
                        let e_var = match e {
                            Term::Var(var) => var,
                            _ => {
                                return Err(IqlError::Execution(
                                    "pattern entity must be a variable or bound".into(),
                                ))
                            }
                        };
                        match resolve(&binding, v)? {
                            Some(expected) => {
                                // The pre-intersected candidates already cover
                                // constant patterns; anything else scans and
                                // narrows by the candidate set.
                                let scanned;
                                let matched = match (&ctx.candidates, v) {
                                    (Some(set), Term::Const(_)) => set,
                                    (candidates, _) => {
                                        let mut matched = ctx.db.matching(a, &expected);
                                        if let Some(set) = candidates {
                                            matched.intersect_with(set);
                                        }
                                        scanned = matched;
                                        &scanned
                                    }
                                };
                                for id in matched.iter() {
                                    let mut extended = binding.clone();
                                    if bind_or_check(&mut extended, e_var, Value::Int(id as i64)) {
                                        out.push(extended);
                                    }
                                }
                            }
                            None => {
                                let v_var = match v {
                                    Term::Var(var) => var,
                                    _ => {
                                        return Err(IqlError::Execution(
                                            "pattern value must be a variable or constant".into(),
                                        ))
                                    }
                                };
                                for id in ctx.db.entities().iter() {
                                    let cell = ctx.db.row(id).and_then(|row| row.get(a)).cloned();
                                    if let Some(cell) = cell {
                                        let mut extended = binding.clone();
                                        if bind_or_check(&mut extended, e_var, Value::Int(id as i64))
                                            && bind_or_check(&mut extended, v_var, cell)
                                        {
                                            out.push(extended);
                                        }
                                    }
                                }
                            }
                        }
                    }
                }
            }
        }
        Clause::Call { f, args, binds } => {
            for mut binding in state {
                let function = resolve_required(&binding, f)?;
                let builtin = match function {
                    Value::Builtin(builtin) => builtin,
                    other => {
                        return Err(IqlError::Execution(format!("{} is not callable", other)))
                    }
                };
                let mut resolved = Vec::with_capacity(args.len());
                for arg in args {
                    resolved.push(resolve_required(&binding, arg)?);
                }
                let result = invoke(builtin, &resolved)?;
                match binds {
                    Some(var) => {
                        if bind_or_check(&mut binding, var, result) {
                            out.push(binding);
                        }
                    }
                    None => match result {
                        Value::Bool(true) => out.push(binding),
                        Value::Bool(false) => {}
                        other => {
                            return Err(IqlError::Execution(format!(
                                "guard returned {} instead of a boolean",
                                other
                            )))
                        }
                    },
                }
            }
        }
        Clause::GetElse { e, a, default, binds } => {
            for mut binding in state {
                let id = entity_id(&resolve_required(&binding, e)?)?;
                let row = ctx
                    .db
                    .row(id)
                    .ok_or_else(|| IqlError::Execution(format!("no entity {}", id)))?;
                let value = row.get(a).cloned().unwrap_or_else(|| default.clone());
                if bind_or_check(&mut binding, binds, value) {
                    out.push(binding);
                }
            }
        }
        Clause::Ground { value, binds } => {
            for mut binding in state {
                if bind_or_check(&mut binding, binds, value.clone()) {
                    out.push(binding);
                }
            }
        }
        Clause::Pull { e, pattern, binds } => {
            for mut binding in state {
                let id = entity_id(&resolve_required(&binding, e)?)?;
                let row = pull_row(ctx.db, id, pattern)?;
                if bind_or_check(&mut binding, binds, row) {
                    out.push(binding);
                }
            }
        }
        Clause::OrJoin { bound, branches } => {
            let branch_ctx = Context { db: ctx.db, candidates: None };
            for binding in state {
                let seed: Bindings = bound
                    .iter()
                    .filter_map(|var| {
                        binding.get(var.name()).map(|v| (var.name().to_string(), v.clone()))
                    })
                    .collect();
                let mut projections: Vec<Bindings> = Vec::new();
                for branch in branches {
                    let mut branch_state = vec![seed.clone()];
                    for clause in branch {
                        branch_state = apply_clause(&branch_ctx, clause, branch_state)?;
                        if branch_state.is_empty() {
                            break;
                        }
                    }
                    for result in branch_state {
                        let projected: Bindings = bound
                            .iter()
                            .filter_map(|var| {
                                result.get(var.name()).map(|v| (var.name().to_string(), v.clone()))
                            })
                            .collect();
                        if !projections.contains(&projected) {
                            projections.push(projected);
                        }
                    }
                }
                for projected in projections {
                    let mut extended = binding.clone();
                    for (name, value) in projected {
                        extended.insert(name, value);
                    }
                    out.push(extended);
                }
            }
        }
    }
    Ok(out)
}

fn pull_row(db: &Database, id: u64, pattern: &PullPattern) -> Result<Value> {
    let row = db.row(id).ok_or_else(|| IqlError::Execution(format!("no entity {}", id)))?;
    match pattern {
        PullPattern::All => Ok(Value::Row(row.clone())),
        PullPattern::Attrs(attrs) => {
            let projected: Row = attrs
                .iter()
                .filter_map(|attr| row.get(attr).map(|v| (attr.clone(), v.clone())))
                .collect();
            Ok(Value::Row(projected))
        }
    }
}

fn binary(builtin: Builtin, args: &[Value]) -> Result<(&Value, &Value)> {
    match args {
        [a, b] => Ok((a, b)),
        _ => Err(IqlError::Execution(format!(
            "{} takes two arguments, got {}",
            builtin.name(),
            args.len()
        ))),
    }
}

/// Rows passed to a model drop their placeholder cells first; an absent
/// cell is no event.
fn without_placeholders(row: &Row) -> Row {
    row.iter().filter(|(_, v)| !v.is_no_value()).map(|(k, v)| (k.clone(), v.clone())).collect()
}

fn invoke(builtin: Builtin, args: &[Value]) -> Result<Value> {
    match builtin {
        Builtin::Eq => {
            let (a, b) = binary(builtin, args)?;
            Ok(Value::Bool(value_eq(a, b)))
        }
        Builtin::NotEq => {
            let (a, b) = binary(builtin, args)?;
            Ok(Value::Bool(!value_eq(a, b)))
        }
        Builtin::Gt | Builtin::Gte | Builtin::Lt | Builtin::Lte => {
            let (a, b) = binary(builtin, args)?;
            let holds = match value_partial_cmp(a, b) {
                Some(ordering) => match builtin {
                    Builtin::Gt => ordering == Ordering::Greater,
                    Builtin::Gte => ordering != Ordering::Less,
                    Builtin::Lt => ordering == Ordering::Less,
                    Builtin::Lte => ordering != Ordering::Greater,
                    _ => false,
                },
                None => false,
            };
            Ok(Value::Bool(holds))
        }
        Builtin::Exp => match args {
            [value] => value
                .as_f64()
                .map(|f| Value::Float(f.exp()))
                .ok_or_else(|| IqlError::Execution(format!("exp expects a number, got {}", value))),
            _ => Err(IqlError::Execution("exp takes one argument".into())),
        },
        Builtin::Merge => {
            let (a, b) = binary(builtin, args)?;
            match (a, b) {
                (Value::Row(left), Value::Row(right)) => Ok(Value::Row(merged(left, right))),
                _ => Err(IqlError::Execution("merge expects two rows".into())),
            }
        }
        Builtin::LogPdf => match args {
            [Value::Model(model), Value::Row(targets), Value::Row(constraints)] => model
                .logpdf(&without_placeholders(targets), &without_placeholders(constraints))
                .map(Value::Float),
            _ => Err(IqlError::Execution(
                "logpdf expects a model, a target row and a constraint row".into(),
            )),
        },
        Builtin::Pull => {
            Err(IqlError::Execution("pull is a structural clause, not a call".into()))
        }
    }
}
