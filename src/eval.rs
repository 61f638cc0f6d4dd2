//! The expression evaluator and the driver.
//!
//! Evaluation dispatches on node tag. SELECT expressions hand off to the
//! planner/executor; model expressions fold conditioning and constraining
//! wrappers over a shared handle; everything else reduces to values via
//! the literal reader. The default rule descends through a unique child,
//! returns a leaf string, or reports the node as unsupported.

use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::{debug, info};

use crate::error::{IqlError, Result};
use crate::exec;
use crate::literal;
use crate::model::{condition, ConstrainedGpm, GpmHandle, TargetSet};
use crate::parser::{parse, Node, Rule};
use crate::validate;
use crate::value::{AttrHasher, Builtin, Direction, Relation, Row, Value};

/// Named models handed to the driver.
pub type Models = HashMap<String, GpmHandle, AttrHasher>;

/// The process-wide defaults, carried alongside the environment rather
/// than read from globals.
#[derive(Debug, Clone)]
pub struct Settings {
    pub default_table: String,
    pub default_model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self { default_table: "data".into(), default_model: "model".into() }
    }
}

lazy_static! {
    static ref BUILTIN_TABLE: Vec<Builtin> = vec![
        Builtin::Gt,
        Builtin::Gte,
        Builtin::Lt,
        Builtin::Lte,
        Builtin::Eq,
        Builtin::NotEq,
        Builtin::Exp,
        Builtin::Merge,
        Builtin::LogPdf,
        Builtin::Pull,
    ];
}

/// Symbol→value bindings: built-ins, named tables, named models and the
/// two distinguished defaults.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: HashMap<String, Value, AttrHasher>,
}

impl Env {
    /// Environment carrying only the built-in functions.
    pub fn base() -> Self {
        let mut env = Self::default();
        for builtin in BUILTIN_TABLE.iter() {
            env.insert(builtin.name(), Value::Builtin(*builtin));
        }
        env
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// Lookup with a hard error naming the key and the available keys.
    pub fn get(&self, name: &str) -> Result<&Value> {
        self.vars.get(name).ok_or_else(|| {
            let mut available: Vec<&str> = self.vars.keys().map(String::as_str).collect();
            available.sort_unstable();
            IqlError::UnboundName { name: name.to_string(), available: available.join(", ") }
        })
    }
}

fn as_model(value: Value, node: &Node) -> Result<GpmHandle> {
    match value {
        Value::Model(handle) => Ok(handle),
        _ => Err(IqlError::incorrect_input("expected a model", node.unparse())),
    }
}

fn as_relation(value: Value, node: &Node) -> Result<Relation> {
    match value {
        Value::Relation(rel) => Ok(rel),
        _ => Err(IqlError::incorrect_input("expected a relation", node.unparse())),
    }
}

/// Evaluates a conjunction of point events to an attribute→value map.
/// Distribution events have no point reading and are rejected.
pub fn events_to_map(event_list: &Node, env: &Env, settings: &Settings) -> Result<Row> {
    let mut map = Row::default();
    for event in event_list.children() {
        match event.tag() {
            Rule::density_event => match event.children() {
                [symbol, value] => {
                    map.insert(symbol.unparse().to_string(), eval(value, env, settings)?);
                }
                _ => return Err(IqlError::Compile("malformed density event".into())),
            },
            Rule::distribution_event => {
                return Err(IqlError::incorrect_input(
                    "distribution events have no point semantics here",
                    event.unparse(),
                ))
            }
            Rule::star | Rule::column_event => {
                return Err(IqlError::incorrect_input("event requires a value", event.unparse()))
            }
            other => {
                return Err(IqlError::Compile(format!("unsupported event node {:?}", other)))
            }
        }
    }
    Ok(map)
}

/// Splits `CONSTRAINED BY` events: bare symbols restrict the target set,
/// equality events become implicit constraints.
fn split_constraint_events(
    event_list: &Node,
    env: &Env,
    settings: &Settings,
) -> Result<(TargetSet, Row)> {
    let mut targets = TargetSet::default();
    let mut constraints = Row::default();
    for event in event_list.children() {
        match event.tag() {
            Rule::column_event => {
                targets.insert(event.unparse().to_string());
            }
            Rule::density_event => match event.children() {
                [symbol, value] => {
                    constraints.insert(symbol.unparse().to_string(), eval(value, env, settings)?);
                }
                _ => return Err(IqlError::Compile("malformed density event".into())),
            },
            _ => {
                return Err(IqlError::incorrect_input(
                    "constraints take variables and point events",
                    event.unparse(),
                ))
            }
        }
    }
    Ok((targets, constraints))
}

/// Builds the constrained model behind `GENERATE var_list [UNDER model]`.
pub(crate) fn eval_generate(
    node: &Node,
    env: &Env,
    settings: &Settings,
) -> Result<Arc<ConstrainedGpm>> {
    let variables = node
        .get(Rule::variable_list)
        .ok_or_else(|| IqlError::Compile("generate without variables".into()))?;
    let targets: TargetSet =
        variables.children().iter().map(|c| c.unparse().to_string()).collect();
    let model = match node.get(Rule::model_expr) {
        Some(m) => as_model(eval(m, env, settings)?, m)?,
        None => as_model(env.get(&settings.default_model)?.clone(), node)?,
    };
    Ok(Arc::new(ConstrainedGpm::new(model, targets, Row::default())))
}

/// Tag-dispatched evaluation of a parse-tree node.
pub fn eval(node: &Node, env: &Env, settings: &Settings) -> Result<Value> {
    match node.tag() {
        Rule::select_expr => Ok(Value::Relation(exec::execute_select(node, env, settings)?)),
        Rule::insert_expr => {
            let target = node
                .get(Rule::reference)
                .ok_or_else(|| IqlError::Compile("insert without a target".into()))?;
            let mut base = as_relation(eval(target, env, settings)?, target)?;
            let literal_rel = literal::read_relation(
                node.get(Rule::relation_value)
                    .ok_or_else(|| IqlError::Compile("insert without values".into()))?,
            )?;
            base.append(&literal_rel);
            Ok(Value::Relation(base))
        }
        Rule::reference => env.get(node.unparse()).cloned(),
        Rule::generated_table_expr => {
            let generate = node
                .get(Rule::generate_expr)
                .ok_or_else(|| IqlError::Compile("generated table without generator".into()))?;
            Ok(Value::Relation(Relation::sampled(eval_generate(generate, env, settings)?)))
        }
        Rule::generate_expr => Ok(Value::Model(eval_generate(node, env, settings)?)),
        Rule::model_expr => {
            let children = node.children();
            let primary = children
                .first()
                .ok_or_else(|| IqlError::Compile("empty model expression".into()))?;
            let mut model = as_model(eval(primary, env, settings)?, primary)?;
            for suffix in &children[1..] {
                let events = suffix
                    .get(Rule::event_list)
                    .ok_or_else(|| IqlError::Compile("model wrapper without events".into()))?;
                model = match suffix.tag() {
                    Rule::conditioned_by_expr => {
                        condition(model, events_to_map(events, env, settings)?)
                    }
                    Rule::constrained_by_expr => {
                        let (targets, constraints) =
                            split_constraint_events(events, env, settings)?;
                        Arc::new(ConstrainedGpm::new(model, targets, constraints))
                    }
                    other => {
                        return Err(IqlError::Compile(format!(
                            "unsupported model wrapper {:?}",
                            other
                        )))
                    }
                };
            }
            Ok(Value::Model(model))
        }
        Rule::event_list => Ok(Value::Row(events_to_map(node, env, settings)?)),
        Rule::ascending => Ok(Value::Comparator(Direction::Ascending)),
        Rule::descending => Ok(Value::Comparator(Direction::Descending)),
        Rule::predicate => Ok(Value::Symbol(node.unparse().to_string())),
        Rule::boolean
        | Rule::int
        | Rule::nat
        | Rule::float
        | Rule::string
        | Rule::null
        | Rule::simple_symbol => literal::read(node),
        _ => match node.only_child() {
            Some(child) => eval(child, env, settings),
            None if !node.is_branch() => Ok(Value::String(node.unparse().to_string())),
            _ => Err(IqlError::Compile(format!(
                "unsupported node {:?} in \"{}\"",
                node.tag(),
                node.unparse()
            ))),
        },
    }
}

/// Top-level entry: parses, validates, installs placeholders, extends the
/// environment with the named tables and models, and evaluates.
pub fn q(query: &str, rows: Relation, models: Models) -> Result<Relation> {
    q_with_settings(query, rows, models, &Settings::default())
}

pub fn q_with_settings(
    query: &str,
    rows: Relation,
    models: Models,
    settings: &Settings,
) -> Result<Relation> {
    let tree = parse(query)?;
    debug!(statement = %tree.unparse(), "parsed");
    validate::validate(&tree, settings)?;
    let rows = rows.add_placeholders();
    let mut env = Env::base();
    for (name, model) in models {
        env.insert(name, Value::Model(model));
    }
    env.insert(settings.default_table.clone(), Value::Relation(rows));
    match eval(&tree, &env, settings)? {
        Value::Relation(rel) => {
            info!(rows = rel.len(), columns = rel.columns().len(), "query complete");
            Ok(rel)
        }
        other => {
            Err(IqlError::Execution(format!("query produced {} instead of a relation", other)))
        }
    }
}
