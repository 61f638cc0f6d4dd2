//! The executor: builds the row database for one SELECT, runs the compiled
//! query, and shapes the raw result stream through the post-processing
//! transducers (placeholder stripping, ordering, limiting, private
//! attribute removal).

use tracing::debug;

use crate::compile::{ROW_ID_ATTR, ROW_TYPE, ROW_TYPE_ATTR};
use crate::datalog;
use crate::error::{IqlError, Result};
use crate::eval::{self, Env, Settings};
use crate::ir::Find;
use crate::literal;
use crate::parser::{Node, Rule};
use crate::plan;
use crate::value::{value_cmp, Direction, Relation, Row, Value, NO_VALUE};

/// Plans and executes one SELECT against the environment.
pub fn execute_select(node: &Node, env: &Env, settings: &Settings) -> Result<Relation> {
    let plan = plan::plan(node, env, settings)?;
    debug!(plan = %serde_json::to_string(&plan.query).unwrap_or_default(), "compiled select");

    let limit = match node.get_in(&[Rule::limit_clause, Rule::nat]) {
        Some(nat) => Some(literal::read_nat(nat)?),
        None => None,
    };
    let adding = node
        .get_in(&[Rule::adding_clause, Rule::simple_symbol])
        .map(|n| n.unparse().to_string());

    let mut inputs = plan.inputs;
    let source = match inputs.first() {
        Some(Value::Relation(rel)) => rel.clone(),
        _ => return Err(IqlError::Execution("plan input 0 is not a relation".into())),
    };

    // ADDING injects a fresh placeholder column per row; the LIMIT caps an
    // unbounded source before the database is built, which is what lets a
    // generated table terminate. Materialized sources keep all their rows
    // so ORDER BY still sees the whole relation.
    let transform = adding.clone().map(|column| {
        move |mut row: Row| {
            if !row.contains_key(&column) {
                row.insert(column.clone(), NO_VALUE);
            }
            row
        }
    });
    let cap = if source.is_unbounded() { limit } else { None };
    let rows = match &transform {
        Some(f) => source.materialize(cap, Some(f as &dyn Fn(Row) -> Row))?,
        None => source.materialize(cap, None)?,
    };

    let mut columns = source.columns().to_vec();
    if let Some(column) = &adding {
        if !columns.contains(column) {
            columns.push(column.clone());
        }
    }
    let staged = Relation::new(rows, columns).add_placeholders();
    let tagged: Vec<Row> = staged
        .rows()
        .iter()
        .cloned()
        .enumerate()
        .map(|(id, mut row)| {
            row.insert(ROW_TYPE_ATTR.to_string(), Value::Symbol(ROW_TYPE.to_string()));
            row.insert(ROW_ID_ATTR.to_string(), Value::Int(id as i64));
            row
        })
        .collect();
    inputs[0] = Value::Relation(Relation::new(tagged, staged.columns().to_vec()));

    let output = datalog::run(&plan.query, &inputs)?;

    let mut rows: Vec<Row> = match &output.keys {
        Some(keys) => output
            .tuples
            .into_iter()
            .map(|tuple| keys.iter().cloned().zip(tuple).collect())
            .collect(),
        None => {
            if !matches!(plan.query.find.as_slice(), [Find::Pull { .. }]) {
                return Err(IqlError::Execution("keyless query must find a pulled row".into()));
            }
            let mut shaped = Vec::with_capacity(output.tuples.len());
            for mut tuple in output.tuples {
                match tuple.pop() {
                    Some(Value::Row(row)) if tuple.is_empty() => shaped.push(row),
                    _ => {
                        return Err(IqlError::Execution(
                            "pulled find did not produce a row".into(),
                        ))
                    }
                }
            }
            shaped
        }
    };

    // 1. Placeholder cells disappear from result rows.
    for row in &mut rows {
        row.retain(|_, value| !value.is_no_value());
    }

    // 2. Sort: ORDER BY key, defaulting to the synthetic identity, with
    // the comparator defaulting to ascending.
    let (key, direction) = match node.get(Rule::order_by_clause) {
        Some(clause) => {
            let key = clause
                .get(Rule::simple_symbol)
                .map(|n| n.unparse().to_string())
                .unwrap_or_else(|| ROW_ID_ATTR.to_string());
            let direction = match clause
                .get(Rule::ascending)
                .or_else(|| clause.get(Rule::descending))
            {
                Some(direction_node) => match eval::eval(direction_node, env, settings)? {
                    Value::Comparator(direction) => direction,
                    _ => Direction::Ascending,
                },
                None => Direction::Ascending,
            };
            (key, direction)
        }
        None => (ROW_ID_ATTR.to_string(), Direction::Ascending),
    };
    rows.sort_by(|a, b| {
        let left = a.get(&key).unwrap_or(&NO_VALUE);
        let right = b.get(&key).unwrap_or(&NO_VALUE);
        let ordering = value_cmp(left, right);
        match direction {
            Direction::Ascending => ordering,
            Direction::Descending => ordering.reverse(),
        }
    });

    // 3. LIMIT.
    if let Some(n) = limit {
        rows.truncate(n);
    }

    // 4. Private attributes never leave the executor.
    for row in &mut rows {
        row.shift_remove(ROW_ID_ATTR);
        row.shift_remove(ROW_TYPE_ATTR);
    }

    let columns: Vec<String> = match output.keys {
        Some(keys) => {
            keys.into_iter().filter(|k| k != ROW_ID_ATTR && k != ROW_TYPE_ATTR).collect()
        }
        None => {
            let mut columns: Vec<String> = Vec::new();
            for row in &rows {
                for key in row.keys() {
                    if !columns.iter().any(|c| c == key) {
                        columns.push(key.clone());
                    }
                }
            }
            columns
        }
    };
    Ok(Relation::new(rows, columns))
}
