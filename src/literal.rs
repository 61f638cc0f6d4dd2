//! The literal reader: interprets leaf nodes and literal sub-trees as
//! runtime values, value lists, sparse value lists and relation literals.

use crate::error::{IqlError, Result};
use crate::parser::{Node, Rule};
use crate::value::{Relation, Row, Value};

/// Reads a literal node as a value. A symbol reads as itself; resolution
/// against an environment is the evaluator's business, not the reader's.
pub fn read(node: &Node) -> Result<Value> {
    match node.tag() {
        Rule::boolean => Ok(Value::Bool(node.unparse().eq_ignore_ascii_case("true"))),
        Rule::int | Rule::nat => node
            .unparse()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| IqlError::incorrect_input("malformed integer", node.unparse())),
        Rule::float => node
            .unparse()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| IqlError::incorrect_input("malformed number", node.unparse())),
        Rule::null => Ok(Value::Null),
        Rule::string => Ok(Value::String(unquote(node.unparse()))),
        Rule::simple_symbol => Ok(Value::Symbol(node.unparse().to_string())),
        _ => match node.only_child() {
            Some(child) => read(child),
            None => Err(IqlError::Compile(format!(
                "not a literal node: {:?} in \"{}\"",
                node.tag(),
                node.unparse()
            ))),
        },
    }
}

/// Natural number, for LIMIT counts and sparse indexes.
pub fn read_nat(node: &Node) -> Result<usize> {
    node.unparse()
        .parse::<usize>()
        .map_err(|_| IqlError::incorrect_input("malformed natural number", node.unparse()))
}

fn unquote(raw: &str) -> String {
    let quote = raw.chars().next().unwrap_or('"');
    let mut chars = raw.chars();
    chars.next();
    chars.next_back();
    let inner: String = chars.collect();
    match quote {
        '\'' => inner.replace("''", "'"),
        _ => inner.replace("\"\"", "\""),
    }
}

/// Reads a `value_list` node: an ordered sequence of scalar values.
pub fn read_value_list(node: &Node) -> Result<Vec<Value>> {
    node.children().iter().map(read).collect()
}

/// Reads either form of value lists. The sparse form pairs indexes with
/// lists and densifies to length `max(index) + 1`, unfilled positions
/// reading as the empty sequence.
pub fn read_value_lists(node: &Node) -> Result<Vec<Vec<Value>>> {
    match node.tag() {
        Rule::value_lists_full => node.children().iter().map(read_value_list).collect(),
        Rule::value_lists_sparse => {
            let mut pairs = Vec::new();
            let mut length = 0;
            for entry in node.children() {
                let index = entry
                    .get(Rule::nat)
                    .map(read_nat)
                    .transpose()?
                    .ok_or_else(|| IqlError::Compile("sparse entry without index".into()))?;
                let list = entry
                    .get(Rule::value_list)
                    .map(read_value_list)
                    .transpose()?
                    .ok_or_else(|| IqlError::Compile("sparse entry without values".into()))?;
                length = length.max(index + 1);
                pairs.push((index, list));
            }
            let mut lists = vec![Vec::new(); length];
            for (index, list) in pairs {
                lists[index] = list;
            }
            Ok(lists)
        }
        _ => Err(IqlError::Compile(format!(
            "not a value-lists node: {:?}",
            node.tag()
        ))),
    }
}

/// Reads a `relation_value` node `(col₁, …) VALUES …` into a relation:
/// each value list zips against the column list, and the column list
/// becomes the relation's `columns`.
pub fn read_relation(node: &Node) -> Result<Relation> {
    let columns: Vec<String> = node
        .get(Rule::column_list)
        .ok_or_else(|| IqlError::Compile("relation literal without columns".into()))?
        .children()
        .iter()
        .map(|c| c.unparse().to_string())
        .collect();
    let lists_node = node
        .get(Rule::value_lists_full)
        .or_else(|| node.get(Rule::value_lists_sparse))
        .ok_or_else(|| IqlError::Compile("relation literal without values".into()))?;
    let rows: Vec<Row> = read_value_lists(lists_node)?
        .into_iter()
        .map(|values| columns.iter().cloned().zip(values).collect())
        .collect();
    Ok(Relation::new(rows, columns))
}
