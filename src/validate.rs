//! Whole-tree semantic checks, run after parsing and before anything is
//! planned. The first offending node in document order wins, and every
//! error carries the unparsed source of that node.

use tracing::warn;

use crate::error::{IqlError, Result};
use crate::eval::Settings;
use crate::parser::{Node, Rule};

/// Validates a parse tree. Rules:
///
/// * a SELECT drawing from a generated table must carry a LIMIT, or its
///   infinite stream would never terminate;
/// * a FROM reference to a named table other than the distinguished
///   default is rejected, anywhere in the tree including subqueries.
pub fn validate(node: &Node, settings: &Settings) -> Result<()> {
    if node.tag() == Rule::select_expr {
        if let Some(from) = node.get(Rule::from_clause) {
            let source = from
                .only_child()
                .ok_or_else(|| IqlError::Compile("malformed from clause".into()))?;
            match source.tag() {
                Rule::generated_table_expr if node.get(Rule::limit_clause).is_none() => {
                    warn!(select = %node.unparse(), "rejecting unlimited generated table");
                    return Err(IqlError::incorrect_input(
                        "a generated table requires a LIMIT",
                        node.unparse(),
                    ));
                }
                Rule::reference if source.unparse() != settings.default_table => {
                    return Err(IqlError::incorrect_input(
                        format!(
                            "only the table \"{}\" may be referenced",
                            settings.default_table
                        ),
                        source.unparse(),
                    ));
                }
                _ => {}
            }
        }
    }
    for child in node.child_nodes() {
        validate(child, settings)?;
    }
    Ok(())
}
