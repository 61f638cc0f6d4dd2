//! Grammar-driven parser for the IQL-SQL dialect.
//!
//! The grammar lives in `iql.pest` and is inlined at build time. Parsing
//! produces an owned tree of tagged [`Node`]s rather than borrowed pest
//! pairs: every node remembers its grammar rule, its exact source slice
//! (the canonical *unparse*, used verbatim in error messages) and its
//! sub-nodes in source order. Trees are read-only after parsing.

use pest::error::{ErrorVariant, InputLocation, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser;

use crate::error::{IqlError, Result};

#[derive(Parser)]
#[grammar = "iql.pest"]
struct IqlParser;

/// One node of the concrete parse tree: a tag, the matched source text and
/// the child nodes. A node without children is a leaf and its text is the
/// leaf string.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    tag: Rule,
    text: String,
    children: Vec<Node>,
}

impl Node {
    pub fn tag(&self) -> Rule {
        self.tag
    }

    /// The canonical string rendering: the exact source slice this node
    /// matched.
    pub fn unparse(&self) -> &str {
        &self.text
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// The children that are themselves branches, skipping leaves.
    pub fn child_nodes(&self) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(|c| c.is_branch())
    }

    pub fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }

    /// The single child, when there is exactly one.
    pub fn only_child(&self) -> Option<&Node> {
        match self.children.as_slice() {
            [child] => Some(child),
            _ => None,
        }
    }

    /// First child carrying the given tag.
    pub fn get(&self, tag: Rule) -> Option<&Node> {
        self.children.iter().find(|c| c.tag == tag)
    }

    /// Descends through a path of tags, first match at each level.
    pub fn get_in(&self, path: &[Rule]) -> Option<&Node> {
        let mut node = self;
        for tag in path {
            node = node.get(*tag)?;
        }
        Some(node)
    }
}

fn build(pair: Pair<Rule>) -> Node {
    let tag = pair.as_rule();
    let text = pair.as_str().to_string();
    let children = pair
        .into_inner()
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build)
        .collect();
    Node { tag, text, children }
}

/// Parses one IQL statement into its parse tree. Failures surface the
/// position and the set of expected productions.
pub fn parse(source: &str) -> Result<Node> {
    let mut pairs = IqlParser::parse(Rule::query, source.trim()).map_err(parse_failure)?;
    let query = pairs
        .next()
        .ok_or_else(|| IqlError::Compile("parser produced no tree".into()))?;
    query
        .into_inner()
        .find(|p| p.as_rule() != Rule::EOI)
        .map(build)
        .ok_or_else(|| IqlError::Compile("parser produced an empty statement".into()))
}

fn parse_failure(error: pest::error::Error<Rule>) -> IqlError {
    let position = match error.line_col {
        LineColLocation::Pos((line, col)) => format!("line {}, column {}", line, col),
        LineColLocation::Span((line, col), _) => format!("line {}, column {}", line, col),
    };
    let expected = match &error.variant {
        ErrorVariant::ParsingError { positives, .. } if !positives.is_empty() => positives
            .iter()
            .map(|rule| format!("{:?}", rule))
            .collect::<Vec<_>>()
            .join(", "),
        ErrorVariant::CustomError { message } => message.clone(),
        _ => "end of input".to_string(),
    };
    let message = match error.location {
        InputLocation::Pos(p) => format!("malformed query at offset {}", p),
        InputLocation::Span((s, e)) => format!("malformed query at offsets {}..{}", s, e),
    };
    IqlError::ParseFailure { message, position, expected }
}
