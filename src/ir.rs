//! The Datalog-style intermediate representation.
//!
//! A compiled SELECT is one [`Query`] — `{find, keys, in, where}` — plus a
//! positional input list, together a [`QueryPlan`]. The IR is serializable
//! so plans can be rendered for diagnostics.

use serde::Serialize;

use crate::error::{IqlError, Result};
use crate::value::Value;

/// The datasource variable; always input position 0.
pub const DB_VAR: &str = "$";
/// The entity variable every SELECT revolves around.
pub const ENTITY_VAR: &str = "?e";
/// Prefix of machine-generated variables. Generated variables are excluded
/// from or-join bound lists.
pub const GENVAR_PREFIX: &str = "?g_";
/// Prefix of variables introduced by input lifting. These are ordinary free
/// variables as far as or-join closure is concerned.
pub const INPUT_VAR_PREFIX: &str = "?in_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Var(String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
    pub fn name(&self) -> &str {
        &self.0
    }
    pub fn is_generated(&self) -> bool {
        self.0.starts_with(GENVAR_PREFIX)
    }
}

impl std::fmt::Display for Var {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A term position: a variable, a symbol naming a built-in (before input
/// lifting renames it), or a constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Term {
    Var(Var),
    Sym(String),
    Const(Value),
}

/// Projection pattern for `pull`: every attribute, or a listed few.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PullPattern {
    All,
    Attrs(Vec<String>),
}

/// One element of the `find` list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Find {
    Var(Var),
    Pull { e: Var, pattern: PullPattern },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Clause {
    /// `[?e attr value]` — matches facts in the datasource.
    Pattern { e: Term, a: String, v: Term },
    /// `[(fn args…) result]`, or a result-less guard `[(pred args…)]`.
    Call { f: Term, args: Vec<Term>, binds: Option<Var> },
    /// `[(get_else $ ?e attr default) result]`.
    GetElse { e: Term, a: String, default: Value, binds: Var },
    /// `[(ground const) result]`.
    Ground { value: Value, binds: Var },
    /// `[(pull $ pattern ?e) result]` — materializes a row.
    Pull { e: Term, pattern: PullPattern, binds: Var },
    /// `(or_join [bound…] branch…)` — each branch is a conjunction.
    OrJoin { bound: Vec<Var>, branches: Vec<Vec<Clause>> },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Query {
    pub find: Vec<Find>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<Vec<String>>,
    #[serde(rename = "in")]
    pub in_vars: Vec<Var>,
    #[serde(rename = "where")]
    pub clauses: Vec<Clause>,
}

/// A query together with the runtime values bound to its `in` variables.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub query: Query,
    pub inputs: Vec<Value>,
}

impl QueryPlan {
    /// Couples a query with its inputs; the arities must agree and the
    /// datasource must sit at position 0.
    pub fn new(query: Query, inputs: Vec<Value>) -> Result<Self> {
        if query.in_vars.len() != inputs.len() {
            return Err(IqlError::Compile(format!(
                "plan has {} in-variables but {} inputs",
                query.in_vars.len(),
                inputs.len()
            )));
        }
        if query.in_vars.first().map(Var::name) != Some(DB_VAR) {
            return Err(IqlError::Compile("plan input 0 is not the row database".into()));
        }
        Ok(Self { query, inputs })
    }
}
