//! The clause compiler: translates SELECT sub-nodes into IR fragments.
//!
//! Every fragment contributes to one of `find`/`keys`/`in`/`where`; the
//! planner merges them in order (FROM first, so the row database lands at
//! input position 0) with order-preserving union on `find`/`in` and
//! concatenation on `where`.

use crate::error::{IqlError, Result};
use crate::eval::{self, Env, Settings};
use crate::ir::{Clause, Find, PullPattern, Term, Var, DB_VAR, ENTITY_VAR, GENVAR_PREFIX};
use crate::parser::{Node, Rule};
use crate::value::{Value, NO_VALUE};

/// The symbol value rows are tagged with under `iql_type`.
pub const ROW_TYPE: &str = "row";
/// Synthetic identity attribute assigned at database construction.
pub const ROW_ID_ATTR: &str = "db_id";
/// Private attribute distinguishing rows from other facts.
pub const ROW_TYPE_ATTR: &str = "iql_type";

/// One SELECT sub-node's contribution to the final query.
#[derive(Debug, Default)]
pub struct Fragment {
    pub find: Vec<Find>,
    pub keys: Vec<String>,
    pub in_vars: Vec<Var>,
    pub inputs: Vec<Value>,
    pub clauses: Vec<Clause>,
}

impl Fragment {
    /// Order-preserving merge: `find`/`keys` pairs and `in`/`inputs` pairs
    /// union without reordering, `where` entries concatenate.
    pub fn merge(mut self, other: Fragment) -> Fragment {
        if other.keys.is_empty() {
            for find in other.find {
                if !self.find.contains(&find) {
                    self.find.push(find);
                }
            }
        } else {
            for (find, key) in other.find.into_iter().zip(other.keys) {
                let present = self
                    .find
                    .iter()
                    .zip(&self.keys)
                    .any(|(f, k)| f == &find && k == &key);
                if !present {
                    self.find.push(find);
                    self.keys.push(key);
                }
            }
        }
        for (var, value) in other.in_vars.into_iter().zip(other.inputs) {
            if !self.in_vars.contains(&var) {
                self.in_vars.push(var);
                self.inputs.push(value);
            }
        }
        self.clauses.extend(other.clauses);
        self
    }
}

/// Compiles SELECT sub-nodes against an environment. Generated variables
/// are numbered per compilation so fragments never collide.
pub struct Compiler<'a> {
    env: &'a Env,
    settings: &'a Settings,
    counter: u32,
}

impl<'a> Compiler<'a> {
    pub fn new(env: &'a Env, settings: &'a Settings) -> Self {
        Self { env, settings, counter: 0 }
    }

    fn genvar(&mut self, hint: &str) -> Var {
        self.counter += 1;
        Var::new(format!("{}{}_{}", GENVAR_PREFIX, hint, self.counter))
    }

    fn entity() -> Term {
        Term::Var(Var::new(ENTITY_VAR))
    }

    fn row_pattern() -> Clause {
        Clause::Pattern {
            e: Self::entity(),
            a: ROW_TYPE_ATTR.to_string(),
            v: Term::Const(Value::Symbol(ROW_TYPE.to_string())),
        }
    }

    /// FROM contribution: the datasource variable plus the resolved source
    /// relation as input 0. Defaults to the distinguished `data` entry.
    pub fn compile_from(&mut self, from: Option<&Node>) -> Result<Fragment> {
        let relation = match from {
            None => match self.env.get(&self.settings.default_table)? {
                Value::Relation(rel) => rel.clone(),
                _ => {
                    return Err(IqlError::Compile(format!(
                        "environment entry {} is not a relation",
                        self.settings.default_table
                    )))
                }
            },
            Some(from_clause) => {
                let source = from_clause
                    .only_child()
                    .ok_or_else(|| IqlError::Compile("malformed from clause".into()))?;
                match source.tag() {
                    Rule::reference
                    | Rule::generated_table_expr
                    | Rule::select_expr
                    | Rule::insert_expr => {
                        match eval::eval(source, self.env, self.settings)? {
                            Value::Relation(rel) => rel,
                            _ => {
                                return Err(IqlError::incorrect_input(
                                    "FROM requires a relation",
                                    source.unparse(),
                                ))
                            }
                        }
                    }
                    other => {
                        return Err(IqlError::Compile(format!(
                            "unsupported table expression {:?} in \"{}\"",
                            other,
                            source.unparse()
                        )))
                    }
                }
            }
        };
        Ok(Fragment {
            in_vars: vec![Var::new(DB_VAR)],
            inputs: vec![Value::Relation(relation)],
            ..Fragment::default()
        })
    }

    /// Select-list contribution. `*` pulls whole rows; a selection list
    /// keys the entity identity under `db_id` and merges one fragment per
    /// selection.
    pub fn compile_select_list(&mut self, node: &Node) -> Result<Fragment> {
        if node.get(Rule::star).is_some() {
            return Ok(Fragment {
                find: vec![Find::Pull { e: Var::new(ENTITY_VAR), pattern: PullPattern::All }],
                clauses: vec![Self::row_pattern()],
                ..Fragment::default()
            });
        }
        let mut fragment = Fragment {
            find: vec![Find::Var(Var::new(ENTITY_VAR))],
            keys: vec![ROW_ID_ATTR.to_string()],
            clauses: vec![Self::row_pattern()],
            ..Fragment::default()
        };
        for selection in node.children() {
            let contribution = match selection.tag() {
                Rule::column_selection => self.compile_column_selection(selection)?,
                Rule::rowid_selection => Fragment {
                    find: vec![Find::Var(Var::new(ENTITY_VAR))],
                    keys: vec!["rowid".to_string()],
                    ..Fragment::default()
                },
                Rule::probability_clause => self.compile_probability(selection)?,
                other => {
                    return Err(IqlError::Compile(format!(
                        "unsupported selection {:?} in \"{}\"",
                        other,
                        selection.unparse()
                    )))
                }
            };
            fragment = fragment.merge(contribution);
        }
        Ok(fragment)
    }

    fn compile_column_selection(&mut self, node: &Node) -> Result<Fragment> {
        let (column, label) = match node.children() {
            [column] => (column.unparse().to_string(), column.unparse().to_string()),
            [column, alias] => (column.unparse().to_string(), alias.unparse().to_string()),
            _ => return Err(IqlError::Compile("malformed column selection".into())),
        };
        let var = self.genvar("sel");
        Ok(Fragment {
            find: vec![Find::Var(var.clone())],
            keys: vec![label],
            clauses: vec![Clause::GetElse {
                e: Self::entity(),
                a: column,
                default: NO_VALUE,
                binds: var,
            }],
            ..Fragment::default()
        })
    }

    /// `PROBABILITY [DENSITY] OF … [GIVEN …] [UNDER …] [AS …]`: target and
    /// constraint rows from the event protocol, the model hoisted into the
    /// inputs, then `logpdf` followed by `exp`.
    fn compile_probability(&mut self, node: &Node) -> Result<Fragment> {
        let events = node
            .get(Rule::event_list)
            .ok_or_else(|| IqlError::Compile("probability clause without events".into()))?;
        let model_value = match node.get_in(&[Rule::under_clause, Rule::model_expr]) {
            Some(model_node) => eval::eval(model_node, self.env, self.settings)?,
            None => self.env.get(&self.settings.default_model)?.clone(),
        };
        if !matches!(model_value, Value::Model(_)) {
            return Err(IqlError::incorrect_input("UNDER requires a model", node.unparse()));
        }
        let model_var = self.genvar("model");
        let mut fragment = Fragment {
            in_vars: vec![model_var.clone()],
            inputs: vec![model_value],
            ..Fragment::default()
        };

        let (targets_fragment, targets_var) = self.compile_event_rows(events)?;
        fragment = fragment.merge(targets_fragment);
        let constraints_var = match node.get_in(&[Rule::given_clause, Rule::event_list]) {
            Some(given) => {
                let (constraints_fragment, var) = self.compile_event_rows(given)?;
                fragment = fragment.merge(constraints_fragment);
                var
            }
            None => {
                let var = self.genvar("constraints");
                fragment.clauses.push(Clause::Ground {
                    value: Value::Row(Default::default()),
                    binds: var.clone(),
                });
                var
            }
        };

        let logpdf_var = self.genvar("lp");
        let probability_var = self.genvar("p");
        fragment.clauses.push(Clause::Call {
            f: Term::Sym("logpdf".to_string()),
            args: vec![
                Term::Var(model_var),
                Term::Var(targets_var),
                Term::Var(constraints_var),
            ],
            binds: Some(logpdf_var.clone()),
        });
        fragment.clauses.push(Clause::Call {
            f: Term::Sym("exp".to_string()),
            args: vec![Term::Var(logpdf_var)],
            binds: Some(probability_var.clone()),
        });

        let label = match node.get_in(&[Rule::label_clause, Rule::simple_symbol]) {
            Some(alias) => alias.unparse().to_string(),
            None => node.unparse().to_string(),
        };
        fragment.find.push(Find::Var(probability_var));
        fragment.keys.push(label);
        Ok(fragment)
    }

    /// The row-event protocol: binds one row-valued variable from an event
    /// list. A pulled row covers `*` or the named columns, the equality
    /// events ground a binding map, and a merge joins the two with the
    /// binding map winning on key collision.
    fn compile_event_rows(&mut self, events: &Node) -> Result<(Fragment, Var)> {
        let mut fragment = Fragment::default();
        let has_star = events.children().iter().any(|e| e.tag() == Rule::star);
        let columns: Vec<String> = events
            .children()
            .iter()
            .filter(|e| e.tag() == Rule::column_event)
            .map(|e| e.unparse().to_string())
            .collect();

        let row_var = self.genvar("row");
        if has_star {
            fragment.clauses.push(Clause::Pull {
                e: Self::entity(),
                pattern: PullPattern::All,
                binds: row_var.clone(),
            });
        } else if !columns.is_empty() {
            fragment.clauses.push(Clause::Pull {
                e: Self::entity(),
                pattern: PullPattern::Attrs(columns),
                binds: row_var.clone(),
            });
        } else {
            fragment.clauses.push(Clause::Ground {
                value: Value::Row(Default::default()),
                binds: row_var.clone(),
            });
        }

        let mut binding = crate::value::Row::default();
        for event in events.children() {
            match event.tag() {
                Rule::star | Rule::column_event => {}
                Rule::density_event => match event.children() {
                    [symbol, value] => {
                        binding.insert(
                            symbol.unparse().to_string(),
                            eval::eval(value, self.env, self.settings)?,
                        );
                    }
                    _ => return Err(IqlError::Compile("malformed density event".into())),
                },
                Rule::distribution_event => {
                    return Err(IqlError::incorrect_input(
                        "distribution events have no point semantics here",
                        event.unparse(),
                    ))
                }
                other => {
                    return Err(IqlError::Compile(format!("unsupported event node {:?}", other)))
                }
            }
        }
        let binding_var = self.genvar("binding");
        fragment
            .clauses
            .push(Clause::Ground { value: Value::Row(binding), binds: binding_var.clone() });

        let merged_var = self.genvar("event_row");
        fragment.clauses.push(Clause::Call {
            f: Term::Sym("merge".to_string()),
            args: vec![Term::Var(row_var), Term::Var(binding_var)],
            binds: Some(merged_var.clone()),
        });
        Ok((fragment, merged_var))
    }

    /// WHERE contribution.
    pub fn compile_where(&mut self, node: &Node) -> Result<Fragment> {
        let condition = node
            .only_child()
            .ok_or_else(|| IqlError::Compile("malformed where clause".into()))?;
        self.compile_condition(condition)
    }

    fn compile_condition(&mut self, node: &Node) -> Result<Fragment> {
        if matches!(node.tag(), Rule::or_condition | Rule::and_condition) {
            if let Some(only) = node.only_child() {
                return self.compile_condition(only);
            }
        }
        match node.tag() {
            Rule::and_condition => {
                let mut fragment = Fragment::default();
                for child in node.children() {
                    fragment = fragment.merge(self.compile_condition(child)?);
                }
                Ok(fragment)
            }
            Rule::or_condition => {
                let mut branches = Vec::new();
                for child in node.children() {
                    let fragment = self.compile_condition(child)?;
                    if !fragment.find.is_empty()
                        || !fragment.keys.is_empty()
                        || !fragment.in_vars.is_empty()
                    {
                        return Err(IqlError::Compile(format!(
                            "or sub-conditions may only contribute where clauses: \"{}\"",
                            child.unparse()
                        )));
                    }
                    branches.push(fragment.clauses);
                }
                Ok(Fragment {
                    clauses: vec![Clause::OrJoin {
                        bound: vec![Var::new(ENTITY_VAR)],
                        branches,
                    }],
                    ..Fragment::default()
                })
            }
            Rule::equality_condition => {
                let (column, value_node) = binary_condition(node)?;
                let value = eval::eval(value_node, self.env, self.settings)?;
                let (var, mut clauses) = self.bind_column(column);
                clauses.push(guard("=", vec![Term::Var(var), Term::Const(value)]));
                Ok(Fragment { clauses, ..Fragment::default() })
            }
            Rule::predicate_condition => {
                let children = node.children();
                let (column, operator, value_node) = match children {
                    [column, operator, value] => (column, operator, value),
                    _ => return Err(IqlError::Compile("malformed predicate condition".into())),
                };
                let value = eval::eval(value_node, self.env, self.settings)?;
                let (var, mut clauses) = self.bind_column(column.unparse());
                clauses.push(guard(
                    "not=",
                    vec![Term::Var(var.clone()), Term::Const(NO_VALUE)],
                ));
                clauses.push(guard(
                    operator.unparse(),
                    vec![Term::Var(var), Term::Const(value)],
                ));
                Ok(Fragment { clauses, ..Fragment::default() })
            }
            Rule::presence_condition => {
                let column = condition_column(node)?;
                let (var, mut clauses) = self.bind_column(column);
                clauses.push(guard("not=", vec![Term::Var(var), Term::Const(NO_VALUE)]));
                Ok(Fragment { clauses, ..Fragment::default() })
            }
            Rule::absence_condition => {
                let column = condition_column(node)?;
                let (var, mut clauses) = self.bind_column(column);
                clauses.push(guard("=", vec![Term::Var(var), Term::Const(NO_VALUE)]));
                Ok(Fragment { clauses, ..Fragment::default() })
            }
            other => Err(IqlError::Compile(format!(
                "unsupported condition {:?} in \"{}\"",
                other,
                node.unparse()
            ))),
        }
    }

    /// Selection fragment shared by every condition: binds the column cell
    /// (placeholder default) to a generated variable.
    fn bind_column(&mut self, column: &str) -> (Var, Vec<Clause>) {
        let var = self.genvar("sel");
        let clause = Clause::GetElse {
            e: Self::entity(),
            a: column.to_string(),
            default: NO_VALUE,
            binds: var.clone(),
        };
        (var, vec![clause])
    }
}

fn guard(function: &str, args: Vec<Term>) -> Clause {
    Clause::Call { f: Term::Sym(function.to_string()), args, binds: None }
}

fn binary_condition(node: &Node) -> Result<(&str, &Node)> {
    match node.children() {
        [column, value] => Ok((column.unparse(), value)),
        _ => Err(IqlError::Compile("malformed condition".into())),
    }
}

fn condition_column(node: &Node) -> Result<&str> {
    node.children()
        .first()
        .map(|c| c.unparse())
        .ok_or_else(|| IqlError::Compile("condition without a column".into()))
}
