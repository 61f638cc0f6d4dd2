//! The planner: merges clause fragments into one query, lifts environment
//! symbols into explicit inputs, and closes or-join bound lists over their
//! free variables.

use crate::compile::{Compiler, Fragment};
use crate::error::{IqlError, Result};
use crate::eval::{Env, Settings};
use crate::ir::{Clause, Query, QueryPlan, Term, Var, INPUT_VAR_PREFIX};
use crate::parser::{Node, Rule};
use crate::value::{Builtin, Value};

/// Assembles the plan for one SELECT: FROM ⊕ select-list ⊕ WHERE, then
/// input lifting. Input 0 is always the row database.
pub fn plan(select: &Node, env: &Env, settings: &Settings) -> Result<QueryPlan> {
    let mut compiler = Compiler::new(env, settings);
    let from = compiler.compile_from(select.get(Rule::from_clause))?;
    let select_list = select
        .get(Rule::select_list)
        .ok_or_else(|| IqlError::Compile("select without a selection list".into()))?;
    let selections = compiler.compile_select_list(select_list)?;
    let conditions = match select.get(Rule::where_clause) {
        Some(clause) => compiler.compile_where(clause)?,
        None => Fragment::default(),
    };
    let merged = from.merge(selections).merge(conditions);

    let keys = if merged.keys.is_empty() { None } else { Some(merged.keys) };
    let query = Query {
        find: merged.find,
        keys,
        in_vars: merged.in_vars,
        clauses: merged.clauses,
    };
    let (query, inputs) = inputize(query, merged.inputs, env)?;
    QueryPlan::new(query, inputs)
}

/// Input lifting: every symbol in call position that denotes a built-in is
/// renamed to an `?in_…` variable, the variable appended to `in`, and the
/// resolved environment value appended to the inputs. Afterwards every
/// or-join's bound list is extended with the free, non-generated variables
/// of its branches.
pub fn inputize(mut query: Query, mut inputs: Vec<Value>, env: &Env) -> Result<(Query, Vec<Value>)> {
    let mut lifted: Vec<(String, Var)> = Vec::new();
    for clause in &mut query.clauses {
        lift_clause(clause, &mut lifted);
    }
    for (name, var) in lifted {
        let value = env.get(&name)?.clone();
        query.in_vars.push(var);
        inputs.push(value);
    }
    for clause in &mut query.clauses {
        close_or_joins(clause);
    }
    Ok((query, inputs))
}

fn input_var(name: &str) -> Var {
    let ident = match Builtin::from_name(name) {
        Some(Builtin::Gt) => "gt",
        Some(Builtin::Gte) => "gte",
        Some(Builtin::Lt) => "lt",
        Some(Builtin::Lte) => "lte",
        Some(Builtin::Eq) => "eq",
        Some(Builtin::NotEq) => "not_eq",
        Some(Builtin::Exp) => "exp",
        Some(Builtin::Merge) => "merge",
        Some(Builtin::LogPdf) => "logpdf",
        Some(Builtin::Pull) => "pull",
        None => "fn",
    };
    Var::new(format!("{}{}", INPUT_VAR_PREFIX, ident))
}

fn lift_clause(clause: &mut Clause, lifted: &mut Vec<(String, Var)>) {
    match clause {
        Clause::Call { f, .. } => {
            if let Term::Sym(name) = f {
                if Builtin::from_name(name).is_some() {
                    let var = match lifted.iter().find(|(n, _)| n == name) {
                        Some((_, var)) => var.clone(),
                        None => {
                            let var = input_var(name);
                            lifted.push((name.clone(), var.clone()));
                            var
                        }
                    };
                    *f = Term::Var(var);
                }
            }
        }
        Clause::OrJoin { branches, .. } => {
            for branch in branches {
                for clause in branch {
                    lift_clause(clause, lifted);
                }
            }
        }
        _ => {}
    }
}

fn close_or_joins(clause: &mut Clause) {
    if let Clause::OrJoin { bound, branches } = clause {
        let mut free: Vec<Var> = Vec::new();
        for branch in branches.iter_mut() {
            for clause in branch.iter_mut() {
                close_or_joins(clause);
                collect_vars(clause, &mut free);
            }
        }
        for var in free {
            if !var.is_generated() && !bound.contains(&var) {
                bound.push(var);
            }
        }
    }
}

fn collect_term(term: &Term, out: &mut Vec<Var>) {
    if let Term::Var(var) = term {
        if !out.contains(var) {
            out.push(var.clone());
        }
    }
}

fn collect_vars(clause: &Clause, out: &mut Vec<Var>) {
    match clause {
        Clause::Pattern { e, v, .. } => {
            collect_term(e, out);
            collect_term(v, out);
        }
        Clause::Call { f, args, binds } => {
            collect_term(f, out);
            for arg in args {
                collect_term(arg, out);
            }
            if let Some(var) = binds {
                collect_term(&Term::Var(var.clone()), out);
            }
        }
        Clause::GetElse { e, binds, .. } => {
            collect_term(e, out);
            collect_term(&Term::Var(binds.clone()), out);
        }
        Clause::Ground { binds, .. } => {
            collect_term(&Term::Var(binds.clone()), out);
        }
        Clause::Pull { e, binds, .. } => {
            collect_term(e, out);
            collect_term(&Term::Var(binds.clone()), out);
        }
        Clause::OrJoin { bound, branches } => {
            for var in bound {
                collect_term(&Term::Var(var.clone()), out);
            }
            for branch in branches {
                for clause in branch {
                    collect_vars(clause, out);
                }
            }
        }
    }
}
