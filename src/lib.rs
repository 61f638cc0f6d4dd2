//! InferenceQL – a query compiler and executor for an SQL dialect extended
//! with operations over generative probabilistic models (GPMs).
//!
//! Queries look like SQL and mix two algebras: ordinary relational
//! selection, projection, ordering and limiting over an in-memory row
//! database, and a probabilistic algebra over opaque models — computing
//! densities (`PROBABILITY OF …`), conditioning (`GIVEN`), constraining
//! (`CONSTRAINED BY`) and sampling whole synthetic tables (`GENERATE`).
//!
//! ## Pipeline
//! * [`parser`] – a pest grammar (`iql.pest`) producing an owned tree of
//!   tagged nodes; every node unparses back to its source slice.
//! * [`literal`] – interprets literal sub-trees as values, value lists and
//!   relation literals.
//! * [`validate`] – whole-tree checks (generated tables need a LIMIT, only
//!   the distinguished `data` table may be named).
//! * [`eval`] – tag-dispatched evaluation of expressions, model wrappers
//!   and the driver [`q`].
//! * [`compile`] / [`plan`] – translate SELECT sub-nodes into fragments of
//!   a Datalog-style IR and assemble them into one plan, hoisting
//!   environment symbols into explicit inputs.
//! * [`datalog`] – a minimal conjunctive-query evaluator for that IR.
//! * [`exec`] – builds the row database, runs the plan and applies the
//!   post-processing transducers.
//!
//! ## Quick start
//! ```
//! use inferenceql::{q, Models, Relation, Value};
//!
//! let rows = Relation::from_rows(vec![
//!     [("x".to_string(), Value::Int(1))].into_iter().collect(),
//!     [("x".to_string(), Value::Int(3))].into_iter().collect(),
//! ]);
//! let result = q("SELECT x FROM data WHERE x > 2", rows, Models::default()).unwrap();
//! assert_eq!(result.len(), 1);
//! ```
//!
//! Models are anything implementing [`model::Gpm`]; the engine only ever
//! calls `logpdf` and `simulate` and shares handles by reference.

pub mod compile;
pub mod datalog;
pub mod error;
pub mod eval;
pub mod exec;
pub mod ir;
pub mod literal;
pub mod model;
pub mod parser;
pub mod plan;
pub mod validate;
pub mod value;

pub use error::{IqlError, Result};
pub use eval::{q, q_with_settings, Env, Models, Settings};
pub use model::{Gpm, GpmHandle};
pub use parser::parse;
pub use value::{Relation, Row, Value, NO_VALUE};
