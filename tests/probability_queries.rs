use std::sync::Arc;

use inferenceql::model::TargetSet;
use inferenceql::value::row_of;
use inferenceql::{q, Gpm, Models, Relation, Result, Row, Value};

fn data() -> Relation {
    Relation::new(
        vec![
            row_of(vec![("x", Value::Int(1)), ("y", Value::Int(2))]),
            row_of(vec![("x", Value::Int(3)), ("y", Value::Null)]),
        ],
        vec!["x".into(), "y".into()],
    )
}

/// Deterministic provider: density 0.5 for the point event x = 1, 0.25 for
/// any other event; constraining on y = 2 doubles nothing but is recorded
/// through the returned density so tests can observe it.
#[derive(Debug)]
struct PointGpm;

impl Gpm for PointGpm {
    fn logpdf(&self, targets: &Row, constraints: &Row) -> Result<f64> {
        let base = if targets.get("x") == Some(&Value::Int(1)) { 0.5f64 } else { 0.25f64 };
        let scaled = if constraints.get("y") == Some(&Value::Int(2)) { base * 0.8 } else { base };
        Ok(scaled.ln())
    }
    fn simulate(&self, targets: &TargetSet, _constraints: &Row) -> Result<Row> {
        Ok(targets.iter().map(|t| (t.clone(), Value::Int(7))).collect())
    }
}

fn models() -> Models {
    let mut models = Models::default();
    models.insert("model".to_string(), Arc::new(PointGpm));
    models
}

fn assert_close(value: &Value, expected: f64) {
    match value {
        Value::Float(f) => assert!((f - expected).abs() < 1e-9, "{} != {}", f, expected),
        other => panic!("expected a float, got {:?}", other),
    }
}

#[test]
fn probability_of_a_point_event() {
    let result = q(
        "SELECT PROBABILITY OF x = 1 UNDER model AS p FROM data LIMIT 1",
        data(),
        models(),
    )
    .expect("query ok");
    assert_eq!(result.columns(), ["p"]);
    assert_eq!(result.len(), 1);
    assert_close(&result.rows()[0]["p"], 0.5);
}

#[test]
fn probability_density_reads_the_same_way() {
    let result = q(
        "SELECT PROBABILITY DENSITY OF x = 1 UNDER model AS p FROM data LIMIT 1",
        data(),
        models(),
    )
    .expect("query ok");
    assert_close(&result.rows()[0]["p"], 0.5);
}

#[test]
fn bare_columns_pull_the_event_from_each_row() {
    let result =
        q("SELECT PROBABILITY OF x UNDER model AS px FROM data", data(), models()).expect("query ok");
    assert_eq!(result.len(), 2);
    assert_close(&result.rows()[0]["px"], 0.5);
    assert_close(&result.rows()[1]["px"], 0.25);
}

#[test]
fn binding_events_win_over_pulled_cells() {
    // Every row pulls its own x, but the explicit event overrides it.
    let result = q(
        "SELECT PROBABILITY OF x, x = 1 UNDER model AS p FROM data",
        data(),
        models(),
    )
    .expect("query ok");
    assert_close(&result.rows()[0]["p"], 0.5);
    assert_close(&result.rows()[1]["p"], 0.5);
}

#[test]
fn given_events_become_constraints() {
    let result = q(
        "SELECT PROBABILITY OF x = 1 GIVEN y = 2 UNDER model AS p FROM data LIMIT 1",
        data(),
        models(),
    )
    .expect("query ok");
    assert_close(&result.rows()[0]["p"], 0.4);
}

#[test]
fn conditioned_models_carry_their_events() {
    let result = q(
        "SELECT PROBABILITY OF x = 1 UNDER model GIVEN y = 2 AS p FROM data LIMIT 1",
        data(),
        models(),
    )
    .expect("query ok");
    assert_close(&result.rows()[0]["p"], 0.4);
}

#[test]
fn the_model_environment_entry_is_the_default() {
    let result =
        q("SELECT PROBABILITY OF x = 1 AS p FROM data LIMIT 1", data(), models()).expect("query ok");
    assert_close(&result.rows()[0]["p"], 0.5);
}

#[test]
fn unlabeled_clauses_use_their_source_text() {
    let result =
        q("SELECT PROBABILITY OF x = 1 FROM data LIMIT 1", data(), models()).expect("query ok");
    assert_eq!(result.columns().len(), 1);
    assert!(result.columns()[0].contains("PROBABILITY OF x = 1"));
}

#[test]
fn densities_mix_with_relational_projection() {
    let result = q(
        "SELECT x, PROBABILITY OF x UNDER model AS px FROM data WHERE y IS NOT NULL",
        data(),
        models(),
    )
    .expect("query ok");
    assert_eq!(result.columns(), ["x", "px"]);
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0]["x"], Value::Int(1));
    assert_close(&result.rows()[0]["px"], 0.5);
}

#[test]
fn distribution_events_are_rejected_where_points_are_needed() {
    let err = q(
        "SELECT PROBABILITY OF x = 1 UNDER model GIVEN y > 2 AS p FROM data",
        data(),
        models(),
    )
    .unwrap_err();
    assert!(format!("{}", err).contains("point semantics"));
}
