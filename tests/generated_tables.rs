use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use inferenceql::model::TargetSet;
use inferenceql::value::row_of;
use inferenceql::{q, Gpm, IqlError, Models, Relation, Result, Row, Value};

/// Provider whose draws are constant but counted, so tests can prove the
/// stream is consumed lazily.
#[derive(Debug, Default)]
struct CountingGpm {
    draws: AtomicUsize,
}

impl Gpm for CountingGpm {
    fn logpdf(&self, _targets: &Row, _constraints: &Row) -> Result<f64> {
        Ok(0.0)
    }
    fn simulate(&self, targets: &TargetSet, _constraints: &Row) -> Result<Row> {
        self.draws.fetch_add(1, Ordering::SeqCst);
        Ok(targets.iter().map(|t| (t.clone(), Value::Int(7))).collect())
    }
}

fn data() -> Relation {
    Relation::new(
        vec![row_of(vec![("x", Value::Int(1)), ("y", Value::Int(2))])],
        vec!["x".into(), "y".into()],
    )
}

fn counting_models() -> (Models, Arc<CountingGpm>) {
    let gpm = Arc::new(CountingGpm::default());
    let mut models = Models::default();
    models.insert("model".to_string(), gpm.clone());
    (models, gpm)
}

#[test]
fn generated_tables_stream_under_a_limit() {
    let (models, gpm) = counting_models();
    let result =
        q("SELECT * FROM (GENERATE x UNDER model) LIMIT 2", data(), models).expect("query ok");
    assert_eq!(result.columns(), ["x"]);
    assert_eq!(
        result.rows(),
        [row_of(vec![("x", Value::Int(7))]), row_of(vec![("x", Value::Int(7))])]
    );
    assert_eq!(gpm.draws.load(Ordering::SeqCst), 2, "the stream is capped before execution");
}

#[test]
fn generated_tables_without_a_limit_fail_validation() {
    let (models, gpm) = counting_models();
    let err = q("SELECT * FROM (GENERATE x UNDER model)", data(), models).unwrap_err();
    match err {
        IqlError::IncorrectInput { message, .. } => assert!(message.contains("LIMIT")),
        other => panic!("expected a validation failure, got {:?}", other),
    }
    assert_eq!(gpm.draws.load(Ordering::SeqCst), 0, "nothing was sampled");
}

#[test]
fn generated_columns_project_like_any_relation() {
    let (models, _) = counting_models();
    let result = q(
        "SELECT x FROM (GENERATE x, y UNDER model) WHERE y = 7 LIMIT 3",
        data(),
        models,
    )
    .expect("query ok");
    assert_eq!(result.len(), 3);
    assert!(result.rows().iter().all(|row| row["x"] == Value::Int(7)));
}

#[test]
fn non_data_table_references_fail_anywhere_in_the_tree() {
    let (models, _) = counting_models();
    let err = q("SELECT * FROM mystery", data(), models).unwrap_err();
    match err {
        IqlError::IncorrectInput { expression, .. } => assert_eq!(expression, "mystery"),
        other => panic!("expected a validation failure, got {:?}", other),
    }

    let (models, _) = counting_models();
    let err =
        q("SELECT x FROM (SELECT x FROM mystery)", data(), models).unwrap_err();
    assert!(matches!(err, IqlError::IncorrectInput { .. }));
}

#[test]
fn valid_queries_pass_validation() {
    let (models, _) = counting_models();
    assert!(q("SELECT * FROM data", data(), models).is_ok());
}

#[test]
fn provider_failures_propagate_unchanged() {
    #[derive(Debug)]
    struct FailingGpm;
    impl Gpm for FailingGpm {
        fn logpdf(&self, _targets: &Row, _constraints: &Row) -> Result<f64> {
            Err(IqlError::Provider("refusing to integrate".into()))
        }
        fn simulate(&self, _targets: &TargetSet, _constraints: &Row) -> Result<Row> {
            Err(IqlError::Provider("refusing to sample".into()))
        }
    }
    let mut models = Models::default();
    models.insert("model".to_string(), Arc::new(FailingGpm));
    let err = q("SELECT * FROM (GENERATE x UNDER model) LIMIT 1", data(), models).unwrap_err();
    match err {
        IqlError::Provider(message) => assert_eq!(message, "refusing to sample"),
        other => panic!("expected a provider failure, got {:?}", other),
    }
}
