use inferenceql::value::row_of;
use inferenceql::{q, IqlError, Models, Relation, Value};

fn data() -> Relation {
    Relation::new(
        vec![
            row_of(vec![("x", Value::Int(1)), ("y", Value::Int(2))]),
            row_of(vec![("x", Value::Int(3)), ("y", Value::Null)]),
        ],
        vec!["x".into(), "y".into()],
    )
}

#[test]
fn select_star_strips_placeholders_but_keeps_columns() {
    let result = q("SELECT * FROM data", data(), Models::default()).expect("query ok");
    assert_eq!(result.columns(), ["x", "y"]);
    assert_eq!(result.len(), 2);
    assert_eq!(result.rows()[0], row_of(vec![("x", Value::Int(1)), ("y", Value::Int(2))]));
    assert_eq!(result.rows()[1], row_of(vec![("x", Value::Int(3))]));
}

#[test]
fn from_defaults_to_data() {
    let result = q("SELECT x", data(), Models::default()).expect("query ok");
    assert_eq!(result.len(), 2);
}

#[test]
fn presence_condition_drops_sparse_rows() {
    let result =
        q("SELECT x FROM data WHERE y IS NOT NULL", data(), Models::default()).expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0], row_of(vec![("x", Value::Int(1))]));
}

#[test]
fn absence_condition_keeps_only_sparse_rows() {
    let result =
        q("SELECT x FROM data WHERE y IS NULL", data(), Models::default()).expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0], row_of(vec![("x", Value::Int(3))]));
}

#[test]
fn order_by_desc_with_limit() {
    let result = q("SELECT x FROM data ORDER BY x DESC LIMIT 1", data(), Models::default())
        .expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0], row_of(vec![("x", Value::Int(3))]));
}

#[test]
fn predicate_conditions_skip_missing_cells() {
    let result = q("SELECT x FROM data WHERE y >= 2", data(), Models::default()).expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0]["x"], Value::Int(1));
}

#[test]
fn equality_condition_on_numbers() {
    let result = q("SELECT y FROM data WHERE x = 3", data(), Models::default()).expect("query ok");
    assert_eq!(result.len(), 1);
    assert!(result.rows()[0].is_empty(), "y is a placeholder on that row");
}

#[test]
fn or_conditions_union_rows() {
    let result = q("SELECT x FROM data WHERE x = 1 OR y IS NULL", data(), Models::default())
        .expect("query ok");
    assert_eq!(result.len(), 2);
}

#[test]
fn and_conditions_intersect_rows() {
    let result = q("SELECT x FROM data WHERE x = 1 AND y = 2", data(), Models::default())
        .expect("query ok");
    assert_eq!(result.len(), 1);
    let result = q("SELECT x FROM data WHERE x = 1 AND y IS NULL", data(), Models::default())
        .expect("query ok");
    assert_eq!(result.len(), 0);
}

#[test]
fn aliases_define_the_output_columns() {
    let result =
        q("SELECT y AS label, x FROM data WHERE x = 1", data(), Models::default()).expect("query ok");
    assert_eq!(result.columns(), ["label", "x"]);
    assert_eq!(result.rows()[0], row_of(vec![("label", Value::Int(2)), ("x", Value::Int(1))]));
}

#[test]
fn rowid_exposes_the_synthetic_identity() {
    let result = q("SELECT rowid, x FROM data", data(), Models::default()).expect("query ok");
    assert_eq!(result.columns(), ["rowid", "x"]);
    assert_eq!(result.rows()[0]["rowid"], Value::Int(0));
    assert_eq!(result.rows()[1]["rowid"], Value::Int(1));
}

#[test]
fn adding_injects_a_placeholder_column() {
    let result = q("SELECT x FROM data WHERE z IS NULL ADDING z", data(), Models::default())
        .expect("query ok");
    assert_eq!(result.len(), 2, "the fresh column is absent everywhere");

    let result = q("SELECT z FROM data ADDING z", data(), Models::default()).expect("query ok");
    assert_eq!(result.columns(), ["z"]);
    assert!(result.rows().iter().all(|row| row.is_empty()));
}

#[test]
fn subqueries_in_from_are_relations() {
    let result = q(
        "SELECT x FROM (SELECT x, y FROM data WHERE y IS NOT NULL)",
        data(),
        Models::default(),
    )
    .expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0]["x"], Value::Int(1));
}

#[test]
fn insert_appends_literal_rows() {
    let result = q(
        "SELECT * FROM INSERT INTO data (x, z) VALUES (9, 10)",
        data(),
        Models::default(),
    )
    .expect("query ok");
    assert_eq!(result.columns(), ["x", "y", "z"]);
    assert_eq!(result.len(), 3);
    assert_eq!(result.rows()[2], row_of(vec![("x", Value::Int(9)), ("z", Value::Int(10))]));
}

#[test]
fn sparse_value_lists_insert_empty_rows() {
    let result = q(
        "SELECT * FROM INSERT INTO data (x, y) VALUES 1: (5, 6)",
        data(),
        Models::default(),
    )
    .expect("query ok");
    // Index 1 is the only listed position; position 0 reads as the empty row.
    assert_eq!(result.len(), 4);
    assert!(result.rows()[2].is_empty());
    assert_eq!(result.rows()[3], row_of(vec![("x", Value::Int(5)), ("y", Value::Int(6))]));
}

#[test]
fn string_cells_compare_by_equality() {
    let rows = Relation::from_rows(vec![
        row_of(vec![("name", Value::String("alpha".into()))]),
        row_of(vec![("name", Value::String("beta".into()))]),
    ]);
    let result =
        q("SELECT name FROM data WHERE name = 'beta'", rows, Models::default()).expect("query ok");
    assert_eq!(result.len(), 1);
    assert_eq!(result.rows()[0]["name"], Value::String("beta".into()));
}

#[test]
fn parse_failures_surface_position_and_expectations() {
    let err = q("SELECT x FROM", data(), Models::default()).unwrap_err();
    match err {
        IqlError::ParseFailure { position, expected, .. } => {
            assert!(position.contains("line 1"));
            assert!(!expected.is_empty());
        }
        other => panic!("expected a parse failure, got {:?}", other),
    }
}

#[test]
fn unknown_models_report_available_names() {
    let err = q("SELECT PROBABILITY OF x = 1 AS p FROM data", data(), Models::default())
        .unwrap_err();
    match err {
        IqlError::UnboundName { name, available } => {
            assert_eq!(name, "model");
            assert!(available.contains("data"));
        }
        other => panic!("expected an unbound name, got {:?}", other),
    }
}
