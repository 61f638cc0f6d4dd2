use inferenceql::literal::{read, read_value_lists};
use inferenceql::parser::{parse, Rule};
use inferenceql::value::row_of;
use inferenceql::{Relation, Value, NO_VALUE};

#[test]
fn add_placeholders_is_idempotent() {
    let relation = Relation::new(
        vec![
            row_of(vec![("x", Value::Int(1))]),
            row_of(vec![("y", Value::Int(2)), ("z", Value::Int(3))]),
        ],
        vec!["x".into(), "y".into()],
    );
    let once = relation.add_placeholders();
    let twice = once.clone().add_placeholders();
    assert_eq!(once.columns(), twice.columns());
    assert_eq!(once.rows(), twice.rows());
}

#[test]
fn placeholder_rows_cover_every_known_key() {
    let relation = Relation::new(
        vec![
            row_of(vec![("x", Value::Int(1))]),
            row_of(vec![("y", Value::Int(2)), ("z", Value::Int(3))]),
        ],
        vec!["x".into(), "y".into()],
    )
    .add_placeholders();
    assert_eq!(relation.columns(), ["x", "y", "z"]);
    for row in relation.rows() {
        for column in ["x", "y", "z"] {
            assert!(row.contains_key(column), "{} missing from {:?}", column, row);
        }
    }
    assert_eq!(relation.rows()[0]["y"], NO_VALUE);
}

fn value_lists_node(query: &str, tag: Rule) -> inferenceql::parser::Node {
    let tree = parse(query).expect("parse ok");
    tree.get_in(&[Rule::relation_value, tag]).expect("value lists").clone()
}

#[test]
fn sparse_value_lists_obey_the_laws() {
    let node = value_lists_node(
        "INSERT INTO data (a, b) VALUES 4: (1, 2), 2: (3, 4)",
        Rule::value_lists_sparse,
    );
    let lists = read_value_lists(&node).expect("read ok");
    // Length is max(index) + 1.
    assert_eq!(lists.len(), 5);
    // Listed positions carry their values.
    assert_eq!(lists[2], vec![Value::Int(3), Value::Int(4)]);
    assert_eq!(lists[4], vec![Value::Int(1), Value::Int(2)]);
    // Positions not listed are the empty sequence.
    for index in [0, 1, 3] {
        assert!(lists[index].is_empty());
    }
}

#[test]
fn full_value_lists_keep_their_order() {
    let node = value_lists_node(
        "INSERT INTO data (a) VALUES (1), (2), (3)",
        Rule::value_lists_full,
    );
    let lists = read_value_lists(&node).expect("read ok");
    assert_eq!(
        lists,
        vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]
    );
}

#[test]
fn scalar_literals_cover_the_value_universe() {
    let tree = parse(
        "INSERT INTO data (a, b, c, d, e, f) VALUES (1, -2.5, 'text', \"quoted\", true, null)",
    )
    .expect("parse ok");
    let lists = tree
        .get_in(&[Rule::relation_value, Rule::value_lists_full])
        .expect("value lists");
    let list = &lists.children()[0];
    let values: Vec<Value> = list.children().iter().map(|n| read(n).unwrap()).collect();
    assert_eq!(
        values,
        vec![
            Value::Int(1),
            Value::Float(-2.5),
            Value::String("text".into()),
            Value::String("quoted".into()),
            Value::Bool(true),
            Value::Null,
        ]
    );
}
