use dcsm::DcValue;
use dcsm::diff::{Change, IgnoreSet, apply, diff, semantically_equal};
use pretty_assertions::assert_eq;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn doc(json: &str) -> DcValue {
    DcValue::parse_json(json).unwrap()
}

#[test]
fn integer_and_integral_real_are_a_type_change() {
    let changes = diff(&doc(r#"{"x":7}"#), &doc(r#"{"x":7.0}"#), &IgnoreSet::default());
    assert_eq!(
        changes,
        vec![Change::TypeChange {
            path: "x".into(),
            old: DcValue::from(7),
            old_type: "int",
            new: DcValue::from(7.0),
            new_type: "float",
        }]
    );

    let back = diff(&doc(r#"{"x":7.0}"#), &doc(r#"{"x":7}"#), &IgnoreSet::default());
    assert_eq!(back.len(), 1);
    assert!(matches!(back[0], Change::TypeChange { .. }));
}

#[test]
fn reordered_list_of_objects_is_unchanged() {
    let old = doc(r#"{"l":[{"a":1},{"b":2}]}"#);
    let new = doc(r#"{"l":[{"b":2},{"a":1}]}"#);
    assert_eq!(diff(&old, &new, &IgnoreSet::default()), vec![]);
}

#[test]
fn replaced_list_element_is_remove_plus_append() {
    let old = doc(r#"{"l":[{"a":1},{"b":2}]}"#);
    let new = doc(r#"{"l":[{"b":2},{"a":3}]}"#);
    assert_eq!(
        diff(&old, &new, &IgnoreSet::default()),
        vec![
            Change::ListRemove {
                path: "l".into(),
                item: doc(r#"{"a":1}"#),
            },
            Change::ListAppend {
                path: "l".into(),
                item: doc(r#"{"a":3}"#),
            },
        ]
    );
}

#[test]
fn duplicate_list_items_count_as_a_multiset() {
    let changes = diff(
        &doc(r#"{"s":[1,1,2]}"#),
        &doc(r#"{"s":[1,2,2]}"#),
        &IgnoreSet::default(),
    );
    assert_eq!(
        changes,
        vec![
            Change::ListRemove {
                path: "s".into(),
                item: DcValue::from(1),
            },
            Change::ListAppend {
                path: "s".into(),
                item: DcValue::from(2),
            },
        ]
    );
}

#[test]
fn ignore_is_a_dotted_prefix_not_a_substring() {
    let ignore = IgnoreSet::new(["record"]);
    let old = doc(r#"{"record":{"foo":{"bar":1}},"records_total":1}"#);
    let new = doc(r#"{"record":{"foo":{"bar":2}},"records_total":2}"#);
    let changes = diff(&old, &new, &ignore);
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].path(), "records_total");
}

#[test]
fn nested_paths_are_dotted() {
    let changes = diff(
        &doc(r#"{"judgeCounts":{"perfect":1,"bad":0}}"#),
        &doc(r#"{"judgeCounts":{"perfect":2,"good":1}}"#),
        &IgnoreSet::default(),
    );
    assert_eq!(
        changes,
        vec![
            Change::Scalar {
                path: "judgeCounts.perfect".into(),
                old: DcValue::from(1),
                new: DcValue::from(2),
            },
            Change::Removed {
                path: "judgeCounts.bad".into(),
            },
            Change::Added {
                path: "judgeCounts.good".into(),
                value: DcValue::from(1),
            },
        ]
    );
}

#[test]
fn semantic_equality_rules() {
    assert!(semantically_equal(&DcValue::Null, &DcValue::Null));
    assert!(semantically_equal(&DcValue::from(" hi "), &DcValue::from("hi")));
    assert!(semantically_equal(&DcValue::from(0.1 + 0.2), &DcValue::from(0.3)));
    assert!(semantically_equal(&DcValue::from(3), &DcValue::from(3.0)));
    assert!(!semantically_equal(&DcValue::from(true), &DcValue::from(1)));
    assert!(!semantically_equal(&DcValue::from(1), &DcValue::from("1")));
}

#[test]
fn whitespace_only_string_edits_are_not_reported() {
    let changes = diff(
        &doc(r#"{"name":"Mio"}"#),
        &doc(r#"{"name":"Mio "}"#),
        &IgnoreSet::default(),
    );
    assert!(changes.is_empty());
}

#[test]
fn a_document_never_differs_from_itself() -> Result<()> {
    let d = doc(r#"{"a":[1,{"b":[2,3]}],"c":{"d":null,"e":1.5},"f":"x"}"#);
    assert_eq!(diff(&d, &d, &IgnoreSet::default()), vec![]);
    Ok(())
}

#[test]
fn applying_a_diff_reaches_the_new_document() {
    let ignore = IgnoreSet::new(["record"]);
    let pairs = [
        (
            r#"{"hp":1,"l":[1,2,3],"o":{"k":"v"},"gone":true,"record":{"x":1}}"#,
            r#"{"hp":2,"l":[3,4],"o":{"k":"w","n":null},"new":[1],"record":{"x":2}}"#,
        ),
        (r#"{"x":7}"#, r#"{"x":7.0}"#),
        (r#"{"a":{"b":{"c":1}}}"#, r#"{"a":{"b":[1]}}"#),
    ];
    for (old, new) in pairs {
        let (old, new) = (doc(old), doc(new));
        let changes = diff(&old, &new, &ignore);
        let patched = apply(&old, &changes);
        assert_eq!(diff(&patched, &new, &ignore), vec![], "{old} -> {new}");
    }
}
