// Property-based tests for matching and merge operators.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use proptest::prelude::*;

use dupmerge_merge::matcher::{is_value_match, match_records};
use dupmerge_merge::merge::{apply_operator, merge_pairs, MergeOptions};
use dupmerge_merge::model::field;
use dupmerge_merge::{ColumnMapping, Dataset, MergeOperation, Operator, Record, Value};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

fn config_256() -> ProptestConfig {
    ProptestConfig {
        cases: std::env::var("PROPTEST_CASES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(256),
        failure_persistence: None,
        ..ProptestConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Key values drawn from a small pool so duplicates and cross-matches are common.
fn arb_key() -> impl Strategy<Value = Value> {
    prop_oneof![
        4 => prop::sample::select(vec!["acme", "ACME", " Acme ", "globex", "initech", "x"])
            .prop_map(Value::from),
        1 => Just(Value::Null),
        1 => (0i32..4).prop_map(|n| Value::Number(n as f64)),
    ]
}

/// Cell values: mostly numeric text, sometimes words, sometimes null.
fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        3 => r"-?[0-9]{1,5}(\.[0-9]{1,3})?".prop_map(Value::from),
        1 => (-1000.0f64..1000.0).prop_map(Value::Number),
        1 => r"[a-z]{1,6}".prop_map(Value::from),
        1 => Just(Value::Null),
    ]
}

fn arb_dataset(key: &'static str) -> impl Strategy<Value = Dataset> {
    prop::collection::vec((arb_key(), arb_value()), 0..24).prop_map(move |rows| {
        let rows = rows.into_iter().map(|(k, v)| vec![k, v]);
        Dataset::from_rows(&[key, "amount"], rows).unwrap()
    })
}

fn commutative_op() -> impl Strategy<Value = Operator> {
    prop::sample::select(vec![Operator::Sum, Operator::Avg, Operator::Min, Operator::Max])
}

fn any_op() -> impl Strategy<Value = Operator> {
    prop::sample::select(Operator::ALL.to_vec())
}

/// Reference matcher: linear scan over a shrinking working copy of B.
fn scan_match(a: &Dataset, b: &Dataset, mapping: &ColumnMapping) -> (Vec<(usize, usize)>, Vec<usize>, Vec<usize>) {
    let mut remaining: Vec<usize> = (0..b.len()).collect();
    let mut pairs = Vec::new();
    let mut unique_a = Vec::new();
    for (ai, ra) in a.records().iter().enumerate() {
        let key_a = field(ra, &mapping.column_a);
        let hit = remaining
            .iter()
            .position(|&bi| is_value_match(key_a, field(&b.records()[bi], &mapping.column_b)));
        match hit {
            Some(pos) => pairs.push((ai, remaining.remove(pos))),
            None => unique_a.push(ai),
        }
    }
    (pairs, unique_a, remaining)
}

fn position(records: &[Record], target: &Record) -> usize {
    records.iter().position(|r| std::ptr::eq(r, target)).unwrap()
}

// ---------------------------------------------------------------------------
// Matching properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(config_256())]

    #[test]
    fn counts_partition_both_sides(a in arb_dataset("key"), b in arb_dataset("other")) {
        let mapping = ColumnMapping::new("key", "other");
        let out = match_records(&a, &b, &mapping).unwrap();
        prop_assert_eq!(out.pairs.len() + out.unique_a.len(), a.len());
        prop_assert_eq!(out.pairs.len() + out.unique_b.len(), b.len());
    }

    #[test]
    fn indexed_match_equals_greedy_scan(a in arb_dataset("key"), b in arb_dataset("key")) {
        let mapping = ColumnMapping::new("key", "key");
        let out = match_records(&a, &b, &mapping).unwrap();
        let (pairs, unique_a, unique_b) = scan_match(&a, &b, &mapping);

        let got_pairs: Vec<(usize, usize)> = out
            .pairs
            .iter()
            .map(|p| (position(a.records(), p.record_a), position(b.records(), p.record_b)))
            .collect();
        let got_a: Vec<usize> = out.unique_a.iter().map(|r| position(a.records(), r)).collect();
        let got_b: Vec<usize> = out.unique_b.iter().map(|r| position(b.records(), r)).collect();

        prop_assert_eq!(got_pairs, pairs);
        prop_assert_eq!(got_a, unique_a);
        prop_assert_eq!(got_b, unique_b);
    }

    #[test]
    fn matching_ignores_case_and_padding(word in "[A-Za-z0-9]{1,10}", left in " {0,3}", right in " {0,3}") {
        let padded = Value::from(format!("{left}{}{right}", word.to_uppercase()));
        prop_assert!(is_value_match(&Value::from(word.to_lowercase()), &padded));
    }

    // -----------------------------------------------------------------------
    // Operator properties
    // -----------------------------------------------------------------------

    #[test]
    fn commutative_operators(a in arb_value(), b in arb_value(), op in commutative_op()) {
        // Non-numeric input keeps the first operand, so commutativity only
        // holds when both sides are numbers (or one side is null).
        let numeric = |v: &Value| v.is_null() || v.as_number().is_some();
        prop_assume!(numeric(&a) && numeric(&b));
        let options = MergeOptions::default();
        prop_assert_eq!(
            apply_operator(&a, &b, op, &options),
            apply_operator(&b, &a, op, &options)
        );
    }

    #[test]
    fn numeric_results_have_two_decimals(a in arb_value(), b in arb_value(), op in any_op()) {
        prop_assume!(op.is_numeric());
        if let Value::Number(n) = apply_operator(&a, &b, op, &MergeOptions::default()) {
            if a.as_number().is_some() && b.as_number().is_some() {
                let text = n.to_string();
                let decimals = text.split_once('.').map_or(0, |(_, frac)| frac.len());
                prop_assert!(decimals <= 2, "{}", text);
            }
        }
    }

    #[test]
    fn null_never_wins_over_a_value(v in arb_value(), op in any_op()) {
        prop_assume!(!v.is_null());
        let options = MergeOptions::default();
        prop_assert_eq!(apply_operator(&v, &Value::Null, op, &options), v.clone());
        prop_assert_eq!(apply_operator(&Value::Null, &v, op, &options), v);
    }

    #[test]
    fn merge_all_never_drops_a_column(a in arb_dataset("key"), b in arb_dataset("key")) {
        let mapping = ColumnMapping::new("key", "key");
        let out = match_records(&a, &b, &mapping).unwrap();
        let options = MergeOptions::default();
        let merged = merge_pairs(&out.pairs, &[MergeOperation::MergeAll], &options);
        prop_assert_eq!(merged.len(), out.pairs.len());
        for (pair, record) in out.pairs.iter().zip(&merged) {
            for (column, value) in pair.record_a {
                prop_assert_eq!(record.get(column), Some(value));
            }
            for (column, value) in pair.record_b {
                let prefixed = format!("{}{}", options.secondary_prefix, column);
                let kept = record.get(column) == Some(value)
                    || record.iter().any(|(k, v)| k.starts_with(&prefixed) && v == value);
                prop_assert!(kept, "column {} lost", column);
            }
        }
    }
}

#[test]
fn greedy_two_to_one() {
    let a = Dataset::from_rows(&["k"], vec![vec![Value::from("X")], vec![Value::from("X")]]).unwrap();
    let b = Dataset::from_rows(&["k"], vec![vec![Value::from("X")]]).unwrap();
    let out = match_records(&a, &b, &ColumnMapping::new("k", "k")).unwrap();
    assert_eq!(out.pairs.len(), 1);
    assert_eq!(out.unique_a.len(), 1);
    assert!(out.unique_b.is_empty());
}
