//! The relational merge engine.
//!
//! Standard join semantics: a key value appearing multiple times on either
//! side expands Cartesian-style (every combination of matching rows is
//! emitted). Empty key cells never match. Right-side columns that collide
//! with a left-side name are suffixed with `_right`; when both sides join on
//! the same column name the key is emitted once, like a dataframe merge.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{Dataset, TabularError};

/// Rows returned inline with a completed merge job.
pub const PREVIEW_ROWS: usize = 100;

/// Supported relational join types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    Left,
    Right,
    Inner,
    Outer,
}

impl JoinType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::Left => "left",
            JoinType::Right => "right",
            JoinType::Inner => "inner",
            JoinType::Outer => "outer",
        }
    }
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Join-membership of an output row, used for statistics and then dropped.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Provenance {
    Both,
    LeftOnly,
    RightOnly,
}

/// Summary statistics for a completed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStats {
    pub left_rows: usize,
    pub right_rows: usize,
    pub output_rows: usize,
    pub matched: usize,
    pub left_only: usize,
    pub right_only: usize,
    pub join_type: JoinType,
}

/// A merged dataset plus its statistics.
#[derive(Debug, Clone)]
pub struct MergeOutput {
    pub dataset: Dataset,
    pub stats: MergeStats,
}

/// Result of a key-overlap preview between two columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchPreview {
    pub unique_a: usize,
    pub unique_b: usize,
    pub match_count: usize,
    pub match_percent: f64,
}

/// Compare two key columns on normalized values without performing the join.
pub fn match_preview(
    left: &Dataset,
    right: &Dataset,
    key_a: &str,
    key_b: &str,
) -> Result<MatchPreview, TabularError> {
    let values_a = left.normalized_values(key_a)?;
    let values_b = right.normalized_values(key_b)?;
    let match_count = values_a.intersection(&values_b).count();
    let match_percent = if values_a.is_empty() {
        0.0
    } else {
        (match_count as f64 / values_a.len() as f64 * 1000.0).round() / 10.0
    };
    Ok(MatchPreview {
        unique_a: values_a.len(),
        unique_b: values_b.len(),
        match_count,
        match_percent,
    })
}

/// Join `left` and `right` on a key pair.
///
/// `selected_columns`, when present and overlapping the output header, filters
/// the output columns; an allow-list with no overlap is ignored rather than
/// producing an empty dataset.
pub fn merge(
    left: &Dataset,
    right: &Dataset,
    join: JoinType,
    left_key: &str,
    right_key: &str,
    selected_columns: Option<&[String]>,
) -> Result<MergeOutput, TabularError> {
    let left_key_idx = left.column_index(left_key)?;
    let right_key_idx = right.column_index(right_key)?;

    // Same-name keys collapse into one output column; otherwise both are kept.
    let shared_key = left_key == right_key;

    let left_names: HashSet<&str> = left.columns().iter().map(String::as_str).collect();
    let mut columns: Vec<String> = left.columns().to_vec();
    let mut right_out_idx: Vec<usize> = Vec::new();
    for (idx, name) in right.columns().iter().enumerate() {
        if shared_key && idx == right_key_idx {
            continue;
        }
        right_out_idx.push(idx);
        if left_names.contains(name.as_str()) {
            columns.push(format!("{name}_right"));
        } else {
            columns.push(name.clone());
        }
    }

    let emit = |left_row: Option<&Vec<String>>, right_row: Option<&Vec<String>>| -> Vec<String> {
        let mut out: Vec<String> = match left_row {
            Some(row) => row.clone(),
            None => vec![String::new(); left.columns().len()],
        };
        if let Some(row) = right_row {
            // A right-only row still carries its key into the shared column.
            if shared_key && left_row.is_none() {
                out[left_key_idx] = row[right_key_idx].clone();
            }
            out.extend(right_out_idx.iter().map(|&i| row[i].clone()));
        } else {
            out.extend(std::iter::repeat_n(String::new(), right_out_idx.len()));
        }
        out
    };

    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut provenance: Vec<Provenance> = Vec::new();

    match join {
        JoinType::Left | JoinType::Inner | JoinType::Outer => {
            let right_index = right.key_index(right_key_idx);
            let mut matched_right: HashSet<usize> = HashSet::new();

            for left_row in left.rows() {
                let key = left_row[left_key_idx].as_str();
                let matches = if key.is_empty() { None } else { right_index.get(key) };
                match matches {
                    Some(indexes) => {
                        for &ri in indexes {
                            matched_right.insert(ri);
                            rows.push(emit(Some(left_row), Some(&right.rows()[ri])));
                            provenance.push(Provenance::Both);
                        }
                    }
                    None => {
                        if join != JoinType::Inner {
                            rows.push(emit(Some(left_row), None));
                            provenance.push(Provenance::LeftOnly);
                        }
                    }
                }
            }

            if join == JoinType::Outer {
                for (ri, right_row) in right.rows().iter().enumerate() {
                    if !matched_right.contains(&ri) {
                        rows.push(emit(None, Some(right_row)));
                        provenance.push(Provenance::RightOnly);
                    }
                }
            }
        }
        JoinType::Right => {
            let left_index = left.key_index(left_key_idx);
            for right_row in right.rows() {
                let key = right_row[right_key_idx].as_str();
                let matches = if key.is_empty() { None } else { left_index.get(key) };
                match matches {
                    Some(indexes) => {
                        for &li in indexes {
                            rows.push(emit(Some(&left.rows()[li]), Some(right_row)));
                            provenance.push(Provenance::Both);
                        }
                    }
                    None => {
                        rows.push(emit(None, Some(right_row)));
                        provenance.push(Provenance::RightOnly);
                    }
                }
            }
        }
    }

    let stats = MergeStats {
        left_rows: left.row_count(),
        right_rows: right.row_count(),
        output_rows: rows.len(),
        matched: provenance.iter().filter(|p| **p == Provenance::Both).count(),
        left_only: provenance
            .iter()
            .filter(|p| **p == Provenance::LeftOnly)
            .count(),
        right_only: provenance
            .iter()
            .filter(|p| **p == Provenance::RightOnly)
            .count(),
        join_type: join,
    };

    let mut dataset = Dataset::new(columns, rows);
    if let Some(selection) = selected_columns {
        dataset = apply_selection(dataset, selection);
    }

    Ok(MergeOutput { dataset, stats })
}

/// Keep only the selected columns, preserving output order. A selection that
/// matches nothing leaves the dataset untouched.
fn apply_selection(dataset: Dataset, selection: &[String]) -> Dataset {
    let wanted: HashSet<&str> = selection.iter().map(String::as_str).collect();
    let keep: Vec<usize> = dataset
        .columns()
        .iter()
        .enumerate()
        .filter(|(_, name)| wanted.contains(name.as_str()))
        .map(|(i, _)| i)
        .collect();
    if keep.is_empty() {
        return dataset;
    }
    let columns = keep.iter().map(|&i| dataset.columns()[i].clone()).collect();
    let rows = dataset
        .rows()
        .iter()
        .map(|row| keep.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Dataset::new(columns, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn left() -> Dataset {
        Dataset::new(
            vec!["k".into(), "x".into()],
            vec![
                vec!["1".into(), "a".into()],
                vec!["2".into(), "b".into()],
                vec!["3".into(), "c".into()],
            ],
        )
    }

    fn right() -> Dataset {
        Dataset::new(
            vec!["k".into(), "y".into()],
            vec![
                vec!["1".into(), "p".into()],
                vec!["2".into(), "q".into()],
                vec!["9".into(), "z".into()],
            ],
        )
    }

    #[test]
    fn inner_join_on_fully_matching_keys() {
        let a = Dataset::new(
            vec!["k".into(), "x".into()],
            vec![vec!["1".into(), "a".into()], vec!["2".into(), "b".into()]],
        );
        let b = Dataset::new(
            vec!["k".into(), "y".into()],
            vec![vec!["1".into(), "p".into()], vec!["2".into(), "q".into()]],
        );
        let out = merge(&a, &b, JoinType::Inner, "k", "k", None).unwrap();
        assert_eq!(out.stats.output_rows, 2);
        assert_eq!(out.stats.matched, 2);
        assert_eq!(out.stats.left_only, 0);
        assert_eq!(out.stats.right_only, 0);
        assert_eq!(out.dataset.columns(), ["k", "x", "y"]);
    }

    #[test]
    fn duplicate_keys_expand_cartesian() {
        let a = Dataset::new(
            vec!["k".into(), "x".into()],
            vec![vec!["1".into(), "a".into()], vec!["1".into(), "b".into()]],
        );
        let b = Dataset::new(
            vec!["k".into(), "y".into()],
            vec![vec!["1".into(), "p".into()]],
        );
        let out = merge(&a, &b, JoinType::Inner, "k", "k", None).unwrap();
        assert_eq!(out.stats.output_rows, 2);
        assert_eq!(out.stats.matched, 2);
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows() {
        let out = merge(&left(), &right(), JoinType::Left, "k", "k", None).unwrap();
        assert_eq!(out.stats.output_rows, 3);
        assert_eq!(out.stats.matched, 2);
        assert_eq!(out.stats.left_only, 1);
        assert_eq!(out.stats.right_only, 0);
        // Unmatched left row has empty right cells.
        assert_eq!(out.dataset.rows()[2], ["3", "c", ""]);
    }

    #[test]
    fn right_join_keeps_unmatched_right_rows() {
        let out = merge(&left(), &right(), JoinType::Right, "k", "k", None).unwrap();
        assert_eq!(out.stats.output_rows, 3);
        assert_eq!(out.stats.right_only, 1);
        // The shared key column carries the right side's key for right-only rows.
        assert_eq!(out.dataset.rows()[2][0], "9");
    }

    #[test]
    fn outer_join_keeps_both_sides() {
        let out = merge(&left(), &right(), JoinType::Outer, "k", "k", None).unwrap();
        assert_eq!(out.stats.output_rows, 4);
        assert_eq!(out.stats.matched, 2);
        assert_eq!(out.stats.left_only, 1);
        assert_eq!(out.stats.right_only, 1);
    }

    #[test]
    fn distinct_key_names_keep_both_columns() {
        let b = Dataset::new(
            vec!["id".into(), "y".into()],
            vec![vec!["1".into(), "p".into()]],
        );
        let out = merge(&left(), &b, JoinType::Inner, "k", "id", None).unwrap();
        assert_eq!(out.dataset.columns(), ["k", "x", "id", "y"]);
    }

    #[test]
    fn colliding_right_columns_are_suffixed() {
        let b = Dataset::new(
            vec!["k".into(), "x".into()],
            vec![vec!["1".into(), "other".into()]],
        );
        let out = merge(&left(), &b, JoinType::Inner, "k", "k", None).unwrap();
        assert_eq!(out.dataset.columns(), ["k", "x", "x_right"]);
    }

    #[test]
    fn empty_keys_never_match() {
        let a = Dataset::new(vec!["k".into()], vec![vec![String::new()]]);
        let b = Dataset::new(vec!["k".into()], vec![vec![String::new()]]);
        let out = merge(&a, &b, JoinType::Outer, "k", "k", None).unwrap();
        assert_eq!(out.stats.matched, 0);
        assert_eq!(out.stats.left_only, 1);
        assert_eq!(out.stats.right_only, 1);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let err = merge(&left(), &right(), JoinType::Inner, "nope", "k", None).unwrap_err();
        assert!(matches!(err, TabularError::MissingColumn(_)));
    }

    #[test]
    fn column_selection_filters_output() {
        let selection = vec!["k".to_string(), "y".to_string()];
        let out = merge(&left(), &right(), JoinType::Inner, "k", "k", Some(&selection)).unwrap();
        assert_eq!(out.dataset.columns(), ["k", "y"]);
    }

    #[test]
    fn selection_with_no_overlap_is_ignored() {
        let selection = vec!["missing".to_string()];
        let out = merge(&left(), &right(), JoinType::Inner, "k", "k", Some(&selection)).unwrap();
        assert_eq!(out.dataset.columns(), ["k", "x", "y"]);
    }

    #[test]
    fn match_preview_normalizes_values() {
        let a = Dataset::new(
            vec!["k".into()],
            vec![vec!["Foo ".into()], vec!["bar".into()]],
        );
        let b = Dataset::new(vec!["k".into()], vec![vec!["foo".into()]]);
        let preview = match_preview(&a, &b, "k", "k").unwrap();
        assert_eq!(preview.unique_a, 2);
        assert_eq!(preview.unique_b, 1);
        assert_eq!(preview.match_count, 1);
        assert_eq!(preview.match_percent, 50.0);
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;
        use std::collections::HashMap;

        fn dataset_with_keys(keys: &[u8]) -> Dataset {
            Dataset::new(
                vec!["k".into(), "v".into()],
                keys.iter()
                    .enumerate()
                    .map(|(i, k)| vec![k.to_string(), i.to_string()])
                    .collect(),
            )
        }

        proptest! {
            /// Inner-join row count equals the sum over keys of the product of
            /// per-side multiplicities (Cartesian expansion law).
            #[test]
            fn inner_join_count_law(
                left_keys in proptest::collection::vec(0u8..8, 0..24),
                right_keys in proptest::collection::vec(0u8..8, 0..24),
            ) {
                let a = dataset_with_keys(&left_keys);
                let b = dataset_with_keys(&right_keys);
                let out = merge(&a, &b, JoinType::Inner, "k", "k", None).unwrap();

                let mut left_counts: HashMap<u8, usize> = HashMap::new();
                for k in &left_keys { *left_counts.entry(*k).or_default() += 1; }
                let mut right_counts: HashMap<u8, usize> = HashMap::new();
                for k in &right_keys { *right_counts.entry(*k).or_default() += 1; }

                let expected: usize = left_counts
                    .iter()
                    .map(|(k, lc)| lc * right_counts.get(k).copied().unwrap_or(0))
                    .sum();

                prop_assert_eq!(out.stats.output_rows, expected);
                prop_assert_eq!(out.stats.matched, expected);
            }

            /// Provenance counts always sum to the output row count.
            #[test]
            fn provenance_partitions_output(
                left_keys in proptest::collection::vec(0u8..8, 0..24),
                right_keys in proptest::collection::vec(0u8..8, 0..24),
            ) {
                let a = dataset_with_keys(&left_keys);
                let b = dataset_with_keys(&right_keys);
                for join in [JoinType::Left, JoinType::Right, JoinType::Inner, JoinType::Outer] {
                    let out = merge(&a, &b, join, "k", "k", None).unwrap();
                    prop_assert_eq!(
                        out.stats.matched + out.stats.left_only + out.stats.right_only,
                        out.stats.output_rows
                    );
                }
            }
        }
    }
}
