//! The in-memory dataset model.

use std::collections::{HashMap, HashSet};

use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::TabularError;

/// Cap on the number of distinct values considered per column when building
/// match previews; keeps pathological files from ballooning memory.
pub const UNIQUE_VALUE_CAP: usize = 50_000;

/// An ordered set of named columns plus rows of text cells.
///
/// Cells are kept as text: uploads are text-shaped formats, and every consumer
/// (join keys, previews, persisted CSV) works on the textual representation.
/// Numeric semantics are recovered only for presentation via
/// [`Dataset::infer_dtypes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Dataset {
    /// Build a dataset, padding/truncating ragged rows to the header width.
    pub fn new(columns: Vec<String>, mut rows: Vec<Vec<String>>) -> Self {
        let width = columns.len();
        for row in &mut rows {
            row.resize(width, String::new());
        }
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Result<usize, TabularError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TabularError::MissingColumn(name.to_string()))
    }

    /// Row-wise concatenation of several datasets.
    ///
    /// The first part's header wins; subsequent parts are stacked positionally.
    /// Column sets are assumed compatible; there is no schema reconciliation.
    pub fn concat(parts: Vec<Dataset>) -> Result<Dataset, TabularError> {
        let mut parts = parts.into_iter();
        let first = parts.next().ok_or(TabularError::Empty)?;
        let mut rows = first.rows;
        for part in parts {
            rows.extend(part.rows);
        }
        Ok(Dataset::new(first.columns, rows))
    }

    /// Infer a presentation-only scalar type per column.
    ///
    /// Mirrors the common dataframe vocabulary: `int64`, `float64`, `bool`,
    /// `object`. Empty cells are ignored; an all-empty column is `object`.
    pub fn infer_dtypes(&self) -> JsonMap<String, JsonValue> {
        let mut dtypes = JsonMap::new();
        for (idx, name) in self.columns.iter().enumerate() {
            let mut saw_value = false;
            let mut all_int = true;
            let mut all_float = true;
            let mut all_bool = true;
            for row in &self.rows {
                let cell = row[idx].trim();
                if cell.is_empty() {
                    continue;
                }
                saw_value = true;
                all_int = all_int && cell.parse::<i64>().is_ok();
                all_float = all_float && cell.parse::<f64>().is_ok();
                all_bool = all_bool
                    && matches!(cell.to_ascii_lowercase().as_str(), "true" | "false");
                if !all_int && !all_float && !all_bool {
                    break;
                }
            }
            let dtype = if !saw_value {
                "object"
            } else if all_int {
                "int64"
            } else if all_float {
                "float64"
            } else if all_bool {
                "bool"
            } else {
                "object"
            };
            dtypes.insert(name.clone(), JsonValue::String(dtype.to_string()));
        }
        dtypes
    }

    /// Number of distinct raw values per column.
    pub fn unique_counts(&self) -> JsonMap<String, JsonValue> {
        let mut counts = JsonMap::new();
        for (idx, name) in self.columns.iter().enumerate() {
            let distinct: HashSet<&str> = self.rows.iter().map(|r| r[idx].as_str()).collect();
            counts.insert(name.clone(), JsonValue::from(distinct.len()));
        }
        counts
    }

    /// First `limit` rows as JSON objects with all cells serialized as text.
    pub fn preview(&self, limit: usize) -> Vec<JsonMap<String, JsonValue>> {
        self.rows
            .iter()
            .take(limit)
            .map(|row| {
                let mut obj = JsonMap::new();
                for (name, cell) in self.columns.iter().zip(row) {
                    obj.insert(name.clone(), JsonValue::String(cell.clone()));
                }
                obj
            })
            .collect()
    }

    /// Distinct normalized (trimmed, case-folded) non-empty values of a column,
    /// capped at [`UNIQUE_VALUE_CAP`]. Used for match previews.
    pub fn normalized_values(&self, column: &str) -> Result<HashSet<String>, TabularError> {
        let idx = self.column_index(column)?;
        let mut values = HashSet::new();
        for row in &self.rows {
            let v = row[idx].trim().to_lowercase();
            if !v.is_empty() {
                values.insert(v);
                if values.len() >= UNIQUE_VALUE_CAP {
                    break;
                }
            }
        }
        Ok(values)
    }

    /// Group row indexes by the raw value of a key column.
    ///
    /// Empty key cells are excluded: a missing key never matches anything.
    pub(crate) fn key_index(&self, key_idx: usize) -> HashMap<&str, Vec<usize>> {
        let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = row[key_idx].as_str();
            if !key.is_empty() {
                index.entry(key).or_default().push(i);
            }
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        Dataset::new(
            vec!["id".into(), "name".into(), "score".into()],
            vec![
                vec!["1".into(), "alice".into(), "10".into()],
                vec!["2".into(), "bob".into(), "3.5".into()],
                vec!["2".into(), "bob".into(), String::new()],
            ],
        )
    }

    #[test]
    fn ragged_rows_are_padded_to_header_width() {
        let ds = Dataset::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into()], vec!["1".into(), "2".into(), "3".into()]],
        );
        assert!(ds.rows().iter().all(|r| r.len() == 2));
    }

    #[test]
    fn dtype_inference() {
        let dtypes = sample().infer_dtypes();
        assert_eq!(dtypes["id"], "int64");
        assert_eq!(dtypes["name"], "object");
        // Mixed ints and decimals degrade to float64.
        assert_eq!(dtypes["score"], "float64");
    }

    #[test]
    fn unique_counts_count_raw_values() {
        let counts = sample().unique_counts();
        assert_eq!(counts["id"], 2);
        assert_eq!(counts["name"], 2);
        assert_eq!(counts["score"], 3);
    }

    #[test]
    fn preview_serializes_cells_as_text() {
        let preview = sample().preview(1);
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0]["score"], "10");
    }

    #[test]
    fn concat_stacks_rows_under_first_header() {
        let a = sample();
        let b = sample();
        let merged = Dataset::concat(vec![a, b]).unwrap();
        assert_eq!(merged.row_count(), 6);
        assert_eq!(merged.columns().len(), 3);
    }

    #[test]
    fn concat_of_nothing_is_an_error() {
        assert!(matches!(Dataset::concat(vec![]), Err(TabularError::Empty)));
    }

    #[test]
    fn normalized_values_fold_case_and_trim() {
        let ds = Dataset::new(
            vec!["k".into()],
            vec![
                vec!["  Foo ".into()],
                vec!["foo".into()],
                vec![String::new()],
            ],
        );
        let values = ds.normalized_values("k").unwrap();
        assert_eq!(values.len(), 1);
        assert!(values.contains("foo"));
    }
}
